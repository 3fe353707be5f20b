use super::saddle_point::{self, SaddlePointResult};
use crate::core::grid::SimulationBox;
use crate::core::spectral::SpectralTransform;
use crate::engine::anderson::AndersonMixing;
use crate::engine::config::{ConfigError, LangevinConfig, LangevinScheme, SaddlePointConfig};
use crate::engine::error::{EngineError, check_len};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::propagator::PropagatorSolver;
use itertools::izip;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, instrument, warn};

/// Copy of both fields taken during a Langevin run.
#[derive(Debug, Clone, PartialEq)]
pub struct LangevinSnapshot {
    /// Zero-based index of the step after which the copy was taken.
    pub step: usize,
    pub w_plus: Vec<f64>,
    pub w_minus: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LangevinResult {
    pub steps: usize,
    /// Hamiltonian at the end of every step.
    pub hamiltonians: Vec<f64>,
    /// `-ln(Q/V)` at the end of every step.
    pub neg_log_partitions: Vec<f64>,
    /// Propagator solves spent in all saddle-point searches, including the
    /// initial one.
    pub saddle_iterations: usize,
    /// Saddle-point searches that stopped at `max_iterations`.
    pub unconverged_searches: usize,
    pub snapshots: Vec<LangevinSnapshot>,
    /// State of the last saddle-point search.
    pub last_saddle: SaddlePointResult,
}

/// Standard deviation of the per-grid-point noise for one Langevin step of
/// length `dt`.
pub fn noise_sigma(sim_box: &SimulationBox, dt: f64, nbar: f64) -> f64 {
    (2.0 * dt * sim_box.grid_size() as f64 / (sim_box.volume() * nbar.sqrt())).sqrt()
}

/// Step factors of exponential time differencing for the exchange field,
/// whose linear part relaxes at `rate = 2/χN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtdKernels {
    pub rate: f64,
    /// `(1 - e^{-rate dt}) / rate`, applied to the full drift.
    pub drift: f64,
    /// `sqrt((1 - e^{-2 rate dt}) / (2 rate dt))`, applied to the noise.
    pub noise: f64,
    /// `(rate dt + e^{-rate dt} - 1) / (rate² dt)`, applied to the
    /// second-stage correction.
    pub second: f64,
}

impl EtdKernels {
    pub fn new(chi_n: f64, dt: f64) -> Self {
        let rate = 2.0 / chi_n;
        let x = rate * dt;
        Self {
            rate,
            drift: dt * phi1(x),
            noise: phi1(2.0 * x).sqrt(),
            second: dt * phi2(x),
        }
    }
}

/// `(1 - e^{-x}) / x`
fn phi1(x: f64) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    -(-x).exp_m1() / x
}

/// `(x + e^{-x} - 1) / x²`
fn phi2(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        return 0.5 - x / 6.0 + x * x / 24.0;
    }
    (x + (-x).exp_m1()) / (x * x)
}

/// Field-theoretic simulation of the exchange field `w-`. `w+` is kept at
/// its saddle point after every stage; the integrator is chosen by
/// [`LangevinConfig::scheme`].
#[instrument(skip_all, name = "langevin_workflow")]
pub fn run<T: SpectralTransform>(
    solver: &mut PropagatorSolver<T>,
    mixer: &mut AndersonMixing,
    w_plus: &mut [f64],
    w_minus: &mut [f64],
    saddle_config: &SaddlePointConfig,
    config: &LangevinConfig,
    reporter: &ProgressReporter,
) -> Result<LangevinResult, EngineError> {
    config.validate()?;
    let sim_box = solver.sim_box().clone();
    let chi_n = solver.chain().chi_n();
    let mm = sim_box.grid_size();
    let volume = sim_box.volume();
    check_len("w_plus", w_plus, mm)?;
    check_len("w_minus", w_minus, mm)?;

    let sigma = noise_sigma(&sim_box, config.dt, config.nbar);
    let normal = Normal::new(0.0, sigma).map_err(|e| ConfigError::InvalidParameter {
        name: "dt",
        reason: format!("noise amplitude {sigma} is unusable: {e}"),
    })?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    info!(
        sigma,
        seed = config.seed,
        steps = config.max_steps,
        scheme = %config.scheme,
        "Starting Langevin dynamics."
    );

    let mut saddle_iterations = 0;
    let mut unconverged_searches = 0;
    let mut search = |solver: &mut PropagatorSolver<T>,
                      mixer: &mut AndersonMixing,
                      w_plus: &mut [f64],
                      w_minus: &[f64]|
     -> Result<SaddlePointResult, EngineError> {
        let result = saddle_point::run(solver, mixer, w_plus, w_minus, saddle_config, reporter)?;
        saddle_iterations += result.iterations;
        if !result.converged {
            unconverged_searches += 1;
        }
        Ok(result)
    };

    let mut current = search(solver, mixer, w_plus, w_minus)?;

    // χN > 0 is guaranteed once the first search has succeeded
    let etd = EtdKernels::new(chi_n, config.dt);
    if config.scheme != LangevinScheme::PredictorCorrector {
        debug!(
            drift = etd.drift,
            noise = etd.noise,
            second = etd.second,
            "Exponential time differencing kernels."
        );
    }

    let mut w_minus_copy = vec![0.0; mm];
    let mut noise = vec![0.0; mm];
    let mut g_minus = vec![0.0; mm];
    let mut hamiltonians = Vec::with_capacity(config.max_steps);
    let mut neg_log_partitions = Vec::with_capacity(config.max_steps);
    let mut snapshots = Vec::new();

    reporter.report(Progress::TaskStart {
        total_steps: config.max_steps as u64,
    });
    for step in 0..config.max_steps {
        w_minus_copy.copy_from_slice(w_minus);
        noise.iter_mut().for_each(|x| *x = normal.sample(&mut rng));
        for (g, wm, a, b) in izip!(g_minus.iter_mut(), w_minus.iter(), &current.phi_a, &current.phi_b) {
            *g = a - b + 2.0 * wm / chi_n;
        }

        match config.scheme {
            LangevinScheme::PredictorCorrector => {
                for (wm, g, n) in izip!(w_minus.iter_mut(), &g_minus, &noise) {
                    *wm += -g * config.dt + n;
                }
                sim_box.zero_mean(w_minus);
                current = search(solver, mixer, w_plus, w_minus)?;

                for (wm, w0, g1, a, b, n) in izip!(
                    w_minus.iter_mut(),
                    &w_minus_copy,
                    &g_minus,
                    &current.phi_a,
                    &current.phi_b,
                    &noise
                ) {
                    let g2 = a - b + 2.0 * *wm / chi_n;
                    *wm = w0 - 0.5 * (g1 + g2) * config.dt + n;
                }
            }
            LangevinScheme::Etd | LangevinScheme::EtdRk2 => {
                for (wm, g, n) in izip!(w_minus.iter_mut(), &g_minus, &noise) {
                    *wm += -etd.drift * g + etd.noise * n;
                }
                if config.scheme == LangevinScheme::EtdRk2 {
                    sim_box.zero_mean(w_minus);
                    current = search(solver, mixer, w_plus, w_minus)?;

                    for (wm, w0, g1, a, b) in izip!(
                        w_minus.iter_mut(),
                        &w_minus_copy,
                        &g_minus,
                        &current.phi_a,
                        &current.phi_b
                    ) {
                        let g2 = a - b + 2.0 * *wm / chi_n;
                        *wm += etd.second * (-g2 + etd.rate * *wm + g1 - etd.rate * w0);
                    }
                }
            }
        }
        sim_box.zero_mean(w_minus);
        current = search(solver, mixer, w_plus, w_minus)?;

        let neg_log_partition = -(current.partition_function / volume).ln();
        hamiltonians.push(current.hamiltonian);
        neg_log_partitions.push(neg_log_partition);
        if config.snapshot_interval > 0 && step % config.snapshot_interval == 0 {
            snapshots.push(LangevinSnapshot {
                step,
                w_plus: w_plus.to_vec(),
                w_minus: w_minus.to_vec(),
            });
        }
        info!(
            step = step + 1,
            hamiltonian = current.hamiltonian,
            neg_log_partition,
            saddle_iterations = current.iterations,
            "Langevin step finished."
        );
        reporter.report(Progress::TaskIncrement);
    }
    reporter.report(Progress::TaskFinish);

    if unconverged_searches > 0 {
        warn!(
            unconverged_searches,
            "Some saddle-point searches did not reach the tolerance."
        );
    }

    Ok(LangevinResult {
        steps: config.max_steps,
        hamiltonians,
        neg_log_partitions,
        saddle_iterations,
        unconverged_searches,
        snapshots,
        last_saddle: current,
    })
}
