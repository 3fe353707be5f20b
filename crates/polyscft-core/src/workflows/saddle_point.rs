use crate::core::grid::SimulationBox;
use crate::core::spectral::SpectralTransform;
use crate::engine::anderson::AndersonMixing;
use crate::engine::config::{ConfigError, SaddlePointConfig};
use crate::engine::error::{EngineError, check_len};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::propagator::PropagatorSolver;
use itertools::izip;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SaddlePointResult {
    /// Number of propagator solves performed.
    pub iterations: usize,
    pub converged: bool,
    pub error_level: f64,
    pub partition_function: f64,
    pub hamiltonian: f64,
    pub mass_error: f64,
    pub phi_a: Vec<f64>,
    pub phi_b: Vec<f64>,
}

/// Field-theoretic Hamiltonian per chain of an incompressible AB melt,
/// `-ln(Q/V) + <w-, w-> / (χN V) - ∫ w+ / V`.
pub fn hamiltonian(
    sim_box: &SimulationBox,
    chi_n: f64,
    partition_function: f64,
    w_plus: &[f64],
    w_minus: &[f64],
) -> f64 {
    let volume = sim_box.volume();
    -(partition_function / volume).ln() + sim_box.inner_product(w_minus, w_minus) / chi_n / volume
        - sim_box.integral(w_plus) / volume
}

/// Relaxes the pressure-like field `w+` for a fixed exchange field `w-` until
/// the melt is incompressible (`phi_a + phi_b = 1`).
///
/// `w+` is updated in place by `mixer`, which is reset on entry. Running out
/// of iterations is reported through [`SaddlePointResult::converged`], not as
/// an error.
#[instrument(skip_all, name = "saddle_point_workflow")]
pub fn run<T: SpectralTransform>(
    solver: &mut PropagatorSolver<T>,
    mixer: &mut AndersonMixing,
    w_plus: &mut [f64],
    w_minus: &[f64],
    config: &SaddlePointConfig,
    reporter: &ProgressReporter,
) -> Result<SaddlePointResult, EngineError> {
    config.validate()?;
    let sim_box = solver.sim_box().clone();
    let chi_n = solver.chain().chi_n();
    if !(chi_n.is_finite() && chi_n > 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "chi_n",
            reason: format!("must be positive for the saddle-point search, got {chi_n}"),
        }
        .into());
    }

    let mm = sim_box.grid_size();
    check_len("w_plus", w_plus, mm)?;
    check_len("w_minus", w_minus, mm)?;

    let volume = sim_box.volume();
    let mut w_a = vec![0.0; mm];
    let mut w_b = vec![0.0; mm];
    let mut w_plus_out = vec![0.0; mm];
    let mut g_plus = vec![0.0; mm];
    let mut error_level = f64::INFINITY;

    mixer.reset();
    debug!(
        tolerance = config.tolerance,
        max_iterations = config.max_iterations,
        "Starting saddle-point iteration."
    );

    let mut iteration = 0;
    loop {
        iteration += 1;

        sim_box.linear_combination(&mut w_a, 1.0, w_plus, 1.0, w_minus);
        sim_box.linear_combination(&mut w_b, 1.0, w_plus, -1.0, w_minus);
        let solution = solver.find_phi(&w_a, &w_b)?;
        if !solution.is_finite() {
            return Err(EngineError::NonFiniteSolution { iteration });
        }

        for (g, a, b) in izip!(g_plus.iter_mut(), &solution.phi_a, &solution.phi_b) {
            *g = a + b - 1.0;
        }
        sim_box.linear_combination(&mut w_plus_out, 1.0, w_plus, 1.0, &g_plus);
        sim_box.zero_mean(&mut w_plus_out);

        let old_error_level = error_level;
        error_level = (sim_box.inner_product(&g_plus, &g_plus) / volume).sqrt();
        let mass_error = sim_box.mean(&g_plus);

        debug!(iteration, error_level, mass_error, "Saddle-point iteration.");
        reporter.report(Progress::Iteration {
            iteration,
            error_level,
            mass_error,
        });

        let converged = error_level < config.tolerance;
        if converged || iteration >= config.max_iterations {
            let result = SaddlePointResult {
                iterations: iteration,
                converged,
                error_level,
                partition_function: solution.partition_function,
                hamiltonian: hamiltonian(
                    &sim_box,
                    chi_n,
                    solution.partition_function,
                    w_plus,
                    w_minus,
                ),
                mass_error,
                phi_a: solution.phi_a,
                phi_b: solution.phi_b,
            };
            if converged {
                info!(
                    iterations = iteration,
                    hamiltonian = result.hamiltonian,
                    "Saddle point found."
                );
            } else {
                warn!(
                    iterations = iteration,
                    error_level,
                    tolerance = config.tolerance,
                    "Saddle-point search stopped before reaching the tolerance."
                );
            }
            return Ok(result);
        }

        match mixer.compute_new_fields(w_plus, &w_plus_out, &g_plus, old_error_level, error_level) {
            Err(EngineError::SingularSystem {
                size,
                smallest,
                threshold,
            }) => {
                warn!(
                    iteration,
                    size,
                    smallest,
                    threshold,
                    "Anderson system is singular; restarting with an empty history."
                );
                mixer.reset();
                mixer.compute_new_fields(
                    w_plus,
                    &w_plus_out,
                    &g_plus,
                    old_error_level,
                    error_level,
                )?;
            }
            other => other?,
        }
    }
}
