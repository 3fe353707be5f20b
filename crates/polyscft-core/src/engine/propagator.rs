use super::config::{SolverOptions, SplittingScheme};
use super::error::{EngineError, check_len};
use crate::core::chain::{ChainModel, PolymerChain};
use crate::core::grid::SimulationBox;
use crate::core::spectral::SpectralTransform;
use num_complex::Complex64;
use tracing::{debug, trace, warn};

const SPECIES_A: usize = 0;
const SPECIES_B: usize = 1;

/// Segment concentrations and single-chain partition function of one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagatorSolution {
    pub phi_a: Vec<f64>,
    pub phi_b: Vec<f64>,
    /// `Q = ∫ q(r, s) q†(r, s) dr`, reported as the integral over the box
    /// (not divided by the volume).
    pub partition_function: f64,
    volume: f64,
}

impl PropagatorSolution {
    /// `Q / V`.
    #[inline]
    pub fn mean_partition(&self) -> f64 {
        self.partition_function / self.volume
    }

    /// `false` when the fields were extreme enough to overflow or underflow
    /// the propagators.
    pub fn is_finite(&self) -> bool {
        self.partition_function.is_finite()
            && self.partition_function > 0.0
            && self.phi_a.iter().chain(&self.phi_b).all(|v| v.is_finite())
    }
}

/// Scratch and Fourier-space factors shared by every contour step.
struct SplitKernel<T> {
    transform: T,
    boltz_full: Vec<f64>,
    boltz_half: Vec<f64>,
    spectral: Vec<Complex64>,
    full: Vec<f64>,
    half: Vec<f64>,
}

impl<T: SpectralTransform> SplitKernel<T> {
    fn diffuse(transform: &mut T, spectral: &mut [Complex64], boltz: &[f64], data: &mut [f64]) {
        transform.forward(data, spectral);
        for (c, b) in spectral.iter_mut().zip(boltz) {
            *c *= *b;
        }
        transform.backward(spectral, data);
    }

    /// `exp_dw` holds `exp(-w ds / 2)` and `exp_dw_half` holds `exp(-w ds / 4)`.
    fn gaussian_step(
        &mut self,
        scheme: SplittingScheme,
        q_in: &[f64],
        q_out: &mut [f64],
        exp_dw: &[f64],
        exp_dw_half: &[f64],
    ) {
        for (f, q, e) in itertools::izip!(self.full.iter_mut(), q_in, exp_dw) {
            *f = q * e;
        }
        Self::diffuse(
            &mut self.transform,
            &mut self.spectral,
            &self.boltz_full,
            &mut self.full,
        );

        if scheme == SplittingScheme::Strang {
            for (out, f, e) in itertools::izip!(q_out.iter_mut(), &self.full, exp_dw) {
                *out = f * e;
            }
            return;
        }

        for (f, e) in self.full.iter_mut().zip(exp_dw) {
            *f *= e;
        }

        for (h, q, e) in itertools::izip!(self.half.iter_mut(), q_in, exp_dw_half) {
            *h = q * e;
        }
        Self::diffuse(
            &mut self.transform,
            &mut self.spectral,
            &self.boltz_half,
            &mut self.half,
        );
        // two adjacent quarter steps of the field merge into one half step
        for (h, e) in self.half.iter_mut().zip(exp_dw) {
            *h *= e;
        }
        Self::diffuse(
            &mut self.transform,
            &mut self.spectral,
            &self.boltz_half,
            &mut self.half,
        );

        for (out, h, f, e) in itertools::izip!(q_out.iter_mut(), &self.half, &self.full, exp_dw_half) {
            *out = (4.0 * h * e - f) / 3.0;
        }
    }

    /// Bond diffusion followed by the Boltzmann weight of the next bead;
    /// `exp_dw` holds `exp(-w ds)`.
    fn discrete_step(&mut self, q_in: &[f64], q_out: &mut [f64], exp_dw: &[f64]) {
        self.full.copy_from_slice(q_in);
        Self::diffuse(
            &mut self.transform,
            &mut self.spectral,
            &self.boltz_full,
            &mut self.full,
        );
        for (out, f, e) in itertools::izip!(q_out.iter_mut(), &self.full, exp_dw) {
            *out = f * e;
        }
    }
}

/// Pseudo-spectral solver of the modified diffusion equation for an AB
/// diblock in the fields `w_a` and `w_b`.
///
/// `q1` is propagated from the A end and `q2` from the B end. Both are kept
/// for every contour point (`N + 1` slices of the grid), so the concentrations
/// can be integrated after the solve and [`partial_partitions`] can expose
/// any step of the last solution.
///
/// [`partial_partitions`]: Self::partial_partitions
pub struct PropagatorSolver<T: SpectralTransform> {
    sim_box: SimulationBox,
    chain: PolymerChain,
    options: SolverOptions,
    kernel: SplitKernel<T>,
    q1_init: Vec<f64>,
    q2_init: Vec<f64>,
    q1: Vec<f64>,
    q2: Vec<f64>,
    exp_dw: [Vec<f64>; 2],
    exp_dw_half: [Vec<f64>; 2],
    solved: bool,
}

impl<T: SpectralTransform> PropagatorSolver<T> {
    pub fn new(sim_box: &SimulationBox, chain: &PolymerChain, transform: T) -> Result<Self, EngineError> {
        Self::with_options(sim_box, chain, transform, SolverOptions::default())
    }

    pub fn with_options(
        sim_box: &SimulationBox,
        chain: &PolymerChain,
        transform: T,
        options: SolverOptions,
    ) -> Result<Self, EngineError> {
        if transform.grid() != sim_box.nx() {
            return Err(EngineError::TransformGridMismatch {
                transform: transform.grid(),
                grid: sim_box.nx(),
            });
        }

        let mm = sim_box.grid_size();
        let n_points = chain.n_segment() + 1;
        let ds = chain.ds();
        let k2 = transform.squared_wavenumbers(sim_box.lx());
        let boltz_full: Vec<f64> = k2.iter().map(|k| (-k * ds / 6.0).exp()).collect();
        let boltz_half: Vec<f64> = k2.iter().map(|k| (-k * ds / 12.0).exp()).collect();

        debug!(
            "Pseudo-spectral solver for {} chain: grid {:?}, {} contour points, {:?}",
            chain.model(),
            sim_box.nx(),
            n_points,
            options
        );

        let kernel = SplitKernel {
            spectral: vec![Complex64::new(0.0, 0.0); transform.spectral_size()],
            transform,
            boltz_full,
            boltz_half,
            full: vec![0.0; mm],
            half: vec![0.0; mm],
        };

        Ok(Self {
            sim_box: sim_box.clone(),
            chain: chain.clone(),
            options,
            kernel,
            q1_init: vec![1.0; mm],
            q2_init: vec![1.0; mm],
            q1: vec![0.0; n_points * mm],
            q2: vec![0.0; n_points * mm],
            exp_dw: [vec![0.0; mm], vec![0.0; mm]],
            exp_dw_half: [vec![0.0; mm], vec![0.0; mm]],
            solved: false,
        })
    }

    #[inline]
    pub fn sim_box(&self) -> &SimulationBox {
        &self.sim_box
    }

    #[inline]
    pub fn chain(&self) -> &PolymerChain {
        &self.chain
    }

    #[inline]
    pub fn options(&self) -> SolverOptions {
        self.options
    }

    /// Chain-end conditions for the next solves. Both default to `1`
    /// everywhere (free ends).
    pub fn set_initial_propagators(&mut self, q1_init: &[f64], q2_init: &[f64]) -> Result<(), EngineError> {
        let mm = self.sim_box.grid_size();
        check_len("q1_init", q1_init, mm)?;
        check_len("q2_init", q2_init, mm)?;
        self.q1_init.copy_from_slice(q1_init);
        self.q2_init.copy_from_slice(q2_init);
        Ok(())
    }

    /// Solves both propagators in `w_a`, `w_b` and integrates them into
    /// segment concentrations normalized so that their volume average sums
    /// to one.
    ///
    /// Extreme fields are not clamped; check
    /// [`PropagatorSolution::is_finite`] on the result.
    pub fn find_phi(&mut self, w_a: &[f64], w_b: &[f64]) -> Result<PropagatorSolution, EngineError> {
        let mm = self.sim_box.grid_size();
        check_len("w_a", w_a, mm)?;
        check_len("w_b", w_b, mm)?;

        let ds = self.chain.ds();
        let model = self.chain.model();
        for (species, w) in [(SPECIES_A, w_a), (SPECIES_B, w_b)] {
            match model {
                ChainModel::Gaussian => {
                    for (e, eh, wi) in itertools::izip!(
                        self.exp_dw[species].iter_mut(),
                        self.exp_dw_half[species].iter_mut(),
                        w
                    ) {
                        *e = (-wi * ds * 0.5).exp();
                        *eh = (-wi * ds * 0.25).exp();
                    }
                }
                ChainModel::Discrete => {
                    for (e, wi) in self.exp_dw[species].iter_mut().zip(w) {
                        *e = (-wi * ds).exp();
                    }
                }
            }
        }

        let solution = match model {
            ChainModel::Gaussian => {
                self.propagate_gaussian();
                self.gaussian_concentrations()
            }
            ChainModel::Discrete => {
                self.propagate_discrete();
                self.discrete_concentrations()
            }
        };
        self.solved = true;

        if solution.is_finite() {
            trace!("Q/V = {:.10e}", solution.mean_partition());
        } else {
            warn!(
                "Propagator solve produced a non-finite result (Q = {:e})",
                solution.partition_function
            );
        }
        Ok(solution)
    }

    /// Last computed `(q1, q2)` pair after `n` contour steps from the
    /// respective chain end: `q1` at step `n` and `q2` at step `N - n`.
    /// `partial_partitions(0)` returns both initial conditions and
    /// `partial_partitions(N)` both fully propagated chains.
    pub fn partial_partitions(&self, n: usize) -> Result<(&[f64], &[f64]), EngineError> {
        let n_segment = self.chain.n_segment();
        if n > n_segment {
            return Err(EngineError::ContourStepOutOfRange { step: n, n_segment });
        }
        if !self.solved {
            return Err(EngineError::PropagatorsUnavailable);
        }
        Ok((self.q1_slice(n), self.q2_slice(n_segment - n)))
    }

    fn species_of_step(&self, n: usize) -> usize {
        if n <= self.chain.n_segment_a() {
            SPECIES_A
        } else {
            SPECIES_B
        }
    }

    fn q1_slice(&self, n: usize) -> &[f64] {
        let mm = self.sim_box.grid_size();
        &self.q1[n * mm..(n + 1) * mm]
    }

    fn q2_slice(&self, n: usize) -> &[f64] {
        let mm = self.sim_box.grid_size();
        &self.q2[n * mm..(n + 1) * mm]
    }

    fn propagate_gaussian(&mut self) {
        let mm = self.sim_box.grid_size();
        let n_segment = self.chain.n_segment();
        let scheme = self.options.splitting;

        self.q1[..mm].copy_from_slice(&self.q1_init);
        for n in 1..=n_segment {
            let s = self.species_of_step(n);
            let (done, rest) = self.q1.split_at_mut(n * mm);
            self.kernel.gaussian_step(
                scheme,
                &done[(n - 1) * mm..],
                &mut rest[..mm],
                &self.exp_dw[s],
                &self.exp_dw_half[s],
            );
        }

        self.q2[n_segment * mm..].copy_from_slice(&self.q2_init);
        for n in (1..=n_segment).rev() {
            let s = self.species_of_step(n);
            let (rest, done) = self.q2.split_at_mut(n * mm);
            self.kernel.gaussian_step(
                scheme,
                &done[..mm],
                &mut rest[(n - 1) * mm..],
                &self.exp_dw[s],
                &self.exp_dw_half[s],
            );
        }
    }

    fn gaussian_concentrations(&self) -> PropagatorSolution {
        let mm = self.sim_box.grid_size();
        let n_segment = self.chain.n_segment();
        let n_a = self.chain.n_segment_a();
        let quadrature = self.options.quadrature;

        let mut phi_a = vec![0.0; mm];
        let mut phi_b = vec![0.0; mm];
        self.accumulate_products(&mut phi_a, 0, &quadrature.weights(n_a));
        self.accumulate_products(&mut phi_b, n_a, &quadrature.weights(n_segment - n_a));

        let partition_function = self
            .sim_box
            .inner_product(self.q1_slice(n_a), self.q2_slice(n_a));
        self.normalize(phi_a, phi_b, partition_function)
    }

    fn accumulate_products(&self, phi: &mut [f64], first: usize, weights: &[f64]) {
        for (offset, &weight) in weights.iter().enumerate() {
            let n = first + offset;
            for (p, a, b) in itertools::izip!(phi.iter_mut(), self.q1_slice(n), self.q2_slice(n)) {
                *p += weight * a * b;
            }
        }
    }

    fn propagate_discrete(&mut self) {
        let mm = self.sim_box.grid_size();
        let n_segment = self.chain.n_segment();

        self.q1[..mm].copy_from_slice(&self.q1_init);
        let first = self.species_of_step(1);
        for (q, init, e) in itertools::izip!(&mut self.q1[mm..2 * mm], &self.q1_init, &self.exp_dw[first]) {
            *q = init * e;
        }
        for n in 2..=n_segment {
            let s = self.species_of_step(n);
            let (done, rest) = self.q1.split_at_mut(n * mm);
            self.kernel
                .discrete_step(&done[(n - 1) * mm..], &mut rest[..mm], &self.exp_dw[s]);
        }

        self.q2[n_segment * mm..].copy_from_slice(&self.q2_init);
        let last = self.species_of_step(n_segment);
        let (rest, init) = self.q2.split_at_mut(n_segment * mm);
        for (q, i, e) in itertools::izip!(&mut rest[(n_segment - 1) * mm..], &*init, &self.exp_dw[last]) {
            *q = i * e;
        }
        for m in (1..n_segment).rev() {
            let s = self.species_of_step(m);
            let (rest, done) = self.q2.split_at_mut(m * mm);
            self.kernel
                .discrete_step(&done[..mm], &mut rest[(m - 1) * mm..], &self.exp_dw[s]);
        }
    }

    fn discrete_concentrations(&self) -> PropagatorSolution {
        let mm = self.sim_box.grid_size();
        let n_segment = self.chain.n_segment();

        let mut phi_a = vec![0.0; mm];
        let mut phi_b = vec![0.0; mm];
        for n in 1..=n_segment {
            let s = self.species_of_step(n);
            let phi = if s == SPECIES_A { &mut phi_a } else { &mut phi_b };
            // both propagators carry the Boltzmann weight of bead n
            for (p, a, b, e) in itertools::izip!(
                phi.iter_mut(),
                self.q1_slice(n),
                self.q2_slice(n - 1),
                &self.exp_dw[s]
            ) {
                *p += a * b / e;
            }
        }

        let partition_function = self
            .sim_box
            .inner_product(self.q1_slice(n_segment), self.q2_slice(n_segment));
        self.normalize(phi_a, phi_b, partition_function)
    }

    fn normalize(&self, mut phi_a: Vec<f64>, mut phi_b: Vec<f64>, partition_function: f64) -> PropagatorSolution {
        let volume = self.sim_box.volume();
        let norm = volume / (partition_function * self.chain.n_segment() as f64);
        phi_a.iter_mut().chain(phi_b.iter_mut()).for_each(|p| *p *= norm);
        PropagatorSolution {
            phi_a,
            phi_b,
            partition_function,
            volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quadrature::ContourQuadrature;
    use crate::core::spectral::RustFftTransform;

    const TOLERANCE: f64 = 1e-7;

    #[rustfmt::skip]
    const WA: [f64; 60] = [
        0.183471406e+0, 0.623968915e+0, 0.731257661e+0, 0.997228140e+0, 0.961913696e+0,
        0.792673860e-1, 0.429684069e+0, 0.290531312e+0, 0.453270921e+0, 0.199228629e+0,
        0.754931905e-1, 0.226924328e+0, 0.936407886e+0, 0.979392715e+0, 0.464957186e+0,
        0.742653949e+0, 0.368019859e+0, 0.885231224e+0, 0.406191773e+0, 0.653096157e+0,
        0.567929080e-1, 0.568028857e+0, 0.144986181e+0, 0.466158777e+0, 0.573327733e+0,
        0.136324723e+0, 0.819010407e+0, 0.271218167e+0, 0.626224101e+0, 0.398109186e-1,
        0.860031651e+0, 0.338153865e+0, 0.688078522e+0, 0.564682952e+0, 0.222924187e+0,
        0.306816449e+0, 0.316316038e+0, 0.640568415e+0, 0.702342408e+0, 0.632135481e+0,
        0.649402777e+0, 0.647100865e+0, 0.370402133e+0, 0.691313864e+0, 0.447870566e+0,
        0.757298851e+0, 0.586173682e+0, 0.766745717e-1, 0.504185402e+0, 0.812016428e+0,
        0.217988206e+0, 0.273487202e+0, 0.937672578e+0, 0.570540523e+0, 0.409071185e+0,
        0.391548274e-1, 0.663478965e+0, 0.260755447e+0, 0.503943226e+0, 0.979481790e+0,
    ];

    #[rustfmt::skip]
    const WB: [f64; 60] = [
        0.113822903e-1, 0.330673934e+0, 0.270138412e+0, 0.669606774e+0, 0.885344778e-1,
        0.604752856e+0, 0.890062293e+0, 0.328557615e+0, 0.965824739e+0, 0.865399960e+0,
        0.698893686e+0, 0.857947305e+0, 0.594897904e+0, 0.248187208e+0, 0.155686710e+0,
        0.116803898e+0, 0.711146609e+0, 0.107610460e+0, 0.143034307e+0, 0.123131521e+0,
        0.230387237e+0, 0.516274641e+0, 0.562366089e-1, 0.491449746e+0, 0.746656140e+0,
        0.296108614e+0, 0.424987667e+0, 0.651538750e+0, 0.116745920e+0, 0.567790110e+0,
        0.954487190e+0, 0.802476927e-1, 0.440223916e+0, 0.843025420e+0, 0.612864528e+0,
        0.571893767e+0, 0.759625605e+0, 0.872255004e+0, 0.935065364e+0, 0.635565347e+0,
        0.373711972e-2, 0.860683468e+0, 0.186492706e+0, 0.267880995e+0, 0.579305501e+0,
        0.693549226e+0, 0.613843845e+0, 0.259811620e-1, 0.848915465e+0, 0.766111508e+0,
        0.872008750e+0, 0.116289041e+0, 0.917713893e+0, 0.710076955e+0, 0.442712526e+0,
        0.516722213e+0, 0.253395805e+0, 0.472950065e-1, 0.152934959e+0, 0.292486174e+0,
    ];

    #[rustfmt::skip]
    const Q1_LAST: [f64; 60] = [
        0.6965456581, 0.636655225, 0.6514580668,
        0.5794545502, 0.6413949021, 0.5962758192,
        0.558548356, 0.6601148449, 0.5569728913,
        0.5964779091, 0.6290102494, 0.5775121486,
        0.5846974973, 0.6469315711, 0.6639138583,
        0.654692146, 0.5950073499, 0.6825497426,
        0.6917256734, 0.7245422629, 0.7022905036,
        0.6208944319, 0.7362918657, 0.6476201437,
        0.556910252, 0.651577934, 0.6122978018,
        0.5876833681, 0.6942208366, 0.616292124,
        0.5481693969, 0.7025850486, 0.6337584332,
        0.5391286738, 0.6224088075, 0.6143140535,
        0.5345032761, 0.5294697169, 0.520947629,
        0.5829711247, 0.6610041438, 0.5287456124,
        0.6601460967, 0.6659161313, 0.6197818348,
        0.5853524162, 0.5952154452, 0.6984995997,
        0.5638891268, 0.5313406813, 0.5343779299,
        0.6463252753, 0.5258684278, 0.5531855677,
        0.6586589231, 0.6413400744, 0.6505003159,
        0.7070963334, 0.6864069274, 0.6566075495,
    ];

    #[rustfmt::skip]
    const Q2_LAST: [f64; 60] = [
        0.6810083246, 0.6042219428, 0.6088941863,
        0.5499790828, 0.5523265158, 0.6646200703,
        0.6104139336, 0.6635820753, 0.6213703022,
        0.6796826878, 0.7098425232, 0.6458523321,
        0.5548159682, 0.5798284317, 0.6281662988,
        0.5963987107, 0.6430736681, 0.6104627897,
        0.6593499107, 0.6631208324, 0.7252402836,
        0.6170169159, 0.7195208023, 0.6585338261,
        0.5794674771, 0.6725039984, 0.5752551656,
        0.6436001186, 0.642522178, 0.6871550254,
        0.5640114031, 0.670609007, 0.6181336276,
        0.5703167502, 0.6774451221, 0.6424661223,
        0.5786673846, 0.5496132976, 0.5417027025,
        0.5841556773, 0.5807653122, 0.5541754977,
        0.6424438503, 0.6198358109, 0.6386821682,
        0.5771929061, 0.5987387839, 0.6900534285,
        0.6009603513, 0.5254176256, 0.6024316286,
        0.628337461, 0.5247686088, 0.5741865074,
        0.6621998454, 0.7046183294, 0.598915981,
        0.6727811693, 0.6382628733, 0.5693589452,
    ];

    #[rustfmt::skip]
    const PHI_A: [f64; 60] = [
        0.5756682772, 0.4907693646, 0.4929215785,
        0.4285495384, 0.4485241316, 0.5415179101,
        0.4721954361, 0.5414789207, 0.4780566168,
        0.5347742365, 0.5690190057, 0.5062251635,
        0.4344691944, 0.4632728414, 0.5203322167,
        0.4867970811, 0.5136125019, 0.4955962665,
        0.5451656095, 0.5427844852, 0.6039258559,
        0.4896837933, 0.6058012546, 0.5270202724,
        0.4549896083, 0.5581025362, 0.4569688042,
        0.5146078707, 0.5295426558, 0.5607452147,
        0.4284411841, 0.5584599491, 0.4897354879,
        0.4412935033, 0.5451907287, 0.5168324559,
        0.4590688112, 0.4289971762, 0.4182401334,
        0.4651297448, 0.4848154606, 0.4296692569,
        0.5298085479, 0.5040272922, 0.5128324626,
        0.452969296, 0.4739701644, 0.5869633329,
        0.4739224835, 0.408162465, 0.4778525932,
        0.5251137097, 0.4022878568, 0.4526763114,
        0.5391015021, 0.5775454583, 0.4854159658,
        0.5646456355, 0.5268519966, 0.4568607917,
    ];

    #[rustfmt::skip]
    const PHI_B: [f64; 60] = [
        0.5848544585, 0.508489761, 0.5241955346,
        0.4451322812, 0.5071443158, 0.4911079757,
        0.4416811435, 0.5434021974, 0.4420503732,
        0.4846776037, 0.5183013133, 0.4637692837,
        0.4494961178, 0.507312145, 0.5364240841,
        0.5228719171, 0.4708956331, 0.5452408371,
        0.565472036, 0.5845457287, 0.5860825396,
        0.4937634126, 0.6153237081, 0.5224226282,
        0.4429585009, 0.543793551, 0.4859600497,
        0.4778220444, 0.5652469751, 0.5102330395,
        0.418083857, 0.5765879686, 0.504648947,
        0.4231151427, 0.5102461621, 0.49780598,
        0.4329733075, 0.4162387429, 0.4077063205,
        0.4651514372, 0.5363397681, 0.4146043284,
        0.5399827372, 0.5322107973, 0.4968313562,
        0.4587441194, 0.4716514621, 0.5916059197,
        0.4497456639, 0.4116926438, 0.4322357342,
        0.5391672185, 0.4020952935, 0.4427455021,
        0.5352874883, 0.5316571999, 0.5197440786,
        0.5872076975, 0.5595593854, 0.513662551,
    ];

    fn reference_box() -> SimulationBox {
        SimulationBox::new([5, 4, 3], [4.0, 3.0, 2.0]).unwrap()
    }

    fn solver_with(
        sim_box: &SimulationBox,
        f: f64,
        n_segment: usize,
        model: ChainModel,
        options: SolverOptions,
    ) -> PropagatorSolver<RustFftTransform> {
        let chain = PolymerChain::new(f, n_segment, 0.0, model).unwrap();
        PropagatorSolver::with_options(sim_box, &chain, RustFftTransform::new(sim_box.nx()), options)
            .unwrap()
    }

    fn reference_solver() -> PropagatorSolver<RustFftTransform> {
        solver_with(&reference_box(), 0.5, 4, ChainModel::Gaussian, SolverOptions::default())
    }

    fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn gaussian_chain_reproduces_reference_propagators_and_concentrations() {
        let mut solver = reference_solver();
        let solution = solver.find_phi(&WA, &WB).unwrap();

        let (q1_last, q2_last) = solver.partial_partitions(4).unwrap();
        assert!(max_abs_diff(q1_last, &Q1_LAST) < TOLERANCE);
        assert!(max_abs_diff(q2_last, &Q2_LAST) < TOLERANCE);
        let (q1_first, q2_first) = solver.partial_partitions(0).unwrap();
        assert!(max_abs_diff(q1_first, &[1.0; 60]) < 1e-15);
        assert!(max_abs_diff(q2_first, &[1.0; 60]) < 1e-15);

        assert!(max_abs_diff(&solution.phi_a, &PHI_A) < TOLERANCE);
        assert!(max_abs_diff(&solution.phi_b, &PHI_B) < TOLERANCE);
        assert!((solution.partition_function - 14.8996298226).abs() < 1e-7);
        assert!(solution.is_finite());
    }

    #[test]
    fn repeated_solves_give_identical_results() {
        let mut solver = reference_solver();
        let first = solver.find_phi(&WA, &WB).unwrap();
        let second = solver.find_phi(&WA, &WB).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn volume_averaged_concentrations_sum_to_one() {
        for options in [
            SolverOptions::default(),
            SolverOptions {
                splitting: SplittingScheme::Strang,
                quadrature: ContourQuadrature::Trapezoid,
            },
        ] {
            let sim_box = reference_box();
            let mut solver = solver_with(&sim_box, 0.5, 8, ChainModel::Gaussian, options);
            let solution = solver.find_phi(&WA, &WB).unwrap();
            let total = sim_box.mean(&solution.phi_a) + sim_box.mean(&solution.phi_b);
            assert!((total - 1.0).abs() < 1e-10, "{options:?}: {total}");
        }
    }

    #[test]
    fn uniform_fields_give_block_fractions() {
        let sim_box = reference_box();
        let (c_a, c_b) = (0.4, -0.3);
        let w_a = vec![c_a; 60];
        let w_b = vec![c_b; 60];

        for model in [ChainModel::Gaussian, ChainModel::Discrete] {
            let mut solver = solver_with(&sim_box, 0.25, 8, model, SolverOptions::default());
            let solution = solver.find_phi(&w_a, &w_b).unwrap();

            for (a, b) in solution.phi_a.iter().zip(&solution.phi_b) {
                assert!((a - 0.25).abs() < 1e-10, "{model}: phi_a = {a}");
                assert!((b - 0.75).abs() < 1e-10, "{model}: phi_b = {b}");
            }
            let expected_q = (-(c_a * 0.25 + c_b * 0.75)).exp();
            assert!((solution.mean_partition() - expected_q).abs() < 1e-10);
        }
    }

    #[test]
    fn zero_fields_leave_propagators_flat() {
        let sim_box = reference_box();
        let mut solver = solver_with(&sim_box, 0.5, 4, ChainModel::Gaussian, SolverOptions::default());
        let zeros = vec![0.0; 60];
        let solution = solver.find_phi(&zeros, &zeros).unwrap();

        for n in 0..=4 {
            let (q1, q2) = solver.partial_partitions(n).unwrap();
            assert!(max_abs_diff(q1, &[1.0; 60]) < 1e-12);
            assert!(max_abs_diff(q2, &[1.0; 60]) < 1e-12);
        }
        assert!((solution.partition_function - sim_box.volume()).abs() < 1e-10);
    }

    #[test]
    fn strang_splitting_stays_within_its_truncation_error() {
        let sim_box = reference_box();
        let mut richardson = reference_solver();
        let mut strang = solver_with(
            &sim_box,
            0.5,
            4,
            ChainModel::Gaussian,
            SolverOptions {
                splitting: SplittingScheme::Strang,
                quadrature: ContourQuadrature::Trapezoid,
            },
        );
        let fine = richardson.find_phi(&WA, &WB).unwrap();
        let coarse = strang.find_phi(&WA, &WB).unwrap();

        let diff = max_abs_diff(&fine.phi_a, &coarse.phi_a);
        assert!(diff > 1e-6 && diff < 5e-2, "diff = {diff}");
    }

    #[test]
    fn simpson_quadrature_agrees_with_trapezoid_for_fine_contours() {
        let sim_box = reference_box();
        let simpson = SolverOptions {
            splitting: SplittingScheme::Richardson,
            quadrature: ContourQuadrature::Simpson,
        };
        let a = solver_with(&sim_box, 0.5, 32, ChainModel::Gaussian, simpson)
            .find_phi(&WA, &WB)
            .unwrap();
        let b = solver_with(&sim_box, 0.5, 32, ChainModel::Gaussian, SolverOptions::default())
            .find_phi(&WA, &WB)
            .unwrap();
        assert!(max_abs_diff(&a.phi_a, &b.phi_a) < 1e-3);
        assert_eq!(a.partition_function, b.partition_function);
    }

    #[test]
    fn discrete_chain_conserves_mass_and_responds_to_fields() {
        let sim_box = reference_box();
        let mut solver = solver_with(&sim_box, 0.5, 4, ChainModel::Discrete, SolverOptions::default());
        let solution = solver.find_phi(&WA, &WB).unwrap();

        let total = sim_box.mean(&solution.phi_a) + sim_box.mean(&solution.phi_b);
        assert!((total - 1.0).abs() < 1e-10, "total = {total}");
        assert!(solution.is_finite());

        // a lower A field attracts A segments
        let lowest = (0..60)
            .min_by(|&i, &j| WA[i].total_cmp(&WA[j]))
            .unwrap();
        let highest = (0..60)
            .max_by(|&i, &j| WA[i].total_cmp(&WA[j]))
            .unwrap();
        assert!(solution.phi_a[lowest] > solution.phi_a[highest]);
    }

    #[test]
    fn initial_propagators_scale_partition_function() {
        let mut solver = reference_solver();
        let base = solver.find_phi(&WA, &WB).unwrap();

        solver.set_initial_propagators(&[2.0; 60], &[1.0; 60]).unwrap();
        let scaled = solver.find_phi(&WA, &WB).unwrap();

        assert!((scaled.partition_function - 2.0 * base.partition_function).abs() < 1e-10);
        assert!(max_abs_diff(&scaled.phi_a, &base.phi_a) < 1e-10);
    }

    #[test]
    fn extreme_fields_are_reported_as_non_finite() {
        let mut solver = reference_solver();
        let huge = vec![1.0e5; 60];
        let solution = solver.find_phi(&huge, &huge).unwrap();
        assert!(!solution.is_finite());
    }

    #[test]
    fn find_phi_rejects_wrong_field_length() {
        let mut solver = reference_solver();
        let result = solver.find_phi(&WA[..59], &WB);
        assert_eq!(
            result,
            Err(EngineError::DimensionMismatch {
                name: "w_a",
                expected: 60,
                actual: 59
            })
        );
    }

    #[test]
    fn new_rejects_transform_on_different_grid() {
        let sim_box = reference_box();
        let chain = PolymerChain::new(0.5, 4, 0.0, ChainModel::Gaussian).unwrap();
        let result = PropagatorSolver::new(&sim_box, &chain, RustFftTransform::new([4, 4, 3]));
        assert!(matches!(
            result,
            Err(EngineError::TransformGridMismatch {
                transform: [4, 4, 3],
                grid: [5, 4, 3]
            })
        ));
    }

    #[test]
    fn partial_partitions_guard_range_and_unsolved_state() {
        let mut solver = reference_solver();
        assert_eq!(
            solver.partial_partitions(1).err(),
            Some(EngineError::PropagatorsUnavailable)
        );
        solver.find_phi(&WA, &WB).unwrap();
        assert_eq!(
            solver.partial_partitions(5).err(),
            Some(EngineError::ContourStepOutOfRange {
                step: 5,
                n_segment: 4
            })
        );
    }
}
