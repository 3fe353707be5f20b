use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Forward/backward transform between a real periodic grid and its spectral
/// representation.
///
/// `forward` is unnormalized. `backward` divides by the total number of grid
/// points exactly once, so `backward(forward(x))` reproduces `x`.
///
/// Implementations own whatever scratch they need, which is why both
/// directions take `&mut self`; one instance must not be shared by concurrent
/// propagator solves.
pub trait SpectralTransform {
    fn grid(&self) -> [usize; 3];

    /// Number of complex coefficients produced by `forward`.
    fn spectral_size(&self) -> usize {
        self.grid().iter().product()
    }

    fn forward(&mut self, rdata: &[f64], cdata: &mut [Complex64]);

    fn backward(&mut self, cdata: &[Complex64], rdata: &mut [f64]);

    /// `|k|^2` for every spectral coefficient, in the order `forward` emits them.
    ///
    /// The default covers the full complex layout (same row-major order as real
    /// space). Backends with a half-complex layout must override it.
    fn squared_wavenumbers(&self, lx: [f64; 3]) -> Vec<f64> {
        let nx = self.grid();
        let factor = [2.0 * PI / lx[0], 2.0 * PI / lx[1], 2.0 * PI / lx[2]];
        let mode = |i: usize, n: usize| -> f64 {
            let folded = if i > n / 2 { n - i } else { i };
            folded as f64
        };

        let mut k2 = Vec::with_capacity(self.spectral_size());
        for i in 0..nx[0] {
            let kx = mode(i, nx[0]) * factor[0];
            for j in 0..nx[1] {
                let ky = mode(j, nx[1]) * factor[1];
                for k in 0..nx[2] {
                    let kz = mode(k, nx[2]) * factor[2];
                    k2.push(kx * kx + ky * ky + kz * kz);
                }
            }
        }
        k2
    }
}

/// Three-dimensional complex FFT assembled from one-dimensional `rustfft`
/// passes along each axis.
pub struct RustFftTransform {
    nx: [usize; 3],
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
    work: Vec<Complex64>,
    line: Vec<Complex64>,
    scratch: Vec<Complex64>,
    normal_factor: f64,
}

impl RustFftTransform {
    pub fn new(nx: [usize; 3]) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let forward = nx.map(|n| planner.plan_fft_forward(n));
        let inverse = nx.map(|n| planner.plan_fft_inverse(n));

        let scratch_len = forward
            .iter()
            .chain(inverse.iter())
            .map(|plan| plan.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        let grid_size: usize = nx.iter().product();
        let longest_axis = nx.iter().copied().max().unwrap_or(0);

        Self {
            nx,
            forward,
            inverse,
            work: vec![Complex64::default(); grid_size],
            line: vec![Complex64::default(); longest_axis],
            scratch: vec![Complex64::default(); scratch_len],
            normal_factor: 1.0 / grid_size as f64,
        }
    }
}

impl std::fmt::Debug for RustFftTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustFftTransform")
            .field("nx", &self.nx)
            .finish_non_exhaustive()
    }
}

impl SpectralTransform for RustFftTransform {
    fn grid(&self) -> [usize; 3] {
        self.nx
    }

    fn forward(&mut self, rdata: &[f64], cdata: &mut [Complex64]) {
        assert_eq!(rdata.len(), self.work.len(), "real array has wrong length");
        assert_eq!(cdata.len(), self.work.len(), "spectral array has wrong length");

        for (c, &r) in cdata.iter_mut().zip(rdata) {
            *c = Complex64::new(r, 0.0);
        }
        for axis in 0..3 {
            process_axis(
                self.nx,
                axis,
                self.forward[axis].as_ref(),
                cdata,
                &mut self.line,
                &mut self.scratch,
            );
        }
    }

    fn backward(&mut self, cdata: &[Complex64], rdata: &mut [f64]) {
        assert_eq!(cdata.len(), self.work.len(), "spectral array has wrong length");
        assert_eq!(rdata.len(), self.work.len(), "real array has wrong length");

        self.work.copy_from_slice(cdata);
        for axis in 0..3 {
            process_axis(
                self.nx,
                axis,
                self.inverse[axis].as_ref(),
                &mut self.work,
                &mut self.line,
                &mut self.scratch,
            );
        }
        for (r, c) in rdata.iter_mut().zip(&self.work) {
            *r = c.re * self.normal_factor;
        }
    }
}

fn process_axis(
    nx: [usize; 3],
    axis: usize,
    plan: &dyn Fft<f64>,
    data: &mut [Complex64],
    line: &mut [Complex64],
    scratch: &mut [Complex64],
) {
    let n = nx[axis];
    if n == 1 {
        return;
    }
    let stride: usize = nx[axis + 1..].iter().product();
    if stride == 1 {
        // contiguous lines, one batched call
        plan.process_with_scratch(data, scratch);
        return;
    }

    let outer: usize = nx[..axis].iter().product();
    let line = &mut line[..n];
    for o in 0..outer {
        let base = o * n * stride;
        for inner in 0..stride {
            for (t, slot) in line.iter_mut().enumerate() {
                *slot = data[base + t * stride + inner];
            }
            plan.process_with_scratch(line, scratch);
            for (t, value) in line.iter().enumerate() {
                data[base + t * stride + inner] = *value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn sample_field(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * 7 + 3) % 11) as f64 * 0.1 - 0.4).collect()
    }

    #[test]
    fn backward_inverts_forward() {
        let mut fft = RustFftTransform::new([5, 4, 3]);
        let input = sample_field(60);
        let mut spectral = vec![Complex64::default(); fft.spectral_size()];
        let mut output = vec![0.0; 60];

        fft.forward(&input, &mut spectral);
        fft.backward(&spectral, &mut output);

        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < TOLERANCE);
        }
    }

    #[test]
    fn forward_is_unnormalized_at_zero_mode() {
        let mut fft = RustFftTransform::new([4, 3, 2]);
        let input = sample_field(24);
        let mut spectral = vec![Complex64::default(); 24];
        fft.forward(&input, &mut spectral);

        let sum: f64 = input.iter().sum();
        assert!((spectral[0].re - sum).abs() < 1e-10);
        assert!(spectral[0].im.abs() < 1e-10);
    }

    #[test]
    fn plane_wave_along_x_lands_in_single_mode() {
        let nx = [4, 3, 2];
        let mut fft = RustFftTransform::new(nx);
        let mut input = vec![0.0; 24];
        for i in 0..nx[0] {
            for j in 0..nx[1] {
                for k in 0..nx[2] {
                    input[(i * nx[1] + j) * nx[2] + k] = (2.0 * PI * i as f64 / 4.0).cos();
                }
            }
        }
        let mut spectral = vec![Complex64::default(); 24];
        fft.forward(&input, &mut spectral);

        let mode_1 = 6;
        let mode_3 = 3 * 6;
        for (idx, c) in spectral.iter().enumerate() {
            if idx == mode_1 || idx == mode_3 {
                assert!((c.re - 12.0).abs() < 1e-10);
            } else {
                assert!(c.norm() < 1e-10, "unexpected weight at {idx}: {c}");
            }
        }
    }

    #[test]
    fn squared_wavenumbers_fold_negative_frequencies() {
        let fft = RustFftTransform::new([5, 4, 3]);
        let k2 = fft.squared_wavenumbers([4.0, 3.0, 2.0]);
        assert_eq!(k2.len(), 60);
        assert_eq!(k2[0], 0.0);

        let kx = 2.0 * PI / 4.0;
        // i = 1 and i = 4 are the same |k| on a 5-point axis.
        assert!((k2[12] - kx * kx).abs() < TOLERANCE);
        assert!((k2[4 * 12] - kx * kx).abs() < TOLERANCE);

        let ky = 2.0 * PI / 3.0;
        // j = 2 on a 4-point axis is the Nyquist mode.
        assert!((k2[2 * 3] - 4.0 * ky * ky).abs() < TOLERANCE);
    }

    #[test]
    fn singleton_axes_are_skipped() {
        let mut fft = RustFftTransform::new([8, 1, 1]);
        let input = sample_field(8);
        let mut spectral = vec![Complex64::default(); 8];
        let mut output = vec![0.0; 8];
        fft.forward(&input, &mut spectral);
        fft.backward(&spectral, &mut output);
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < TOLERANCE);
        }
    }
}
