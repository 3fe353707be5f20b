use itertools::izip;
use thiserror::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Block length of the parallel reductions. Partial sums are combined in
/// block order, so results do not depend on the thread count.
#[cfg(feature = "parallel")]
const REDUCTION_BLOCK: usize = 4096;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum GridError {
    #[error("Grid dimension {axis} must contain at least one point, got {value}")]
    EmptyAxis { axis: usize, value: usize },

    #[error("Box length along axis {axis} must be positive and finite, got {value}")]
    InvalidLength { axis: usize, value: f64 },
}

/// Uniform periodic grid over a rectangular simulation box.
///
/// Real-space arrays are stored row-major with `z` varying fastest, so the
/// point `(i, j, k)` lives at `i * ny * nz + j * nz + k`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationBox {
    nx: [usize; 3],
    lx: [f64; 3],
    dx: [f64; 3],
    grid_size: usize,
    volume: f64,
    dv: f64,
}

impl SimulationBox {
    pub fn new(nx: [usize; 3], lx: [f64; 3]) -> Result<Self, GridError> {
        for axis in 0..3 {
            if nx[axis] == 0 {
                return Err(GridError::EmptyAxis {
                    axis,
                    value: nx[axis],
                });
            }
            if !(lx[axis].is_finite() && lx[axis] > 0.0) {
                return Err(GridError::InvalidLength {
                    axis,
                    value: lx[axis],
                });
            }
        }

        let dx = [
            lx[0] / nx[0] as f64,
            lx[1] / nx[1] as f64,
            lx[2] / nx[2] as f64,
        ];
        let grid_size = nx.iter().product();
        let volume = lx.iter().product();

        Ok(Self {
            nx,
            lx,
            dx,
            grid_size,
            volume,
            dv: volume / grid_size as f64,
        })
    }

    #[inline]
    pub fn nx(&self) -> [usize; 3] {
        self.nx
    }

    #[inline]
    pub fn lx(&self) -> [f64; 3] {
        self.lx
    }

    #[inline]
    pub fn dx(&self) -> [f64; 3] {
        self.dx
    }

    #[inline]
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        self.volume
    }

    #[inline]
    pub fn dv(&self) -> f64 {
        self.dv
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.nx[1] + j) * self.nx[2] + k
    }

    pub fn integral(&self, g: &[f64]) -> f64 {
        debug_assert_eq!(g.len(), self.grid_size);

        #[cfg(not(feature = "parallel"))]
        let sum: f64 = g.iter().sum();

        #[cfg(feature = "parallel")]
        let sum: f64 = g
            .par_chunks(REDUCTION_BLOCK)
            .map(|block| block.iter().sum::<f64>())
            .collect::<Vec<_>>()
            .iter()
            .sum();

        sum * self.dv
    }

    pub fn inner_product(&self, g: &[f64], h: &[f64]) -> f64 {
        debug_assert_eq!(g.len(), self.grid_size);
        debug_assert_eq!(h.len(), self.grid_size);

        #[cfg(not(feature = "parallel"))]
        let sum: f64 = g.iter().zip(h).map(|(a, b)| a * b).sum();

        #[cfg(feature = "parallel")]
        let sum: f64 = g
            .par_chunks(REDUCTION_BLOCK)
            .zip(h.par_chunks(REDUCTION_BLOCK))
            .map(|(gb, hb)| gb.iter().zip(hb).map(|(a, b)| a * b).sum::<f64>())
            .collect::<Vec<_>>()
            .iter()
            .sum();

        sum * self.dv
    }

    /// Inner product over `n_comp` fields laid out back to back.
    pub fn multi_inner_product(&self, n_comp: usize, g: &[f64], h: &[f64]) -> f64 {
        debug_assert_eq!(g.len(), n_comp * self.grid_size);
        g.chunks_exact(self.grid_size)
            .zip(h.chunks_exact(self.grid_size))
            .take(n_comp)
            .map(|(gc, hc)| self.inner_product(gc, hc))
            .sum()
    }

    pub fn mean(&self, g: &[f64]) -> f64 {
        self.integral(g) / self.volume
    }

    pub fn zero_mean(&self, g: &mut [f64]) {
        let mean = self.mean(g);
        g.iter_mut().for_each(|x| *x -= mean);
    }

    /// `out = a * g + b * h`, elementwise.
    pub fn linear_combination(&self, out: &mut [f64], a: f64, g: &[f64], b: f64, h: &[f64]) {
        for (o, &x, &y) in izip!(out.iter_mut(), g, h) {
            *o = a * x + b * y;
        }
    }
}
