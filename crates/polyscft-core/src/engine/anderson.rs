use super::config::AndersonConfig;
use super::error::{EngineError, check_len};
use super::history::HistoryBuffer;
use crate::core::grid::SimulationBox;
use itertools::izip;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

const MIX_SHRINK: f64 = 0.7;
const MIX_GROW: f64 = 1.01;

/// Eligibility of the accelerator for history-based extrapolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndersonState {
    /// Error has not yet dropped below the start threshold since the last reset.
    Inactive,
    /// Extrapolation is enabled and uses this many past iterates (capped at
    /// `max_history`). Zero means history is being recorded but simple mixing
    /// is still applied.
    Active(usize),
}

/// Anderson mixing for the outer SCFT fixed-point iteration (Thompson et al.,
/// J. Chem. Phys. 120, 31 (2004)).
#[derive(Debug, Clone)]
pub struct AndersonMixing {
    sim_box: SimulationBox,
    config: AndersonConfig,
    total_grid: usize,
    mix: f64,
    state: AndersonState,
    wout_hist: HistoryBuffer,
    wdiff_hist: HistoryBuffer,
    wdiff_inner_products: HistoryBuffer,
    inner_product_row: Vec<f64>,
    u_nm: DMatrix<f64>,
    v_n: DVector<f64>,
    a_n: DVector<f64>,
}

impl AndersonMixing {
    pub fn new(sim_box: &SimulationBox, config: AndersonConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let total_grid = config.num_components * sim_box.grid_size();
        let n_slots = config.max_history + 1;
        debug!(
            "Allocating Anderson mixing history: {} slots of {} values",
            n_slots, total_grid
        );

        Ok(Self {
            sim_box: sim_box.clone(),
            total_grid,
            mix: config.mix_init,
            state: AndersonState::Inactive,
            wout_hist: HistoryBuffer::new(n_slots, total_grid),
            wdiff_hist: HistoryBuffer::new(n_slots, total_grid),
            wdiff_inner_products: HistoryBuffer::new(n_slots, n_slots),
            inner_product_row: vec![0.0; n_slots],
            u_nm: DMatrix::zeros(config.max_history, config.max_history),
            v_n: DVector::zeros(config.max_history),
            a_n: DVector::zeros(config.max_history),
            config,
        })
    }

    #[inline]
    pub fn mix(&self) -> f64 {
        self.mix
    }

    #[inline]
    pub fn state(&self) -> AndersonState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &AndersonConfig {
        &self.config
    }

    /// Number of output fields currently held in history.
    #[inline]
    pub fn history_len(&self) -> usize {
        self.wout_hist.len()
    }

    /// Returns to the freshly constructed state: initial mixing parameter,
    /// inactive extrapolation and empty histories.
    pub fn reset(&mut self) {
        self.mix = self.config.mix_init;
        self.state = AndersonState::Inactive;
        self.wout_hist.reset();
        self.wdiff_hist.reset();
        self.wdiff_inner_products.reset();
        self.inner_product_row.fill(0.0);
        self.u_nm.fill(0.0);
        self.v_n.fill(0.0);
        self.a_n.fill(0.0);
    }

    /// Replaces `w` with the next iterate.
    ///
    /// `w_diff` is the residual `w_out - w` of this iteration and the error
    /// levels are the caller's scalar convergence measure for the previous and
    /// current iteration.
    ///
    /// On [`EngineError::SingularSystem`] `w` is left unchanged but this call's
    /// output and residual stay in history; recovering (for instance by calling
    /// [`reset`](Self::reset) and mixing again) is up to the caller.
    pub fn compute_new_fields(
        &mut self,
        w: &mut [f64],
        w_out: &[f64],
        w_diff: &[f64],
        old_error: f64,
        error: f64,
    ) -> Result<(), EngineError> {
        check_len("w", w, self.total_grid)?;
        check_len("w_out", w_out, self.total_grid)?;
        check_len("w_diff", w_diff, self.total_grid)?;

        self.state = match self.state {
            AndersonState::Inactive if error < self.config.start_error => {
                debug!(
                    "Error level {:.3e} below {:.3e}; recording history for Anderson mixing",
                    error, self.config.start_error
                );
                AndersonState::Active(0)
            }
            AndersonState::Inactive => AndersonState::Inactive,
            AndersonState::Active(n) => AndersonState::Active((n + 1).min(self.config.max_history)),
        };

        // history is recorded before deciding how to mix
        if let AndersonState::Active(n) = self.state {
            self.record_history(n, w_out, w_diff);
        }

        match self.state {
            AndersonState::Active(n) if n > 0 => self.extrapolate(n, w),
            _ => {
                self.simple_mixing(w, w_out, old_error, error);
                Ok(())
            }
        }
    }

    fn record_history(&mut self, n: usize, w_out: &[f64], w_diff: &[f64]) {
        self.wout_hist.insert(w_out);
        self.wdiff_hist.insert(w_diff);

        let n_comp = self.config.num_components;
        self.inner_product_row.fill(0.0);
        for lag in 0..=n {
            if let Some(past) = self.wdiff_hist.get_array(lag) {
                self.inner_product_row[lag] =
                    self.sim_box.multi_inner_product(n_comp, w_diff, past);
            }
        }
        self.wdiff_inner_products.insert(&self.inner_product_row);
    }

    fn simple_mixing(&mut self, w: &mut [f64], w_out: &[f64], old_error: f64, error: f64) {
        if old_error < error {
            self.mix = (self.mix * MIX_SHRINK).max(self.config.mix_min);
        } else {
            self.mix *= MIX_GROW;
        }
        trace!("Simple mixing with mix = {:.4}", self.mix);

        let mix = self.mix;
        for (wi, &wo) in w.iter_mut().zip(w_out) {
            *wi = (1.0 - mix) * *wi + mix * wo;
        }
    }

    fn sym(&self, i: usize, j: usize) -> Result<f64, EngineError> {
        self.wdiff_inner_products
            .get_sym(i, j)
            .ok_or(EngineError::HistoryUnavailable {
                index: i.max(j),
                available: self.wdiff_inner_products.len(),
            })
    }

    fn extrapolate(&mut self, n: usize, w: &mut [f64]) -> Result<(), EngineError> {
        let d_nn = self.sym(n, n)?;
        for i in 0..n {
            let d_ni = self.sym(n, n - i - 1)?;
            self.v_n[i] = d_nn - d_ni;
            for j in 0..n {
                self.u_nm[(i, j)] = d_nn - d_ni - self.sym(n - j - 1, n)?
                    + self.sym(n - i - 1, n - j - 1)?;
            }
        }

        self.find_an(n, d_nn)?;
        trace!("Anderson coefficients: {:?}", &self.a_n.as_slice()[..n]);

        let newest = self
            .wout_hist
            .get_array(0)
            .ok_or(EngineError::HistoryUnavailable {
                index: 0,
                available: 0,
            })?;
        w.copy_from_slice(newest);
        for i in 0..n {
            let past = self
                .wout_hist
                .get_array(i + 1)
                .ok_or(EngineError::HistoryUnavailable {
                    index: i + 1,
                    available: self.wout_hist.len(),
                })?;
            let a = self.a_n[i];
            for (wj, &pj, &nj) in izip!(w.iter_mut(), past, newest) {
                *wj += a * (pj - nj);
            }
        }
        Ok(())
    }

    /// Solves `U a = V` for the leading `m x m` block by LU with partial pivoting.
    ///
    /// The block is rejected when its smallest singular value is at or below
    /// `m * max(EPSILON * s_max, sqrt(EPSILON) * <d_n, d_n>)`. The first term
    /// bounds the condition number, the second rejects residual differences
    /// that vanish against the current residual.
    fn find_an(&mut self, m: usize, d_nn: f64) -> Result<(), EngineError> {
        let block = self.u_nm.view((0, 0), (m, m)).clone_owned();
        if block.iter().any(|x| !x.is_finite()) {
            return Err(EngineError::SingularSystem {
                size: m,
                smallest: f64::NAN,
                threshold: f64::NAN,
            });
        }

        let singular_values = block.singular_values();
        let (smallest, largest) = singular_values
            .iter()
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        let threshold = m as f64 * (f64::EPSILON * largest).max(f64::EPSILON.sqrt() * d_nn.abs());
        trace!(smallest, largest, threshold, "Anderson system spectrum");

        let singular = EngineError::SingularSystem {
            size: m,
            smallest,
            threshold,
        };
        if !(smallest > threshold) {
            return Err(singular);
        }

        let v = self.v_n.rows(0, m).clone_owned();
        let a = block.lu().solve(&v).ok_or_else(|| singular.clone())?;
        if a.iter().any(|x| !x.is_finite()) {
            return Err(singular);
        }
        self.a_n.rows_mut(0, m).copy_from(&a);
        Ok(())
    }
}
