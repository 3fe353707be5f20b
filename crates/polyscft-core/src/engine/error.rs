use super::config::ConfigError;
use crate::core::chain::ChainError;
use crate::core::grid::GridError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum EngineError {
    #[error("Invalid simulation box: {0}")]
    Grid(#[from] GridError),

    #[error("Invalid polymer chain: {0}")]
    Chain(#[from] ChainError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Array '{name}' has length {actual}, expected {expected}")]
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Spectral transform grid {transform:?} does not match simulation box grid {grid:?}")]
    TransformGridMismatch {
        transform: [usize; 3],
        grid: [usize; 3],
    },

    #[error(
        "Anderson mixing system of size {size} is singular or ill-conditioned (smallest singular value {smallest:e}, threshold {threshold:e})"
    )]
    SingularSystem {
        size: usize,
        smallest: f64,
        threshold: f64,
    },

    #[error("History entry {index} requested but only {available} are stored")]
    HistoryUnavailable { index: usize, available: usize },

    #[error("Propagators have not been computed yet")]
    PropagatorsUnavailable,

    #[error("Propagator solve at saddle-point iteration {iteration} produced non-finite values")]
    NonFiniteSolution { iteration: usize },

    #[error("Contour step {step} is outside the chain (0..={n_segment})")]
    ContourStepOutOfRange { step: usize, n_segment: usize },
}

pub(crate) fn check_len(
    name: &'static str,
    data: &[f64],
    expected: usize,
) -> Result<(), EngineError> {
    if data.len() == expected {
        Ok(())
    } else {
        Err(EngineError::DimensionMismatch {
            name,
            expected,
            actual: data.len(),
        })
    }
}
