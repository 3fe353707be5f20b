use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ChainError {
    #[error("Composition fraction must lie strictly between 0 and 1, got {0}")]
    InvalidFraction(f64),

    #[error("Chain needs at least 2 contour steps, got {0}")]
    TooFewSegments(usize),

    #[error(
        "Composition fraction {f} with {n_segment} steps leaves block A with {n_segment_a} steps; both blocks need at least one"
    )]
    EmptyBlock {
        f: f64,
        n_segment: usize,
        n_segment_a: usize,
    },

    #[error("Unknown chain model '{0}'. Expected 'Gaussian' or 'Discrete'.")]
    UnknownModel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum ChainModel {
    /// Continuous Gaussian chain, propagated by the modified diffusion equation.
    #[default]
    Gaussian,
    /// Bead-spring chain with Gaussian bonds.
    Discrete,
}

impl FromStr for ChainModel {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gaussian" | "continuous" => Ok(Self::Gaussian),
            "discrete" => Ok(Self::Discrete),
            _ => Err(ChainError::UnknownModel(s.to_string())),
        }
    }
}

impl fmt::Display for ChainModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gaussian => write!(f, "Gaussian"),
            Self::Discrete => write!(f, "Discrete"),
        }
    }
}

/// Linear AB diblock copolymer. Lengths are in units of `R0 = b N^{1/2}`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolymerChain {
    f: f64,
    n_segment: usize,
    n_segment_a: usize,
    chi_n: f64,
    model: ChainModel,
}

impl PolymerChain {
    pub fn new(
        f: f64,
        n_segment: usize,
        chi_n: f64,
        model: ChainModel,
    ) -> Result<Self, ChainError> {
        if !(f > 0.0 && f < 1.0) {
            return Err(ChainError::InvalidFraction(f));
        }
        if n_segment < 2 {
            return Err(ChainError::TooFewSegments(n_segment));
        }
        let n_segment_a = (f * n_segment as f64).round() as usize;
        if n_segment_a == 0 || n_segment_a >= n_segment {
            return Err(ChainError::EmptyBlock {
                f,
                n_segment,
                n_segment_a,
            });
        }

        Ok(Self {
            f,
            n_segment,
            n_segment_a,
            chi_n,
            model,
        })
    }

    #[inline]
    pub fn f(&self) -> f64 {
        self.f
    }

    #[inline]
    pub fn n_segment(&self) -> usize {
        self.n_segment
    }

    #[inline]
    pub fn n_segment_a(&self) -> usize {
        self.n_segment_a
    }

    #[inline]
    pub fn n_segment_b(&self) -> usize {
        self.n_segment - self.n_segment_a
    }

    #[inline]
    pub fn chi_n(&self) -> f64 {
        self.chi_n
    }

    #[inline]
    pub fn model(&self) -> ChainModel {
        self.model
    }

    /// Contour step `1 / N`.
    #[inline]
    pub fn ds(&self) -> f64 {
        1.0 / self.n_segment as f64
    }
}
