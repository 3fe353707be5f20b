use crate::core::quadrature::ContourQuadrature;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Unknown Langevin scheme '{0}'")]
    UnknownScheme(String),
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AndersonConfig {
    /// Number of fields concatenated in one mixed vector.
    pub num_components: usize,
    /// Number of past iterates used in the extrapolation.
    pub max_history: usize,
    /// Error level below which extrapolation starts.
    pub start_error: f64,
    pub mix_min: f64,
    pub mix_init: f64,
}

impl AndersonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_components == 0 {
            return Err(invalid("num_components", "must be at least 1"));
        }
        if !(self.mix_min.is_finite() && self.mix_min > 0.0 && self.mix_min <= 1.0) {
            return Err(invalid(
                "mix_min",
                format!("must lie in (0, 1], got {}", self.mix_min),
            ));
        }
        if !(self.mix_init.is_finite() && self.mix_init >= self.mix_min && self.mix_init <= 1.0) {
            return Err(invalid(
                "mix_init",
                format!(
                    "must lie in [mix_min, 1] = [{}, 1], got {}",
                    self.mix_min, self.mix_init
                ),
            ));
        }
        if self.start_error.is_nan() {
            return Err(invalid("start_error", "must not be NaN"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct AndersonConfigBuilder {
    num_components: Option<usize>,
    max_history: Option<usize>,
    start_error: Option<f64>,
    mix_min: Option<f64>,
    mix_init: Option<f64>,
}

impl AndersonConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_components(mut self, n: usize) -> Self {
        self.num_components = Some(n);
        self
    }
    pub fn max_history(mut self, n: usize) -> Self {
        self.max_history = Some(n);
        self
    }
    pub fn start_error(mut self, error: f64) -> Self {
        self.start_error = Some(error);
        self
    }
    pub fn mix_min(mut self, mix: f64) -> Self {
        self.mix_min = Some(mix);
        self
    }
    pub fn mix_init(mut self, mix: f64) -> Self {
        self.mix_init = Some(mix);
        self
    }

    pub fn build(self) -> Result<AndersonConfig, ConfigError> {
        let config = AndersonConfig {
            num_components: self.num_components.unwrap_or(1),
            max_history: self
                .max_history
                .ok_or(ConfigError::MissingParameter("max_history"))?,
            start_error: self
                .start_error
                .ok_or(ConfigError::MissingParameter("start_error"))?,
            mix_min: self
                .mix_min
                .ok_or(ConfigError::MissingParameter("mix_min"))?,
            mix_init: self
                .mix_init
                .ok_or(ConfigError::MissingParameter("mix_init"))?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// How one contour step of the Gaussian chain is advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplittingScheme {
    /// Single symmetric split step, second order in `ds`.
    Strang,
    /// One full and two half split steps combined as `(4 q_half - q_full) / 3`.
    #[default]
    Richardson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolverOptions {
    pub splitting: SplittingScheme,
    pub quadrature: ContourQuadrature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaddlePointConfig {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SaddlePointConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 100,
        }
    }
}

impl SaddlePointConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(invalid(
                "tolerance",
                format!("must be positive, got {}", self.tolerance),
            ));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1"));
        }
        Ok(())
    }
}

/// Time integrator for the exchange-field Langevin equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LangevinScheme {
    /// Explicit Euler predictor followed by a trapezoidal (Heun) corrector.
    #[default]
    PredictorCorrector,
    /// First-order exponential time differencing. One saddle-point search per
    /// step.
    Etd,
    /// Second-order exponential time differencing (Runge-Kutta type).
    EtdRk2,
}

impl FromStr for LangevinScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "predictor-corrector" | "heun" => Ok(Self::PredictorCorrector),
            "etd" | "etd1" => Ok(Self::Etd),
            "etd-rk2" | "etdrk2" => Ok(Self::EtdRk2),
            _ => Err(ConfigError::UnknownScheme(s.to_string())),
        }
    }
}

impl fmt::Display for LangevinScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PredictorCorrector => write!(f, "predictor-corrector"),
            Self::Etd => write!(f, "etd"),
            Self::EtdRk2 => write!(f, "etd-rk2"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LangevinConfig {
    /// Langevin time step, in units of `N` segment diffusion times.
    pub dt: f64,
    /// Invariant polymerization index.
    pub nbar: f64,
    pub max_steps: usize,
    pub seed: u64,
    pub scheme: LangevinScheme,
    /// Keep a copy of both fields every this many steps (counted from step
    /// zero). Zero disables snapshots.
    pub snapshot_interval: usize,
}

impl LangevinConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(invalid("dt", format!("must be positive, got {}", self.dt)));
        }
        if !(self.nbar.is_finite() && self.nbar > 0.0) {
            return Err(invalid(
                "nbar",
                format!("must be positive, got {}", self.nbar),
            ));
        }
        Ok(())
    }
}
