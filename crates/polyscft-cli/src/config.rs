use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use polyscft::core::chain::{ChainModel, PolymerChain};
use polyscft::core::grid::SimulationBox;
use polyscft::core::quadrature::ContourQuadrature;
use polyscft::engine::config::{
    AndersonConfig, AndersonConfigBuilder, LangevinConfig, LangevinScheme, SaddlePointConfig,
    SolverOptions, SplittingScheme,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const DEFAULT_MAX_HISTORY: usize = 20;
const DEFAULT_START_ERROR: f64 = 0.8;
const DEFAULT_MIX_MIN: f64 = 0.1;
const DEFAULT_MIX_INIT: f64 = 0.1;
const DEFAULT_LANGEVIN_DT: f64 = 1.0;
const DEFAULT_LANGEVIN_NBAR: f64 = 1024.0;
const DEFAULT_SEED: u64 = 5489;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialBoxConfig {
    nx: Option<[usize; 3]>,
    lx: Option<[f64; 3]>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialChainConfig {
    f: Option<f64>,
    n_segment: Option<usize>,
    chi_n: Option<f64>,
    model: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSolverConfig {
    splitting: Option<SplittingScheme>,
    quadrature: Option<ContourQuadrature>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialAndersonConfig {
    max_history: Option<usize>,
    start_error: Option<f64>,
    mix_min: Option<f64>,
    mix_init: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSaddleConfig {
    tolerance: Option<f64>,
    max_iterations: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialLangevinConfig {
    dt: Option<f64>,
    nbar: Option<f64>,
    max_steps: Option<usize>,
    seed: Option<u64>,
    scheme: Option<LangevinScheme>,
    snapshot_interval: Option<usize>,
}

/// Simulation settings as read from the TOML file, before CLI overrides.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    #[serde(rename = "box")]
    sim_box: Option<PartialBoxConfig>,
    chain: Option<PartialChainConfig>,
    solver: Option<PartialSolverConfig>,
    anderson: Option<PartialAndersonConfig>,
    saddle: Option<PartialSaddleConfig>,
    langevin: Option<PartialLangevinConfig>,
}

/// Fully resolved and validated settings of one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sim_box: SimulationBox,
    pub chain: PolymerChain,
    pub solver: SolverOptions,
    pub anderson: AndersonConfig,
    pub saddle: SaddlePointConfig,
    /// Also drives the amplitude of the random initial fields when
    /// `max_steps` is zero.
    pub langevin: LangevinConfig,
    pub output: PathBuf,
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| {
        CliError::Config(format!(
            "`{}` is required in the configuration file or via --set.",
            key
        ))
    })
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CliError::Config(format!("Invalid value for {}: {}", key, value))
    })
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<RunConfig> {
        self.apply_set_values(&args.set_values)?;

        let box_file = self.sim_box.take().unwrap_or_default();
        let sim_box = SimulationBox::new(
            required(box_file.nx, "box.nx")?,
            required(box_file.lx, "box.lx")?,
        )
        .map_err(|e| CliError::Config(e.to_string()))?;

        let chain_file = self.chain.take().unwrap_or_default();
        let model = match chain_file.model.as_deref() {
            Some(name) => {
                ChainModel::from_str(name).map_err(|e| CliError::Config(e.to_string()))?
            }
            None => ChainModel::default(),
        };
        let chain = PolymerChain::new(
            required(chain_file.f, "chain.f")?,
            required(chain_file.n_segment, "chain.n-segment")?,
            required(chain_file.chi_n, "chain.chi-n")?,
            model,
        )
        .map_err(|e| CliError::Config(e.to_string()))?;

        let solver_file = self.solver.take().unwrap_or_default();
        let solver = SolverOptions {
            splitting: solver_file.splitting.unwrap_or_default(),
            quadrature: solver_file.quadrature.unwrap_or_default(),
        };

        let anderson_file = self.anderson.take().unwrap_or_default();
        let anderson = AndersonConfigBuilder::new()
            .max_history(anderson_file.max_history.unwrap_or(DEFAULT_MAX_HISTORY))
            .start_error(anderson_file.start_error.unwrap_or(DEFAULT_START_ERROR))
            .mix_min(anderson_file.mix_min.unwrap_or(DEFAULT_MIX_MIN))
            .mix_init(anderson_file.mix_init.unwrap_or(DEFAULT_MIX_INIT))
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let saddle_file = self.saddle.take().unwrap_or_default();
        let defaults = SaddlePointConfig::default();
        let saddle = SaddlePointConfig {
            tolerance: args
                .tolerance
                .or(saddle_file.tolerance)
                .unwrap_or(defaults.tolerance),
            max_iterations: saddle_file
                .max_iterations
                .unwrap_or(defaults.max_iterations),
        };
        saddle
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let langevin_file = self.langevin.take().unwrap_or_default();
        let langevin = LangevinConfig {
            dt: langevin_file.dt.unwrap_or(DEFAULT_LANGEVIN_DT),
            nbar: langevin_file.nbar.unwrap_or(DEFAULT_LANGEVIN_NBAR),
            max_steps: args
                .langevin_steps
                .or(langevin_file.max_steps)
                .unwrap_or(0),
            seed: args.seed.or(langevin_file.seed).unwrap_or(DEFAULT_SEED),
            scheme: langevin_file.scheme.unwrap_or_default(),
            snapshot_interval: langevin_file.snapshot_interval.unwrap_or(0),
        };
        langevin
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;

        Ok(RunConfig {
            sim_box,
            chain,
            solver,
            anderson,
            saddle,
            langevin,
            output: args.output.clone(),
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value_str) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;

            match key {
                "chain.f" => {
                    self.chain.get_or_insert_with(Default::default).f =
                        Some(parse_value(key, value_str)?);
                }
                "chain.n-segment" => {
                    self.chain.get_or_insert_with(Default::default).n_segment =
                        Some(parse_value(key, value_str)?);
                }
                "chain.chi-n" => {
                    self.chain.get_or_insert_with(Default::default).chi_n =
                        Some(parse_value(key, value_str)?);
                }
                "chain.model" => {
                    self.chain.get_or_insert_with(Default::default).model =
                        Some(value_str.to_string());
                }
                "anderson.max-history" => {
                    self.anderson
                        .get_or_insert_with(Default::default)
                        .max_history = Some(parse_value(key, value_str)?);
                }
                "anderson.start-error" => {
                    self.anderson
                        .get_or_insert_with(Default::default)
                        .start_error = Some(parse_value(key, value_str)?);
                }
                "anderson.mix-min" => {
                    self.anderson.get_or_insert_with(Default::default).mix_min =
                        Some(parse_value(key, value_str)?);
                }
                "anderson.mix-init" => {
                    self.anderson.get_or_insert_with(Default::default).mix_init =
                        Some(parse_value(key, value_str)?);
                }
                "saddle.tolerance" => {
                    self.saddle.get_or_insert_with(Default::default).tolerance =
                        Some(parse_value(key, value_str)?);
                }
                "saddle.max-iterations" => {
                    self.saddle
                        .get_or_insert_with(Default::default)
                        .max_iterations = Some(parse_value(key, value_str)?);
                }
                "langevin.dt" => {
                    self.langevin.get_or_insert_with(Default::default).dt =
                        Some(parse_value(key, value_str)?);
                }
                "langevin.nbar" => {
                    self.langevin.get_or_insert_with(Default::default).nbar =
                        Some(parse_value(key, value_str)?);
                }
                "langevin.max-steps" => {
                    self.langevin
                        .get_or_insert_with(Default::default)
                        .max_steps = Some(parse_value(key, value_str)?);
                }
                "langevin.seed" => {
                    self.langevin.get_or_insert_with(Default::default).seed =
                        Some(parse_value(key, value_str)?);
                }
                "langevin.scheme" => {
                    let scheme = LangevinScheme::from_str(value_str)
                        .map_err(|e| CliError::Config(e.to_string()))?;
                    self.langevin.get_or_insert_with(Default::default).scheme = Some(scheme);
                }
                "langevin.snapshot-interval" => {
                    self.langevin
                        .get_or_insert_with(Default::default)
                        .snapshot_interval = Some(parse_value(key, value_str)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}
