use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu",
    version,
    about = "polyscft CLI - Self-consistent field theory and Langevin field-theoretic simulation of AB diblock copolymer melts.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find the saddle point of a melt and optionally run Langevin dynamics from it.
    Run(RunArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the simulation configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path for the final fields and concentrations (TOML).
    #[arg(short, long, value_name = "PATH", default_value = "fields.toml")]
    pub output: PathBuf,

    // --- Overrides ---
    /// Override the random seed used for the initial fields and the Langevin noise.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override the number of Langevin steps. Zero runs the saddle-point search only.
    #[arg(long, value_name = "INT")]
    pub langevin_steps: Option<usize>,

    /// Override the saddle-point error tolerance.
    #[arg(long, value_name = "FLOAT")]
    pub tolerance: Option<f64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S chain.chi-n=15
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
