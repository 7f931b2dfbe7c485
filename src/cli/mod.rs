//! Command-line parsing for the `baseline` EOP estimator.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! estimation code. Every estimation flag also reads an environment variable,
//! so `.env` files and CI environments can pin a configuration.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::SolverMethod;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "baseline", version, about = "VLBI Earth orientation parameter estimator")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate EOP from one session and print the report.
    Estimate(EstimateArgs),
    /// Estimate several sessions in parallel, one summary line each.
    Batch(BatchArgs),
    /// Print observation statistics for a session without estimating.
    Summary(SummaryArgs),
    /// Write a synthetic session JSON.
    Simulate(SimulateArgs),
}

/// Estimation options shared by `estimate` and `batch`.
///
/// Unset options fall back to the session file's embedded configuration,
/// then to built-in defaults.
#[derive(Debug, Args, Clone, Default)]
pub struct EstimationArgs {
    /// Rejection limit on |standardized residual|.
    #[arg(long, env = "BASELINE_THRESHOLD")]
    pub threshold: Option<f64>,

    /// Cap on screening iterations (solves).
    #[arg(long, env = "BASELINE_MAX_ITERATIONS")]
    pub max_iterations: Option<usize>,

    /// Parameters to estimate, comma separated (e.g. UT1,x_pole,y_pole,clock:KOKEE).
    #[arg(long = "estimate", env = "BASELINE_ESTIMATE", value_delimiter = ',')]
    pub estimate: Option<Vec<String>>,

    /// Normal-equation solver.
    #[arg(long, value_enum, env = "BASELINE_SOLVER")]
    pub solver: Option<SolverMethod>,
}

#[derive(Debug, Args)]
pub struct EstimateArgs {
    /// Session JSON (or observation CSV).
    #[arg(value_name = "SESSION")]
    pub session: PathBuf,

    #[command(flatten)]
    pub estimation: EstimationArgs,

    /// Write the EOP report as JSON.
    #[arg(long = "export-eop", value_name = "JSON")]
    pub export_eop: Option<PathBuf>,

    /// Write per-observation residuals as CSV.
    #[arg(long = "export-residuals", value_name = "CSV")]
    pub export_residuals: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Session files to estimate.
    #[arg(value_name = "SESSION", required = true, num_args = 1..)]
    pub sessions: Vec<PathBuf>,

    #[command(flatten)]
    pub estimation: EstimationArgs,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[arg(value_name = "SESSION")]
    pub session: PathBuf,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Output session JSON.
    #[arg(long, value_name = "JSON")]
    pub out: PathBuf,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Session length (hours).
    #[arg(long, default_value_t = 24.0)]
    pub hours: f64,

    /// Minutes between scans.
    #[arg(long, default_value_t = 10.0)]
    pub scan_interval: f64,

    /// Delay uncertainty (picoseconds).
    #[arg(long, default_value_t = 20.0)]
    pub sigma_ps: f64,

    /// Generate noise-free delays.
    #[arg(long)]
    pub no_noise: bool,

    /// Simulate station clock offsets with this std dev (nanoseconds).
    #[arg(long, default_value_t = 0.0)]
    pub clock_ns: f64,

    /// Simulate zenith delay corrections with this std dev (picoseconds).
    #[arg(long, default_value_t = 0.0)]
    pub troposphere_ps: f64,
}
