//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and initialises logging
//! - parses CLI arguments
//! - dispatches to estimation, batch, summary or simulation
//! - prints reports and writes optional exports

use clap::Parser;
use log::info;

use crate::cli::{BatchArgs, Cli, Command, EstimateArgs, SimulateArgs, SummaryArgs};
use crate::data::{SyntheticConfig, generate_session};
use crate::error::AppError;
use crate::report::{format_batch_line, format_run_report, format_session_summary, summarize};

pub mod pipeline;

/// Entry point for the `baseline` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is the normal case.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Estimate(args) => handle_estimate(args),
        Command::Batch(args) => handle_batch(args),
        Command::Summary(args) => handle_summary(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // A logger may already be installed when embedded (tests, other binaries).
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .try_init();
}

fn handle_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let run = pipeline::run_estimate(&args.session, &args.estimation)?;

    println!("{}", format_run_report(&run));

    if let Some(path) = &args.export_eop {
        crate::io::export::write_eop_json(path, &run)?;
        info!("wrote EOP report to {}", path.display());
    }
    if let Some(path) = &args.export_residuals {
        crate::io::export::write_residuals_csv(path, &run)?;
        info!("wrote residuals to {}", path.display());
    }

    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let outcomes = pipeline::run_batch(&args.sessions, &args.estimation)?;

    let mut failed = 0usize;
    for (name, outcome) in &outcomes {
        println!("{}", format_batch_line(name, outcome));
        failed += usize::from(outcome.is_err());
    }

    if failed == outcomes.len() {
        return Err(AppError::new(4, format!("All {failed} session(s) failed.")));
    }
    if failed > 0 {
        eprintln!("{failed} of {} session(s) failed.", outcomes.len());
    }
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<(), AppError> {
    let session = crate::io::session::load_session(&args.session)?;
    println!("{}", format_session_summary(&summarize(&session)));
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = synthetic_config_from_args(&args);
    let sim = generate_session(&config)?;
    crate::io::session::write_session_json(&args.out, &sim.session)?;

    println!(
        "Wrote {} observations ({} parameters) to {}",
        sim.session.observations.len(),
        sim.truth.len(),
        args.out.display()
    );
    for (name, value) in &sim.truth {
        println!("  truth {name:<20} {value:.6e}");
    }
    Ok(())
}

pub fn synthetic_config_from_args(args: &SimulateArgs) -> SyntheticConfig {
    SyntheticConfig {
        seed: args.seed,
        duration_hours: args.hours,
        scan_interval_minutes: args.scan_interval,
        delay_sigma: args.sigma_ps * 1e-12,
        noise: !args.no_noise,
        clock_sigma: args.clock_ns * 1e-9,
        troposphere_sigma: args.troposphere_ps * 1e-12,
        ..SyntheticConfig::default()
    }
}
