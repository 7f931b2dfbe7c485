//! Shared estimation pipeline used by the CLI subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load session -> resolve configuration -> estimate -> (report/export)

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::cli::EstimationArgs;
use crate::domain::{EstimationConfig, Session};
use crate::error::{AppError, EstimationError};
use crate::fit::{EstimationRun, estimate};
use crate::io::session::load_session;

/// Configuration for a session: CLI flags over the embedded file config over defaults.
pub fn resolve_config(args: &EstimationArgs, session: &Session) -> EstimationConfig {
    let mut config = session.config.clone().unwrap_or_default();
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(estimate) = &args.estimate {
        config.estimated_parameters = estimate
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(solver) = args.solver {
        config.solver = solver;
    }
    config
}

/// Load and estimate one session.
pub fn run_estimate(path: &Path, args: &EstimationArgs) -> Result<EstimationRun, AppError> {
    let session = load_session(path)?;
    let config = resolve_config(args, &session);
    Ok(estimate(&session, &config)?)
}

/// Load every session, then estimate them in parallel.
///
/// A file that cannot be loaded aborts the batch; an estimation failure only
/// fails its own entry.
pub fn run_batch(
    paths: &[PathBuf],
    args: &EstimationArgs,
) -> Result<Vec<(String, Result<EstimationRun, EstimationError>)>, AppError> {
    let jobs = paths
        .iter()
        .map(|p| -> Result<(Session, EstimationConfig), AppError> {
            let session = load_session(p)?;
            let config = resolve_config(args, &session);
            Ok((session, config))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(jobs
        .par_iter()
        .map(|(session, config)| (session.name.clone(), estimate(session, config)))
        .collect())
}
