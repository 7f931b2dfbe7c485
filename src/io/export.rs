//! Export estimation results.
//!
//! - EOP report JSON: the plain `name -> {value, sigma}` mapping plus fit diagnostics
//! - residual CSV: one row per observation, rejected ones included

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::domain::Epoch;
use crate::error::AppError;
use crate::fit::EstimationRun;
use crate::report::{EopReport, ValueSigma};

/// Top-level shape of the EOP JSON export.
#[derive(Debug, Serialize)]
pub struct EopExport<'a> {
    pub tool: &'static str,
    pub session: &'a str,
    pub reference_epoch: Epoch,
    /// Reference epoch as ISO-8601 UTC, for readers that do not speak MJD.
    pub reference_time: String,
    pub eop: BTreeMap<String, Option<ValueSigma>>,
    pub report: &'a EopReport,
}

impl<'a> EopExport<'a> {
    pub fn new(run: &'a EstimationRun) -> Self {
        Self {
            tool: "baseline",
            session: &run.session,
            reference_epoch: run.reference_epoch,
            reference_time: run.reference_epoch.to_string(),
            eop: run.eop.value_map(),
            report: &run.eop,
        }
    }
}

/// Write the EOP report of one run as JSON.
pub fn write_eop_json(path: &Path, run: &EstimationRun) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create EOP JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &EopExport::new(run))
        .map_err(|e| AppError::new(2, format!("Failed to write EOP JSON: {e}")))?;
    Ok(())
}

/// Write per-observation residuals of one run to a CSV file.
pub fn write_residuals_csv(path: &Path, run: &EstimationRun) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create residual CSV '{}': {e}", path.display())))?;
    write_residuals(file, run)
        .map_err(|e| AppError::new(2, format!("Failed to write residual CSV: {e}")))
}

/// Residual rows to any writer. Delays in picoseconds.
pub fn write_residuals<W: Write>(mut out: W, run: &EstimationRun) -> std::io::Result<()> {
    writeln!(
        out,
        "baseline,source,mjd,prefit_ps,postfit_ps,sigma_ps,standardized,active"
    )?;

    let sol = &run.solution;
    for (i, obs) in run.observations.iter().enumerate() {
        writeln!(
            out,
            "{},{},{:.8},{:.4},{:.4},{:.4},{:.4},{}",
            obs.baseline(),
            obs.source().unwrap_or(""),
            obs.epoch().mjd(),
            obs.residual() * 1e12,
            sol.postfit_residuals[i] * 1e12,
            obs.uncertainty() * 1e12,
            sol.standardized_residuals[i],
            sol.active[i],
        )?;
    }
    out.flush()
}
