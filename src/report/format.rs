//! Formatted terminal output.
//!
//! Formatting lives here so the estimation code stays free of presentation
//! concerns and output changes stay localized.

use crate::domain::EopComponent;
use crate::error::EstimationError;
use crate::fit::EstimationRun;
use crate::report::eop::{EopField, EopReport};
use crate::report::summary::SessionSummary;

/// Full report of one estimation run.
pub fn format_run_report(run: &EstimationRun) -> String {
    let mut out = String::new();
    let sol = &run.solution;

    out.push_str(&format!("=== baseline - EOP estimate: {} ===\n", display_name(&run.session)));
    out.push_str(&format!(
        "Reference epoch: {} (MJD {:.6})\n",
        run.reference_epoch,
        run.reference_epoch.mjd()
    ));
    out.push_str(&format!(
        "Observations: {} used | {} rejected | {} dropped (no partials)\n",
        sol.active_count(),
        sol.rejected_count(),
        run.dropped
    ));
    out.push_str(&format!(
        "Fit: wrms={:.3} ps | sigma0={:.4} | dof={} | {:?} | {} iteration(s){}\n",
        sol.weighted_rms * 1e12,
        sol.variance_factor.sqrt(),
        sol.degrees_of_freedom,
        sol.decomposition,
        sol.iterations,
        if sol.is_converged() { "" } else { " (not converged)" }
    ));
    for w in &sol.warnings {
        out.push_str(&format!("Warning: {w}\n"));
    }

    let unobservable = sol.unobservable();
    if !unobservable.is_empty() {
        out.push_str(&format!("Unobservable: {}\n", unobservable.join(", ")));
    }

    out.push('\n');
    out.push_str(&format_eop_table(&run.eop));

    if run.eop.correlation.components.len() > 1 {
        out.push('\n');
        out.push_str(&format_correlation(&run.eop));
    }

    if sol.history.len() > 1 {
        out.push_str("\nScreening:\n");
        for h in &sol.history {
            out.push_str(&format!(
                "  #{:<3} active={:<6} rejected={:<4} sigma0^2={:.4e} wrms={:.3} ps\n",
                h.iteration,
                h.active,
                h.rejected,
                h.variance_factor,
                h.weighted_rms * 1e12
            ));
        }
    }

    out
}

/// EOP table: value ± sigma per component.
pub fn format_eop_table(report: &EopReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:>18} {:>14} {:>14} {:<8}\n",
        "EOP", "value", "sigma", "correction", "unit"
    ));
    out.push_str(&format!("{:-<12} {:-<18} {:-<14} {:-<14} {:-<8}\n", "", "", "", "", ""));

    for field in &report.fields {
        let c = field.component();
        match field {
            EopField::Available(e) => {
                let (v, s, d) = (fmt_value(c, e.value), fmt_value(c, e.sigma), fmt_value(c, e.correction));
                out.push_str(&format!("{:<12} {:>18} {:>14} {:>14} {:<8}\n", c.name(), v, s, d, e.unit));
            }
            EopField::Unavailable { reason, .. } => {
                out.push_str(&format!(
                    "{:<12} {:>18} {:>14} {:>14} {:<8}\n",
                    c.name(),
                    format!("({reason})"),
                    "-",
                    "-",
                    c.unit_label()
                ));
            }
        }
    }
    out
}

fn format_correlation(report: &EopReport) -> String {
    let comps = &report.correlation.components;
    let mut out = String::from("Correlations:\n");
    out.push_str(&format!("{:<12}", ""));
    for c in comps {
        out.push_str(&format!(" {:>12}", c.name()));
    }
    out.push('\n');
    for (i, c) in comps.iter().enumerate() {
        out.push_str(&format!("{:<12}", c.name()));
        for v in &report.correlation.matrix[i] {
            out.push_str(&format!(" {v:>12.4}"));
        }
        out.push('\n');
    }
    out
}

/// One line per session for batch runs.
pub fn format_batch_line(name: &str, outcome: &Result<EstimationRun, EstimationError>) -> String {
    match outcome {
        Ok(run) => {
            let part = |c: EopComponent| match run.eop.estimate(c) {
                Some(e) => format!("{}={}±{}", c.name(), fmt_value(c, e.value), fmt_value(c, e.sigma)),
                None => format!("{}=n/a", c.name()),
            };
            format!(
                "{:<24} {} {} {} wrms={:.2}ps rejected={}",
                truncate(display_name(name), 24),
                part(EopComponent::Ut1),
                part(EopComponent::XPole),
                part(EopComponent::YPole),
                run.solution.weighted_rms * 1e12,
                run.solution.rejected_count()
            )
        }
        Err(e) => format!("{:<24} FAILED: {e}", truncate(display_name(name), 24)),
    }
}

/// Human-readable session summary.
pub fn format_session_summary(summary: &SessionSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Session: {}\n", display_name(&summary.name)));
    out.push_str(&format!("Observations: {}\n", summary.n_observations));
    out.push_str(&format!("Stations ({}): {}\n", summary.stations.len(), summary.stations.join(", ")));
    out.push_str(&format!("Sources: {}\n", summary.sources.len()));
    out.push_str(&format!("Baselines: {}\n", summary.baselines.len()));
    if let Some(tr) = &summary.time_range {
        out.push_str(&format!(
            "Time range: {} .. {} ({:.2} h)\n",
            tr.start, tr.end, tr.duration_hours
        ));
    }
    if let Some(d) = &summary.delay_stats {
        out.push_str(&format!(
            "Delays: mean={:.3} us std={:.3} us | mean sigma={:.4} ns\n",
            d.mean_delay_us, d.std_delay_us, d.mean_sigma_ns
        ));
    }
    out
}

fn fmt_value(c: EopComponent, v: f64) -> String {
    match c {
        EopComponent::Ut1 | EopComponent::Ut1Rate => format!("{v:.7}"),
        _ => format!("{v:.4}"),
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "(unnamed)" } else { name }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::eop::{EopCorrelation, EopEstimate, Unavailable};

    fn report() -> EopReport {
        EopReport {
            reference_epoch: None,
            fields: vec![
                EopField::Available(EopEstimate {
                    component: EopComponent::Ut1,
                    unit: "s".into(),
                    apriori: 0.03,
                    correction: 1e-5,
                    value: 0.03001,
                    sigma: 2e-6,
                }),
                EopField::Unavailable {
                    component: EopComponent::YPole,
                    reason: Unavailable::Unobservable,
                },
            ],
            correlation: EopCorrelation::default(),
            weighted_rms: 2e-11,
            variance_factor: 1.0,
            degrees_of_freedom: 10,
            active_observations: 12,
            rejected_observations: 0,
            iterations: 1,
            converged: true,
            warnings: vec![],
        }
    }

    #[test]
    fn table_marks_unavailable_components() {
        let t = format_eop_table(&report());
        assert!(t.contains("0.0300100"));
        assert!(t.contains("(unobservable)"));
        assert!(t.lines().count() == 4);
    }

    #[test]
    fn failed_batch_line_shows_error() {
        let line = format_batch_line("s1", &Err(EstimationError::Cancelled));
        assert!(line.starts_with("s1"));
        assert!(line.ends_with("FAILED: estimation cancelled"));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
