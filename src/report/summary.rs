//! Session overview: what was observed, where, and when.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::{Epoch, Session};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: Epoch,
    pub end: Epoch,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayStats {
    /// Mean observed delay (µs).
    pub mean_delay_us: f64,
    /// Sample standard deviation of observed delay (µs).
    pub std_delay_us: f64,
    /// Mean formal error (ns).
    pub mean_sigma_ns: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub n_observations: usize,
    pub stations: Vec<String>,
    pub sources: Vec<String>,
    pub baselines: Vec<String>,
    pub time_range: Option<TimeRange>,
    pub delay_stats: Option<DelayStats>,
}

/// Summarize a session. Name lists are sorted and unique.
pub fn summarize(session: &Session) -> SessionSummary {
    let obs = &session.observations;

    let stations: BTreeSet<&str> = obs.iter().flat_map(|o| o.baseline().stations()).collect();
    let sources: BTreeSet<&str> = obs.iter().filter_map(|o| o.source()).collect();
    let baselines: BTreeSet<String> = obs.iter().map(|o| o.baseline().to_string()).collect();

    let time_range = session.time_span().map(|(start, end)| TimeRange {
        start,
        end,
        duration_hours: end.days_since(start) * 24.0,
    });

    let delay_stats = (!obs.is_empty()).then(|| {
        let n = obs.len() as f64;
        let mean = obs.iter().map(|o| o.observed_delay()).sum::<f64>() / n;
        let var = if obs.len() > 1 {
            obs.iter().map(|o| (o.observed_delay() - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        let mean_sigma = obs.iter().map(|o| o.uncertainty()).sum::<f64>() / n;
        DelayStats {
            mean_delay_us: mean * 1e6,
            std_delay_us: var.sqrt() * 1e6,
            mean_sigma_ns: mean_sigma * 1e9,
        }
    });

    SessionSummary {
        name: session.name.clone(),
        n_observations: obs.len(),
        stations: stations.into_iter().map(str::to_string).collect(),
        sources: sources.into_iter().map(str::to_string).collect(),
        baselines: baselines.into_iter().collect(),
        time_range,
        delay_stats,
    }
}
