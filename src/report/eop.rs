//! EOP extraction from a solution result.
//!
//! Pure function of its inputs: the same `SolutionResult` always yields the
//! same report. Values are converted to conventional units (seconds for UT1,
//! milliarcseconds for the pole) and a component that was not estimated, or
//! was excluded as unobservable, is reported as unavailable, never as zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{EopComponent, Epoch, SolutionResult};
use crate::error::SolutionWarning;

/// Adjusted EOP value with its formal error, conventional units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EopEstimate {
    pub component: EopComponent,
    pub unit: String,
    pub apriori: f64,
    pub correction: f64,
    /// A priori plus correction.
    pub value: f64,
    /// One-sigma formal error.
    pub sigma: f64,
}

/// Why a requested component has no estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    NotEstimated,
    Unobservable,
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::NotEstimated => f.write_str("not estimated"),
            Unavailable::Unobservable => f.write_str("unobservable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EopField {
    Available(EopEstimate),
    Unavailable {
        component: EopComponent,
        reason: Unavailable,
    },
}

impl EopField {
    pub fn component(&self) -> EopComponent {
        match self {
            EopField::Available(e) => e.component,
            EopField::Unavailable { component, .. } => *component,
        }
    }

    pub fn estimate(&self) -> Option<&EopEstimate> {
        match self {
            EopField::Available(e) => Some(e),
            EopField::Unavailable { .. } => None,
        }
    }
}

/// Correlation matrix among the available EOP components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EopCorrelation {
    pub components: Vec<EopComponent>,
    pub matrix: Vec<Vec<f64>>,
}

impl EopCorrelation {
    pub fn get(&self, a: EopComponent, b: EopComponent) -> Option<f64> {
        let i = self.components.iter().position(|c| *c == a)?;
        let j = self.components.iter().position(|c| *c == b)?;
        Some(self.matrix[i][j])
    }
}

/// `{value, sigma}` pair of the plain output mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueSigma {
    pub value: f64,
    pub sigma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EopReport {
    pub reference_epoch: Option<Epoch>,
    pub fields: Vec<EopField>,
    pub correlation: EopCorrelation,
    /// Weighted post-fit RMS (s).
    pub weighted_rms: f64,
    pub variance_factor: f64,
    pub degrees_of_freedom: usize,
    pub active_observations: usize,
    pub rejected_observations: usize,
    pub iterations: usize,
    pub converged: bool,
    pub warnings: Vec<SolutionWarning>,
}

impl EopReport {
    pub fn field(&self, component: EopComponent) -> Option<&EopField> {
        self.fields.iter().find(|f| f.component() == component)
    }

    pub fn estimate(&self, component: EopComponent) -> Option<&EopEstimate> {
        self.field(component).and_then(EopField::estimate)
    }

    /// EOP name → `{value, sigma}`; unavailable components map to `None`.
    pub fn value_map(&self) -> BTreeMap<String, Option<ValueSigma>> {
        self.fields
            .iter()
            .map(|f| {
                let vs = f.estimate().map(|e| ValueSigma {
                    value: e.value,
                    sigma: e.sigma,
                });
                (f.component().name().to_string(), vs)
            })
            .collect()
    }
}

/// Build the EOP report for `components` (duplicates ignored, order kept).
pub fn extract_eop(
    result: &SolutionResult,
    components: &[EopComponent],
    reference_epoch: Option<Epoch>,
) -> EopReport {
    let mut requested: Vec<EopComponent> = Vec::with_capacity(components.len());
    for c in components {
        if !requested.contains(c) {
            requested.push(*c);
        }
    }

    let fields: Vec<EopField> = requested.iter().map(|&c| extract_one(result, c)).collect();

    let available: Vec<EopComponent> = fields
        .iter()
        .filter_map(|f| f.estimate().map(|e| e.component))
        .collect();
    let matrix = available
        .iter()
        .map(|a| {
            available
                .iter()
                .map(|b| correlation(result, a.name(), b.name()))
                .collect()
        })
        .collect();

    EopReport {
        reference_epoch,
        fields,
        correlation: EopCorrelation {
            components: available,
            matrix,
        },
        weighted_rms: result.weighted_rms,
        variance_factor: result.variance_factor,
        degrees_of_freedom: result.degrees_of_freedom,
        active_observations: result.active_count(),
        rejected_observations: result.rejected_count(),
        iterations: result.iterations,
        converged: result.is_converged(),
        warnings: result.warnings.clone(),
    }
}

fn extract_one(result: &SolutionResult, component: EopComponent) -> EopField {
    let name = component.name();
    let Some(i) = result.parameters.index_of(name) else {
        return EopField::Unavailable {
            component,
            reason: Unavailable::NotEstimated,
        };
    };
    let Some(sigma) = result.sigma(name) else {
        return EopField::Unavailable {
            component,
            reason: Unavailable::Unobservable,
        };
    };

    let apriori = result.parameters.get(i).map(|p| p.apriori).unwrap_or(0.0);
    let correction = result.corrections[i];
    EopField::Available(EopEstimate {
        component,
        unit: component.unit_label().to_string(),
        apriori: component.to_conventional(apriori),
        correction: component.to_conventional(correction),
        value: component.to_conventional(apriori + correction),
        sigma: component.to_conventional(sigma),
    })
}

fn correlation(result: &SolutionResult, a: &str, b: &str) -> f64 {
    let (Some(cab), Some(sa), Some(sb)) = (result.covariance_between(a, b), result.sigma(a), result.sigma(b)) else {
        return f64::NAN;
    };
    if a == b {
        return 1.0;
    }
    if sa == 0.0 || sb == 0.0 {
        return 0.0;
    }
    (cab / (sa * sb)).clamp(-1.0, 1.0)
}
