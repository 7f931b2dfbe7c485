//! Run configuration, session input and solution output.
//!
//! A session is everything the upstream archive reader hands the core; a
//! solution result is everything EOP extraction and the exporters consume.

use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::{AprioriEopSeries, AprioriParameters, EopComponent, Epoch, Observation, ParameterVector};
use crate::error::{EstimationError, SolutionWarning};

/// Default standardized-residual rejection limit.
pub const DEFAULT_THRESHOLD: f64 = 3.0;
/// Default cap on screening iterations (number of solves).
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
/// Default floor on the variance factor used to standardize residuals.
pub const DEFAULT_VARIANCE_FLOOR: f64 = 1e-12;

/// Which decomposition solves the normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SolverMethod {
    /// Cholesky, switching to QR when the normal matrix is poorly conditioned.
    Auto,
    /// Always Cholesky on the equilibrated normal matrix.
    Cholesky,
    /// Always QR on the weighted design matrix.
    Qr,
}

/// Decomposition that actually produced a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decomposition {
    Cholesky,
    Qr,
}

/// Configuration of one estimation run.
///
/// Passed by value into every run; nothing here is process-global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Rejection limit on |standardized residual|.
    pub threshold: f64,
    /// Cap on the number of solves in the screening loop.
    pub max_iterations: usize,
    /// Names of the parameters to solve for, in column order.
    pub estimated_parameters: Vec<String>,
    pub solver: SolverMethod,
    /// Absolute lower bound on the variance factor when standardizing
    /// residuals. Screening also applies a floor derived from the delay
    /// magnitudes and sigmas, and uses the larger of the two.
    pub variance_floor: f64,
    /// EOP components to report. `None` reports UT1 and pole offsets plus any
    /// estimated rates.
    pub report_components: Option<Vec<EopComponent>>,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            estimated_parameters: EopComponent::OFFSETS.iter().map(|c| c.name().to_string()).collect(),
            solver: SolverMethod::Auto,
            variance_floor: DEFAULT_VARIANCE_FLOOR,
            report_components: None,
        }
    }
}

impl EstimationConfig {
    pub fn validate(&self) -> Result<(), EstimationError> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(EstimationError::InvalidConfiguration(format!(
                "rejection threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(EstimationError::InvalidConfiguration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.variance_floor.is_finite() && self.variance_floor >= 0.0) {
            return Err(EstimationError::InvalidConfiguration(format!(
                "variance_floor must be finite and non-negative, got {}",
                self.variance_floor
            )));
        }
        if self.estimated_parameters.is_empty() {
            return Err(EstimationError::InvalidConfiguration(
                "no parameters selected for estimation".to_string(),
            ));
        }
        Ok(())
    }

    /// Components to put in the EOP report for the given parameter vector.
    pub fn components_to_report(&self, parameters: &ParameterVector) -> Vec<EopComponent> {
        if let Some(list) = &self.report_components {
            return list.clone();
        }
        let mut out: Vec<EopComponent> = EopComponent::OFFSETS.to_vec();
        out.extend(
            EopComponent::ALL
                .into_iter()
                .filter(|c| c.is_rate() && parameters.contains(c.name())),
        );
        out.sort();
        out
    }
}

/// Calibrated observations of one session plus their a priori model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub name: String,
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub apriori: AprioriParameters,
    #[serde(default)]
    pub apriori_eop: AprioriEopSeries,
    /// Epoch EOP offsets refer to. Defaults to the middle of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_epoch: Option<Epoch>,
    /// Configuration embedded in the session file (command-line flags win).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EstimationConfig>,
}

impl Session {
    pub fn new(name: impl Into<String>, observations: Vec<Observation>) -> Self {
        Self {
            name: name.into(),
            observations,
            ..Self::default()
        }
    }

    /// Validate every observation, reporting the first bad record.
    pub fn validate(&self) -> Result<(), EstimationError> {
        self.observations
            .iter()
            .enumerate()
            .try_for_each(|(i, o)| o.validate(i))
    }

    /// First and last observation epochs.
    pub fn time_span(&self) -> Option<(Epoch, Epoch)> {
        let mut it = self.observations.iter().map(|o| o.epoch());
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), e| {
            (
                if e < lo { e } else { lo },
                if e > hi { e } else { hi },
            )
        }))
    }

    /// Explicit reference epoch, else the midpoint of the session.
    pub fn reference_epoch(&self) -> Option<Epoch> {
        self.reference_epoch
            .or_else(|| self.time_span().map(|(a, b)| a.midpoint(b)))
    }
}

/// Screening loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningState {
    Fitting,
    Converged,
    MaxIterationsReached,
    Failed,
}

/// Audit record of one screening iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub active: usize,
    /// Observations found above threshold after this solve.
    pub rejected: usize,
    pub variance_factor: f64,
    /// Weighted post-fit RMS (s).
    pub weighted_rms: f64,
}

/// Final output of one estimation run. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionResult {
    pub parameters: ParameterVector,
    /// Corrections for every parameter; exactly zero where unobservable.
    pub corrections: Vec<f64>,
    /// Indices (into `parameters`) that took part in the solve.
    pub observable: Vec<usize>,
    /// `σ₀²·N⁻¹` over the observable parameters, in `observable` order.
    pub covariance: DMatrix<f64>,
    /// Post-fit variance factor σ₀².
    pub variance_factor: f64,
    /// Weighted post-fit RMS (s).
    pub weighted_rms: f64,
    pub degrees_of_freedom: usize,
    /// Post-fit residual per input observation (s), rejected ones included.
    pub postfit_residuals: Vec<f64>,
    /// Standardized post-fit residual per input observation.
    pub standardized_residuals: Vec<f64>,
    /// Final active flag per input observation.
    pub active: Vec<bool>,
    pub iterations: usize,
    pub state: ScreeningState,
    pub history: Vec<IterationRecord>,
    pub decomposition: Decomposition,
    pub warnings: Vec<SolutionWarning>,
}

impl SolutionResult {
    fn observable_slot(&self, name: &str) -> Option<usize> {
        let i = self.parameters.index_of(name)?;
        self.observable.iter().position(|&j| j == i)
    }

    pub fn is_observable(&self, name: &str) -> bool {
        self.observable_slot(name).is_some()
    }

    /// Correction Δx for `name` (zero when unobservable, `None` when unknown).
    pub fn correction(&self, name: &str) -> Option<f64> {
        self.parameters.index_of(name).map(|i| self.corrections[i])
    }

    /// A priori plus correction, internal units.
    pub fn adjusted_value(&self, name: &str) -> Option<f64> {
        let i = self.parameters.index_of(name)?;
        self.parameters.get(i).map(|p| p.apriori + self.corrections[i])
    }

    /// Formal one-sigma error; `None` when the parameter was not observable.
    pub fn sigma(&self, name: &str) -> Option<f64> {
        let k = self.observable_slot(name)?;
        Some(self.covariance[(k, k)].max(0.0).sqrt())
    }

    pub fn covariance_between(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.covariance[(self.observable_slot(a)?, self.observable_slot(b)?)])
    }

    /// Names of parameters excluded as unobservable.
    pub fn unobservable(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.observable.contains(i))
            .map(|(_, p)| p.name.as_str())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.active.len() - self.active_count()
    }

    pub fn is_converged(&self) -> bool {
        self.state == ScreeningState::Converged
    }
}
