//! Delay observations and the baselines they are measured on.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Epoch;
use crate::error::EstimationError;

/// An ordered station pair. The delay is `arrival(station2) - arrival(station1)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Baseline {
    pub station1: String,
    pub station2: String,
}

impl Baseline {
    pub fn new(station1: impl Into<String>, station2: impl Into<String>) -> Self {
        Self {
            station1: station1.into(),
            station2: station2.into(),
        }
    }

    pub fn stations(&self) -> [&str; 2] {
        [&self.station1, &self.station2]
    }

    pub fn contains(&self, station: &str) -> bool {
        self.station1 == station || self.station2 == station
    }
}

impl std::fmt::Display for Baseline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.station1, self.station2)
    }
}

impl FromStr for Baseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| format!("baseline '{s}' is not of the form STATION1-STATION2"))?;
        let (a, b) = (a.trim(), b.trim());
        if a.is_empty() || b.is_empty() {
            return Err(format!("baseline '{s}' has an empty station name"));
        }
        if a == b {
            return Err(format!("baseline '{s}' joins a station to itself"));
        }
        Ok(Baseline::new(a, b))
    }
}

/// One scan-baseline group delay, already calibrated.
///
/// Everything except the active flag is fixed at construction; the residual is
/// derived on every call so it can never go stale against the a priori delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    baseline: Baseline,
    epoch: Epoch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    /// Observed delay (s).
    observed_delay: f64,
    /// A priori computed delay (s).
    apriori_delay: f64,
    /// Formal one-sigma uncertainty (s).
    uncertainty: f64,
    /// ∂delay/∂parameter keyed by parameter name.
    partials: BTreeMap<String, f64>,
    /// Set by screening only; input records always start active.
    #[serde(skip_deserializing, default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl Observation {
    /// Validating constructor.
    ///
    /// Fails with `InvalidObservation` (index 0; callers holding a collection
    /// re-tag it) when the uncertainty is not strictly positive or any value is
    /// not finite.
    pub fn new(
        baseline: Baseline,
        epoch: Epoch,
        observed_delay: f64,
        apriori_delay: f64,
        uncertainty: f64,
        partials: BTreeMap<String, f64>,
    ) -> Result<Self, EstimationError> {
        let obs = Self {
            baseline,
            epoch,
            source: None,
            observed_delay,
            apriori_delay,
            uncertainty,
            partials,
            active: true,
        };
        obs.validate(0)?;
        Ok(obs)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Check the construction invariants, reporting failures against `index`.
    ///
    /// Deserialized observations bypass [`Observation::new`], so ingest calls
    /// this on every record.
    pub fn validate(&self, index: usize) -> Result<(), EstimationError> {
        let invalid = |reason: String| EstimationError::InvalidObservation { index, reason };

        if !(self.uncertainty.is_finite() && self.uncertainty > 0.0) {
            return Err(invalid(format!(
                "uncertainty must be strictly positive, got {}",
                self.uncertainty
            )));
        }
        if !self.observed_delay.is_finite() || !self.apriori_delay.is_finite() {
            return Err(invalid("delays must be finite".to_string()));
        }
        if !self.epoch.mjd().is_finite() {
            return Err(invalid("epoch must be finite".to_string()));
        }
        if self.baseline.station1.is_empty() || self.baseline.station2.is_empty() {
            return Err(invalid("baseline has an empty station name".to_string()));
        }
        if let Some((name, value)) = self.partials.iter().find(|(_, v)| !v.is_finite()) {
            return Err(invalid(format!("partial for '{name}' is not finite ({value})")));
        }
        Ok(())
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn observed_delay(&self) -> f64 {
        self.observed_delay
    }

    pub fn apriori_delay(&self) -> f64 {
        self.apriori_delay
    }

    pub fn uncertainty(&self) -> f64 {
        self.uncertainty
    }

    /// Weight `1/σ²` used in the normal equations.
    pub fn weight(&self) -> f64 {
        1.0 / (self.uncertainty * self.uncertainty)
    }

    pub fn partials(&self) -> &BTreeMap<String, f64> {
        &self.partials
    }

    /// Partial for `name`, zero when the observation does not depend on it.
    pub fn partial(&self, name: &str) -> f64 {
        self.partials.get(name).copied().unwrap_or(0.0)
    }

    /// Observed minus computed.
    pub fn residual(&self) -> f64 {
        self.observed_delay - self.apriori_delay
    }

    /// `residual / (uncertainty * sqrt(variance_factor))`.
    pub fn standardized_residual(&self, variance_factor: f64) -> f64 {
        self.residual() / (self.uncertainty * variance_factor.sqrt())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }

    /// Replace the a priori delay after the a priori model changed.
    pub fn set_apriori_delay(&mut self, apriori_delay: f64) -> Result<(), EstimationError> {
        if !apriori_delay.is_finite() {
            return Err(EstimationError::InvalidObservation {
                index: 0,
                reason: "a priori delay must be finite".to_string(),
            });
        }
        self.apriori_delay = apriori_delay;
        Ok(())
    }

    /// True when at least one of `names` has a non-zero partial here.
    pub fn depends_on_any<'a>(&self, mut names: impl Iterator<Item = &'a str>) -> bool {
        names.any(|n| self.partial(n) != 0.0)
    }

    pub(crate) fn insert_partial(&mut self, name: &str, value: f64) {
        self.partials.insert(name.to_string(), value);
    }
}
