//! The ordered set of unknowns solved for in one run.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{AprioriEopSeries, EopComponent, Epoch};
use crate::error::EstimationError;

/// A priori value and estimation flag for one named parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AprioriParameter {
    pub value: f64,
    /// Fixed parameters are known quantities and may not be estimated.
    #[serde(default)]
    pub fixed: bool,
}

/// A priori parameter set keyed by name.
pub type AprioriParameters = BTreeMap<String, AprioriParameter>;

/// One estimated unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// A priori value (internal units).
    pub apriori: f64,
}

impl Parameter {
    pub fn new(name: impl Into<String>, apriori: f64) -> Self {
        Self {
            name: name.into(),
            apriori,
        }
    }

    /// The EOP component this parameter is, if any.
    pub fn eop_component(&self) -> Option<EopComponent> {
        EopComponent::from_name(&self.name)
    }
}

/// Ordered, named unknowns. The order defines the column index space of the
/// design matrix and of the covariance matrix for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterVector {
    parameters: Vec<Parameter>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ParameterVector {
    pub fn new(parameters: Vec<Parameter>) -> Result<Self, EstimationError> {
        let mut index = HashMap::with_capacity(parameters.len());
        for (i, p) in parameters.iter().enumerate() {
            if p.name.trim().is_empty() {
                return Err(EstimationError::InvalidConfiguration(
                    "parameter names must not be empty".to_string(),
                ));
            }
            if !p.apriori.is_finite() {
                return Err(EstimationError::InvalidConfiguration(format!(
                    "a priori value of '{}' is not finite",
                    p.name
                )));
            }
            if index.insert(p.name.clone(), i).is_some() {
                return Err(EstimationError::InvalidConfiguration(format!(
                    "parameter '{}' is listed more than once",
                    p.name
                )));
            }
        }
        Ok(Self { parameters, index })
    }

    /// Resolve the estimated names against the a priori inputs.
    ///
    /// A priori values come from the explicit parameter set first, then (for
    /// EOP names) from the series interpolated at `reference`, else zero.
    pub fn resolve(
        names: &[String],
        apriori: &AprioriParameters,
        series: &AprioriEopSeries,
        reference: Epoch,
    ) -> Result<Self, EstimationError> {
        if names.is_empty() {
            return Err(EstimationError::InvalidConfiguration(
                "no parameters selected for estimation".to_string(),
            ));
        }

        let mut parameters = Vec::with_capacity(names.len());
        for name in names {
            let value = match apriori.get(name) {
                Some(p) if p.fixed => {
                    return Err(EstimationError::InvalidConfiguration(format!(
                        "parameter '{name}' is fixed a priori but was requested for estimation"
                    )));
                }
                Some(p) => p.value,
                None => EopComponent::from_name(name)
                    .and_then(|c| series.value_at(c, reference))
                    .unwrap_or(0.0),
            };
            parameters.push(Parameter::new(name.clone(), value));
        }
        ParameterVector::new(parameters)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Parameter> {
        self.parameters.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }
}
