//! Error types.
//!
//! Two layers:
//!
//! - [`EstimationError`]: failures of a single estimation run (the library core)
//! - [`AppError`]: what the binary reports, carrying a process exit code

use thiserror::Error;

/// Fatal conditions of one estimation run.
///
/// Every variant aborts the run; no fallback solution is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    /// Malformed input record, rejected before any solve.
    #[error("invalid observation #{index}: {reason}")]
    InvalidObservation { index: usize, reason: String },

    /// Run configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Not enough active observations for the observable parameters.
    #[error(
        "underdetermined system: {observations} active observations for {parameters} parameters \
         ({deficit} more needed)"
    )]
    UnderdeterminedSystem {
        observations: usize,
        parameters: usize,
        deficit: usize,
    },

    /// Normal matrix is singular even after unobservable parameters were excluded.
    #[error("singular normal matrix; linearly dependent parameters: {}", parameters.join(", "))]
    SingularSystem { parameters: Vec<String> },

    /// Non-finite solution or a covariance that failed verification.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// The run was abandoned between screening iterations.
    #[error("estimation cancelled")]
    Cancelled,
}

impl EstimationError {
    pub(crate) fn underdetermined(observations: usize, parameters: usize) -> Self {
        EstimationError::UnderdeterminedSystem {
            observations,
            parameters,
            deficit: (parameters + 1).saturating_sub(observations),
        }
    }
}

/// Non-fatal conditions attached to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SolutionWarning {
    /// Screening hit its iteration cap while outliers were still being found.
    NotFullyConverged {
        iterations: usize,
        pending_outliers: usize,
    },
}

impl std::fmt::Display for SolutionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolutionWarning::NotFullyConverged {
                iterations,
                pending_outliers,
            } => write!(
                f,
                "not fully converged after {iterations} iterations ({pending_outliers} observations still above threshold)"
            ),
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<EstimationError> for AppError {
    fn from(err: EstimationError) -> Self {
        let exit_code = match &err {
            EstimationError::InvalidObservation { .. } | EstimationError::InvalidConfiguration(_) => 2,
            EstimationError::UnderdeterminedSystem { .. } => 3,
            EstimationError::SingularSystem { .. } | EstimationError::NumericalFailure(_) => 4,
            EstimationError::Cancelled => 5,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underdetermined_deficit_counts_missing_observations() {
        let err = EstimationError::underdetermined(2, 3);
        assert_eq!(
            err,
            EstimationError::UnderdeterminedSystem {
                observations: 2,
                parameters: 3,
                deficit: 2
            }
        );
    }

    #[test]
    fn app_error_exit_codes_follow_error_kind() {
        let app: AppError = EstimationError::SingularSystem {
            parameters: vec!["clock:KOKEE".to_string()],
        }
        .into();
        assert_eq!(app.exit_code(), 4);
        assert!(app.to_string().contains("clock:KOKEE"));

        let app: AppError = EstimationError::InvalidConfiguration("x".into()).into();
        assert_eq!(app.exit_code(), 2);
    }
}
