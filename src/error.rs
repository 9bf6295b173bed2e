use thiserror::Error;

use crate::models::Period;

/// A write would break a uniqueness rule, e.g. a second monthly budget for the
/// same month.
#[derive(Debug, Error)]
#[error("{0} already exists")]
pub struct Conflict(pub String);

/// Input that passed deserialization but breaks a domain rule, e.g. a negative
/// amount.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InvalidInput(pub String);

/// Failures of request-triggered budget analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The operation needs budget configuration that the user has not set up.
    #[error("No {what} configured for {period}")]
    ConfigurationNotFound { what: &'static str, period: Period },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
