//! Error types for the autofill core library.

use thiserror::Error;

/// Errors that can occur while serving an autofill request.
///
/// Every variant is caught at the engine boundary; hosts only ever see these
/// as the `error` message on a failed `AutofillResult`, or from the
/// configuration/builder entry points.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutofillError {
    /// Candidate fetch from the credential source failed
    #[error("Database error: {0}")]
    Database(String),

    /// Processing exceeded the configured deadline
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The host cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Engine or resolver was configured incorrectly
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error serializing/deserializing JSON
    #[error("JSON error: {0}")]
    Json(String),

    /// Anything else
    #[error("Error: {0}")]
    Unknown(String),
}

impl AutofillError {
    /// Stable label used as the failure dimension in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AutofillError::Database(_) => "DatabaseError",
            AutofillError::Timeout { .. } => "TimeoutError",
            AutofillError::Cancelled => "CancelledError",
            AutofillError::Configuration(_) => "ConfigurationError",
            AutofillError::Json(_) => "JsonError",
            AutofillError::Unknown(_) => "UnknownError",
        }
    }

    /// Only a failed candidate fetch is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AutofillError::Database(_))
    }
}

impl From<serde_json::Error> for AutofillError {
    fn from(err: serde_json::Error) -> Self {
        AutofillError::Json(err.to_string())
    }
}

/// Failure reported by a credential source implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        SourceError(message.into())
    }
}

impl From<SourceError> for AutofillError {
    fn from(err: SourceError) -> Self {
        AutofillError::Database(err.0)
    }
}

/// Result type alias for autofill core operations.
pub type CoreResult<T> = Result<T, AutofillError>;
