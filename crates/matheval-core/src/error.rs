//! Error types for the evaluation pipeline

use thiserror::Error;

/// Result type alias for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Main error type for the evaluation pipeline
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// Configuration related errors (unknown model, missing key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or HTTP failure while calling a model endpoint
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The endpoint answered but carried neither content nor usage
    #[error("Empty response from model endpoint")]
    EmptyResponse,

    /// Explicit throttling signal from the provider
    #[error("Rate limited by provider")]
    RateLimited,

    /// Structurally valid response whose extraction yielded no usable answer
    #[error("No usable answer in model output")]
    UnusableAnswer,

    /// The judge call succeeded but no correctness verdict could be parsed
    #[error("Judge verdict could not be determined")]
    JudgeUndetermined,

    /// Writing to the result store failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Problems reading or interpreting dataset records
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EvalError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create a new dataset error
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset(message.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Whether the solve phase may consume a retry attempt on this error.
    ///
    /// Judge and persistence failures are terminal for a unit and never
    /// retried; configuration errors indicate operator mistakes and fail
    /// immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::EmptyResponse | Self::RateLimited | Self::UnusableAnswer
        )
    }

    /// Whether this error is an explicit throttling signal
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
