//! Error types for tickerflow.
//!
//! Library crates use [`TickerflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! [`ComputeError`] is kept separate: it describes why a single step's
//! compute failed, and is turned into an error envelope rather than
//! propagated to the caller.

use std::path::PathBuf;

/// Top-level error type for all tickerflow operations.
#[derive(Debug, thiserror::Error)]
pub enum TickerflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Step cache backend error (write path only; reads degrade to empty).
    #[error("storage error: {0}")]
    Storage(String),

    /// Provider client construction error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// (De)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested step id has no registered compute function.
    #[error("unknown step: {0}")]
    UnknownStep(String),

    /// A step was requested without the input it needs, and nothing usable
    /// could be derived from the cache either.
    #[error("missing input for {step}: {message}")]
    MissingInput { step: String, message: String },

    /// Data validation error (bad payload shape, invalid tier, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TickerflowError>;

impl TickerflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a missing-input error for `step`.
    pub fn missing_input(step: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MissingInput {
            step: step.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller-facing boundary should reject the request
    /// (as opposed to an internal infrastructure failure).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnknownStep(_) | Self::MissingInput { .. } | Self::Validation { .. }
        )
    }
}

/// Why a step's compute function failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    /// The provider reported quota/rate exhaustion.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The request never produced a usable response (network, timeout, decode).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider answered with an error of its own.
    #[error("provider failure: {0}")]
    Provider(String),
}

impl ComputeError {
    /// The message stored in an error envelope.
    pub fn user_message(&self) -> String {
        match self {
            Self::ResourceExhausted(_) => "AI evaluation failed: Resource exhausted. \
                The service is temporarily unavailable. Please try again later."
                .to_string(),
            Self::Transport(detail) | Self::Provider(detail) => {
                format!("AI evaluation failed: {detail}")
            }
        }
    }
}
