//! Unified error hierarchy for ChronoShift
//!
//! Malformed input and upstream store failures are errors. Sparse data is not:
//! estimators report it as an "unavailable" outcome instead.

use thiserror::Error;

/// Top-level error type for all ChronoShift operations
#[derive(Debug, Error)]
pub enum ChronoShiftError {
    /// Bad clock strings, out-of-range request fields
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] InputError),

    /// The external sample store failed; never retried locally
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Request validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Clock time is not a well-formed 24-hour `HH:mm` value
    #[error("Malformed time '{value}': {reason}")]
    MalformedTime { value: String, reason: String },

    /// A field is present but outside its accepted range
    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// A required field is missing
    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

impl InputError {
    pub fn malformed_time(value: impl Into<String>, reason: impl Into<String>) -> Self {
        InputError::MalformedTime {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        InputError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Sample store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or opened
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored record could not be decoded
    #[error("Corrupt record in {collection}: {reason}")]
    CorruptRecord { collection: String, reason: String },
}

/// Result type alias for ChronoShift operations
pub type Result<T> = std::result::Result<T, ChronoShiftError>;

impl ChronoShiftError {
    /// Check if error is retryable.
    ///
    /// Always false: the core performs no retries, and store failures are
    /// surfaced to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ChronoShiftError::MalformedInput(_) => ErrorSeverity::Warning,
            ChronoShiftError::UpstreamFetch(StoreError::CorruptRecord { .. }) => {
                ErrorSeverity::Critical
            }
            ChronoShiftError::UpstreamFetch(_) => ErrorSeverity::Error,
            ChronoShiftError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ChronoShiftError::MalformedInput(InputError::MalformedTime { value, .. }) => {
                format!("'{}' is not a valid time. Use 24-hour HH:mm, e.g. 06:30.", value)
            }
            ChronoShiftError::MalformedInput(InputError::MissingField { field }) => {
                format!("The request is missing '{}'.", field)
            }
            ChronoShiftError::UpstreamFetch(_) => {
                "Unable to load your performance history right now. Please try again later."
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
