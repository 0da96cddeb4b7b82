//! Error types for labelmap.
//!
//! All errors are strongly typed using thiserror. Only missing required
//! inputs abort a run; lookup failures are absorbed by the resolver and
//! recorded as misses.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the token dictionary.
#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("Token dictionary not found: {}", path.display())]
    Missing {
        path: PathBuf,
    },

    #[error("Failed to read token dictionary {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed token dictionary: {0}")]
    Csv(#[from] csv::Error),

    #[error("Token dictionary is missing required column '{column}'")]
    MissingColumn {
        column: String,
    },
}

/// Errors returned by a graph query executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Query timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Transport failure: {message}")]
    Transport {
        message: String,
    },

    #[error("Malformed query: {message}")]
    Malformed {
        message: String,
    },

    #[error("Query queue full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Query workers disconnected")]
    Disconnected,
}

impl QueryError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a malformed-query error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for '{field}': {reason}")]
    Invalid {
        field: String,
        reason: String,
    },
}

/// Top-level error type for labelmap.
#[derive(Debug, Error)]
pub enum LabelMapError {
    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl LabelMapError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if a required input was absent.
    #[must_use]
    pub const fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            Self::Dictionary(DictionaryError::Missing { .. } | DictionaryError::MissingColumn { .. })
        )
    }

    /// Returns true if this is a query error.
    #[must_use]
    pub const fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Query(e) => matches!(
                e,
                QueryError::Timeout { .. } | QueryError::Transport { .. } | QueryError::QueueFull { .. }
            ),
            Self::Dictionary(_) | Self::Config(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for labelmap operations.
pub type LabelMapResult<T> = Result<T, LabelMapError>;
