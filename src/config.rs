//! Configuration.
//!
//! Plain structs with `Default` and serde per-field defaults. JSON loaders
//! validate before returning.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::QueryRuntimeConfig;

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Threads used to resolve distinct tokens.
    pub resolve_workers: usize,
    /// Maximum example cluster labels per problem token.
    pub example_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolve_workers: 4,
            example_limit: 3,
        }
    }
}

impl PipelineConfig {
    /// Checks field ranges.
    ///
    /// # Errors
    /// `Invalid` for zero workers or a zero example limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolve_workers == 0 {
            return Err(invalid("resolve_workers", "must be at least 1"));
        }
        if self.example_limit == 0 {
            return Err(invalid("example_limit", "must be at least 1"));
        }
        Ok(())
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    /// `Parse` or `Invalid`.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    /// `Io`, `Parse` or `Invalid`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read(path.as_ref())?)
    }
}

impl QueryRuntimeConfig {
    /// Parses and validates a JSON document. Durations are milliseconds.
    ///
    /// # Errors
    /// `Parse` or `Invalid`.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    /// `Io`, `Parse` or `Invalid`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read(path.as_ref())?)
    }
}

pub(crate) fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
