//! Error types for definitions loading and resolution
//!
//! Only structural problems surface here. Fetch failures, parse failures and
//! reference cycles are logged where they happen and degrade to missing data.

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Registry loading errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid document {uri}: {reason}")]
    InvalidDocument { uri: String, reason: String },

    #[error("Malformed registry model: {0}")]
    Model(String),

    #[error("Schema reference {reference} cannot be resolved: {reason}")]
    SchemaReference { reference: String, reason: String },

    #[error("Schema format mismatch: expected {expected}, found {found}")]
    SchemaFormatMismatch { expected: String, found: String },

    #[error("CloudEvents message {message} has no 'type' in its envelope metadata")]
    MissingMessageType { message: String },

    #[error("Failed to fetch {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl RegistryError {
    pub(crate) fn schema_reference(reference: &str, reason: impl Into<String>) -> Self {
        Self::SchemaReference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}
