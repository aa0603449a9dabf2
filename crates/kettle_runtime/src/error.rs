//! Runtime error types
//!
//! Each layer gets its own enum. Errors that cross the scheduler boundary are
//! logged with the offending process id and never propagate further.

use kettle_types::{ConversionError, ValidationError};

/// Result type alias for component writes
pub type ComponentResult<T> = std::result::Result<T, ComponentError>;

/// Errors raised by component operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComponentError {
    #[error("Validation error on '{id}': {source}")]
    Validation {
        id: String,
        #[source]
        source: ValidationError,
    },

    #[error("Conversion error mirroring '{id}': {source}")]
    Conversion {
        id: String,
        #[source]
        source: ConversionError,
    },

    #[error("Component '{0}' is read-only")]
    ReadOnly(String),
}

/// Errors raised by the local registry
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Component '{0}' already exists")]
    Duplicate(String),

    #[error("Invalid component config: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Invalid component reference '{0}'")]
    InvalidReference(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Bus transport failures. Logged by callers, never fatal to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid topic '{0}'")]
    InvalidTopic(String),

    #[error("Invalid topic pattern '{0}'")]
    InvalidPattern(String),

    #[error("Cannot connect to '{address}': {reason}")]
    Connect { address: String, reason: String },

    #[error("Bus closed")]
    Closed,
}

/// Persistence adapter failures
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings document for '{0}' is not a JSON object")]
    NotAnObject(String),
}

/// Process load, setup and step failures
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Unknown process '{0}'")]
    Unknown(String),

    #[error("Dependency cycle while loading '{0}'")]
    Cycle(String),

    #[error("Dependency '{dependency}' of '{process}' failed to load")]
    Dependency { process: String, dependency: String },

    #[error("Process '{0}' failed to load earlier")]
    Failed(String),

    #[error("Process panicked: {0}")]
    Panicked(String),

    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for ProcessError {
    fn from(err: anyhow::Error) -> Self {
        ProcessError::Other(err.to_string())
    }
}
