//! Error taxonomy for the critique pipeline.

use std::time::Duration;

use critique_clients::CapabilityError;

use crate::domain::RoleName;

/// Errors raised while building the module registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("module {role}/{version} is registered more than once")]
    DuplicateModule { role: RoleName, version: String },

    #[error("module declared as {declared} but its builder produces {actual}")]
    RoleMismatch {
        declared: RoleName,
        actual: RoleName,
        version: String,
    },

    #[error("module for role {role} has an empty version")]
    EmptyVersion { role: RoleName },
}

/// Critique pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum CritiqueError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("Unsupported {role} version '{version}'. available: {}", .available.join(", "))]
    UnknownModuleVersion {
        role: RoleName,
        version: String,
        available: Vec<String>,
    },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("capability failure: {0}")]
    Capability(#[from] CapabilityError),

    #[error("{role} step timed out after {timeout:?}")]
    StepTimeout { role: RoleName, timeout: Duration },

    #[error("call cancelled during {role} step")]
    Cancelled { role: RoleName },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("batch error: {0}")]
    Batch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for critique pipeline operations.
pub type Result<T> = std::result::Result<T, CritiqueError>;
