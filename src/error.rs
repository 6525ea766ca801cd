//! Error types for preheat and tracker validation

use thiserror::Error;

/// Result type for preheat and validation operations
pub type Result<T> = std::result::Result<T, PreheatError>;

/// Preheat and validation errors
///
/// Resolution misses are never errors: a reference that cannot be found is
/// reported as `None` by the store and left as a stub by the connector.
#[derive(Error, Debug)]
pub enum PreheatError {
    #[error("Invalid preheat parameters: {0}")]
    InvalidPreheatParams(String),

    #[error("Import cancelled before {phase}")]
    Cancelled { phase: &'static str },

    #[error("Unknown object type: {0}")]
    UnknownObjectType(String),

    #[error("Invalid {object_type} object: {reason}")]
    InvalidObject { object_type: String, reason: String },

    #[error("Validation hook {hook} failed: {reason}")]
    Hook { hook: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl PreheatError {
    pub fn invalid_object(object_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidObject {
            object_type: object_type.into(),
            reason: reason.into(),
        }
    }

    pub fn hook(hook: &'static str, reason: impl Into<String>) -> Self {
        Self::Hook {
            hook,
            reason: reason.into(),
        }
    }
}
