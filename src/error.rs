//! Domain errors of the configuration service.
//!
//! Library functions return `anyhow::Result`; the failures callers are expected
//! to branch on are raised as `ConfigError` and can be recovered with
//! `err.downcast_ref::<ConfigError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Generic failure of the configuration service.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("snapshot {0} not found")]
    SnapshotNotFound(u64),

    /// Snapshot file could not be decrypted or unmarshalled.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    /// Snapshot could not be written (I/O or encryption failure).
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("required attribute missing: {0}")]
    RequiredAttributeMissing(String),

    #[error("attribute '{id}' invalid (value '{value}'): {message}")]
    AttributeInvalid {
        id: String,
        value: String,
        message: String,
    },

    /// Best-effort batch finished, but some items failed.
    #[error("{operation}: {} item(s) failed", .causes.len())]
    PartialSuccess {
        operation: String,
        causes: Vec<anyhow::Error>,
    },
}

impl ConfigError {
    /// Build a `PartialSuccess` from collected causes, or `None` if there are none.
    pub fn partial(operation: &str, causes: Vec<anyhow::Error>) -> Option<Self> {
        if causes.is_empty() {
            None
        } else {
            Some(ConfigError::PartialSuccess {
                operation: operation.to_string(),
                causes,
            })
        }
    }
}
