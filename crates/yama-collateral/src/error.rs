use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollateralError {
    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid retention policy {policy:?}: {reason}")]
    InvalidRetentionPolicy { policy: String, reason: String },

    #[error("{path:?} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}
