use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {hash:?} not found")]
    NotFound { kind: &'static str, hash: String },

    #[error("prefix {prefix:?} matches {matches} {kind}, expected exactly one")]
    AmbiguousPrefix {
        kind: &'static str,
        prefix: String,
        matches: usize,
    },

    #[error("{path:?} is locked by another process")]
    Locked { path: PathBuf },

    #[error("{path:?} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Model(#[from] yama_core::ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, hash: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            hash: hash.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
