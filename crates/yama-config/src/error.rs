use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no .yama directory found above {searched_from:?}")]
    YamaDirNotFound { searched_from: PathBuf },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Figment(#[from] figment::Error),

    #[error("invalid value for {key:?}: {reason}")]
    InvalidValue { key: String, reason: String },
}
