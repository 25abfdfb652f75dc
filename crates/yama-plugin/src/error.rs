use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("step {kind} on {table:?} is not supported by this plugin's capabilities")]
    CapabilityUnsupported { kind: &'static str, table: String },

    #[error("plugin failed to execute SQL: {0}")]
    PluginFailure(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
