use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("no transition path from {from} to {to}")]
    NoPath { from: String, to: String },

    #[error("environment {environment:?} is at {actual:?}, expected {expected:?}")]
    HashMismatch {
        environment: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("policy rejected a {level} plan for environment {environment:?}: {warnings:?}")]
    PolicyRejected {
        environment: String,
        level: String,
        warnings: Vec<String>,
    },

    #[error("plugin failed applying step {step}/{total}: {source}")]
    PluginFailure {
        step: usize,
        total: usize,
        #[source]
        source: yama_plugin::PluginError,
    },

    #[error("rollback failed after step {step}, requires human intervention: {source}")]
    FatalDuringRollback {
        step: usize,
        #[source]
        source: yama_plugin::PluginError,
    },

    #[error(transparent)]
    Store(#[from] yama_store::StoreError),

    #[error(transparent)]
    Collateral(#[from] yama_collateral::CollateralError),

    #[error(transparent)]
    Model(#[from] yama_core::ModelError),
}
