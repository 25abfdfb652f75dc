use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Model(#[from] yama_core::ModelError),

    #[error(transparent)]
    Store(#[from] yama_store::StoreError),
}
