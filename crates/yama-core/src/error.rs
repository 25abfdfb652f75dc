use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("table {table:?} declares column {column:?} more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("entity {entity:?} field {field:?} references unknown entity or field {target:?}")]
    UnknownReference {
        entity: String,
        field: String,
        target: String,
    },
}

#[derive(Debug, Error)]
pub enum DiffError {
    #[error(transparent)]
    Model(#[from] ModelError),
}
