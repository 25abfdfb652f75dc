//! The migration step sum type.
//!
//! A [`Step`] is a tagged enum with per-variant payloads rather than a
//! shared base trait: the set of step kinds is closed and each plugin
//! dispatches on it with a single `match`, so there is no benefit to an
//! open hierarchy and real cost (dynamic dispatch, downcasting) to one.

use serde::{Deserialize, Serialize};

use crate::entity::DefaultValue;
use crate::model::{Column, ForeignKeyDef, IndexDef};

/// The sparse set of column attributes a `modify_column` step actually
/// changes. Only fields that differ between the two models are set; a
/// `None` means that attribute is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// `Some(None)` means the default was removed; `None` means unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Option<DefaultValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    AddTable {
        table: String,
        columns: Vec<(String, Column)>,
    },
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    DropColumn {
        table: String,
        column: String,
    },
    ModifyColumn {
        table: String,
        column: String,
        changes: ColumnChanges,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    AddIndex {
        table: String,
        index: IndexDef,
    },
    DropIndex {
        table: String,
        index: String,
    },
    AddForeignKey {
        table: String,
        foreign_key: ForeignKeyDef,
    },
    DropForeignKey {
        table: String,
        foreign_key: String,
    },
}

impl Step {
    /// The table the step applies to, used for collateral staging and
    /// safety classification.
    pub fn table(&self) -> &str {
        match self {
            Step::AddTable { table, .. }
            | Step::DropTable { table }
            | Step::AddColumn { table, .. }
            | Step::DropColumn { table, .. }
            | Step::ModifyColumn { table, .. }
            | Step::RenameColumn { table, .. }
            | Step::AddIndex { table, .. }
            | Step::DropIndex { table, .. }
            | Step::AddForeignKey { table, .. }
            | Step::DropForeignKey { table, .. } => table,
        }
    }

    /// A short, stable kind tag matching the `kind` field used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::AddTable { .. } => "add_table",
            Step::DropTable { .. } => "drop_table",
            Step::AddColumn { .. } => "add_column",
            Step::DropColumn { .. } => "drop_column",
            Step::ModifyColumn { .. } => "modify_column",
            Step::RenameColumn { .. } => "rename_column",
            Step::AddIndex { .. } => "add_index",
            Step::DropIndex { .. } => "drop_index",
            Step::AddForeignKey { .. } => "add_foreign_key",
            Step::DropForeignKey { .. } => "drop_foreign_key",
        }
    }
}
