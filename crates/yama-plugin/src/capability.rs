//! Flat capability record a plugin advertises, consulted before planning.

use serde::{Deserialize, Serialize};

use yama_core::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub add_table: bool,
    pub drop_table: bool,
    pub add_column: bool,
    pub drop_column: bool,
    pub modify_column_type: bool,
    pub modify_column_nullable: bool,
    pub modify_column_default: bool,
    pub rename_column: bool,
    pub add_index: bool,
    pub drop_index: bool,
    pub foreign_keys: bool,
    pub transactional_ddl: bool,
    pub shadow_columns: bool,
    pub concurrent_indexes: bool,
    pub online_ddl: bool,
}

impl Capabilities {
    /// Every capability enabled -- useful as a baseline for a hypothetical
    /// fully-featured plugin, and in tests that don't care about negotiation.
    pub const fn all() -> Self {
        Capabilities {
            add_table: true,
            drop_table: true,
            add_column: true,
            drop_column: true,
            modify_column_type: true,
            modify_column_nullable: true,
            modify_column_default: true,
            rename_column: true,
            add_index: true,
            drop_index: true,
            foreign_keys: true,
            transactional_ddl: true,
            shadow_columns: true,
            concurrent_indexes: true,
            online_ddl: true,
        }
    }

    /// Whether this plugin supports the given step directly (not counting
    /// any planner-level substitution, e.g. shadow-column rename).
    pub fn supports(&self, step: &Step) -> bool {
        match step {
            Step::AddTable { .. } => self.add_table,
            Step::DropTable { .. } => self.drop_table,
            Step::AddColumn { .. } => self.add_column,
            Step::DropColumn { .. } => self.drop_column,
            Step::ModifyColumn { changes, .. } => {
                (changes.sql_type.is_none() || self.modify_column_type)
                    && (changes.nullable.is_none() || self.modify_column_nullable)
                    && (changes.default.is_none() || self.modify_column_default)
            }
            Step::RenameColumn { .. } => self.rename_column,
            Step::AddIndex { .. } => self.add_index,
            Step::DropIndex { .. } => self.drop_index,
            Step::AddForeignKey { .. } => self.foreign_keys,
            Step::DropForeignKey { .. } => self.foreign_keys,
        }
    }
}
