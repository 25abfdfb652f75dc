//! Database migration plugin interface: capability negotiation and SQL
//! generation dispatch, plus a SQLite reference plugin.

mod capability;
mod error;
mod plugin;
mod sqlite;

pub use capability::Capabilities;
pub use error::PluginError;
pub use plugin::{AuditOperation, AuditRecord, MigrationPlugin, MigrationRecord, SqlPlan, UnsupportedStep};
pub use sqlite::{SqlitePlugin, AUDIT_TABLE_DDL, TRACKING_TABLE_DDL};
