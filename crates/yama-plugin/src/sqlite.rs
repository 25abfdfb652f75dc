//! Reference plugin targeting SQLite. Built the same way the workspace
//! precedent's own SQLite store builds its schema: idempotent `CREATE
//! TABLE IF NOT EXISTS` DDL plus a tracking table for applied migrations.
//!
//! SQLite's capability set here is deliberately restricted to match real
//! SQLite limitations (`ALTER TABLE` can add columns but not change a
//! column's type or rename columns on older SQLite builds, and DDL is not
//! always safely wrapped in a transaction), so the capability-negotiation
//! and shadow-column paths have something real to exercise.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use yama_core::{DefaultValue, Step};

use crate::capability::Capabilities;
use crate::error::PluginError;
use crate::plugin::{AuditOperation, AuditRecord, MigrationPlugin, MigrationRecord, SqlPlan};

/// DDL for the migration tracking table every plugin must declare.
pub const TRACKING_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS _yama_migrations (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT UNIQUE NOT NULL,
    type            TEXT NOT NULL DEFAULT 'schema',
    from_model_hash TEXT,
    to_model_hash   TEXT,
    checksum        TEXT,
    description     TEXT,
    applied_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)
"#;

/// DDL for the append-only audit log table. Created on demand by
/// `record_audit` rather than eagerly by the constructors, per the
/// "creates on demand" contract.
pub const AUDIT_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS _yama_audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    snapshot    TEXT NOT NULL,
    table_name  TEXT NOT NULL,
    record_id   TEXT NOT NULL,
    operation   TEXT NOT NULL,
    old_data    TEXT,
    new_data    TEXT,
    changed_by  TEXT,
    changed_via TEXT,
    recorded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)
"#;

fn audit_operation_sql(operation: AuditOperation) -> &'static str {
    match operation {
        AuditOperation::Insert => "INSERT",
        AuditOperation::Update => "UPDATE",
        AuditOperation::Delete => "DELETE",
    }
}

/// SQLite-backed reference plugin. Wraps a [`rusqlite::Connection`] in a
/// `Mutex` the same way the workspace precedent's `SqliteStore` does.
pub struct SqlitePlugin {
    conn: Mutex<Connection>,
}

impl SqlitePlugin {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        info!(path = %path.as_ref().display(), "opening SQLite plugin connection");
        let conn = Connection::open(path)?;
        let plugin = SqlitePlugin { conn: Mutex::new(conn) };
        plugin.init_tracking_table()?;
        Ok(plugin)
    }

    pub fn open_in_memory() -> Result<Self, PluginError> {
        debug!("opening in-memory SQLite plugin connection");
        let conn = Connection::open_in_memory()?;
        let plugin = SqlitePlugin { conn: Mutex::new(conn) };
        plugin.init_tracking_table()?;
        Ok(plugin)
    }

    fn init_tracking_table(&self) -> Result<(), PluginError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        conn.execute_batch(TRACKING_TABLE_DDL)?;
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

fn default_sql(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Scalar(v) => match v {
            serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            other => other.to_string(),
        },
        DefaultValue::Symbol(s) => s.clone(),
    }
}

fn column_def_sql(name: &str, column: &yama_core::Column) -> String {
    let mut sql = format!("{} {}", quote_ident(name), column.sql_type);
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {}", default_sql(default)));
    }
    if column.primary {
        sql.push_str(" PRIMARY KEY");
    }
    sql
}

impl MigrationPlugin for SqlitePlugin {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            add_table: true,
            drop_table: true,
            add_column: true,
            drop_column: false,
            modify_column_type: false,
            modify_column_nullable: false,
            modify_column_default: false,
            rename_column: false,
            add_index: true,
            drop_index: true,
            foreign_keys: true,
            transactional_ddl: false,
            shadow_columns: true,
            concurrent_indexes: false,
            online_ddl: false,
        }
    }

    fn tracking_table_ddl(&self) -> &'static str {
        TRACKING_TABLE_DDL
    }

    fn generate_step_sql(&self, step: &Step) -> Result<Option<String>, PluginError> {
        let sql = match step {
            Step::AddTable { table, columns } => {
                let defs: Vec<String> = columns.iter().map(|(name, col)| column_def_sql(name, col)).collect();
                Some(format!("CREATE TABLE {} ({})", quote_ident(table), defs.join(", ")))
            }
            Step::DropTable { table } => Some(format!("DROP TABLE {}", quote_ident(table))),
            Step::AddColumn { table, column } => Some(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_ident(table),
                column_def_sql(&column.name, column)
            )),
            Step::DropColumn { table, column } => {
                return Err(PluginError::CapabilityUnsupported {
                    kind: "drop_column",
                    table: format!("{table}.{column}"),
                })
            }
            Step::ModifyColumn { table, column, .. } => {
                return Err(PluginError::CapabilityUnsupported {
                    kind: "modify_column",
                    table: format!("{table}.{column}"),
                })
            }
            Step::RenameColumn { table, from, .. } => {
                return Err(PluginError::CapabilityUnsupported {
                    kind: "rename_column",
                    table: format!("{table}.{from}"),
                })
            }
            Step::AddIndex { table, index } => {
                let unique = if index.unique { "UNIQUE " } else { "" };
                let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
                Some(format!(
                    "CREATE {unique}INDEX {} ON {} ({})",
                    quote_ident(&index.name),
                    quote_ident(table),
                    columns.join(", ")
                ))
            }
            Step::DropIndex { index, .. } => Some(format!("DROP INDEX {}", quote_ident(index))),
            Step::AddForeignKey { .. } | Step::DropForeignKey { .. } => {
                // SQLite only supports foreign keys declared at table-creation
                // time; altering them after the fact requires a full table
                // rebuild, which this reference plugin does not attempt.
                None
            }
        };
        Ok(sql)
    }

    fn begin(&self) -> Result<(), PluginError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<(), PluginError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        debug!(sql, "executing migration statement");
        conn.execute_batch(sql)
            .map_err(|e| PluginError::PluginFailure(format!("{sql}: {e}")))
    }

    fn commit(&self) -> Result<(), PluginError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<(), PluginError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn record_migration(&self, record: &MigrationRecord) -> Result<(), PluginError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        conn.execute(
            "INSERT INTO _yama_migrations (name, type, from_model_hash, to_model_hash, checksum, description) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.name,
                record.migration_type,
                record.from_model_hash,
                record.to_model_hash,
                record.checksum,
                record.description,
            ],
        )?;
        info!(name = %record.name, to = %record.to_model_hash, "recorded migration");
        Ok(())
    }

    fn installed_hash(&self) -> Result<Option<String>, PluginError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        let result: rusqlite::Result<String> = conn.query_row(
            "SELECT to_model_hash FROM _yama_migrations ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        );
        match result {
            Ok(hash) => Ok(Some(hash)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PluginError::from(e)),
        }
    }

    fn audit_table_ddl(&self) -> &'static str {
        AUDIT_TABLE_DDL
    }

    fn record_audit(&self, record: &AuditRecord) -> Result<(), PluginError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        conn.execute_batch(AUDIT_TABLE_DDL)?;
        conn.execute(
            "INSERT INTO _yama_audit_log (snapshot, table_name, record_id, operation, old_data, new_data, changed_by, changed_via) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                record.snapshot,
                record.table,
                record.record_id,
                audit_operation_sql(record.operation),
                record.old_data,
                record.new_data,
                record.changed_by,
                record.changed_via,
            ],
        )?;
        debug!(table = %record.table, record_id = %record.record_id, "recorded audit entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yama_core::Column;

    fn users_add_table() -> Step {
        Step::AddTable {
            table: "users".into(),
            columns: vec![(
                "id".into(),
                Column {
                    name: "id".into(),
                    sql_type: "INTEGER".into(),
                    nullable: false,
                    primary: true,
                    default: None,
                    generated: false,
                },
            )],
        }
    }

    #[test]
    fn add_table_emits_create_table() {
        let plugin = SqlitePlugin::open_in_memory().unwrap();
        let sql = plugin.generate_step_sql(&users_add_table()).unwrap().unwrap();
        assert!(sql.starts_with("CREATE TABLE \"users\""));
        assert!(sql.contains("PRIMARY KEY"));
    }

    #[test]
    fn drop_column_is_unsupported() {
        let plugin = SqlitePlugin::open_in_memory().unwrap();
        let step = Step::DropColumn {
            table: "users".into(),
            column: "legacy".into(),
        };
        assert!(plugin.generate_step_sql(&step).is_err());
        assert!(!plugin.capabilities().supports(&step));
    }

    #[test]
    fn generate_sql_reports_unsupported_steps_with_a_shadow_column_suggestion() {
        let plugin = SqlitePlugin::open_in_memory().unwrap();
        let plan = plugin.generate_sql(&[
            users_add_table(),
            Step::DropColumn {
                table: "users".into(),
                column: "legacy".into(),
            },
        ]);
        assert_eq!(plan.sql.len(), 1);
        assert_eq!(plan.unsupported_steps.len(), 1);
        assert!(plan.unsupported_steps[0].suggestion.is_some());
        assert!(!plan.safe);
    }

    #[test]
    fn execute_then_record_migration_updates_installed_hash() {
        let plugin = SqlitePlugin::open_in_memory().unwrap();
        let plan = plugin.generate_sql(&[users_add_table()]);
        for stmt in &plan.sql {
            plugin.execute(stmt).unwrap();
        }
        let record = MigrationRecord {
            name: "0001_init".into(),
            migration_type: "schema".into(),
            from_model_hash: None,
            to_model_hash: "abc123".into(),
            checksum: plan.checksum(),
            description: None,
        };
        plugin.record_migration(&record).unwrap();
        assert_eq!(plugin.installed_hash().unwrap(), Some("abc123".to_string()));
    }

    #[test]
    fn installed_hash_is_none_before_any_migration() {
        let plugin = SqlitePlugin::open_in_memory().unwrap();
        assert_eq!(plugin.installed_hash().unwrap(), None);
    }

    #[test]
    fn record_audit_creates_the_table_on_demand_and_inserts() {
        let plugin = SqlitePlugin::open_in_memory().unwrap();
        let count_tables = || {
            let conn = plugin.conn.lock().unwrap();
            conn.query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='_yama_audit_log'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .unwrap()
        };
        assert_eq!(count_tables(), 0);

        plugin
            .record_audit(&AuditRecord {
                snapshot: "abc123".into(),
                table: "users".into(),
                record_id: "1".into(),
                operation: AuditOperation::Insert,
                old_data: None,
                new_data: Some(r#"{"email":"a@example.com"}"#.into()),
                changed_by: None,
                changed_via: None,
            })
            .unwrap();

        assert_eq!(count_tables(), 1);
        let conn = plugin.conn.lock().unwrap();
        let rows: i64 = conn
            .query_row("SELECT count(*) FROM _yama_audit_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
