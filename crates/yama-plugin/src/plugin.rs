//! The plugin interface: capability negotiation plus per-step and
//! per-plan SQL generation. The core never synthesizes SQL itself -- it
//! only dispatches to whatever plugin is configured.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use yama_core::Step;

use crate::capability::Capabilities;
use crate::error::PluginError;

/// The kind of row-level data change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOperation {
    Insert,
    Update,
    Delete,
}

/// A row-level change the applier (or any instrumented write path) asks
/// the plugin to append to `_yama_audit_log`. `old_data`/`new_data` are
/// opaque JSON text, per-entity policy decides what gets recorded here.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub snapshot: String,
    pub table: String,
    pub record_id: String,
    pub operation: AuditOperation,
    pub old_data: Option<String>,
    pub new_data: Option<String>,
    pub changed_by: Option<String>,
    pub changed_via: Option<String>,
}

/// A single unsupported step, surfaced with the planner's suggested
/// substitution when one exists (e.g. a shadow-column rename in place of
/// an unsupported `drop_column`).
#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedStep {
    pub kind: &'static str,
    pub table: String,
    pub suggestion: Option<String>,
}

/// The result of compiling a step list to the target dialect.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlPlan {
    pub sql: Vec<String>,
    /// Destructive iff the plan contains any drop.
    pub safe: bool,
    pub estimated_time_ms: u64,
    pub warnings: Vec<String>,
    pub unsupported_steps: Vec<UnsupportedStep>,
}

impl SqlPlan {
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for stmt in &self.sql {
            hasher.update(stmt.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for b in digest {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

/// The row the applier asks the plugin to insert into `_yama_migrations`
/// once a transition's SQL has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    pub name: String,
    pub migration_type: String,
    pub from_model_hash: Option<String>,
    pub to_model_hash: String,
    pub checksum: String,
    pub description: Option<String>,
}

/// Implemented once per target database. The core holds a `&dyn
/// MigrationPlugin` and never matches on the concrete type.
pub trait MigrationPlugin: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Translates a single step to SQL, or `None` if the step produces no
    /// SQL on its own (e.g. it is fully handled by collateral staging).
    fn generate_step_sql(&self, step: &Step) -> Result<Option<String>, PluginError>;

    /// DDL that creates the `_yama_migrations` tracking table, idempotent
    /// to run repeatedly.
    fn tracking_table_ddl(&self) -> &'static str;

    /// Opens a transaction. Only called by the applier when
    /// `capabilities().transactional_ddl` is true.
    fn begin(&self) -> Result<(), PluginError>;

    /// Executes one SQL statement produced by `generate_step_sql`.
    fn execute(&self, sql: &str) -> Result<(), PluginError>;

    fn commit(&self) -> Result<(), PluginError>;

    fn rollback_transaction(&self) -> Result<(), PluginError>;

    /// Inserts a row into `_yama_migrations`.
    fn record_migration(&self, record: &MigrationRecord) -> Result<(), PluginError>;

    /// The `to_model_hash` of the most recently applied migration, or
    /// `None` if none have been recorded yet.
    fn installed_hash(&self) -> Result<Option<String>, PluginError>;

    /// DDL that creates the append-only `_yama_audit_log` table, idempotent
    /// to run repeatedly.
    fn audit_table_ddl(&self) -> &'static str;

    /// Appends a row to `_yama_audit_log`, creating the table on demand.
    fn record_audit(&self, record: &AuditRecord) -> Result<(), PluginError>;

    /// Translates a full step list, reporting unsupported steps rather
    /// than failing outright -- the applier decides whether to proceed.
    fn generate_sql(&self, steps: &[Step]) -> SqlPlan {
        let caps = self.capabilities();
        let mut plan = SqlPlan {
            safe: !steps.iter().any(is_destructive),
            ..Default::default()
        };

        for step in steps {
            if !caps.supports(step) {
                plan.unsupported_steps.push(UnsupportedStep {
                    kind: step.kind(),
                    table: step.table().to_string(),
                    suggestion: substitution_for(step, &caps),
                });
                plan.warnings.push(format!(
                    "{} on {} is not supported by this plugin",
                    step.kind(),
                    step.table()
                ));
                continue;
            }
            match self.generate_step_sql(step) {
                Ok(Some(sql)) => plan.sql.push(sql),
                Ok(None) => {}
                Err(e) => plan.warnings.push(format!("{}: {e}", step.kind())),
            }
        }

        plan
    }
}

fn is_destructive(step: &Step) -> bool {
    matches!(
        step,
        Step::DropTable { .. } | Step::DropColumn { .. } | Step::DropIndex { .. } | Step::DropForeignKey { .. }
    )
}

fn substitution_for(step: &Step, caps: &Capabilities) -> Option<String> {
    match step {
        Step::DropColumn { .. } if caps.shadow_columns => {
            Some("stage a shadow column instead of dropping".to_string())
        }
        _ => None,
    }
}
