//! Safety collateral: shadow columns, physical data-copy snapshots, and
//! retention-bounded backups -- the bookkeeping that makes destructive
//! schema operations reversible. The audit log is a plugin-owned database
//! table (`yama_plugin::AuditRecord`/`MigrationPlugin::record_audit`), not
//! collateral state, so it lives in `yama-plugin` rather than here.

mod backup;
mod data_snapshot;
mod error;
mod retention;
mod shadow;

pub use backup::{BackupEntry, BackupStore, BackupTrigger};
pub use data_snapshot::{data_snapshot_table_name, DataSnapshotEntry, DataSnapshotStore};
pub use error::CollateralError;
pub use retention::{is_expired, parse_retention_days};
pub use shadow::{shadow_column_name, ShadowColumn, ShadowColumnStore, ShadowStatus};
