//! Physical data-copy snapshots for `drop_table`: the copy itself is a
//! database-side operation the plugin performs, this module names the
//! copy table and tracks it so a retention sweep can reclaim it.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollateralError;
use crate::retention::is_expired;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshotEntry {
    pub table: String,
    pub copy_table: String,
    pub snapshot: String,
    pub created_at: DateTime<Utc>,
}

pub fn data_snapshot_table_name(table: &str, snapshot: &str) -> String {
    let prefix = &snapshot[..snapshot.len().min(8)];
    format!("{table}_before_{prefix}")
}

pub struct DataSnapshotStore {
    root: PathBuf,
}

impl DataSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataSnapshotStore { root: root.into() }
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("data_snapshots.json")
    }

    pub fn record(&self, table: &str, snapshot: &str) -> Result<DataSnapshotEntry, CollateralError> {
        let entry = DataSnapshotEntry {
            table: table.to_string(),
            copy_table: data_snapshot_table_name(table, snapshot),
            snapshot: snapshot.to_string(),
            created_at: Utc::now(),
        };
        let mut manifest = self.manifest()?;
        manifest.push(entry.clone());
        self.write_manifest(&manifest)?;
        Ok(entry)
    }

    pub fn manifest(&self) -> Result<Vec<DataSnapshotEntry>, CollateralError> {
        match fs::read(self.manifest_path()) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CollateralError::Io(e)),
        }
    }

    fn write_manifest(&self, manifest: &[DataSnapshotEntry]) -> Result<(), CollateralError> {
        if let Some(parent) = self.manifest_path().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(self.manifest_path(), serde_json::to_vec_pretty(manifest)?)?;
        Ok(())
    }

    /// Returns, and drops from tracking, every copy table past
    /// `retention_days` as of `now`. The caller still has to issue the
    /// physical `DROP TABLE` through the plugin.
    pub fn sweep_expired(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<DataSnapshotEntry>, CollateralError> {
        let manifest = self.manifest()?;
        let (expired, remaining): (Vec<_>, Vec<_>) = manifest
            .into_iter()
            .partition(|entry| is_expired(entry.created_at, retention_days, now));
        self.write_manifest(&remaining)?;
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_table_name_uses_a_short_snapshot_prefix() {
        assert_eq!(
            data_snapshot_table_name("users", "abc123456789"),
            "users_before_abc12345"
        );
    }

    #[test]
    fn sweep_only_reclaims_past_due_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataSnapshotStore::new(dir.path());
        store.record("users", "abc12345").unwrap();

        let mut manifest = store.manifest().unwrap();
        manifest[0].created_at = Utc::now() - chrono::Duration::days(31);
        store.write_manifest(&manifest).unwrap();

        let expired = store.sweep_expired(30, Utc::now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert!(store.manifest().unwrap().is_empty());
    }
}
