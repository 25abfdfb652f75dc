//! Shadow columns: `drop_column` is staged as a rename-aside rather than a
//! destructive drop when the plugin reports the `shadowColumns` capability.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CollateralError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowStatus {
    Active,
    Restored,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowColumn {
    pub table: String,
    pub original_name: String,
    /// The shadow physical column name: `_shadow_{originalName}_{snapshotPrefix}_{timestamp}`.
    pub column: String,
    pub snapshot: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ShadowStatus,
}

pub fn shadow_column_name(original_name: &str, snapshot: &str, created_at: DateTime<Utc>) -> String {
    let prefix = &snapshot[..snapshot.len().min(8)];
    format!("_shadow_{original_name}_{prefix}_{}", created_at.format("%Y%m%d%H%M%S"))
}

pub struct ShadowColumnStore {
    root: PathBuf,
}

impl ShadowColumnStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ShadowColumnStore { root: root.into() }
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("shadows").join("manifest.json")
    }

    /// Stages a shadow column for `table.original_name`, defaulting to a
    /// 30-day expiry when `retention_days` is not overridden.
    pub fn create(
        &self,
        table: &str,
        original_name: &str,
        snapshot: &str,
        retention_days: i64,
    ) -> Result<ShadowColumn, CollateralError> {
        let created_at = Utc::now();
        let shadow = ShadowColumn {
            table: table.to_string(),
            original_name: original_name.to_string(),
            column: shadow_column_name(original_name, snapshot, created_at),
            snapshot: snapshot.to_string(),
            created_at,
            expires_at: created_at + Duration::days(retention_days),
            status: ShadowStatus::Active,
        };
        let mut manifest = self.manifest()?;
        manifest.push(shadow.clone());
        self.write_manifest(&manifest)?;
        info!(table, column = %shadow.column, "staged shadow column");
        Ok(shadow)
    }

    pub fn manifest(&self) -> Result<Vec<ShadowColumn>, CollateralError> {
        match fs::read(self.manifest_path()) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CollateralError::Io(e)),
        }
    }

    fn write_manifest(&self, manifest: &[ShadowColumn]) -> Result<(), CollateralError> {
        let path = self.manifest_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(manifest)?)?;
        Ok(())
    }

    /// Marks a shadow column `active → restored` on explicit recovery.
    pub fn restore(&self, column: &str) -> Result<ShadowColumn, CollateralError> {
        self.transition(column, ShadowStatus::Restored)
    }

    /// Runs a retention sweep: every active shadow past its expiry moves
    /// `active → expired` and is returned for the caller to physically drop.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<ShadowColumn>, CollateralError> {
        let mut manifest = self.manifest()?;
        let mut expired = Vec::new();
        for shadow in manifest.iter_mut() {
            if shadow.status == ShadowStatus::Active && now >= shadow.expires_at {
                shadow.status = ShadowStatus::Expired;
                expired.push(shadow.clone());
            }
        }
        self.write_manifest(&manifest)?;
        Ok(expired)
    }

    fn transition(&self, column: &str, to: ShadowStatus) -> Result<ShadowColumn, CollateralError> {
        let mut manifest = self.manifest()?;
        let shadow = manifest
            .iter_mut()
            .find(|s| s.column == column)
            .ok_or_else(|| CollateralError::NotFound {
                kind: "shadow column",
                id: column.to_string(),
            })?;
        shadow.status = to;
        let result = shadow.clone();
        self.write_manifest(&manifest)?;
        Ok(result)
    }
}
