//! Retention-bounded backups. The database plugin produces the opaque
//! blob; this module persists it under `backups/snapshots/` with its
//! checksum recorded in its own manifest file under `backups/manifests/`,
//! one file per entry, named `{snapshot}_{timestamp}`.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::CollateralError;
use crate::retention::{is_expired, parse_retention_days};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupTrigger {
    SchemaTransition,
    DataTransformation,
    Schedule,
    ProductionDeploy,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub snapshot: String,
    pub timestamp: DateTime<Utc>,
    pub trigger: BackupTrigger,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    pub retention_policy: String,
    pub file: PathBuf,
}

pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BackupStore { root: root.into() }
    }

    fn dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    fn blobs_dir(&self) -> PathBuf {
        self.dir().join("snapshots")
    }

    fn manifests_dir(&self) -> PathBuf {
        self.dir().join("manifests")
    }

    fn stem(snapshot: &str, timestamp: DateTime<Utc>) -> String {
        format!("{snapshot}_{}", timestamp.format("%Y%m%d%H%M%S%3f"))
    }

    /// Writes `data` as a backup blob under `backups/snapshots/` and its
    /// entry as its own file under `backups/manifests/`, both named
    /// `{snapshot}_{timestamp}`. `data` is opaque to this crate -- it is
    /// whatever bytes the plugin produced.
    pub fn record(
        &self,
        snapshot: &str,
        trigger: BackupTrigger,
        data: &[u8],
        retention_policy: &str,
        compression: Option<String>,
    ) -> Result<BackupEntry, CollateralError> {
        parse_retention_days(retention_policy)?;

        fs::create_dir_all(self.blobs_dir())?;
        fs::create_dir_all(self.manifests_dir())?;
        let timestamp = Utc::now();
        let stem = Self::stem(snapshot, timestamp);
        let file_name = format!("{stem}.dump");
        let file_path = self.blobs_dir().join(&file_name);
        fs::write(&file_path, data)?;

        let mut hasher = Sha256::new();
        hasher.update(data);
        let checksum = hex_encode(&hasher.finalize());

        let entry = BackupEntry {
            snapshot: snapshot.to_string(),
            timestamp,
            trigger,
            checksum,
            compression,
            retention_policy: retention_policy.to_string(),
            file: PathBuf::from(&file_name),
        };

        let manifest_path = self.manifests_dir().join(format!("{stem}.json"));
        fs::write(&manifest_path, serde_json::to_vec_pretty(&entry)?)?;
        info!(snapshot, file = %file_name, "recorded backup");
        Ok(entry)
    }

    /// Reads every per-entry manifest file under `backups/manifests/`,
    /// in file-name order (which sorts by snapshot then timestamp).
    pub fn manifest(&self) -> Result<Vec<BackupEntry>, CollateralError> {
        let dir = self.manifests_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(&path)?;
            entries.push(serde_json::from_slice(&bytes)?);
        }
        Ok(entries)
    }

    pub fn for_snapshot(&self, snapshot: &str) -> Result<Vec<BackupEntry>, CollateralError> {
        Ok(self
            .manifest()?
            .into_iter()
            .filter(|e| e.snapshot == snapshot)
            .collect())
    }

    /// Returns, and removes from disk, every backup past its retention
    /// policy as of `now` -- both the blob and its per-entry manifest file.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<BackupEntry>, CollateralError> {
        let manifest = self.manifest()?;
        let expired: Vec<BackupEntry> = manifest
            .into_iter()
            .filter(|entry| {
                parse_retention_days(&entry.retention_policy)
                    .map(|days| is_expired(entry.timestamp, days, now))
                    .unwrap_or(false)
            })
            .collect();

        for entry in &expired {
            let blob_path = self.blobs_dir().join(&entry.file);
            if blob_path.exists() {
                fs::remove_file(blob_path)?;
            }
            let stem = Self::stem(&entry.snapshot, entry.timestamp);
            let manifest_path = self.manifests_dir().join(format!("{stem}.json"));
            if manifest_path.exists() {
                fs::remove_file(manifest_path)?;
            }
        }
        Ok(expired)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
