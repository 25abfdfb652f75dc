//! Content-addressed snapshot store: immutable schema states keyed by hash,
//! with an append-indexed manifest for cheap enumeration.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use yama_core::{build_model, Entities};

use crate::error::StoreError;
use crate::fslock::DirLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_hash: Option<String>,
    pub entities: Entities,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    /// Builds a snapshot from entities, computing its hash as
    /// `model(entities).hash` -- the snapshot's identity is never anything
    /// but the canonical model hash.
    pub fn new(
        entities: Entities,
        parent_hash: Option<String>,
        metadata: SnapshotMetadata,
    ) -> Result<Self, StoreError> {
        let model = build_model(&entities)?;
        Ok(Snapshot {
            hash: model.hash,
            parent_hash,
            entities,
            metadata,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_hash: Option<String>,
    pub metadata: SnapshotMetadata,
}

pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SnapshotStore { root: root.into() }
    }

    fn dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.dir().join(format!("{hash}.json"))
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir().join("manifest.json")
    }

    /// Writes the snapshot blob (if absent) and upserts its manifest entry.
    /// Idempotent on hash: re-saving an identical snapshot is a no-op for
    /// the blob and a no-op upsert for the manifest.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        fs::create_dir_all(self.dir())?;
        let blob_path = self.blob_path(&snapshot.hash);
        if !blob_path.exists() {
            let json = serde_json::to_vec_pretty(snapshot)?;
            fs::write(&blob_path, json)?;
            debug!(hash = %snapshot.hash, "wrote snapshot blob");
        }

        let _lock = DirLock::acquire(&self.root)?;
        let mut manifest = self.manifest()?;
        if !manifest.iter().any(|e| e.hash == snapshot.hash) {
            manifest.push(ManifestEntry {
                hash: snapshot.hash.clone(),
                parent_hash: snapshot.parent_hash.clone(),
                metadata: snapshot.metadata.clone(),
            });
            self.write_manifest(&manifest)?;
        }
        Ok(())
    }

    pub fn load(&self, hash: &str) -> Result<Snapshot, StoreError> {
        let path = self.blob_path(hash);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::not_found("snapshot", hash)
            } else {
                StoreError::Io(e)
            }
        })?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(snapshot)
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.blob_path(hash).exists()
    }

    /// Resolves a possibly-partial hash prefix to the one full hash it
    /// unambiguously names.
    pub fn find(&self, prefix: &str) -> Result<String, StoreError> {
        let manifest = self.manifest()?;
        let mut matches: Vec<&str> = manifest
            .iter()
            .map(|e| e.hash.as_str())
            .filter(|h| h.starts_with(prefix))
            .collect();
        matches.sort_unstable();
        matches.dedup();
        match matches.len() {
            0 => Err(StoreError::not_found("snapshot", prefix)),
            1 => Ok(matches[0].to_string()),
            n => Err(StoreError::AmbiguousPrefix {
                kind: "snapshots",
                prefix: prefix.to_string(),
                matches: n,
            }),
        }
    }

    /// Removes a snapshot's blob and manifest entry. Callers are
    /// responsible for verifying no transition still references it.
    pub fn delete(&self, hash: &str) -> Result<(), StoreError> {
        let _lock = DirLock::acquire(&self.root)?;
        let path = self.blob_path(hash);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let manifest: Vec<ManifestEntry> = self
            .manifest()?
            .into_iter()
            .filter(|e| e.hash != hash)
            .collect();
        self.write_manifest(&manifest)
    }

    /// Returns the manifest, rebuilding it from the snapshots directory if
    /// it is missing or fails to parse. The manifest is a hint, never a
    /// source of truth -- directory contents always win.
    pub fn manifest(&self) -> Result<Vec<ManifestEntry>, StoreError> {
        let path = self.manifest_path();
        match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => Ok(entries),
                Err(err) => {
                    warn!(?err, "snapshot manifest is corrupt, rebuilding");
                    self.rebuild_manifest()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.rebuild_manifest(),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn rebuild_manifest(&self) -> Result<Vec<ManifestEntry>, StoreError> {
        let dir = self.dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !is_snapshot_blob(&path) {
                continue;
            }
            let bytes = fs::read(&path)?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
            entries.push(ManifestEntry {
                hash: snapshot.hash,
                parent_hash: snapshot.parent_hash,
                metadata: snapshot.metadata,
            });
        }
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        if dir.exists() {
            self.write_manifest(&entries)?;
        }
        Ok(entries)
    }

    fn write_manifest(&self, entries: &[ManifestEntry]) -> Result<(), StoreError> {
        fs::create_dir_all(self.dir())?;
        let json = serde_json::to_vec_pretty(entries)?;
        fs::write(self.manifest_path(), json)?;
        Ok(())
    }
}

fn is_snapshot_blob(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && path.file_name().and_then(|n| n.to_str()) != Some("manifest.json")
}
