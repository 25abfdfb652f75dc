//! Per-environment pointer to the currently installed snapshot hash.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_snapshot: Option<String>,
    pub updated_at: chrono::DateTime<Utc>,
}

pub struct EnvironmentStore {
    root: PathBuf,
}

impl EnvironmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        EnvironmentStore { root: root.into() }
    }

    fn dir(&self) -> PathBuf {
        self.root.join("state")
    }

    fn path(&self, environment: &str) -> PathBuf {
        self.dir().join(format!("{environment}.json"))
    }

    pub fn get(&self, environment: &str) -> Result<Option<EnvironmentState>, StoreError> {
        let path = self.path(environment);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Replaces the snapshot pointer and refreshes the timestamp, creating
    /// the record on first write.
    pub fn update_state(&self, environment: &str, hash: &str) -> Result<EnvironmentState, StoreError> {
        fs::create_dir_all(self.dir())?;
        let state = EnvironmentState {
            environment: environment.to_string(),
            current_snapshot: Some(hash.to_string()),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&state)?;
        fs::write(self.path(environment), json)?;
        Ok(state)
    }

    /// Removes an environment's state record. This never touches snapshots
    /// or transitions -- it only removes the environment from enumeration.
    pub fn delete(&self, environment: &str) -> Result<(), StoreError> {
        let path = self.path(environment);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<EnvironmentState>, StoreError> {
        let dir = self.dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut states = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let bytes = fs::read(entry.path())?;
            states.push(serde_json::from_slice(&bytes)?);
        }
        states.sort_by(|a: &EnvironmentState, b: &EnvironmentState| a.environment.cmp(&b.environment));
        Ok(states)
    }
}
