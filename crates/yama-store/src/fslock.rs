//! Advisory file locking for the shared `.yama` directory, guarding
//! concurrent writers against interleaved snapshot/transition writes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::StoreError;

/// Holds an exclusive advisory lock on `{root}/.lock` for its lifetime.
/// Released automatically on drop.
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Acquires the lock, blocking the caller until it is available.
    pub fn acquire(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = root.as_ref().join(".lock");
        std::fs::create_dir_all(root.as_ref())?;
        let file = OpenOptions::new().create(true).write(true).open(&path)?;
        file.lock_exclusive()
            .map_err(|_| StoreError::Locked { path: path.clone() })?;
        Ok(DirLock { file, path })
    }

    /// Attempts to acquire the lock without blocking; returns
    /// `StoreError::Locked` if another process already holds it.
    pub fn try_acquire(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = root.as_ref().join(".lock");
        std::fs::create_dir_all(root.as_ref())?;
        let file = OpenOptions::new().create(true).write(true).open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked { path: path.clone() })?;
        Ok(DirLock { file, path })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
