//! `.yama` directory discovery: checks the `YAMA_DIR` environment variable
//! first, then walks up from the current directory looking for `.yama`.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const YAMA_DIR_ENV: &str = "YAMA_DIR";
pub const YAMA_DIR_NAME: &str = ".yama";

/// Finds the project's `.yama` directory, or `None` if neither the
/// environment override nor a walk-up search finds one.
pub fn find_yama_dir() -> Option<PathBuf> {
    if let Ok(value) = env::var(YAMA_DIR_ENV) {
        return Some(PathBuf::from(value));
    }
    let cwd = env::current_dir().ok()?;
    find_yama_dir_from(&cwd)
}

fn find_yama_dir_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.canonicalize().ok()?;
    loop {
        let candidate = current.join(YAMA_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Same as [`find_yama_dir`] but returns a typed error instead of `None`.
pub fn find_yama_dir_or_error() -> Result<PathBuf, ConfigError> {
    find_yama_dir().ok_or_else(|| ConfigError::YamaDirNotFound {
        searched_from: env::current_dir().unwrap_or_default(),
    })
}

/// Creates `.yama` in the current directory if it does not already exist
/// anywhere up the tree, returning its path either way.
pub fn ensure_yama_dir() -> Result<PathBuf, ConfigError> {
    if let Some(existing) = find_yama_dir() {
        return Ok(existing);
    }
    let cwd = env::current_dir().map_err(|source| ConfigError::Read {
        path: PathBuf::from("."),
        source,
    })?;
    let dir = cwd.join(YAMA_DIR_NAME);
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Read {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_yama_dir_in_a_parent_directory() {
        let root = tempfile::tempdir().unwrap();
        let yama = root.path().join(".yama");
        std::fs::create_dir_all(&yama).unwrap();
        let nested = root.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_yama_dir_from(&nested).unwrap();
        assert_eq!(found, yama.canonicalize().unwrap());
    }

    #[test]
    fn returns_none_when_no_yama_dir_exists() {
        let root = tempfile::tempdir().unwrap();
        assert!(find_yama_dir_from(root.path()).is_none());
    }
}
