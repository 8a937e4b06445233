//! Persistence for the last-viewed project, keyed by user.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum LastProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON file mapping user id to their last-viewed project id.
///
/// Keyed per user so one account never restores into another account's
/// project after a sign-out and sign-in. Best-effort: an unreadable file
/// starts the map empty instead of failing restoration.
pub struct LastProjectStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl LastProjectStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LastProjectError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Last-project file unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn load(&self, user_id: &str) -> Option<String> {
        self.lock_entries().get(user_id).cloned()
    }

    pub fn save(&self, user_id: &str, project_id: &str) -> Result<(), LastProjectError> {
        let mut entries = self.lock_entries();
        entries.insert(user_id.to_string(), project_id.to_string());
        self.flush(&entries)
    }

    pub fn forget(&self, user_id: &str) -> Result<(), LastProjectError> {
        let mut entries = self.lock_entries();
        if entries.remove(user_id).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), LastProjectError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_project.json");

        let store = LastProjectStore::open(&path).unwrap();
        store.save("user-1", "project-1").unwrap();
        store.save("user-2", "project-2").unwrap();
        assert_eq!(store.load("user-1").as_deref(), Some("project-1"));
        assert_eq!(store.load("user-2").as_deref(), Some("project-2"));

        // Persists across reopen.
        let reopened = LastProjectStore::open(&path).unwrap();
        assert_eq!(reopened.load("user-1").as_deref(), Some("project-1"));
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastProjectStore::open(dir.path().join("missing.json")).unwrap();
        assert!(store.load("user-1").is_none());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_project.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = LastProjectStore::open(&path).unwrap();
        assert!(store.load("user-1").is_none());
    }

    #[test]
    fn test_forget_removes_only_that_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastProjectStore::open(dir.path().join("last_project.json")).unwrap();
        store.save("user-1", "project-1").unwrap();
        store.save("user-2", "project-2").unwrap();

        store.forget("user-1").unwrap();
        assert!(store.load("user-1").is_none());
        assert_eq!(store.load("user-2").as_deref(), Some("project-2"));
    }
}
