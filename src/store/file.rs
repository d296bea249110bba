//! JSON file store backend.
//!
//! The whole store is one JSON object on disk. Every operation re-reads the
//! file, so separate processes pointed at the same path see each other's
//! writes. Writes go through a temp file and an atomic rename, under an
//! exclusive lock on a `<store>.lock` sidecar file.

use async_trait::async_trait;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::warn;

use super::RangeStore;
use crate::error::StoreError;

type Entries = BTreeMap<String, String>;

/// Store persisted to a single JSON file.
pub struct FileStore {
    path: PathBuf,
    /// Keeps this process's writers off the blocking pool while another
    /// one holds the file lock.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Entries, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_entries(&path))
            .await
            .map_err(|e| StoreError::Corrupt {
                path: self.path.display().to_string(),
                message: format!("load task failed: {}", e),
            })?
    }

    /// Run one load, apply, save cycle while holding the sidecar lock, so
    /// writers in other processes never work from a stale snapshot.
    async fn modify<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Entries) -> bool + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let _lock = StoreLock::acquire(&path)?;
            let mut entries = load_for_update(&path)?;
            if apply(&mut entries) {
                save_entries(&path, &entries)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io {
            path: self.path.display().to_string(),
            source: std::io::Error::other(e.to_string()),
        })?
    }
}

#[async_trait]
impl RangeStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load().await?.remove(key))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.modify(move |entries| {
            entries.insert(key, value);
            true
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.modify(move |entries| entries.remove(&key).is_some()).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .load()
            .await?
            .into_keys()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

/// Exclusive lock on the store's sidecar file, released on drop.
struct StoreLock {
    _file: File,
}

impl StoreLock {
    fn acquire(store_path: &Path) -> Result<Self, StoreError> {
        let lock_path = lock_path_for(store_path);
        let io_err = |source: std::io::Error| StoreError::Io {
            path: lock_path.display().to_string(),
            source,
        };

        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        // create+read+write without truncate, no race between create and lock
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(io_err)?;

        file.lock_exclusive().map_err(io_err)?;

        Ok(Self { _file: file })
    }
}

fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut name = OsString::from(store_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Load for modification. A corrupt file is replaced rather than blocking
/// every future write.
fn load_for_update(path: &Path) -> Result<Entries, StoreError> {
    match load_entries(path) {
        Ok(entries) => Ok(entries),
        Err(StoreError::Corrupt { path, message }) => {
            warn!("Discarding corrupt store {}: {}", path, message);
            Ok(Entries::new())
        }
        Err(e) => Err(e),
    }
}

fn load_entries(path: &Path) -> Result<Entries, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(Entries::new());
    }

    serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn save_entries(path: &Path, entries: &Entries) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let content = serde_json::to_string_pretty(entries)?;

    // Temp file in the same directory so the rename stays on one filesystem
    let mut temp_file = NamedTempFile::new_in(parent).map_err(io_err)?;
    temp_file.write_all(content.as_bytes()).map_err(io_err)?;
    temp_file.as_file().sync_all().map_err(io_err)?;
    temp_file.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}
