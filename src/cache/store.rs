use crate::cache::records::{CacheRecord, CacheVariant};
use crate::processor::job::ScanKey;
use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache record: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// JSON file cache, one document per (scan key, record variant)
pub struct CacheStore {
    dir: PathBuf,
    max_age: Duration,
}

impl CacheStore {
    /// Open the cache directory, creating it if needed, and sweep out files
    /// that have not been touched within `max_age`
    pub fn open(dir: impl Into<PathBuf>, max_age: Duration) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let store = Self { dir, max_age };
        let removed = store.sweep();
        if removed > 0 {
            info!("Removed {} stale cache files from {}", removed, store.dir.display());
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &ScanKey, variant: CacheVariant) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", key.cache_key(), variant.file_suffix()))
    }

    /// Load a record. Missing, unreadable, malformed or stale records are
    /// reported as absent; the latter three are also deleted.
    pub fn read<T>(&self, key: &ScanKey) -> Option<T>
    where
        T: CacheRecord + DeserializeOwned,
    {
        let path = self.path(key, T::VARIANT);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                error!("Failed to read {} cache for {}: {}", T::VARIANT, key, e);
                return None;
            }
        };

        let record: T = match serde_json::from_str(&contents) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding corrupt {} cache for {}: {}", T::VARIANT, key, e);
                self.delete(key, T::VARIANT);
                return None;
            }
        };

        if !record.is_fresh(Utc::now(), self.max_age) {
            debug!("Discarding stale {} cache for {}", T::VARIANT, key);
            self.delete(key, T::VARIANT);
            return None;
        }

        Some(record.normalize())
    }

    /// Persist a record, replacing any previous record of the same variant
    pub fn write<T>(&self, key: &ScanKey, record: &T) -> Result<(), CacheError>
    where
        T: CacheRecord + Serialize,
    {
        let path = self.path(key, T::VARIANT);
        let json = serde_json::to_vec(record)?;

        if T::ATOMIC {
            self.write_atomic(&path, &json)
        } else {
            fs::write(&path, json).map_err(io_error(&path))
        }
    }

    // Write to a uniquely named sibling, then rename over the target so a
    // reader sees either the old document or the complete new one
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = self.dir.join(format!("{}.{}.tmp", file_name, Uuid::new_v4()));

        let result = File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(io_error(path));

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Remove a record. Returns whether a file was removed.
    pub fn delete(&self, key: &ScanKey, variant: CacheVariant) -> bool {
        let path = self.path(key, variant);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                error!("Failed to delete {} cache for {}: {}", variant, key, e);
                false
            }
        }
    }

    /// Delete every file in the cache directory untouched for longer than
    /// `max_age`, regardless of variant
    pub fn sweep(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot sweep cache directory {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let max_age = self.max_age.to_std().unwrap_or_default();
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());

            if age.is_some_and(|age| age > max_age) {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove stale cache file {}: {}", path.display(), e),
                }
            }
        }

        removed
    }
}
