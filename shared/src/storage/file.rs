//! JSON-file storage backend
//!
//! Persistent key/value store backed by a single JSON document on disk.
//! The whole map is loaded into memory when the store is opened and the
//! document is rewritten after every write, which suits the small
//! collections a source registry holds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{StorageBackend, StorageError, StorageResult};

/// Key/value store persisted as one JSON document
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, loading any existing document
    ///
    /// A missing file yields an empty store; the document is only
    /// created once the first value is written.
    ///
    /// # Returns
    /// * `Ok(FileStorage)` - Ready-to-use store
    /// * `Err(StorageError)` - If the document exists but cannot be
    ///   read or parsed
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StorageError::Encoding {
                    message: format!(
                        "Failed to parse store document '{}': {}",
                        path.display(),
                        e
                    ),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store document at '{}', starting empty", path.display());
                HashMap::new()
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &HashMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_vec_pretty(entries).map_err(|e| StorageError::Encoding {
            message: format!("Failed to serialize store document: {}", e),
        })?;
        tokio::fs::write(&self.path, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get_all_keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn get_value(&self, key: &str) -> StorageResult<String> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound {
                key: key.to_string(),
            })
    }

    async fn set_value(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries).await
    }
}
