//! In-memory storage backend
//!
//! Volatile key/value store used as the default backend for tests and
//! for managers that do not need their collection to survive the
//! process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StorageBackend, StorageError, StorageResult};

/// Key/value store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
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
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
