//! Storage backends for the Latchkey source registry
//!
//! This module provides the trait and implementations for key/value
//! persistence, allowing the source collection manager to delegate
//! storage to pluggable backends while staying agnostic of where the
//! records actually live.

pub mod file;
pub mod memory;

// Re-export commonly used types
pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Storage encoding error: {message}")]
    Encoding { message: String },

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for key/value persistence consumed by the source manager
///
/// All operations are asynchronous and may fail; the manager issues
/// reads and writes concurrently, so implementations must tolerate
/// interleaved calls.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// List every key currently present in the store, in no particular
    /// order
    async fn get_all_keys(&self) -> StorageResult<Vec<String>>;

    /// Read the value stored under `key`
    ///
    /// # Returns
    /// * `Ok(String)` - The stored value
    /// * `Err(StorageError::KeyNotFound)` - If the key is absent
    async fn get_value(&self, key: &str) -> StorageResult<String>;

    /// Write `value` under `key`, replacing any existing value
    async fn set_value(&self, key: &str, value: &str) -> StorageResult<()>;
}

#[async_trait]
impl<S: StorageBackend + ?Sized> StorageBackend for Arc<S> {
    async fn get_all_keys(&self) -> StorageResult<Vec<String>> {
        (**self).get_all_keys().await
    }

    async fn get_value(&self, key: &str) -> StorageResult<String> {
        (**self).get_value(key).await
    }

    async fn set_value(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set_value(key, value).await
    }
}
