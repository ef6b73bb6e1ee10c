//! Latchkey Shared Library
//!
//! This crate contains the vault source registry used across the Latchkey
//! credential manager: the collection manager that tracks registered
//! vault sources, the source entity it coordinates, pluggable key/value
//! storage backends, and the typed notification channels UI layers
//! subscribe to.
//!
//! # Features
//!
//! - **Source Registry**: Ordered, uniquely-keyed collection of vault
//!   sources with dense display ranks
//! - **Persistence**: Dehydrate/rehydrate the collection through any
//!   [`storage::StorageBackend`]
//! - **Notifications**: Per-kind broadcast channels for collection
//!   updates and source lock/unlock/colour changes
//! - **Configuration**: TOML-backed settings for desktop applications
//!
//! # Usage
//!
//! ```rust
//! use latchkey_shared::sources::{VaultSource, VaultSourceManager};
//! use latchkey_shared::storage::MemoryStorage;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = VaultSourceManager::new(MemoryStorage::new());
//!
//! let source = VaultSource::new("Personal vault");
//! manager.add_source(source).await;
//!
//! // Persist the collection; a later rehydrate() restores it
//! manager.dehydrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod sources;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ConfigResult, ManagerConfig, StorageSettings};

pub use sources::{
    ManagerError, ManagerEvents, ManagerResult, SourceDescription, SourceError, SourceEvent,
    SourceStatus, VaultSource, VaultSourceManager, STORAGE_KEY_PREFIX,
};

pub use storage::{
    FileStorage, MemoryStorage, StorageBackend, StorageError, StorageResult,
};

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
