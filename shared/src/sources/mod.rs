//! Vault source management module
//!
//! This module provides the core source registry functionality: the
//! collection manager that tracks registered vault sources, the source
//! entity it coordinates, and the typed notification channels UI layers
//! subscribe to. Persistence goes through the pluggable backends in
//! [`crate::storage`].

pub mod events;
pub mod manager;
pub mod source;

// Re-export commonly used types
pub use events::{ManagerEvents, SourceEvent, DEFAULT_EVENT_CAPACITY};
pub use manager::VaultSourceManager;
pub use source::{SourceDescription, SourceStatus, VaultSource};

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

/// Prefix shared by every storage key the manager owns
pub const STORAGE_KEY_PREFIX: &str = "latchkey_sourcemgr_";

/// Storage key under which the source with the given id is persisted
pub(crate) fn storage_key_for(id: Uuid) -> String {
    format!("{STORAGE_KEY_PREFIX}{id}")
}

/// Whether `key` names a record this manager owns
///
/// Keys must carry the prefix followed by a lowercase hyphenated UUID.
/// Anything else is ignored during restore, even when it shares the
/// prefix.
pub(crate) fn is_manager_key(key: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(
            "^latchkey_sourcemgr_[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$",
        )
        .expect("storage key pattern is a valid regex")
    });
    pattern.is_match(key)
}

/// Errors that can occur during source collection operations
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Failed {op}: no source found for id: {id}")]
    SourceNotFound { op: &'static str, id: Uuid },

    #[error("Failed serializing source {id} for storage")]
    Dehydrate {
        id: Uuid,
        #[source]
        source: SourceError,
    },

    #[error("Storage access failed for key: {key}")]
    Persistence {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed listing storage keys")]
    ListKeys {
        #[source]
        source: StorageError,
    },

    #[error("Failed rehydrating item from storage with key: {key}")]
    Rehydration {
        key: String,
        #[source]
        source: SourceError,
    },

    #[error("Failed rehydrating sources")]
    RehydrationBatch {
        #[source]
        source: Box<ManagerError>,
    },
}

/// Result type for source collection operations
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors raised by a source entity's own (de)serialization
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed serializing source state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed deserializing source state: {0}")]
    Deserialize(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_shape() {
        let id = Uuid::new_v4();
        let key = storage_key_for(id);

        assert!(key.starts_with(STORAGE_KEY_PREFIX));
        assert!(is_manager_key(&key));
    }

    #[test]
    fn test_key_recognition_rejects_malformed_suffixes() {
        assert!(!is_manager_key("latchkey_sourcemgr_not-a-uuid"));
        assert!(!is_manager_key("latchkey_sourcemgr_"));
        // Uppercase hex is not the canonical form
        assert!(!is_manager_key(
            "latchkey_sourcemgr_D3C9A8B7-0000-4000-8000-ABCDEF012345"
        ));
    }

    #[test]
    fn test_key_recognition_rejects_foreign_prefixes() {
        let id = Uuid::new_v4();
        assert!(!is_manager_key(&format!("other_prefix_{id}")));
        // Trailing garbage after a valid key must not match either
        assert!(!is_manager_key(&format!("{STORAGE_KEY_PREFIX}{id}.bak")));
    }

    #[test]
    fn test_not_found_error_carries_operation_context() {
        let id = Uuid::new_v4();
        let err = ManagerError::SourceNotFound {
            op: "removing source",
            id,
        };
        assert_eq!(
            err.to_string(),
            format!("Failed removing source: no source found for id: {id}")
        );
    }
}
