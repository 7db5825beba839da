//! Store Error Types
//!
//! Every backend reports failures through [`StoreError`] so callers can match
//! on the same kinds regardless of which adapter is configured.

use thiserror::Error;

/// Persistence layer errors
///
/// `NotFound` is only ever raised by the `update_*` operations. A read of an
/// absent key returns `Ok(None)` and is never reported through this type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Update target does not exist
    #[error("{kind} not found in '{collection}': {key}")]
    NotFound {
        kind: RecordKind,
        collection: String,
        key: String,
    },

    /// Insert target already exists
    #[error("{kind} already exists in '{collection}': {key}")]
    AlreadyExists {
        kind: RecordKind,
        collection: String,
        key: String,
    },

    /// Driver or network fault, passed through untouched
    #[error(transparent)]
    Backend(#[from] libsql::Error),

    /// Stored data is not valid JSON, or a value failed to encode
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload does not match the shape expected for its collection
    #[error("Invalid payload for '{collection}': {reason}")]
    InvalidPayload { collection: String, reason: String },

    /// Adapter configuration missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Adapter was used after `close()`
    #[error("Store has been closed")]
    Closed,

    /// Filesystem error while preparing a local database
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which primitive an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Document,
    Link,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Document => f.write_str("Document"),
            RecordKind::Link => f.write_str("Link"),
        }
    }
}

impl StoreError {
    /// Create a missing-document error
    pub fn document_not_found(collection: &str, key: &str) -> Self {
        Self::NotFound {
            kind: RecordKind::Document,
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    /// Create a missing-link error; the key reads `parent -> child`
    pub fn link_not_found(collection: &str, parent_key: &str, child_key: &str) -> Self {
        Self::NotFound {
            kind: RecordKind::Link,
            collection: collection.to_string(),
            key: link_key(parent_key, child_key),
        }
    }

    /// Create a duplicate-document error
    pub fn document_exists(collection: &str, key: &str) -> Self {
        Self::AlreadyExists {
            kind: RecordKind::Document,
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    /// Create a duplicate-link error
    pub fn link_exists(collection: &str, parent_key: &str, child_key: &str) -> Self {
        Self::AlreadyExists {
            kind: RecordKind::Link,
            collection: collection.to_string(),
            key: link_key(parent_key, child_key),
        }
    }

    /// Create a payload validation error
    pub fn invalid_payload(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

fn link_key(parent_key: &str, child_key: &str) -> String {
    format!("{} -> {}", parent_key, child_key)
}

/// Result alias used throughout the store
pub type Result<T> = std::result::Result<T, StoreError>;
