//! Error types for secstore.
//!
//! All errors are strongly typed and propagated without panicking.
//! File-level failures always carry the path of the store file involved.
//! Secrets and salts are never included in error messages.

use std::path::PathBuf;

use crate::profile::PropertyKind;

/// Store and codec error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum SecStoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to load store file {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store file {} is corrupt: {source}", path.display())]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save store file {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to acquire lock for {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Change notification failed: {0}")]
    Watch(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid property name: {0:?}")]
    InvalidPropertyName(String),

    #[error("Property {name:?} holds {expected:?} values, got {found:?}")]
    PropertyKindMismatch {
        name: String,
        expected: PropertyKind,
        found: PropertyKind,
    },

    #[error("Cannot decode hashed credential: hashing is irreversible")]
    IrreversibleCredential,

    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, SecStoreError>;
