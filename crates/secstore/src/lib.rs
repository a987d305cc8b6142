//! secstore: embedded data layer for security-provider backends.
//!
//! Provides a generic single-file object store with cross-process locking,
//! in-process caching and external-change invalidation, plus the two
//! encodings layered on top of it: the multiplexed profile-property codec
//! and the clear / hashed / encrypted credential codec.

pub mod compare;
pub mod config;
pub mod credential;
pub mod error;
pub mod model;
pub mod profile;
pub mod storage;
pub mod time;

// Re-export primary types
pub use config::SecurityConfig;
pub use error::{Result, SecStoreError};
pub use storage::{
    lock_name, ChangeDetection, ChangeNotifier, FileStamp, LockGuard, NamedFileLock, ObjectStore,
    StoreOptions,
};

// Re-export codec types
pub use credential::{
    generate_password, generate_salt, CredentialCodec, CredentialFormat, EncodedCredential,
    EncryptionKey,
};
pub use profile::{
    DecodeReport, EncodedProfile, ProfileCodec, PropertyCollection, PropertyDefinition,
    PropertyKind, PropertyValue,
};

// Re-export record types
pub use model::{Credential, Profile, ProfileStore, Role, RoleStore, User, UserStore};
