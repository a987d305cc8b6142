//! Storage layer: the single-file object store and its collaborators.
//!
//! Each store owns one file holding the JSON serialization of its root
//! value. Typical layout for a provider backend:
//!
//! ```text
//! {data_dir}/
//! ├── users.json       ObjectStore<Vec<User>>
//! ├── roles.json       ObjectStore<Vec<Role>>
//! └── profiles.json    ObjectStore<Vec<Profile>>
//!
//! {temp_dir}/secstore-locks/
//! └── {lock_name}.lock one per store file, named by path digest
//! ```
//!
//! # Modules
//!
//! - [`lock`]: named cross-process lock keyed by normalized path.
//! - [`notifier`]: one-shot change notification for a store file.
//! - [`object_store`]: cached, atomically written `ObjectStore<T>`.

pub mod lock;
pub mod notifier;
pub mod object_store;

// Re-export the primary types so callers can write `storage::ObjectStore`
// without reaching into sub-modules.
pub use lock::{lock_name, normalize_path, LockGuard, NamedFileLock};
pub use notifier::{ChangeDetection, ChangeNotifier, FileStamp};
pub use object_store::{ObjectStore, StoreOptions};
