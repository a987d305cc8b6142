//! Named cross-process file locks.
//!
//! A [`NamedFileLock`] turns a store file path into a short, stable lock name
//! and serializes every critical section for that path across threads and
//! across operating-system processes.
//!
//! Two spellings of the same file (relative vs. absolute, `.`/`..` segments,
//! symlinks, case variants on case-insensitive platforms) map to the same
//! lock. The name is a 128-bit BLAKE3 digest of the normalized path,
//! hex-encoded, so it is safe to use as a file name and never reveals the
//! raw path.
//!
//! Exclusion is enforced with an OS advisory lock on
//! `{lock_dir}/{lock_name}.lock`. Every acquisition opens its own handle, so
//! two threads of one process exclude each other exactly like two processes
//! do. Release happens when the [`LockGuard`] is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Result, SecStoreError};

/// Directory name (under the system temp dir) holding lock files by default.
const DEFAULT_LOCK_DIR: &str = "secstore-locks";

/// Number of digest bytes kept for the lock name (128 bits).
const LOCK_NAME_BYTES: usize = 16;

/// Polling step used by [`NamedFileLock::try_acquire_for`].
const TRY_LOCK_STEP: Duration = Duration::from_millis(10);

// ── Path normalization ────────────────────────────────────────────────────────

/// Normalize a path so that every spelling of one file yields the same value.
///
/// The path is made absolute, `.` and `..` segments are folded, symlinks are
/// resolved when the file (or at least its parent directory) exists, and the
/// result is lower-cased on platforms with case-insensitive filesystems.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let lexical = lexical_normalize(&absolute);

    let resolved = match std::fs::canonicalize(&lexical) {
        Ok(p) => p,
        Err(_) => match (lexical.parent(), lexical.file_name()) {
            (Some(parent), Some(name)) => std::fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or_else(|_| lexical.clone()),
            _ => lexical.clone(),
        },
    };

    Ok(fold_case(resolved))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(any(windows, target_os = "macos"))]
fn fold_case(path: PathBuf) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

#[cfg(not(any(windows, target_os = "macos")))]
fn fold_case(path: PathBuf) -> PathBuf {
    path
}

/// Compute the fixed-length lock name for a path.
///
/// Returns 32 lowercase hex characters.
pub fn lock_name(path: &Path) -> Result<String> {
    let normalized = normalize_path(path)?;
    let digest = blake3::hash(normalized.to_string_lossy().as_bytes());
    Ok(hex::encode(&digest.as_bytes()[..LOCK_NAME_BYTES]))
}

// ── NamedFileLock ─────────────────────────────────────────────────────────────

/// Factory for named, process-wide exclusive locks keyed by file path.
#[derive(Debug, Clone)]
pub struct NamedFileLock {
    lock_dir: PathBuf,
}

impl Default for NamedFileLock {
    fn default() -> Self {
        Self::new()
    }
}

impl NamedFileLock {
    /// Locks live in `{temp_dir}/secstore-locks`, shared by every process on
    /// the machine.
    pub fn new() -> Self {
        Self {
            lock_dir: std::env::temp_dir().join(DEFAULT_LOCK_DIR),
        }
    }

    /// Use a custom directory for lock files.
    ///
    /// All cooperating processes must agree on the directory.
    pub fn with_lock_dir(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    /// Directory holding the lock files.
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Path of the lock file guarding `path`.
    pub fn lock_path(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.lock_dir.join(format!("{}.lock", lock_name(path)?)))
    }

    /// Block until the lock for `path` is held.
    ///
    /// There is no timeout; callers needing a bounded wait use
    /// [`try_acquire_for`](Self::try_acquire_for).
    pub fn acquire(&self, path: &Path) -> Result<LockGuard> {
        let (file, name) = self.open_lock_file(path)?;
        FileExt::lock_exclusive(&file).map_err(|source| SecStoreError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        log::trace!("acquired lock {name} for {}", path.display());
        Ok(LockGuard { file, name })
    }

    /// Try to take the lock for `path`, giving up after `timeout`.
    ///
    /// Returns `Ok(None)` if another holder kept the lock for the whole wait.
    pub fn try_acquire_for(&self, path: &Path, timeout: Duration) -> Result<Option<LockGuard>> {
        let (file, name) = self.open_lock_file(path)?;
        let deadline = Instant::now() + timeout;

        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    log::trace!("acquired lock {name} for {}", path.display());
                    return Ok(Some(LockGuard { file, name }));
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(TRY_LOCK_STEP);
                }
                Err(source) => {
                    return Err(SecStoreError::Lock {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
    }

    fn open_lock_file(&self, path: &Path) -> Result<(File, String)> {
        let name = lock_name(path)?;
        let lock_err = |source: std::io::Error| SecStoreError::Lock {
            path: path.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(&self.lock_dir).map_err(lock_err)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_dir.join(format!("{name}.lock")))
            .map_err(lock_err)?;

        Ok((file, name))
    }
}

// ── LockGuard ─────────────────────────────────────────────────────────────────

/// Holds a named lock; dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    name: String,
}

impl LockGuard {
    /// The hashed lock name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("failed to release lock {}: {e}", self.name);
        } else {
            log::trace!("released lock {}", self.name);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
