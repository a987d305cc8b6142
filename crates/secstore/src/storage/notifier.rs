//! One-shot change notification for a single store file.
//!
//! A [`ChangeNotifier`] watches the directory containing the target file and
//! invokes its callback at most once per arming, when the file's
//! [`FileStamp`] (size, modification time and file id, or absence) stops
//! matching the baseline it was armed with. After firing it stays disarmed
//! until [`ChangeNotifier::rearm`] is called, normally after the owner
//! reloaded the file. A callback that returns `false` declines the change
//! (the owner already knew that state) and leaves the notifier armed.
//!
//! The parent directory is watched rather than the file itself, so a file
//! that is replaced by rename or deleted and recreated keeps being observed.
//!
//! When the platform facility is unavailable, [`ChangeDetection::Poll`] lets
//! the store compare stamps on access instead; see
//! [`ObjectStore`](super::ObjectStore) for the consistency caveats.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SecStoreError};

/// How a store notices that another writer replaced its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDetection {
    /// OS file-system notifications; falls back to `Poll` when unavailable.
    #[default]
    Watch,
    /// Compare the file stamp on access, at most once per poll interval.
    Poll,
    /// Serve the cache until an explicit `load()`.
    Disabled,
}

/// Cheap fingerprint of a file's on-disk state.
///
/// `file_id` is the inode on Unix and 0 elsewhere. Atomic saves publish a
/// new inode, so a replacement is noticed even when size and mtime match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStamp {
    Missing,
    Present {
        len: u64,
        modified: Option<SystemTime>,
        file_id: u64,
    },
}

impl FileStamp {
    /// Read the current stamp of `path`.
    ///
    /// Any metadata error is reported as `Missing`.
    pub fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => FileStamp::Present {
                len: meta.len(),
                modified: meta.modified().ok(),
                file_id: file_id(&meta),
            },
            Err(_) => FileStamp::Missing,
        }
    }
}

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> u64 {
    0
}

struct NotifierState {
    target: PathBuf,
    armed: AtomicBool,
    baseline: Mutex<FileStamp>,
}

impl NotifierState {
    fn is_target(&self, event_path: &Path) -> bool {
        event_path.file_name() == self.target.file_name()
    }
}

/// Watches one file and fires a callback once per arming.
pub struct ChangeNotifier {
    _watcher: RecommendedWatcher,
    state: Arc<NotifierState>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("target", &self.state.target)
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl ChangeNotifier {
    /// Start watching `path` and arm the notifier with `baseline`.
    ///
    /// The callback runs on the watcher's thread and returns whether it
    /// consumed the change.
    ///
    /// # Errors
    ///
    /// Returns `SecStoreError::Watch` if the parent directory does not exist
    /// or the platform watcher cannot be created.
    pub fn arm<F>(path: &Path, baseline: FileStamp, callback: F) -> Result<Self>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let state = Arc::new(NotifierState {
            target: path.to_path_buf(),
            armed: AtomicBool::new(true),
            baseline: Mutex::new(baseline),
        });

        let handler_state = Arc::clone(&state);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("watch error for {}: {e}", handler_state.target.display());
                    return;
                }
            };
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            if !event.paths.iter().any(|p| handler_state.is_target(p)) {
                return;
            }

            let current = FileStamp::of(&handler_state.target);
            if current == *handler_state.baseline.lock() {
                return;
            }
            if handler_state.armed.swap(false, Ordering::SeqCst) {
                log::debug!("change detected on {}", handler_state.target.display());
                if !callback() {
                    handler_state.armed.store(true, Ordering::SeqCst);
                }
            }
        })
        .map_err(|e| SecStoreError::Watch(e.to_string()))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| SecStoreError::Watch(format!("{}: {e}", dir.display())))?;

        Ok(Self {
            _watcher: watcher,
            state,
        })
    }

    /// Re-enable the notifier after it fired, with a fresh baseline.
    pub fn rearm(&self, baseline: FileStamp) {
        *self.state.baseline.lock() = baseline;
        self.state.armed.store(true, Ordering::SeqCst);
    }

    /// Replace the baseline without changing the armed state.
    pub fn set_baseline(&self, baseline: FileStamp) {
        *self.state.baseline.lock() = baseline;
    }

    /// Whether the next qualifying change will fire the callback.
    pub fn is_armed(&self) -> bool {
        self.state.armed.load(Ordering::SeqCst)
    }

    /// The watched file.
    pub fn target(&self) -> &Path {
        &self.state.target
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
