//! Generic single-file object store.
//!
//! An [`ObjectStore<T>`] owns exactly one root value of type `T`, persisted
//! as pretty-printed JSON in one file. The value is loaded lazily, cached in
//! memory, written back atomically, and invalidated when another writer (in
//! this or another process) replaces the file.
//!
//! ```text
//! Empty ──load (file exists)──────────────▶ Populated
//! Empty ──load (file missing, auto_create)─▶ Populated(default)
//! Populated ──external change──────────────▶ Empty
//! Populated ──delete───────────────────────▶ Empty
//! ```
//!
//! Every file operation runs inside the [`NamedFileLock`] for the store path,
//! so loads, saves and deletes on one file are totally ordered across threads
//! and processes. The in-memory value is guarded by an instance lock; callers
//! that read, mutate and write back should use [`ObjectStore::update`], which
//! holds both locks for the whole sequence.
//!
//! # Consistency caveats
//!
//! With [`ChangeDetection::Watch`] a cached value is stale for at most the
//! notification latency. If the platform watcher cannot be armed the store
//! logs a warning and polls the file stamp on access instead, at most once
//! per `poll_interval_ms`. With [`ChangeDetection::Disabled`] the cache is
//! served until an explicit [`ObjectStore::load`]. In every mode
//! [`ObjectStore::update`] re-reads the file under the lock when it changed,
//! so read-modify-write sequences never lose another writer's update.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SecStoreError};
use crate::storage::lock::NamedFileLock;
use crate::storage::notifier::{ChangeDetection, ChangeNotifier, FileStamp};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Attempts made by [`ObjectStore::delete`] before giving up.
const DELETE_ATTEMPTS: u32 = 3;

/// Base delay between delete attempts; attempt `n` waits `n` times this.
const DELETE_BACKOFF: Duration = Duration::from_millis(50);

const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

// ── Options ───────────────────────────────────────────────────────────────────

/// Behaviour switches for an [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Create a default value when nothing could be loaded.
    pub auto_create: bool,
    /// Load from disk on first access.
    pub auto_load: bool,
    /// Write the destination in place instead of publishing a temp file.
    ///
    /// Readers that do not take the store lock may observe a partial file;
    /// intended for exclusive or batch use only.
    pub direct_write: bool,
    /// How external changes are detected.
    pub change_detection: ChangeDetection,
    /// Minimum delay between two stamp checks in polling mode.
    pub poll_interval_ms: u64,
    /// Directory for lock files; the system temp dir when unset.
    pub lock_dir: Option<PathBuf>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            auto_create: true,
            auto_load: true,
            direct_write: false,
            change_detection: ChangeDetection::Watch,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            lock_dir: None,
        }
    }
}

impl StoreOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

type Listener = Arc<dyn Fn() + Send + Sync>;

/// State reachable from the notifier thread.
struct Shared<T> {
    cache: Mutex<Option<T>>,
    /// Stamp of the file as this instance last read or wrote it. Only
    /// changed while `cache` is held.
    baseline: Mutex<FileStamp>,
    file_changed: Mutex<Vec<Listener>>,
    value_changed: Mutex<Vec<Listener>>,
}

impl<T> Shared<T> {
    fn raise(listeners: &Mutex<Vec<Listener>>) {
        let snapshot: Vec<Listener> = listeners.lock().clone();
        for listener in snapshot {
            listener();
        }
    }

    fn raise_file_changed(&self) {
        Self::raise(&self.file_changed);
    }

    fn raise_value_changed(&self) {
        Self::raise(&self.value_changed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveDetection {
    None,
    Watch,
    Poll,
}

#[derive(Debug)]
struct DetectionState {
    active: ActiveDetection,
    last_poll: Instant,
}

// ── ObjectStore ───────────────────────────────────────────────────────────────

/// Cached, lock-protected, single-file store for one root value.
pub struct ObjectStore<T> {
    path: Option<PathBuf>,
    options: StoreOptions,
    locks: NamedFileLock,
    shared: Arc<Shared<T>>,
    detection: Mutex<DetectionState>,
    notifier: Mutex<Option<ChangeNotifier>>,
}

impl<T> std::fmt::Debug for ObjectStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("empty", &self.shared.cache.lock().is_none())
            .finish()
    }
}

impl<T> ObjectStore<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    /// Create a store backed by `path` with default options.
    ///
    /// Nothing is read until the value is first accessed.
    ///
    /// # Errors
    ///
    /// Returns `SecStoreError::InvalidConfig` for an empty path.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(path, StoreOptions::default())
    }

    /// Create a store backed by `path` with explicit options.
    pub fn with_options(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(SecStoreError::InvalidConfig(
                "store file path must not be empty".to_string(),
            ));
        }
        if path.is_dir() {
            return Err(SecStoreError::InvalidConfig(format!(
                "store file path {} is a directory",
                path.display()
            )));
        }
        Ok(Self::build(Some(path), options))
    }

    /// Create a store without persistence.
    ///
    /// `load` and `save` are no-ops and `delete` returns `false`; the value
    /// lives only in memory.
    pub fn in_memory() -> Self {
        Self::build(None, StoreOptions::default())
    }

    fn build(path: Option<PathBuf>, options: StoreOptions) -> Self {
        let locks = match &options.lock_dir {
            Some(dir) => NamedFileLock::with_lock_dir(dir),
            None => NamedFileLock::new(),
        };
        Self {
            path,
            options,
            locks,
            shared: Arc::new(Shared {
                cache: Mutex::new(None),
                baseline: Mutex::new(FileStamp::Missing),
                file_changed: Mutex::new(Vec::new()),
                value_changed: Mutex::new(Vec::new()),
            }),
            detection: Mutex::new(DetectionState {
                active: ActiveDetection::None,
                last_poll: Instant::now(),
            }),
            notifier: Mutex::new(None),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// The backing file, if the store is persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// `true` while no value is cached.
    pub fn is_empty(&self) -> bool {
        self.shared.cache.lock().is_none()
    }

    /// Return a snapshot of the current value.
    ///
    /// Loads on first access when `auto_load` is set and falls back to
    /// `T::default()` when `auto_create` is set. A missing file is not an
    /// error in that case.
    ///
    /// # Errors
    ///
    /// Load errors are propagated. Returns `SecStoreError::NotFound` when no
    /// value exists and `auto_create` is off.
    pub fn value(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with_value(T::clone)
    }

    /// Run `f` against the current value without cloning it.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let mut cache = self.shared.cache.lock();
        let changed = self.poll_for_changes(&mut cache);
        let result = self.ensure_value(&mut cache).and_then(|()| {
            cache
                .as_ref()
                .map(f)
                .ok_or_else(|| self.not_found())
        });
        drop(cache);

        if changed {
            self.shared.raise_file_changed();
        }
        result
    }

    /// Read, mutate and persist the value as one critical section.
    ///
    /// The store lock is held from the freshness check to the end of the
    /// write, and the file is re-read first if another writer changed it, so
    /// concurrent `update` calls from any thread or process never lose each
    /// other's changes.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut cache = self.shared.cache.lock();

        let Some(path) = self.path.clone() else {
            if cache.is_none() && self.options.auto_create {
                *cache = Some(T::default());
            }
            let value = cache.as_mut().ok_or_else(|| self.not_found())?;
            return Ok(f(value));
        };

        let _guard = self.locks.acquire(&path)?;
        let stale = FileStamp::of(&path) != *self.shared.baseline.lock();
        if stale {
            *cache = None;
        }
        if cache.is_none() && (stale || self.options.auto_load) {
            self.reload_locked(&path, &mut cache)?;
        }
        if cache.is_none() && self.options.auto_create {
            *cache = Some(T::default());
        }

        let value = cache.as_mut().ok_or_else(|| self.not_found())?;
        let out = f(&mut *value);
        self.write_locked(&path, value)?;
        Ok(out)
    }

    /// Replace the cached value without touching the file.
    pub fn set_value(&self, value: T) {
        *self.shared.cache.lock() = Some(value);
        self.shared.raise_value_changed();
    }

    /// Drop the cached value; the next access reloads.
    pub fn invalidate(&self) {
        *self.shared.cache.lock() = None;
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    /// Register a callback for external changes of the backing file.
    ///
    /// Runs after the cache has been invalidated, on the thread that noticed
    /// the change.
    pub fn on_file_changed(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.shared.file_changed.lock().push(Arc::new(listener));
    }

    /// Register a callback for [`set_value`](Self::set_value).
    pub fn on_value_changed(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.shared.value_changed.lock().push(Arc::new(listener));
    }

    // ── File operations ──────────────────────────────────────────────────────

    /// Read the backing file into the cache.
    ///
    /// A missing file leaves the cache untouched and is not an error.
    ///
    /// # Errors
    ///
    /// `SecStoreError::Load` for I/O failures and
    /// `SecStoreError::CorruptStore` when the file cannot be parsed; both
    /// name the file.
    pub fn load(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let mut cache = self.shared.cache.lock();
        let _guard = self.locks.acquire(path)?;
        self.reload_locked(path, &mut cache)
    }

    /// Persist the cached value.
    ///
    /// Does nothing, and touches no file, while the cache is empty.
    ///
    /// # Errors
    ///
    /// `SecStoreError::Save` naming the file for I/O failures,
    /// `SecStoreError::SerializationError` if `T` cannot be serialized.
    pub fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let cache = self.shared.cache.lock();
        let Some(value) = cache.as_ref() else {
            log::debug!("nothing to save for {}", path.display());
            return Ok(());
        };

        let _guard = self.locks.acquire(path)?;
        self.write_locked(path, value)
    }

    /// Remove the backing file and clear the cache.
    ///
    /// Transient failures (e.g. a sharing violation) are retried with a
    /// linearly increasing delay. Returns `false` if there was no file or
    /// every attempt failed.
    pub fn delete(&self) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        let mut cache = self.shared.cache.lock();
        *cache = None;

        let _guard = match self.locks.acquire(path) {
            Ok(guard) => guard,
            Err(e) => {
                log::warn!("cannot delete {}: {e}", path.display());
                return false;
            }
        };
        if !path.exists() {
            return false;
        }

        for attempt in 1..=DELETE_ATTEMPTS {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    log::debug!("deleted {}", path.display());
                    self.record_baseline(FileStamp::Missing);
                    return true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
                Err(e) => {
                    log::warn!(
                        "delete attempt {attempt}/{DELETE_ATTEMPTS} for {} failed: {e}",
                        path.display()
                    );
                    if attempt < DELETE_ATTEMPTS {
                        std::thread::sleep(DELETE_BACKOFF * attempt);
                    }
                }
            }
        }
        false
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn not_found(&self) -> SecStoreError {
        match &self.path {
            Some(path) => SecStoreError::NotFound(format!("no value in {}", path.display())),
            None => SecStoreError::NotFound("no value in memory store".to_string()),
        }
    }

    fn ensure_value(&self, cache: &mut Option<T>) -> Result<()> {
        if cache.is_none() && self.options.auto_load {
            if let Some(path) = self.path.as_deref() {
                let _guard = self.locks.acquire(path)?;
                self.reload_locked(path, cache)?;
            }
        }
        if cache.is_none() && self.options.auto_create {
            *cache = Some(T::default());
        }
        Ok(())
    }

    /// Read the file into `cache`. The caller holds the file lock.
    fn reload_locked(&self, path: &Path, cache: &mut Option<T>) -> Result<()> {
        let stamp = FileStamp::of(path);
        if let Some(value) = read_file(path)? {
            log::debug!("loaded {}", path.display());
            *cache = Some(value);
        }
        self.arm_detection(path, stamp);
        Ok(())
    }

    /// Serialize `value` to the file. The caller holds the file lock.
    fn write_locked(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| SecStoreError::SerializationError(e.to_string()))?;
        let save_err = |source: std::io::Error| SecStoreError::Save {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(save_err)?;
        }
        if self.options.direct_write {
            write_in_place(path, &bytes).map_err(save_err)?;
        } else {
            write_replace(path, &bytes).map_err(save_err)?;
        }
        log::debug!("saved {} ({} bytes)", path.display(), bytes.len());

        self.arm_detection(path, FileStamp::of(path));
        Ok(())
    }

    /// Poll the file stamp in polling mode. Returns `true` if the cache was
    /// invalidated; the caller raises `FileChanged` once its guard is gone.
    fn poll_for_changes(&self, cache: &mut Option<T>) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        if cache.is_none() {
            return false;
        }

        let mut detection = self.detection.lock();
        if detection.active != ActiveDetection::Poll
            || detection.last_poll.elapsed() < self.options.poll_interval()
        {
            return false;
        }
        detection.last_poll = Instant::now();

        if FileStamp::of(path) == *self.shared.baseline.lock() {
            return false;
        }
        log::debug!("{} changed on disk, dropping cache", path.display());
        *cache = None;
        true
    }

    fn record_baseline(&self, stamp: FileStamp) {
        *self.shared.baseline.lock() = stamp;
        if let Some(notifier) = self.notifier.lock().as_ref() {
            notifier.set_baseline(stamp);
        }
    }

    /// Record `stamp` as the known file state and (re-)arm detection.
    fn arm_detection(&self, path: &Path, stamp: FileStamp) {
        let mut detection = self.detection.lock();
        *self.shared.baseline.lock() = stamp;
        detection.last_poll = Instant::now();

        match self.options.change_detection {
            ChangeDetection::Disabled => {}
            ChangeDetection::Poll => detection.active = ActiveDetection::Poll,
            ChangeDetection::Watch => {
                if detection.active == ActiveDetection::Poll {
                    return;
                }
                let mut notifier = self.notifier.lock();
                if let Some(existing) = notifier.as_ref() {
                    existing.rearm(stamp);
                    return;
                }
                match ChangeNotifier::arm(path, stamp, invalidation_callback(&self.shared, path)) {
                    Ok(armed) => {
                        *notifier = Some(armed);
                        detection.active = ActiveDetection::Watch;
                    }
                    Err(e) => {
                        log::warn!(
                            "change notification unavailable for {} ({e}); polling instead",
                            path.display()
                        );
                        detection.active = ActiveDetection::Poll;
                    }
                }
            }
        }
    }
}

/// Callback handed to the notifier: drop the cache, then tell listeners.
///
/// The stamp is re-read under the cache lock. A notification for a state this
/// instance wrote or loaded itself is declined, which keeps the notifier armed.
fn invalidation_callback<T>(
    shared: &Arc<Shared<T>>,
    path: &Path,
) -> impl Fn() -> bool + Send + Sync + 'static
where
    T: Send + 'static,
{
    let weak: Weak<Shared<T>> = Arc::downgrade(shared);
    let path = path.to_path_buf();
    move || {
        let Some(shared) = weak.upgrade() else {
            return true;
        };
        let mut cache = shared.cache.lock();
        if FileStamp::of(&path) == *shared.baseline.lock() {
            return false;
        }
        *cache = None;
        drop(cache);

        log::debug!("{} changed on disk, dropping cache", path.display());
        shared.raise_file_changed();
        true
    }
}

// ── File helpers ──────────────────────────────────────────────────────────────

fn read_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SecStoreError::Load {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| SecStoreError::CorruptStore {
            path: path.to_path_buf(),
            source,
        })
}

fn write_in_place(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Write `bytes` to a fresh temp file next to `path`, then publish it.
///
/// Publishing is a rename; if the rename is refused the temp file is copied
/// over the destination and then removed.
fn write_replace(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    if let Ok(meta) = std::fs::metadata(path) {
        temp.as_file().set_permissions(meta.permissions())?;
    }
    temp.as_file().sync_all()?;

    match temp.persist(path) {
        Ok(_) => Ok(()),
        Err(err) => {
            log::debug!(
                "rename onto {} failed ({}), copying instead",
                path.display(),
                err.error
            );
            let temp = err.file;
            std::fs::copy(temp.path(), path)?;
            temp.close()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
