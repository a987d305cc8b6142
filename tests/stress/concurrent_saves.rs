//! Many independent store instances hammering one file.
//!
//! Each thread owns its own `ObjectStore`, so every exclusion comes from the
//! named file lock rather than shared in-process state.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use secstore::{ChangeDetection, NamedFileLock, ObjectStore, StoreOptions};

const WRITERS: usize = 8;
const UPDATES_PER_WRITER: usize = 25;

fn options(dir: &Path, detection: ChangeDetection) -> StoreOptions {
    StoreOptions {
        lock_dir: Some(dir.join("locks")),
        change_detection: detection,
        poll_interval_ms: 0,
        ..StoreOptions::default()
    }
}

fn run_writers(dir: &Path, file: &Path, detection: ChangeDetection) {
    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let barrier = Arc::clone(&barrier);
            let opts = options(dir, detection);
            let file = file.to_path_buf();
            thread::spawn(move || {
                let store: ObjectStore<Vec<String>> =
                    ObjectStore::with_options(file, opts).unwrap();
                barrier.wait();
                for i in 0..UPDATES_PER_WRITER {
                    store.update(|v| v.push(format!("w{w}-{i}"))).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

fn assert_all_updates_present(dir: &Path, file: &Path) {
    let fresh: ObjectStore<Vec<String>> =
        ObjectStore::with_options(file, options(dir, ChangeDetection::Disabled)).unwrap();
    let items = fresh.value().unwrap();
    assert_eq!(items.len(), WRITERS * UPDATES_PER_WRITER);

    let unique: BTreeSet<_> = items.iter().collect();
    assert_eq!(unique.len(), items.len(), "duplicate entries written");

    // Each writer's own entries stay in order.
    for w in 0..WRITERS {
        let prefix = format!("w{w}-");
        let mine: Vec<usize> = items
            .iter()
            .filter_map(|s| s.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(mine, (0..UPDATES_PER_WRITER).collect::<Vec<_>>());
    }
}

#[test]
fn concurrent_updates_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("shared.json");
    run_writers(dir.path(), &file, ChangeDetection::Disabled);
    assert_all_updates_present(dir.path(), &file);
}

#[test]
fn concurrent_updates_with_polling_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("shared.json");
    run_writers(dir.path(), &file, ChangeDetection::Poll);
    assert_all_updates_present(dir.path(), &file);
}

#[test]
fn concurrent_updates_with_watching_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("shared.json");
    run_writers(dir.path(), &file, ChangeDetection::Watch);
    assert_all_updates_present(dir.path(), &file);
}

#[test]
fn unlocked_readers_never_see_torn_files() {
    let dir = tempfile::tempdir().unwrap();
    let file: PathBuf = dir.path().join("shared.json");
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let file = file.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut parsed = 0usize;
                while !done.load(Ordering::SeqCst) {
                    match std::fs::read(&file) {
                        Ok(bytes) => {
                            let value: Vec<String> = serde_json::from_slice(&bytes)
                                .unwrap_or_else(|e| panic!("torn read ({} bytes): {e}", bytes.len()));
                            assert!(value.len() <= WRITERS * UPDATES_PER_WRITER);
                            parsed += 1;
                        }
                        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
                    }
                }
                parsed
            })
        })
        .collect();

    run_writers(dir.path(), &file, ChangeDetection::Disabled);
    done.store(true, Ordering::SeqCst);

    let parsed: usize = readers.into_iter().map(|r| r.join().unwrap()).sum();
    assert!(parsed > 0);
    assert_all_updates_present(dir.path(), &file);
}

#[test]
fn lock_excludes_other_instances() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("locked.json");
    let locks = NamedFileLock::with_lock_dir(dir.path().join("locks"));

    let guard = locks.acquire(&file).unwrap();
    let other = NamedFileLock::with_lock_dir(dir.path().join("locks"));
    let file_for_thread = file.clone();
    let contended = thread::spawn(move || {
        other
            .try_acquire_for(&file_for_thread, std::time::Duration::from_millis(100))
            .unwrap()
            .is_none()
    })
    .join()
    .unwrap();
    assert!(contended);

    drop(guard);
    assert!(locks
        .try_acquire_for(&file, std::time::Duration::from_millis(100))
        .unwrap()
        .is_some());
}

#[test]
fn deletes_interleaved_with_updates_stay_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("churn.json");

    let writer = {
        let opts = options(dir.path(), ChangeDetection::Disabled);
        let file = file.clone();
        thread::spawn(move || {
            let store: ObjectStore<Vec<u32>> = ObjectStore::with_options(file, opts).unwrap();
            for i in 0..100 {
                store.update(|v| v.push(i)).unwrap();
            }
        })
    };
    let deleter = {
        let opts = options(dir.path(), ChangeDetection::Disabled);
        let file = file.clone();
        thread::spawn(move || {
            let store: ObjectStore<Vec<u32>> = ObjectStore::with_options(file, opts).unwrap();
            for _ in 0..20 {
                store.delete();
                thread::yield_now();
            }
        })
    };
    writer.join().unwrap();
    deleter.join().unwrap();

    // Whatever survived is a valid, strictly increasing suffix of the writes.
    let fresh: ObjectStore<Vec<u32>> =
        ObjectStore::with_options(&file, options(dir.path(), ChangeDetection::Disabled)).unwrap();
    let items = fresh.value().unwrap();
    assert!(items.windows(2).all(|w| w[0] < w[1]));
}
