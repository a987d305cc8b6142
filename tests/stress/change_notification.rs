//! External-change invalidation between independent store instances.
//!
//! Instance A writes; instance B must observe the new content within a
//! bounded delay without an explicit `load()`.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use secstore::{ChangeDetection, ObjectStore, StoreOptions};

const CONVERGE_TIMEOUT: Duration = Duration::from_secs(5);

fn options(dir: &Path, detection: ChangeDetection) -> StoreOptions {
    StoreOptions {
        lock_dir: Some(dir.join("locks")),
        change_detection: detection,
        poll_interval_ms: 20,
        ..StoreOptions::default()
    }
}

fn open(dir: &Path, detection: ChangeDetection) -> ObjectStore<Vec<String>> {
    ObjectStore::with_options(dir.join("shared.json"), options(dir, detection)).unwrap()
}

/// Poll `store.value()` until it equals `expected` or the timeout passes.
fn converges(store: &ObjectStore<Vec<String>>, expected: &[&str]) -> bool {
    let deadline = Instant::now() + CONVERGE_TIMEOUT;
    loop {
        let current = store.value().unwrap();
        if current == expected {
            return true;
        }
        if Instant::now() >= deadline {
            eprintln!("last value seen: {current:?}");
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn writer_then_reader(detection: ChangeDetection) {
    let dir = tempfile::tempdir().unwrap();
    let a = open(dir.path(), ChangeDetection::Disabled);
    let b = open(dir.path(), detection);

    a.update(|v| v.push("X".to_string())).unwrap();
    assert_eq!(b.value().unwrap(), vec!["X"]);

    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    b.on_file_changed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    a.update(|v| v.push("Y".to_string())).unwrap();
    assert!(converges(&b, &["X", "Y"]));
    assert!(changes.load(Ordering::SeqCst) >= 1);

    // Detection re-arms after the reload.
    a.update(|v| v.push("Z".to_string())).unwrap();
    assert!(converges(&b, &["X", "Y", "Z"]));
}

#[test]
fn watching_reader_sees_external_update() {
    writer_then_reader(ChangeDetection::Watch);
}

#[test]
fn polling_reader_sees_external_update() {
    writer_then_reader(ChangeDetection::Poll);
}

#[test]
fn external_delete_resets_to_default() {
    for detection in [ChangeDetection::Watch, ChangeDetection::Poll] {
        let dir = tempfile::tempdir().unwrap();
        let a = open(dir.path(), ChangeDetection::Disabled);
        let b = open(dir.path(), detection);

        a.update(|v| v.push("X".to_string())).unwrap();
        assert_eq!(b.value().unwrap(), vec!["X"]);

        assert!(a.delete());
        assert!(converges(&b, &[]), "{detection:?}");
    }
}

/// Publish `json` the way an external tool would: write aside, then rename.
fn replace_externally(dir: &Path, json: &str) {
    let staging = dir.join("shared.json.staging");
    std::fs::write(&staging, json).unwrap();
    std::fs::rename(&staging, dir.join("shared.json")).unwrap();
}

#[test]
fn hand_written_replacement_is_noticed() {
    let dir = tempfile::tempdir().unwrap();
    let b = open(dir.path(), ChangeDetection::Watch);
    assert!(b.value().unwrap().is_empty());

    replace_externally(dir.path(), r#"["X"]"#);
    assert!(converges(&b, &["X"]));

    replace_externally(dir.path(), r#"["X","Y"]"#);
    assert!(converges(&b, &["X", "Y"]));
}

#[test]
fn many_readers_converge_on_last_write() {
    let dir = tempfile::tempdir().unwrap();
    let writer = open(dir.path(), ChangeDetection::Disabled);
    writer.update(|v| v.push("0".to_string())).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|i| {
            let detection = if i % 2 == 0 {
                ChangeDetection::Watch
            } else {
                ChangeDetection::Poll
            };
            let store = open(dir.path(), detection);
            assert_eq!(store.value().unwrap(), vec!["0"]);
            store
        })
        .collect();

    for n in 1..=10 {
        writer.update(|v| v.push(n.to_string())).unwrap();
    }

    let expected: Vec<String> = (0..=10).map(|n| n.to_string()).collect();
    let expected: Vec<&str> = expected.iter().map(String::as_str).collect();
    for reader in &readers {
        assert!(converges(reader, &expected));
    }
}

#[test]
fn dropped_store_stops_listening() {
    let dir = tempfile::tempdir().unwrap();
    let a = open(dir.path(), ChangeDetection::Disabled);
    let changes = Arc::new(AtomicUsize::new(0));
    {
        let b = open(dir.path(), ChangeDetection::Watch);
        let counter = Arc::clone(&changes);
        b.on_file_changed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        a.update(|v| v.push("X".to_string())).unwrap();
        b.value().unwrap();
    }
    a.update(|v| v.push("Y".to_string())).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(changes.load(Ordering::SeqCst), 0);
}
