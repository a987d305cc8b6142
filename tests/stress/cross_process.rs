//! Store updates from separate OS processes.
//!
//! Each `secstore add-user` invocation is its own process doing one
//! read-modify-write through `ObjectStore::update`. The named file lock is
//! the only thing ordering them, so every user must survive.
//!
//! Registered as a [[test]] in the secstore-cli crate so that
//! CARGO_BIN_EXE_secstore is available.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;
use std::time::{Duration, Instant};

use secstore::{ChangeDetection, ObjectStore, StoreOptions, UserStore};

const PROCESSES: usize = 4;
const USERS_PER_PROCESS: usize = 8;

/// Write a provider config sharing one lock directory and return its path.
fn write_config(dir: &Path) -> PathBuf {
    let config = serde_json::json!({
        "password_format": "clear",
        "store": {
            "lock_dir": dir.join("locks"),
            "change_detection": "disabled",
        },
    });
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&config).unwrap()).unwrap();
    path
}

fn add_user(config: &Path, store: &Path, name: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_secstore"))
        .arg("--config")
        .arg(config)
        .arg("add-user")
        .arg(store)
        .arg(name)
        .args(["--password", "pw"])
        .output()
        .expect("failed to execute secstore")
}

fn open(dir: &Path, detection: ChangeDetection) -> UserStore {
    let options = StoreOptions {
        lock_dir: Some(dir.join("locks")),
        change_detection: detection,
        poll_interval_ms: 20,
        ..StoreOptions::default()
    };
    ObjectStore::with_options(dir.join("users.json"), options).unwrap()
}

fn user_names(store: &UserStore) -> Vec<String> {
    store
        .value()
        .unwrap()
        .into_iter()
        .map(|u| u.user_name)
        .collect()
}

#[test]
fn concurrent_processes_lose_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let users = dir.path().join("users.json");

    thread::scope(|s| {
        for p in 0..PROCESSES {
            let (config, users) = (&config, &users);
            s.spawn(move || {
                for i in 0..USERS_PER_PROCESS {
                    let output = add_user(config, users, &format!("p{p}-u{i}"));
                    assert!(
                        output.status.success(),
                        "p{p}-u{i}: {}",
                        String::from_utf8_lossy(&output.stderr)
                    );
                }
            });
        }
    });

    let store = open(dir.path(), ChangeDetection::Disabled);
    let names: BTreeSet<String> = user_names(&store).into_iter().collect();
    let expected: BTreeSet<String> = (0..PROCESSES)
        .flat_map(|p| (0..USERS_PER_PROCESS).map(move |i| format!("p{p}-u{i}")))
        .collect();
    assert_eq!(names, expected);
    assert_eq!(user_names(&store).len(), PROCESSES * USERS_PER_PROCESS);
}

#[test]
fn racing_processes_add_a_name_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let users = dir.path().join("users.json");

    let outputs: Vec<Output> = thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| s.spawn(|| add_user(&config, &users, "shared")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let succeeded = outputs.iter().filter(|o| o.status.success()).count();
    assert_eq!(succeeded, 1);
    for failed in outputs.iter().filter(|o| !o.status.success()) {
        assert!(String::from_utf8_lossy(&failed.stderr).contains("already exists"));
    }

    let store = open(dir.path(), ChangeDetection::Disabled);
    assert_eq!(user_names(&store), vec!["shared"]);
}

#[test]
fn reader_sees_writes_from_another_process() {
    for detection in [ChangeDetection::Watch, ChangeDetection::Poll] {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());
        let users = dir.path().join("users.json");

        let reader = open(dir.path(), detection);
        assert!(user_names(&reader).is_empty());

        for name in ["x", "y"] {
            assert!(add_user(&config, &users, name).status.success());
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while user_names(&reader).len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(user_names(&reader), vec!["x", "y"], "{detection:?}");
    }
}
