//! Atomic store tests
//!
//! These verify the write-temp-fsync-rename discipline: a committed file
//! always carries the current schema version, no temp file survives, the
//! backup ring stays capped, and queued writes serialize so the last
//! submitted document is the one on disk.

mod common;

use common::{single_user, store_at};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use watcher::store::{Monitor, SCHEMA_VERSION};

#[tokio::test]
async fn write_then_load_round_trips() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path().join("db.json"));

    let data = single_user("100", vec![Monitor::new("https://example.com")]);
    store.write(data.clone()).await.expect("write");

    let loaded = store.load().await.expect("load");
    assert_eq!(loaded.len(), 1);
    let user = loaded.get("100").expect("user present");
    assert_eq!(user.monitors.len(), 1);
    assert_eq!(user.monitors[0].url, "https://example.com");
    store.shutdown().await;
}

#[tokio::test]
async fn committed_file_is_versioned_and_leaves_no_temp() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("db.json");
    let store = store_at(path.clone());

    store
        .write(single_user("7", vec![Monitor::new("https://site.test")]))
        .await
        .expect("write");

    let raw = std::fs::read(&path).expect("store file exists");
    let document: Value = serde_json::from_slice(&raw).expect("valid json");
    assert_eq!(
        document.get("schema_version").and_then(Value::as_str),
        Some(SCHEMA_VERSION)
    );
    assert!(document.get("updated_at").is_some());
    assert!(document.get("data").is_some());

    let tmp = dir.path().join("db.json.tmp");
    assert!(!tmp.exists(), "temp file must not survive a commit");
    store.shutdown().await;
}

#[tokio::test]
async fn backups_roll_and_stay_capped_at_five() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path().join("db.json"));

    for round in 0..8 {
        let data = single_user(
            "1",
            vec![Monitor::new(format!("https://example.com/{round}"))],
        );
        store.write(data).await.expect("write");
    }
    store.shutdown().await;

    let backups: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("db.json.backup_")
        })
        .collect();
    assert!(!backups.is_empty(), "writes over an existing file must back it up");
    assert!(backups.len() <= 5, "got {} backups", backups.len());
}

#[tokio::test]
async fn sequential_writes_serialize_and_the_last_wins() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(store_at(dir.path().join("db.json")));

    for round in 0..10 {
        let data = single_user("42", vec![Monitor::new(format!("https://host/{round}"))]);
        store.write(data).await.expect("write");
    }

    let loaded = store.load().await.expect("load");
    assert_eq!(loaded.get("42").expect("user").monitors[0].url, "https://host/9");
    store.shutdown().await;
}

#[tokio::test]
async fn concurrent_writes_never_corrupt_the_file() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(store_at(dir.path().join("db.json")));

    let writers: Vec<_> = (0..10)
        .map(|round| {
            let store = store.clone();
            tokio::spawn(async move {
                let data = single_user("9", vec![Monitor::new(format!("https://host/{round}"))]);
                store.write(data).await
            })
        })
        .collect();
    for writer in writers {
        writer.await.expect("join").expect("write");
    }

    // Whatever ordering the queue saw, the file is a complete document.
    let loaded = store.load().await.expect("load");
    let user = loaded.get("9").expect("user");
    assert_eq!(user.monitors.len(), 1);
    assert!(user.monitors[0].url.starts_with("https://host/"));
    store.shutdown().await;
}

#[tokio::test]
async fn missing_file_loads_as_an_empty_store() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path().join("absent.json"));
    let loaded = store.load().await.expect("load");
    assert!(loaded.is_empty());
    store.shutdown().await;
}

#[tokio::test]
async fn timestamps_are_canonicalized_on_write() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("db.json");
    let store = store_at(path.clone());

    let mut monitor = Monitor::new("https://example.com");
    // A non-UTC offset must be rewritten to canonical UTC on disk.
    monitor.metadata.created_at = "2026-01-15T10:00:00+02:00".to_string();
    store.write(single_user("5", vec![monitor])).await.expect("write");
    store.shutdown().await;

    let raw = std::fs::read_to_string(&path).expect("read store");
    assert!(!raw.contains("+02:00"), "offset timestamps must be normalized");
    assert!(raw.contains("2026-01-15T08:00:00"));
}
