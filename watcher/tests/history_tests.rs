//! History manager tests: retention, archival, exports, and cleanup.

use std::time::Duration;
use tempfile::TempDir;
use watcher::services::history::decode_archive_block;
use watcher::store::{HistoryEntry, Monitor};
use watcher::HistoryManager;

fn entry(timestamp: &str, change_type: &str, score: f64) -> HistoryEntry {
    HistoryEntry {
        timestamp: timestamp.to_string(),
        change_type: change_type.to_string(),
        similarity_score: score,
        summary: "test".to_string(),
    }
}

#[test]
fn add_entry_appends_a_stamped_row() {
    let dir = TempDir::new().expect("tempdir");
    let history = HistoryManager::new(dir.path());
    let mut monitor = Monitor::new("https://example.com");

    history.add_entry(&mut monitor, "CHANGE", 0.42, "Alerted");

    assert_eq!(monitor.history_log.len(), 1);
    let row = &monitor.history_log[0];
    assert_eq!(row.change_type, "CHANGE");
    assert_eq!(row.similarity_score, 0.42);
    assert_eq!(row.summary, "Alerted");
    assert!(!row.timestamp.is_empty());
}

#[test]
fn aged_entries_move_into_a_decodable_archive_block() {
    let dir = TempDir::new().expect("tempdir");
    let history = HistoryManager::new(dir.path());
    let mut monitor = Monitor::new("https://example.com");
    monitor
        .history_log
        .push(entry("2020-01-01T00:00:00Z", "CHANGE", 0.3));
    monitor
        .history_log
        .push(entry("2020-01-02T00:00:00Z", "MINOR", 0.9));

    history.add_entry(&mut monitor, "CHANGE", 0.5, "Alerted");

    // Only the fresh entry stays active; the two old rows are archived.
    assert_eq!(monitor.history_log.len(), 1);
    assert_eq!(monitor.history_archive.len(), 1);

    let archived = decode_archive_block(&monitor.history_archive[0]).expect("decode block");
    assert_eq!(archived.len(), 2);
    assert_eq!(archived[0].change_type, "CHANGE");
    assert_eq!(archived[1].change_type, "MINOR");
}

#[test]
fn unparsable_timestamps_stay_in_the_active_log() {
    let dir = TempDir::new().expect("tempdir");
    let history = HistoryManager::new(dir.path());
    let mut monitor = Monitor::new("https://example.com");
    monitor.history_log.push(entry("not-a-date", "MINOR", 0.8));

    history.archive_and_prune(&mut monitor, 30);

    assert_eq!(monitor.history_log.len(), 1);
    assert!(monitor.history_archive.is_empty());
}

#[test]
fn csv_export_writes_header_and_two_decimal_scores() {
    let dir = TempDir::new().expect("tempdir");
    let history = HistoryManager::new(dir.path());
    let mut monitor = Monitor::new("https://example.com/prices");
    monitor
        .history_log
        .push(entry("2026-07-01T00:00:00Z", "CHANGE", 0.4242));

    let path = history.export_csv(&monitor).expect("export");
    assert!(path
        .file_name()
        .and_then(|name| name.to_str())
        .expect("filename")
        .starts_with("https_example.com_prices"));

    let rendered = std::fs::read_to_string(&path).expect("read export");
    assert!(rendered.starts_with("Timestamp (UTC),Change Type,Similarity Score,Summary"));
    assert!(rendered.contains("0.42"));
    assert!(rendered.contains("CHANGE"));
}

#[test]
fn json_export_wraps_url_and_history() {
    let dir = TempDir::new().expect("tempdir");
    let history = HistoryManager::new(dir.path());
    let mut monitor = Monitor::new("https://example.com");
    monitor
        .history_log
        .push(entry("2026-07-01T00:00:00Z", "MINOR", 0.91));

    let path = history.export_json(&monitor).expect("export");
    let payload: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).expect("read export")).expect("valid json");
    assert_eq!(
        payload.get("url").and_then(|v| v.as_str()),
        Some("https://example.com")
    );
    assert!(payload.get("exported_at").is_some());
    assert_eq!(
        payload
            .get("history")
            .and_then(|v| v.as_array())
            .map(|rows| rows.len()),
        Some(1)
    );
}

#[test]
fn cleanup_removes_stale_exports() {
    let dir = TempDir::new().expect("tempdir");
    let history = HistoryManager::new(dir.path());
    let mut monitor = Monitor::new("https://example.com");
    monitor
        .history_log
        .push(entry("2026-07-01T00:00:00Z", "MINOR", 0.9));
    let path = history.export_csv(&monitor).expect("export");
    assert!(path.exists());

    // With a zero-minute horizon anything written before now is stale.
    std::thread::sleep(Duration::from_millis(1100));
    let removed = history.cleanup_exports(0);
    assert_eq!(removed, 1);
    assert!(!path.exists());
}
