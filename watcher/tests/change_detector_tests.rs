//! Change detector tests: safe diff rendering and snapshot rotation.

use watcher::store::{ChangeType, Monitor};
use watcher::ChangeDetector;

#[test]
fn identical_texts_produce_no_diff() {
    let detector = ChangeDetector::new();
    assert_eq!(
        detector.generate_safe_diff("same\nlines", "same\nlines"),
        "No differences found."
    );
}

#[test]
fn empty_side_yields_the_no_history_message() {
    let detector = ChangeDetector::new();
    assert_eq!(
        detector.generate_safe_diff("", "new"),
        "No history available for diff."
    );
    assert_eq!(
        detector.generate_safe_diff("old", ""),
        "No history available for diff."
    );
}

#[test]
fn small_diff_is_fenced_with_headers() {
    let detector = ChangeDetector::new();
    let rendered = detector.generate_safe_diff("alpha\nbeta\ngamma", "alpha\nBETA\ngamma");
    assert!(rendered.starts_with("```diff\n"));
    assert!(rendered.ends_with("\n```"));
    assert!(rendered.contains("Previous"));
    assert!(rendered.contains("Current"));
    assert!(rendered.contains("-beta"));
    assert!(rendered.contains("+BETA"));
}

#[test]
fn oversized_diff_truncates_with_pre_truncation_stats() {
    let detector = ChangeDetector::new();
    let old_text: String = (0..120)
        .map(|index| format!("original line number {index} with some padding\n"))
        .collect();
    let new_text: String = (0..120)
        .map(|index| format!("replaced line number {index} with some padding\n"))
        .collect();

    let rendered = detector.generate_safe_diff(&old_text, &new_text);
    assert!(rendered.contains("(Diff Truncated)"));
    assert!(
        rendered.contains("+120 lines, -120 lines"),
        "stats must be counted before truncation: {}",
        rendered.lines().last().unwrap_or_default()
    );
    // Fence plus trailer stays well under the raw diff size.
    assert!(rendered.chars().count() < 3300);
}

#[test]
fn snapshots_rotate_out_the_oldest_beyond_three() {
    let detector = ChangeDetector::new();
    let mut monitor = Monitor::new("https://example.com");

    for round in 0..5 {
        detector.create_snapshot(
            &mut monitor,
            &format!("<html>revision {round}</html>"),
            ChangeType::ContentUpdate,
        );
    }

    assert_eq!(monitor.forensic_snapshots.len(), 3);
    let oldest = monitor.forensic_snapshots[0]
        .decompress()
        .expect("decompress");
    let newest = monitor.forensic_snapshots[2]
        .decompress()
        .expect("decompress");
    assert_eq!(oldest, "<html>revision 2</html>");
    assert_eq!(newest, "<html>revision 4</html>");
}

#[test]
fn snapshot_payload_round_trips_through_compression() {
    let detector = ChangeDetector::new();
    let mut monitor = Monitor::new("https://example.com");
    let body = "<html><body><p>Unicode too: héllo wörld</p></body></html>";
    detector.create_snapshot(&mut monitor, body, ChangeType::UiTweak);

    let snapshot = &monitor.forensic_snapshots[0];
    assert_eq!(snapshot.change_type, ChangeType::UiTweak);
    assert_eq!(snapshot.decompress().expect("decompress"), body);
}
