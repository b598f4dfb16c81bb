//! Safe diff rendering and forensic snapshot rotation.

use crate::constants::change as limits;
use crate::store::{ChangeType, ForensicSnapshot, Monitor};
use similar::TextDiff;

pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Unified diff bounded for downstream message formatting. Oversized
    /// diffs truncate on a newline boundary with pre-truncation stats
    /// appended.
    pub fn generate_safe_diff(&self, old_text: &str, new_text: &str) -> String {
        if old_text.is_empty() || new_text.is_empty() {
            return "No history available for diff.".to_string();
        }
        if old_text == new_text {
            return "No differences found.".to_string();
        }

        let diff = TextDiff::from_lines(old_text, new_text);
        let rendered = diff
            .unified_diff()
            .context_radius(3)
            .header("Previous", "Current")
            .to_string();
        if rendered.trim().is_empty() {
            return "No differences found.".to_string();
        }

        if rendered.chars().count() <= limits::MAX_DIFF_CHARS {
            return format!("```diff\n{}\n```", rendered.trim_end());
        }

        // Stats are counted before truncation; the +++/--- file headers
        // are excluded.
        let (added, removed) = count_changes(&rendered);
        let cut = rendered
            .char_indices()
            .nth(limits::MAX_DIFF_CHARS)
            .map(|(index, _)| index)
            .unwrap_or(rendered.len());
        let mut truncated = &rendered[..cut];
        if let Some(newline) = truncated.rfind('\n') {
            if newline > 0 {
                truncated = &truncated[..newline];
            }
        }
        format!(
            "```diff\n{}\n```\n... (Diff Truncated)\n📊 Stats: +{} lines, -{} lines.",
            truncated, added, removed
        )
    }

    /// Append a compressed snapshot of the new body and rotate out the
    /// oldest beyond the cap.
    pub fn create_snapshot(&self, monitor: &mut Monitor, content: &str, change_type: ChangeType) {
        monitor
            .forensic_snapshots
            .push(ForensicSnapshot::create(content, change_type));
        while monitor.forensic_snapshots.len() > limits::SNAPSHOT_LIMIT {
            monitor.forensic_snapshots.remove(0);
        }
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn count_changes(rendered: &str) -> (usize, usize) {
    let mut added = 0;
    let mut removed = 0;
    for line in rendered.lines() {
        if line.starts_with('+') && !line.starts_with("+++") {
            added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            removed += 1;
        }
    }
    (added, removed)
}
