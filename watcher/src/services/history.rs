//! History retention and export
//!
//! Every patrol decision appends one entry; entries past the retention
//! horizon move into compressed archive blocks on the monitor. Exports
//! render the active log to CSV or JSON files that a collaborator ships
//! to the user and a cleanup job later deletes.

use crate::constants::history as limits;
use crate::store::{utc_now_iso, HistoryEntry, Monitor};
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

pub struct HistoryManager {
    exports_dir: PathBuf,
}

impl HistoryManager {
    pub fn new(exports_dir: impl Into<PathBuf>) -> Self {
        Self {
            exports_dir: exports_dir.into(),
        }
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    /// Append a decision entry stamped now, then archive anything past
    /// the retention horizon.
    pub fn add_entry(&self, monitor: &mut Monitor, change_type: &str, score: f64, summary: &str) {
        monitor.history_log.push(HistoryEntry {
            timestamp: utc_now_iso(),
            change_type: change_type.to_string(),
            similarity_score: score,
            summary: summary.to_string(),
        });
        self.archive_and_prune(monitor, limits::RETENTION_DAYS);
    }

    /// Move entries older than `days_to_keep` into a compressed archive
    /// block. On serialization failure everything stays in the active
    /// log; history is never silently lost.
    pub fn archive_and_prune(&self, monitor: &mut Monitor, days_to_keep: i64) {
        if monitor.history_log.is_empty() {
            return;
        }
        let cutoff = Utc::now() - chrono::Duration::days(days_to_keep);
        let mut active = Vec::new();
        let mut aged = Vec::new();
        for entry in monitor.history_log.drain(..) {
            match DateTime::parse_from_rfc3339(&entry.timestamp) {
                Ok(stamp) if stamp.with_timezone(&Utc) < cutoff => aged.push(entry),
                Ok(_) => active.push(entry),
                Err(e) => {
                    warn!(
                        "keeping history entry with unparsable timestamp '{}': {}",
                        entry.timestamp, e
                    );
                    active.push(entry);
                }
            }
        }

        if !aged.is_empty() {
            match compress_entries(&aged) {
                Ok(block) => {
                    info!("archived {} history entries for {}", aged.len(), monitor.url);
                    monitor.history_archive.push(block);
                }
                Err(e) => {
                    warn!(
                        "history archival failed for {}, keeping entries active: {}",
                        monitor.url, e
                    );
                    aged.extend(active);
                    active = aged;
                }
            }
        }
        monitor.history_log = active;
    }

    pub fn export_csv(&self, monitor: &Monitor) -> Result<PathBuf> {
        fs::create_dir_all(&self.exports_dir)?;
        let path = self
            .exports_dir
            .join(format!("{}_history.csv", sanitize_url(&monitor.url)));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(["Timestamp (UTC)", "Change Type", "Similarity Score", "Summary"])?;
        for entry in &monitor.history_log {
            let score = format!("{:.2}", entry.similarity_score);
            writer.write_record([
                entry.timestamp.as_str(),
                entry.change_type.as_str(),
                score.as_str(),
                entry.summary.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }

    pub fn export_json(&self, monitor: &Monitor) -> Result<PathBuf> {
        fs::create_dir_all(&self.exports_dir)?;
        let path = self
            .exports_dir
            .join(format!("{}_history.json", sanitize_url(&monitor.url)));
        let payload = serde_json::json!({
            "url": monitor.url,
            "exported_at": utc_now_iso(),
            "history": monitor.history_log,
        });
        fs::write(&path, serde_json::to_vec_pretty(&payload)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// Delete export files older than the cutoff; returns how many went.
    pub fn cleanup_exports(&self, max_age_minutes: u64) -> usize {
        let Ok(entries) = fs::read_dir(&self.exports_dir) else {
            return 0;
        };
        let cutoff = SystemTime::now() - Duration::from_secs(max_age_minutes * 60);
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let stale = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if stale && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("removed {} stale export files", removed);
        }
        removed
    }
}

/// Decode an archive block back into entries; the inverse of archival,
/// used by export tooling and tests.
pub fn decode_archive_block(block: &str) -> Result<Vec<HistoryEntry>> {
    let decoded = BASE64.decode(block)?;
    let mut decoder = ZlibDecoder::new(decoded.as_slice());
    let mut payload = Vec::new();
    decoder.read_to_end(&mut payload)?;
    Ok(serde_json::from_slice(&payload)?)
}

fn compress_entries(entries: &[HistoryEntry]) -> Result<String> {
    let payload = serde_json::to_vec(entries)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload)?;
    Ok(BASE64.encode(encoder.finish()?))
}

fn sanitize_url(url: &str) -> String {
    url.replace("://", "_").replace('/', "_")
}
