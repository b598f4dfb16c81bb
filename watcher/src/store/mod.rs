//! Store data model
//!
//! The entire state of the service is one versioned JSON document:
//! a map from chat id to that user's configuration and monitors.
//! `atomic` holds the single-writer persistence queue, `migration` the
//! legacy-shape conversions.

pub mod atomic;
pub mod migration;

pub use atomic::AtomicStore;

use crate::config::WatchConfig;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};

/// Version stamped into every document written to disk.
pub const SCHEMA_VERSION: &str = "2.0";

/// Current UTC time as an ISO-8601 string.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Magnitude of a detected change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    UiTweak,
    ContentUpdate,
    MajorOverhaul,
    InitialBaseline,
}

/// Stable content identity for a monitored page.
///
/// Two fingerprints with equal `hash` are the same content. Legacy
/// migrations produce `version = "legacy"` with empty weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: String,
    pub version: String,
    pub algorithm: String,
    #[serde(default)]
    pub content_weights: HashMap<String, f64>,
    #[serde(default)]
    pub structure_signature: String,
}

/// Compressed copy of a page body kept for diffing and recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicSnapshot {
    pub timestamp: String,
    pub change_type: ChangeType,
    /// zlib-deflated, base64-encoded page body
    pub compressed_content: String,
}

impl ForensicSnapshot {
    pub fn create(content: &str, change_type: ChangeType) -> Self {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let compressed = encoder
            .write_all(content.as_bytes())
            .and_then(|_| encoder.finish())
            .unwrap_or_default();
        Self {
            timestamp: utc_now_iso(),
            change_type,
            compressed_content: BASE64.encode(compressed),
        }
    }

    pub fn decompress(&self) -> Result<String> {
        let decoded = BASE64.decode(&self.compressed_content)?;
        let mut decoder = ZlibDecoder::new(decoded.as_slice());
        let mut body = String::new();
        decoder.read_to_string(&mut body)?;
        Ok(body)
    }
}

/// One row of a monitor's decision history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub change_type: String,
    pub similarity_score: f64,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorMetadata {
    #[serde(default = "utc_now_iso")]
    pub created_at: String,
    #[serde(default)]
    pub last_check: Option<String>,
    #[serde(default)]
    pub check_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default = "default_breaker_state")]
    pub circuit_breaker_state: String,
    #[serde(default)]
    pub rate_limit_count: u32,
    #[serde(default)]
    pub snooze_until: Option<String>,
}

fn default_breaker_state() -> String {
    "CLOSED".to_string()
}

impl Default for MonitorMetadata {
    fn default() -> Self {
        Self {
            created_at: utc_now_iso(),
            last_check: None,
            check_count: 0,
            failure_count: 0,
            circuit_breaker_state: default_breaker_state(),
            rate_limit_count: 0,
            snooze_until: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub url: String,
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub metadata: MonitorMetadata,
    #[serde(default)]
    pub forensic_snapshots: Vec<ForensicSnapshot>,
    #[serde(default)]
    pub history_log: Vec<HistoryEntry>,
    /// Compressed base64 blocks of history entries past the retention horizon
    #[serde(default)]
    pub history_archive: Vec<String>,
    #[serde(default)]
    pub config: Option<WatchConfig>,
}

impl Monitor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fingerprint: None,
            metadata: MonitorMetadata::default(),
            forensic_snapshots: Vec::new(),
            history_log: Vec::new(),
            history_archive: Vec::new(),
            config: None,
        }
    }

    /// Suppress patrol activity for this monitor until `minutes` from now.
    pub fn snooze(&mut self, minutes: i64) {
        let until = Utc::now() + chrono::Duration::minutes(minutes);
        self.metadata.snooze_until = Some(until.to_rfc3339_opts(SecondsFormat::Micros, true));
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserData {
    #[serde(default)]
    pub user_config: WatchConfig,
    #[serde(default)]
    pub monitors: Vec<Monitor>,
}

impl UserData {
    /// A URL is unique within a user's monitors; re-watching replaces.
    pub fn upsert_monitor(&mut self, monitor: Monitor) {
        self.monitors.retain(|m| m.url != monitor.url);
        self.monitors.push(monitor);
    }

    pub fn remove_monitor(&mut self, url: &str) -> bool {
        let before = self.monitors.len();
        self.monitors.retain(|m| m.url != url);
        self.monitors.len() < before
    }

    pub fn monitor(&self, url: &str) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.url == url)
    }

    pub fn monitor_mut(&mut self, url: &str) -> Option<&mut Monitor> {
        self.monitors.iter_mut().find(|m| m.url == url)
    }

    pub fn effective_config<'a>(&'a self, monitor: &'a Monitor) -> &'a WatchConfig {
        monitor.config.as_ref().unwrap_or(&self.user_config)
    }
}

/// Wire shape of the on-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    pub schema_version: String,
    pub updated_at: String,
    pub data: BTreeMap<String, UserData>,
}
