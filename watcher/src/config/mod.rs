pub mod manager;

use serde::{Deserialize, Serialize};

pub use manager::AppConfig;

/// Floor applied when clamping `similarity_threshold`; zero would make
/// `should_alert` unsatisfiable.
pub const MIN_SIMILARITY_THRESHOLD: f64 = 0.05;

/// Shortest allowed check interval, seconds
pub const MIN_CHECK_INTERVAL_SECS: u64 = 30;

/// Per-monitor (or user-wide default) detection settings.
///
/// Out-of-range values are clamped on construction and after load, never
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_include_diff")]
    pub include_diff: bool,
    #[serde(default)]
    pub custom_selector: Option<String>,
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_check_interval() -> u64 {
    60
}

fn default_include_diff() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            check_interval_secs: default_check_interval(),
            include_diff: default_include_diff(),
            custom_selector: None,
        }
    }
}

impl WatchConfig {
    pub fn new(
        similarity_threshold: f64,
        check_interval_secs: u64,
        include_diff: bool,
        custom_selector: Option<String>,
    ) -> Self {
        Self {
            similarity_threshold,
            check_interval_secs,
            include_diff,
            custom_selector,
        }
        .sanitized()
    }

    /// Clamp every field into its valid range.
    pub fn sanitized(mut self) -> Self {
        if !self.similarity_threshold.is_finite() {
            self.similarity_threshold = default_similarity_threshold();
        }
        self.similarity_threshold = self
            .similarity_threshold
            .clamp(MIN_SIMILARITY_THRESHOLD, 1.0);
        self.check_interval_secs = self.check_interval_secs.max(MIN_CHECK_INTERVAL_SECS);
        if let Some(selector) = &self.custom_selector {
            if selector.trim().is_empty() {
                self.custom_selector = None;
            }
        }
        self
    }
}
