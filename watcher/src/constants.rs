//! Central repository for timeouts, intervals, and limits
//!
//! Constants are grouped by the component they govern so every magic
//! number has a single source of truth.

#![allow(dead_code)] // Some constants are defined for collaborator surfaces

use std::time::Duration;

/// Fetch gateway timing
pub mod http {
    use super::Duration;

    /// Hard ceiling wrapping an entire outbound page fetch
    pub const HARD_TIMEOUT: Duration = Duration::from_secs(15);

    /// Timeout for fetching a robots.txt file
    pub const ROBOTS_TIMEOUT: Duration = Duration::from_secs(5);

    /// Lifetime of a cached fetch result
    pub const CACHE_TTL: Duration = Duration::from_secs(30);

    /// Lower bound of the pre-fetch jitter window, seconds
    pub const MIN_JITTER_SECS: f64 = 1.0;

    /// Upper bound of the pre-fetch jitter window, seconds
    pub const MAX_JITTER_SECS: f64 = 5.0;
}

/// Per-key circuit breaker defaults
pub mod circuit {
    use super::Duration;

    /// Consecutive failures before the breaker opens
    pub const FAILURE_THRESHOLD: u32 = 3;

    /// Cooldown before an open breaker allows a probe request
    pub const RECOVERY_TIMEOUT: Duration = Duration::from_secs(3600);
}

/// Token bucket rates
pub mod governor {
    /// Outbound web requests per second
    pub const WEB_RATE: f64 = 5.0;

    /// Outbound web burst capacity
    pub const WEB_BURST: u32 = 5;

    /// Outbound alert messages per second (margin under the 30/s ceiling)
    pub const ALERT_RATE: f64 = 25.0;

    /// Outbound alert burst capacity
    pub const ALERT_BURST: u32 = 25;

    /// Alert queue depth above which the patrol applies back-pressure
    pub const CONGESTION_QUEUE_DEPTH: usize = 50;
}

/// Persistence limits
pub mod store {
    /// Minimum free disk space required before a write is attempted
    pub const MIN_FREE_DISK_BYTES: u64 = 10 * 1024 * 1024;

    /// Number of rolling backup files retained next to the store
    pub const BACKUP_RETAIN: usize = 5;
}

/// Patrol loop timing
pub mod patrol {
    use super::Duration;

    /// Interval between patrol cycles
    pub const CYCLE_INTERVAL: Duration = Duration::from_secs(60);

    /// Grace delay before the first cycle after startup
    pub const STARTUP_DELAY: Duration = Duration::from_secs(10);

    /// Interval between export cleanup runs
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

    /// Age at which export files are deleted, minutes
    pub const EXPORT_MAX_AGE_MINUTES: u64 = 60;

    /// 429 responses tolerated before the user is notified
    pub const RATE_LIMIT_STRIKES: u32 = 3;
}

/// History retention
pub mod history {
    /// Days of history kept in the active log before archival
    pub const RETENTION_DAYS: i64 = 30;
}

/// Change detector limits
pub mod change {
    /// Maximum rendered diff length in characters
    pub const MAX_DIFF_CHARS: usize = 3000;

    /// Forensic snapshots retained per monitor
    pub const SNAPSHOT_LIMIT: usize = 3;
}

/// Metrics thresholds
pub mod metrics {
    /// Size of the DB write latency ring
    pub const DB_LATENCY_RING: usize = 1000;

    /// Free disk floor before a critical alert, megabytes
    pub const LOW_DISK_MB: u64 = 500;

    /// 24 h success rate floor before a critical alert, percent
    pub const SUCCESS_RATE_FLOOR: f64 = 80.0;

    /// Minimum 24 h request count before the success-rate alert applies
    pub const MIN_REQUESTS_FOR_RATE_ALERT: u64 = 10;
}
