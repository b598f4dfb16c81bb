//! Process health metrics
//!
//! One instance is created at startup and shared by reference everywhere
//! observations happen: the fetch gateway, the store writer, and the
//! patrol loop. `get_system_status` backs the health endpoint.

use crate::constants::metrics as limits;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::warn;

#[derive(Debug, Default, Clone)]
struct HourBucket {
    success: u64,
    fail: u64,
    count: u64,
}

#[derive(Debug, Default)]
struct MetricsInner {
    buckets: HashMap<i64, HourBucket>,
    total_latency: f64,
    request_count: u64,
    db_latencies: VecDeque<f64>,
    active_workers: u64,
    total_workers: u64,
}

pub struct Metrics {
    started: Instant,
    inner: Mutex<MetricsInner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub avg_request_latency_sec: f64,
    pub avg_db_write_latency_sec: f64,
    pub success_rate_24h_percent: f64,
    pub total_requests_24h: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub active: u64,
    pub total: u64,
    pub saturation_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub disk_free_mb: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub performance: PerformanceStats,
    pub workers: WorkerStats,
    pub system: SystemStats,
    pub alerts: Vec<String>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    fn locked(&self) -> MutexGuard<'_, MetricsInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record one web request outcome into the global latency average and
    /// the 24 h hour buckets; stale buckets are pruned on every record.
    pub fn record_request(&self, latency_secs: f64, success: bool) {
        let mut inner = self.locked();
        inner.total_latency += latency_secs;
        inner.request_count += 1;

        let now = Utc::now().timestamp();
        let hour = now / 3600 * 3600;
        let cutoff = now - 24 * 3600;
        inner.buckets.retain(|stamp, _| *stamp >= cutoff);

        let bucket = inner.buckets.entry(hour).or_default();
        bucket.count += 1;
        if success {
            bucket.success += 1;
        } else {
            bucket.fail += 1;
        }
    }

    pub fn record_db_operation(&self, latency_secs: f64) {
        let mut inner = self.locked();
        inner.db_latencies.push_back(latency_secs);
        while inner.db_latencies.len() > limits::DB_LATENCY_RING {
            inner.db_latencies.pop_front();
        }
    }

    pub fn update_worker_stats(&self, active: u64, total: u64) {
        let mut inner = self.locked();
        inner.active_workers = active;
        inner.total_workers = total;
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let inner = self.locked();

        let (total_requests, total_success) = inner
            .buckets
            .values()
            .fold((0u64, 0u64), |(count, success), bucket| {
                (count + bucket.count, success + bucket.success)
            });
        let success_rate = if total_requests > 0 {
            total_success as f64 / total_requests as f64 * 100.0
        } else {
            100.0
        };

        let avg_latency = if inner.request_count > 0 {
            inner.total_latency / inner.request_count as f64
        } else {
            0.0
        };
        let avg_db_latency = if inner.db_latencies.is_empty() {
            0.0
        } else {
            inner.db_latencies.iter().sum::<f64>() / inner.db_latencies.len() as f64
        };

        let disk_free_mb = match fs2::available_space(Path::new(".")) {
            Ok(bytes) => bytes / (1024 * 1024),
            Err(e) => {
                warn!("failed to read free disk space: {}", e);
                0
            }
        };

        let saturation = if inner.total_workers > 0 {
            inner.active_workers as f64 / inner.total_workers as f64 * 100.0
        } else {
            0.0
        };

        let mut alerts = Vec::new();
        if success_rate < limits::SUCCESS_RATE_FLOOR
            && total_requests > limits::MIN_REQUESTS_FOR_RATE_ALERT
        {
            alerts.push("CRITICAL: Success rate below 80%".to_string());
        }
        if disk_free_mb < limits::LOW_DISK_MB {
            alerts.push("CRITICAL: Low Disk Space".to_string());
        }

        SystemStatus {
            timestamp: crate::store::utc_now_iso(),
            uptime_seconds: self.started.elapsed().as_secs(),
            performance: PerformanceStats {
                avg_request_latency_sec: round(avg_latency, 3),
                avg_db_write_latency_sec: round(avg_db_latency, 3),
                success_rate_24h_percent: round(success_rate, 2),
                total_requests_24h: total_requests,
            },
            workers: WorkerStats {
                active: inner.active_workers,
                total: inner.total_workers,
                saturation_percent: round(saturation, 1),
            },
            system: SystemStats { disk_free_mb },
            alerts,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn round(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
