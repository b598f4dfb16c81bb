pub mod change_detector;
pub mod circuit;
pub mod config;
pub mod constants;
pub mod errors;
pub mod fingerprint;
pub mod governor;
pub mod metrics;
pub mod patrol;
pub mod request;
pub mod services;
pub mod similarity;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use change_detector::ChangeDetector;
pub use circuit::{CircuitBreaker, CircuitState};
pub use config::{AppConfig, WatchConfig};
pub use fingerprint::Fingerprinter;
pub use governor::{Governor, RateLimiter};
pub use metrics::Metrics;
pub use patrol::{CycleReport, PatrolScheduler};
pub use request::{FetchResult, RequestManager};
pub use services::{AlertMessage, AlertSink, AlertThrottler, HistoryManager, LogSink, TelegramSink};
pub use similarity::SimilarityEngine;
pub use store::AtomicStore;
