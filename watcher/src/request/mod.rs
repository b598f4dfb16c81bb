pub mod headers;
pub mod manager;
pub mod robots;

pub use manager::RequestManager;

use chrono::{DateTime, Utc};

/// Outcome of one fetch through the gateway. Failures are carried in
/// `error` rather than a Result so coalesced callers all observe the same
/// value.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub content: Option<String>,
    pub status_code: u16,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FetchResult {
    pub fn failure(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: None,
            status_code: 0,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
