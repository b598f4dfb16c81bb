//! Shared test utilities: alert sinks, request manager builders, store
//! helpers, and sample page fixtures.

// Allow unused code in test fixtures - they are utilities shared across suites
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use watcher::services::{AlertMessage, AlertSink};
use watcher::store::{Monitor, UserData};
use watcher::{AtomicStore, Metrics, RequestManager};

/// Sink that records every dispatched message.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<AlertMessage>>,
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, message: &AlertMessage) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("recording sink lock")
            .push(message.clone());
        Ok(())
    }
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<AlertMessage> {
        self.sent.lock().expect("recording sink lock").clone()
    }
}

/// Sink that never completes; keeps the throttler queue full.
pub struct StalledSink;

#[async_trait]
impl AlertSink for StalledSink {
    async fn send(&self, _message: &AlertMessage) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// Request manager with no jitter and a short hard deadline, so suites
/// run in seconds instead of minutes.
pub fn quick_request_manager(metrics: Arc<Metrics>) -> RequestManager {
    RequestManager::with_settings(metrics, Duration::from_secs(2), (0.0, 0.0))
}

pub fn store_at(path: impl Into<std::path::PathBuf>) -> AtomicStore {
    AtomicStore::new(path, Arc::new(Metrics::new()))
}

/// One-user store payload with the given monitors.
pub fn single_user(chat_id: &str, monitors: Vec<Monitor>) -> BTreeMap<String, UserData> {
    let mut data = BTreeMap::new();
    data.insert(
        chat_id.to_string(),
        UserData {
            monitors,
            ..UserData::default()
        },
    );
    data
}

pub fn page_with_body(body: &str) -> String {
    format!(
        "<html><head><title>Sample</title></head><body>{}</body></html>",
        body
    )
}
