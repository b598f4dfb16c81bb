//! Outbound alert throttling
//!
//! Alerts enqueue without blocking; a single worker drains the FIFO,
//! acquiring one alert-bucket token per message so the global send rate
//! holds no matter how many monitors fire at once. Dispatch failures are
//! logged, never propagated back to the patrol.

use crate::constants::governor as limits;
use crate::governor::Governor;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// An opaque "send this" task from the throttler's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub chat_id: String,
    pub text: String,
}

/// Transport seam. The core never knows what carries the message.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<()>;
}

pub struct AlertThrottler {
    tx: mpsc::UnboundedSender<AlertMessage>,
    depth: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AlertThrottler {
    pub fn new(governor: Arc<Governor>, sink: Arc<dyn AlertSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AlertMessage>();
        let depth = Arc::new(AtomicUsize::new(0));
        let queue_depth = depth.clone();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                queue_depth.fetch_sub(1, Ordering::SeqCst);
                governor.alerts.acquire().await;
                if let Err(e) = sink.send(&message).await {
                    error!("failed to dispatch alert to {}: {:#}", message.chat_id, e);
                }
            }
            debug!("alert dispatcher stopped");
        });
        Self {
            tx,
            depth,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Never blocks the caller; a closed queue only logs.
    pub fn enqueue(&self, message: AlertMessage) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(message).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            warn!("alert queue closed, dropping message");
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Back-pressure signal consumed by the patrol scheduler.
    pub fn is_congested(&self) -> bool {
        self.queue_depth() > limits::CONGESTION_QUEUE_DEPTH
    }

    pub async fn shutdown(&self) {
        let handle = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

/// Telegram Bot API transport.
pub struct TelegramSink {
    client: Client,
    token: String,
}

impl TelegramSink {
    pub fn new(token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client for alert transport");
        Self {
            client,
            token: token.into(),
        }
    }
}

#[async_trait]
impl AlertSink for TelegramSink {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        let endpoint = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let payload = serde_json::json!({
            "chat_id": message.chat_id,
            "text": message.text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let response = timeout(
            Duration::from_secs(10),
            self.client.post(&endpoint).json(&payload).send(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("alert dispatch timed out"))??;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable response body".to_string());
            anyhow::bail!("alert transport returned {}: {}", status, body);
        }
        Ok(())
    }
}

/// Fallback when no transport credential is configured.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        info!("[alert:{}] {}", message.chat_id, message.text);
        Ok(())
    }
}
