//! Rate governor and alert throttler tests
//!
//! Token buckets must admit the burst instantly and pace everything
//! after; the throttler must preserve FIFO order and expose queue-depth
//! congestion for patrol back-pressure.

mod common;

use common::{RecordingSink, StalledSink};
use std::sync::Arc;
use std::time::{Duration, Instant};
use watcher::services::AlertMessage;
use watcher::{AlertThrottler, Governor, RateLimiter};

#[tokio::test]
async fn burst_is_instant_then_acquires_pace() {
    let limiter = RateLimiter::new(10.0, 2);

    let started = Instant::now();
    limiter.acquire().await;
    limiter.acquire().await;
    assert!(started.elapsed() < Duration::from_millis(50), "burst must not wait");

    limiter.acquire().await;
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(80),
        "third token should be paced, got {:?}",
        elapsed
    );
    assert!(elapsed < Duration::from_millis(500));
}

#[tokio::test]
async fn governor_carries_both_budgets() {
    let governor = Governor::new();
    // Both buckets start full; one token from each comes back instantly.
    let started = Instant::now();
    governor.web.acquire().await;
    governor.alerts.acquire().await;
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[tokio::test]
async fn throttler_dispatches_in_enqueue_order() {
    let sink = Arc::new(RecordingSink::default());
    let throttler = AlertThrottler::new(Arc::new(Governor::new()), sink.clone());

    for index in 0..3 {
        throttler.enqueue(AlertMessage {
            chat_id: "chat".to_string(),
            text: format!("message {index}"),
        });
    }

    let mut waited = 0;
    while sink.messages().len() < 3 && waited < 40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += 1;
    }

    let messages = sink.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].text, "message 0");
    assert_eq!(messages[1].text, "message 1");
    assert_eq!(messages[2].text, "message 2");
    throttler.shutdown().await;
}

#[tokio::test]
async fn deep_queue_reports_congestion() {
    let throttler = AlertThrottler::new(Arc::new(Governor::new()), Arc::new(StalledSink));
    assert!(!throttler.is_congested());

    for index in 0..60 {
        throttler.enqueue(AlertMessage {
            chat_id: "chat".to_string(),
            text: format!("burst {index}"),
        });
    }
    // Give the worker a moment to take at most one message off the queue.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(throttler.queue_depth() >= 59);
    assert!(throttler.is_congested());
    throttler.shutdown().await;
}
