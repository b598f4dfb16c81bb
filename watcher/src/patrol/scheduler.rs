//! The patrol loop
//!
//! Walks every monitor of every user once per cycle: honors snooze and
//! per-monitor intervals, takes one web token per fetch, escalates
//! repeated 429s to the user, advances fingerprints, records history,
//! and flushes the store once at the end when anything mutated.
//!
//! Per-monitor failures never abort a cycle; a failed store write is
//! retried by the next cycle.

use super::CycleReport;
use crate::change_detector::ChangeDetector;
use crate::config::WatchConfig;
use crate::constants::patrol as timing;
use crate::fingerprint::Fingerprinter;
use crate::governor::Governor;
use crate::metrics::Metrics;
use crate::request::{FetchResult, RequestManager};
use crate::services::{AlertMessage, AlertThrottler, HistoryManager};
use crate::similarity::SimilarityEngine;
use crate::store::{utc_now_iso, AtomicStore, Monitor};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct PatrolScheduler {
    store: Arc<AtomicStore>,
    requests: Arc<RequestManager>,
    fingerprinter: Arc<Fingerprinter>,
    similarity: SimilarityEngine,
    change_detector: ChangeDetector,
    history: Arc<HistoryManager>,
    throttler: Arc<AlertThrottler>,
    governor: Arc<Governor>,
    metrics: Arc<Metrics>,
}

impl PatrolScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<AtomicStore>,
        requests: Arc<RequestManager>,
        fingerprinter: Arc<Fingerprinter>,
        history: Arc<HistoryManager>,
        throttler: Arc<AlertThrottler>,
        governor: Arc<Governor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            requests,
            fingerprinter,
            similarity: SimilarityEngine::new(),
            change_detector: ChangeDetector::new(),
            history,
            throttler,
            governor,
            metrics,
        }
    }

    /// Run cycles forever: a startup grace delay, then one cycle per
    /// interval tick.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let patrol = self;
        tokio::spawn(async move {
            tokio::time::sleep(timing::STARTUP_DELAY).await;
            let mut interval = tokio::time::interval(timing::CYCLE_INTERVAL);
            loop {
                interval.tick().await;
                match patrol.run_cycle().await {
                    Ok(report) => debug!(
                        "patrol cycle done: {}/{} monitors checked, {} alerts",
                        report.monitors_checked, report.monitors_total, report.alerts_enqueued
                    ),
                    Err(e) => error!("patrol cycle failed: {:#}", e),
                }
            }
        })
    }

    /// Hourly export cleanup, off the async scheduler.
    pub fn spawn_cleanup(history: Arc<HistoryManager>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(timing::CLEANUP_INTERVAL);
            interval.tick().await; // consume the immediate first tick
            loop {
                interval.tick().await;
                let history = history.clone();
                let removed = tokio::task::spawn_blocking(move || {
                    history.cleanup_exports(timing::EXPORT_MAX_AGE_MINUTES)
                })
                .await
                .unwrap_or(0);
                if removed > 0 {
                    info!("export cleanup removed {} files", removed);
                }
            }
        })
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        if self.throttler.is_congested() {
            warn!("alert queue congested, skipping patrol cycle");
            return Ok(CycleReport::default());
        }

        let mut data = self.store.load().await?;
        let mut report = CycleReport::default();
        let mut dirty = false;

        for (chat_id, user) in data.iter_mut() {
            let user_config = user.user_config.clone();
            for monitor in user.monitors.iter_mut() {
                report.monitors_total += 1;
                let config = monitor
                    .config
                    .clone()
                    .unwrap_or_else(|| user_config.clone());
                match self
                    .check_monitor(chat_id, monitor, &config, &mut report)
                    .await
                {
                    Ok(mutated) => dirty |= mutated,
                    Err(e) => {
                        warn!("error checking {}: {:#}", monitor.url, e);
                        monitor.metadata.failure_count += 1;
                        dirty = true;
                    }
                }
            }
        }

        self.metrics
            .update_worker_stats(report.monitors_checked as u64, report.monitors_total as u64);

        if dirty {
            match self.store.write(data).await {
                Ok(()) => report.store_written = true,
                Err(e) => error!("patrol store write failed, retrying next cycle: {}", e),
            }
        }
        Ok(report)
    }

    async fn check_monitor(
        &self,
        chat_id: &str,
        monitor: &mut Monitor,
        config: &WatchConfig,
        report: &mut CycleReport,
    ) -> Result<bool> {
        let mut dirty = false;

        if let Some(snooze_until) = monitor.metadata.snooze_until.clone() {
            match DateTime::parse_from_rfc3339(&snooze_until) {
                Ok(until) if Utc::now() < until.with_timezone(&Utc) => return Ok(false),
                _ => {
                    monitor.metadata.snooze_until = None;
                    dirty = true;
                }
            }
        }

        if let Some(last_check) = &monitor.metadata.last_check {
            if let Ok(last) = DateTime::parse_from_rfc3339(last_check) {
                let elapsed = Utc::now().signed_duration_since(last.with_timezone(&Utc));
                if elapsed.num_seconds() < config.check_interval_secs as i64 {
                    return Ok(dirty);
                }
            }
        }

        self.governor.web.acquire().await;
        report.monitors_checked += 1;

        let FetchResult {
            content,
            status_code,
            error,
            ..
        } = self.requests.fetch(&monitor.url).await;
        monitor.metadata.check_count += 1;
        monitor.metadata.circuit_breaker_state =
            self.requests.circuit_state(&monitor.url).await.to_string();

        if status_code == 429 {
            monitor.metadata.rate_limit_count += 1;
            if monitor.metadata.rate_limit_count >= timing::RATE_LIMIT_STRIKES {
                self.throttler.enqueue(AlertMessage {
                    chat_id: chat_id.to_string(),
                    text: format!(
                        "⚠️ Rate limited: {} keeps answering 429. Checks continue, alerts may lag.",
                        monitor.url
                    ),
                });
                report.alerts_enqueued += 1;
                monitor.metadata.rate_limit_count = 0;
            }
            return Ok(true);
        }
        monitor.metadata.rate_limit_count = 0;

        let body = match content {
            Some(body) if !body.is_empty() => body,
            _ => {
                if let Some(error) = &error {
                    debug!("fetch error for {}: {}", monitor.url, error);
                }
                monitor.metadata.failure_count += 1;
                return Ok(dirty);
            }
        };

        let new_fingerprint = match self
            .fingerprinter
            .generate_scoped(&body, config.custom_selector.as_deref())
        {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!("fingerprint failed for {}: {}", monitor.url, e);
                monitor.metadata.failure_count += 1;
                return Ok(dirty);
            }
        };
        monitor.metadata.last_check = Some(utc_now_iso());

        match &monitor.fingerprint {
            Some(baseline) if baseline.hash != new_fingerprint.hash => {
                // The last snapshot, when it decompresses, upgrades the
                // comparison from fingerprint-only to full text+structure.
                let previous_body = monitor
                    .forensic_snapshots
                    .last()
                    .and_then(|snapshot| snapshot.decompress().ok());

                let score;
                let mut diff_source = None;
                if let Some(old_html) = &previous_body {
                    let old_text = self.fingerprinter.extract_stable_text(old_html);
                    let new_text = self.fingerprinter.extract_stable_text(&body);
                    score = self
                        .similarity
                        .compare_content(&old_text, &new_text, old_html, &body)
                        .final_score;
                    diff_source = Some((old_text, new_text));
                } else {
                    score = self
                        .similarity
                        .calculate_similarity(baseline, &new_fingerprint)
                        .final_score;
                }

                let change_kind = self.similarity.classify(score);
                self.change_detector
                    .create_snapshot(monitor, &body, change_kind);

                if self.similarity.should_alert(score, config.similarity_threshold) {
                    let mut text = format!(
                        "🚨 Change Detected\n{}\nSimilarity: {:.2}",
                        monitor.url, score
                    );
                    if config.include_diff {
                        if let Some((old_text, new_text)) = &diff_source {
                            text.push('\n');
                            text.push_str(
                                &self.change_detector.generate_safe_diff(old_text, new_text),
                            );
                        }
                    }
                    self.throttler.enqueue(AlertMessage {
                        chat_id: chat_id.to_string(),
                        text,
                    });
                    report.alerts_enqueued += 1;
                    self.history.add_entry(monitor, "CHANGE", score, "Alerted");
                } else {
                    self.history
                        .add_entry(monitor, "MINOR", score, "Silent Update");
                }

                monitor.fingerprint = Some(new_fingerprint);
                dirty = true;
            }
            Some(_) => {} // unchanged
            None => {
                monitor.fingerprint = Some(new_fingerprint);
                dirty = true;
            }
        }
        Ok(dirty)
    }
}
