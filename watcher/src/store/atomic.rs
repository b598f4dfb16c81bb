//! Single-writer atomic persistence
//!
//! All writes funnel through one background worker draining a FIFO queue,
//! so the document on disk is always a fully committed snapshot: the
//! worker pre-flights free disk, rolls a timestamped backup, serializes to
//! a temp file, fsyncs, and renames over the live file. Readers never see
//! a partial write.

use super::{migration, StoreDocument, UserData, SCHEMA_VERSION};
use crate::constants::store as limits;
use crate::errors::StoreError;
use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use glob::glob;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum WriteOp {
    Write {
        data: BTreeMap<String, UserData>,
        done: oneshot::Sender<Result<(), StoreError>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

pub struct AtomicStore {
    path: PathBuf,
    tx: mpsc::UnboundedSender<WriteOp>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AtomicStore {
    pub fn new(path: impl Into<PathBuf>, metrics: Arc<Metrics>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer_loop(path.clone(), rx, metrics));
        Self {
            path,
            tx,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full store. A missing file is an empty store; legacy
    /// documents are migrated in memory and materialize on the next write.
    pub async fn load(&self) -> Result<BTreeMap<String, UserData>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let value: Value = serde_json::from_slice(&raw).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        let (data, migrated) = migration::migrate(value)?;
        if migrated {
            info!("store document migrated to schema {}", SCHEMA_VERSION);
        }
        Ok(data)
    }

    /// Enqueue a write and wait for it to commit or fail.
    pub async fn write(&self, data: BTreeMap<String, UserData>) -> Result<(), StoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(WriteOp::Write {
                data,
                done: done_tx,
            })
            .map_err(|_| StoreError::Io {
                path: self.path.display().to_string(),
                reason: "write queue closed".to_string(),
            })?;
        done_rx.await.map_err(|_| StoreError::Io {
            path: self.path.display().to_string(),
            reason: "store writer stopped before completing the write".to_string(),
        })?
    }

    /// Drain queued writes, then stop the worker.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Shutdown { done: done_tx }).is_ok() {
            let _ = done_rx.await;
        }
        let handle = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn writer_loop(
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    metrics: Arc<Metrics>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Write { data, done } => {
                let started = Instant::now();
                let result = commit(path.clone(), data).await;
                metrics.record_db_operation(started.elapsed().as_secs_f64());
                if let Err(e) = &result {
                    error!("store write failed: {}", e);
                }
                let _ = done.send(result);
            }
            WriteOp::Shutdown { done } => {
                let _ = done.send(());
                break;
            }
        }
    }
    debug!("store writer stopped");
}

async fn commit(path: PathBuf, data: BTreeMap<String, UserData>) -> Result<(), StoreError> {
    let document = StoreDocument {
        schema_version: SCHEMA_VERSION.to_string(),
        updated_at: super::utc_now_iso(),
        data,
    };
    let mut value = serde_json::to_value(&document).map_err(|e| StoreError::Serialization {
        reason: e.to_string(),
    })?;
    normalize_timestamps(&mut value);
    let payload = serde_json::to_vec_pretty(&value).map_err(|e| StoreError::Serialization {
        reason: e.to_string(),
    })?;

    // Blocking file work stays off the scheduler.
    let io_path = path.clone();
    match tokio::task::spawn_blocking(move || write_atomic(&io_path, &payload)).await {
        Ok(result) => result,
        Err(e) => Err(StoreError::Io {
            path: path.display().to_string(),
            reason: format!("writer task failed: {}", e),
        }),
    }
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let available = fs2::available_space(dir).map_err(|e| StoreError::Io {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    if available < limits::MIN_FREE_DISK_BYTES {
        return Err(StoreError::InsufficientStorage {
            available_mb: available / (1024 * 1024),
        });
    }

    if path.exists() {
        snapshot_backup(path)?;
        prune_backups(path);
    }

    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    let committed = (|| -> Result<(), StoreError> {
        let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(payload).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
        drop(file);
        std::fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
        Ok(())
    })();
    if committed.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    committed
}

fn snapshot_backup(path: &Path) -> Result<(), StoreError> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let backup = PathBuf::from(format!("{}.backup_{}", path.display(), stamp));
    std::fs::copy(path, &backup).map_err(|e| io_error(&backup, e))?;
    Ok(())
}

fn prune_backups(path: &Path) {
    let pattern = format!("{}.backup_*", path.display());
    let Ok(entries) = glob(&pattern) else { return };
    let mut backups: Vec<PathBuf> = entries.flatten().collect();
    // Stamp format sorts lexicographically in time order.
    backups.sort();
    if backups.len() <= limits::BACKUP_RETAIN {
        return;
    }
    let excess = backups.len() - limits::BACKUP_RETAIN;
    for stale in backups.into_iter().take(excess) {
        if let Err(e) = std::fs::remove_file(&stale) {
            warn!("failed to prune backup {}: {}", stale.display(), e);
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Rewrite every string field named like a timestamp as canonical UTC.
fn normalize_timestamps(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_timestamp_key(key) {
                    if let Value::String(s) = entry {
                        if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                            *s = parsed
                                .with_timezone(&Utc)
                                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
                        }
                    }
                }
                normalize_timestamps(entry);
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_timestamps(item);
            }
        }
        _ => {}
    }
}

fn is_timestamp_key(key: &str) -> bool {
    key == "timestamp" || key.ends_with("_at") || key.ends_with("_time")
}
