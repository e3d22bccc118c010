// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline-first upload pipeline.
//!
//! The policy engine enqueues transactions on a bounded channel. A single
//! uploader consumer attempts one remote write per record and downgrades
//! failures to the crash-safe cache file. A separate drainer wakes on a
//! schedule, retries everything in the cache, and atomically rewrites it with
//! only the still-failing entries. The two paths share nothing but the cache
//! file, so a blocked remote can never back-pressure an access decision.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::remote::{Reachability, RemoteStore};
use crate::state::AppState;
use crate::txlog::Transaction;

/// Hot-path channel capacity; overflow downgrades straight to the cache.
pub const UPLOAD_QUEUE_CAPACITY: usize = 256;

/// Build the remote document from a transaction. The server attaches its own
/// creation timestamp and id; `entity_id` partitions deployments that share
/// one store.
pub fn remote_document(tx: &Transaction, entity_id: &str) -> serde_json::Value {
    serde_json::json!({
        "name": tx.name,
        "card": tx.card,
        "reader": tx.reader,
        "status": tx.status,
        "timestamp": tx.timestamp,
        "entity_id": entity_id,
    })
}

// -- Failed-upload cache ------------------------------------------------------

/// Append-only JSONL cache of transactions the remote has not confirmed.
///
/// Appends go straight to the file; rewrites (after a drain pass) go through
/// temp-file + fsync + rename so a crash mid-rewrite never loses entries that
/// were still failing.
pub struct FailedCache {
    path: PathBuf,
    lock: parking_lot::Mutex<()>,
}

impl FailedCache {
    pub fn open(base_dir: &Path) -> Self {
        Self {
            path: base_dir.join("failed_transactions_cache.jsonl"),
            lock: parking_lot::Mutex::new(()),
        }
    }

    /// Durably append one transaction.
    pub fn append(&self, tx: &Transaction) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut line = serde_json::to_string(tx)?;
        line.push('\n');
        let mut file =
            std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn read_all(&self) -> Vec<Transaction> {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return vec![];
        };
        contents
            .lines()
            .filter_map(|line| serde_json::from_str::<Transaction>(line).ok())
            .collect()
    }

    /// Snapshot of the cache, tolerating corrupt lines.
    pub fn load(&self) -> Vec<Transaction> {
        let _guard = self.lock.lock();
        self.read_all()
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove entries confirmed by a drain pass. The file is re-read under
    /// the lock so appends that raced the drain survive, then rewritten
    /// atomically, or deleted when nothing remains.
    pub fn commit_drain(&self, uploaded: &HashSet<(String, u8, i64)>) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let remaining: Vec<Transaction> =
            self.read_all().into_iter().filter(|tx| !uploaded.contains(&tx.key())).collect();

        if remaining.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        let mut body = String::new();
        for tx in &remaining {
            body.push_str(&serde_json::to_string(tx)?);
            body.push('\n');
        }
        crate::persist::write_bytes(&self.path, body.as_bytes())
    }
}

// -- Uploader -----------------------------------------------------------------

/// Spawn the hot-path consumer: one upload attempt per dequeued transaction,
/// failure or unreachability downgrades to the cache.
pub fn spawn_uploader<R: RemoteStore>(
    state: Arc<AppState>,
    mut rx: mpsc::Receiver<Transaction>,
    remote: Option<Arc<R>>,
    reachability: Arc<Reachability>,
) {
    tokio::spawn(async move {
        loop {
            let tx = tokio::select! {
                _ = state.shutdown.cancelled() => break,
                tx = rx.recv() => match tx {
                    Some(tx) => tx,
                    None => break,
                },
            };

            let mut uploaded = false;
            if let Some(ref remote) = remote {
                if reachability.check().await {
                    let entity = state.settings.get().entity_id;
                    match remote.insert(remote_document(&tx, &entity)).await {
                        Ok(()) => {
                            tracing::debug!(card = %tx.card, "transaction uploaded");
                            uploaded = true;
                        }
                        Err(e) => {
                            tracing::warn!(card = %tx.card, err = %e, "upload failed, caching");
                        }
                    }
                }
            }

            if !uploaded {
                if let Err(e) = state.cache.append(&tx) {
                    tracing::error!(card = %tx.card, err = %e, "failed to cache transaction");
                }
            }
        }
    });
}

// -- Drainer ------------------------------------------------------------------

/// Drainer cadence. Defaults match production; tests shrink everything.
#[derive(Debug, Clone)]
pub struct DrainSchedule {
    pub startup_delay: Duration,
    pub online_interval: Duration,
    pub offline_interval: Duration,
    /// Spacing between per-entry upload attempts, capping burst load.
    pub request_gap: Duration,
}

impl Default for DrainSchedule {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(60),
            online_interval: Duration::from_secs(300),
            offline_interval: Duration::from_secs(600),
            request_gap: Duration::from_millis(500),
        }
    }
}

/// Spawn the background drainer: on each tick, retry every cached
/// transaction and rewrite the cache with the survivors.
pub fn spawn_drainer<R: RemoteStore>(
    state: Arc<AppState>,
    remote: Option<Arc<R>>,
    reachability: Arc<Reachability>,
    schedule: DrainSchedule,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = tokio::time::sleep(schedule.startup_delay) => {}
        }

        loop {
            let online = reachability.check().await;
            if online {
                if let Some(ref remote) = remote {
                    drain_once(&state, remote.as_ref(), schedule.request_gap).await;
                }
            }

            let interval =
                if online { schedule.online_interval } else { schedule.offline_interval };
            tokio::select! {
                _ = state.shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });
}

/// One drain pass. Public for tests, which drive it directly instead of
/// waiting out the schedule.
pub async fn drain_once<R: RemoteStore>(state: &AppState, remote: &R, request_gap: Duration) {
    let pending = state.cache.load();
    if pending.is_empty() {
        return;
    }
    tracing::info!(pending = pending.len(), "draining failed-upload cache");

    let mut uploaded = HashSet::new();
    for (i, tx) in pending.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(request_gap).await;
        }
        let entity = state.settings.get().entity_id;
        match remote.insert(remote_document(tx, &entity)).await {
            Ok(()) => {
                uploaded.insert(tx.key());
            }
            Err(e) => {
                tracing::warn!(card = %tx.card, err = %e, "cached upload still failing");
            }
        }
    }

    if let Err(e) = state.cache.commit_drain(&uploaded) {
        tracing::error!(err = %e, "failed to rewrite upload cache");
    } else {
        tracing::info!(
            uploaded = uploaded.len(),
            remaining = pending.len() - uploaded.len(),
            "drain pass complete"
        );
    }
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
