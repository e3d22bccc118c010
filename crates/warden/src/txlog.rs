// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only local transaction log: one JSONL file per UTC day.
//!
//! Appends are serialized by a mutex and return once the record is written to
//! the day file; nothing here touches the network. A background monitor calls
//! [`TransactionLog::evict`] to keep the directory under the storage cap.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decision outcome recorded for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    #[serde(rename = "Access Granted")]
    Granted,
    #[serde(rename = "Access Denied")]
    Denied,
    #[serde(rename = "Blocked")]
    Blocked,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "Access Granted",
            Self::Denied => "Access Denied",
            Self::Blocked => "Blocked",
        }
    }
}

/// One access decision, immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub name: String,
    pub card: String,
    pub reader: u8,
    pub status: TxStatus,
    /// Wall-clock seconds at the moment of decision.
    pub timestamp: i64,
}

impl Transaction {
    /// Identity triple used to match cache entries against upload results.
    pub fn key(&self) -> (String, u8, i64) {
        (self.card.clone(), self.reader, self.timestamp)
    }
}

/// Counters for a single day of the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayStats {
    pub total: u64,
    pub granted: u64,
    pub denied: u64,
    pub blocked: u64,
}

const DAY_FILE_PREFIX: &str = "transactions_";
const DAY_FILE_SUFFIX: &str = ".jsonl";

/// Day-file JSONL transaction log with size-capped eviction.
pub struct TransactionLog {
    dir: PathBuf,
    access_log: PathBuf,
    cap_bytes: u64,
    lock: parking_lot::Mutex<()>,
}

impl TransactionLog {
    /// Open (creating the directory if needed) a log rooted at `base_dir`.
    pub fn open(base_dir: &Path, cap_bytes: u64) -> anyhow::Result<Self> {
        let dir = base_dir.join("transactions");
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            access_log: base_dir.join("access.log"),
            cap_bytes,
            lock: parking_lot::Mutex::new(()),
        })
    }

    fn day_file(&self, timestamp: i64) -> PathBuf {
        let day = DateTime::<Utc>::from_timestamp(timestamp, 0)
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "00000000".to_owned());
        self.dir.join(format!("{DAY_FILE_PREFIX}{day}{DAY_FILE_SUFFIX}"))
    }

    fn today_file_name() -> String {
        format!("{DAY_FILE_PREFIX}{}{DAY_FILE_SUFFIX}", Utc::now().format("%Y%m%d"))
    }

    /// Append a transaction to its day file. Returns after the record is
    /// written; the target file is derived from the transaction's timestamp.
    pub fn append(&self, tx: &Transaction) -> anyhow::Result<()> {
        let _guard = self.lock.lock();

        let mut line = serde_json::to_string(tx)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.day_file(tx.timestamp))?;
        file.write_all(line.as_bytes())?;

        // Companion human-readable audit line, best-effort.
        let when = DateTime::<Utc>::from_timestamp(tx.timestamp, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let audit = format!(
            "{when} UTC reader={} card={} name={} status={}\n",
            tx.reader,
            tx.card,
            tx.name,
            tx.status.as_str()
        );
        if let Ok(mut f) =
            std::fs::OpenOptions::new().create(true).append(true).open(&self.access_log)
        {
            let _ = f.write_all(audit.as_bytes());
        }

        Ok(())
    }

    /// Day files sorted ascending by name (oldest first). Names encode the
    /// UTC date, so lexical order is age order.
    fn day_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return vec![];
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(DAY_FILE_PREFIX) && n.ends_with(DAY_FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    }

    /// Read transactions newest-first, skipping unparseable lines (a crash
    /// can leave a torn final line). Stops once `limit` records are
    /// collected; `since` drops records older than the given timestamp.
    pub fn read_recent(&self, limit: usize, since: Option<i64>) -> Vec<Transaction> {
        let _guard = self.lock.lock();
        let mut out = Vec::new();

        for path in self.day_files().into_iter().rev() {
            if out.len() >= limit {
                break;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else {
                continue;
            };
            for line in contents.lines().rev() {
                if out.len() >= limit {
                    break;
                }
                let Ok(tx) = serde_json::from_str::<Transaction>(line) else {
                    continue;
                };
                if let Some(min) = since {
                    if tx.timestamp < min {
                        continue;
                    }
                }
                out.push(tx);
            }
        }
        out
    }

    /// Total bytes across all day files.
    pub fn total_bytes(&self) -> u64 {
        self.day_files()
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }

    /// Delete oldest day files until the directory is back under
    /// `cap × target` once it grows past `cap × trigger`. The current day's
    /// file is preserved even when that leaves the directory over target.
    pub fn evict(&self, trigger: f64, target: f64) -> usize {
        let _guard = self.lock.lock();

        let files = self.day_files();
        let sizes: HashMap<PathBuf, u64> = files
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok().map(|m| (p.clone(), m.len())))
            .collect();
        let mut total: u64 = sizes.values().sum();

        let threshold = (self.cap_bytes as f64 * trigger) as u64;
        if total <= threshold {
            return 0;
        }

        let floor = (self.cap_bytes as f64 * target) as u64;
        let today = Self::today_file_name();
        let mut removed = 0;

        for path in files {
            if total <= floor {
                break;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some(today.as_str()) {
                continue;
            }
            let size = sizes.get(&path).copied().unwrap_or(0);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    total = total.saturating_sub(size);
                    removed += 1;
                    tracing::info!(file = %path.display(), "evicted transaction day file");
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), err = %e, "failed to evict day file");
                }
            }
        }
        if total > floor {
            tracing::warn!(
                total_bytes = total,
                "log still over eviction target; current day preserved"
            );
        }
        removed
    }

    /// Counters for the current UTC day.
    pub fn today_stats(&self) -> DayStats {
        let _guard = self.lock.lock();
        let path = self.dir.join(Self::today_file_name());
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return DayStats::default();
        };

        let mut stats = DayStats::default();
        for line in contents.lines() {
            let Ok(tx) = serde_json::from_str::<Transaction>(line) else {
                continue;
            };
            stats.total += 1;
            match tx.status {
                TxStatus::Granted => stats.granted += 1,
                TxStatus::Denied => stats.denied += 1,
                TxStatus::Blocked => stats.blocked += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
#[path = "txlog_tests.rs"]
mod tests;
