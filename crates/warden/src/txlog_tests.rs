// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use super::{DayStats, Transaction, TransactionLog, TxStatus};
use crate::state::epoch_secs;

fn tx(card: &str, timestamp: i64, status: TxStatus) -> Transaction {
    Transaction {
        name: "Someone".to_owned(),
        card: card.to_owned(),
        reader: 1,
        status,
        timestamp,
    }
}

#[test]
fn append_then_read_back_newest_first() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = TransactionLog::open(tmp.path(), 1 << 20)?;
    let now = epoch_secs();

    for i in 0..3 {
        log.append(&tx(&format!("c{i}"), now + i, TxStatus::Granted))?;
    }

    let recent = log.read_recent(10, None);
    let cards: Vec<&str> = recent.iter().map(|t| t.card.as_str()).collect();
    assert_eq!(cards, vec!["c2", "c1", "c0"]);
    Ok(())
}

#[test]
fn survives_reopen() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let now = epoch_secs();
    {
        let log = TransactionLog::open(tmp.path(), 1 << 20)?;
        for i in 0..5 {
            log.append(&tx(&format!("c{i}"), now + i, TxStatus::Denied))?;
        }
    }

    let log = TransactionLog::open(tmp.path(), 1 << 20)?;
    let recent = log.read_recent(5, None);
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0].card, "c4");
    assert_eq!(recent[4].card, "c0");
    Ok(())
}

#[test]
fn day_file_named_from_transaction_timestamp() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = TransactionLog::open(tmp.path(), 1 << 20)?;

    // 2026-03-01 12:00:00 UTC
    log.append(&tx("1", 1_772_366_400, TxStatus::Granted))?;
    assert!(tmp.path().join("transactions/transactions_20260301.jsonl").exists());
    Ok(())
}

#[test]
fn torn_lines_are_skipped() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = TransactionLog::open(tmp.path(), 1 << 20)?;
    let now = epoch_secs();

    log.append(&tx("good1", now, TxStatus::Granted))?;
    log.append(&tx("good2", now, TxStatus::Granted))?;

    // Simulate a crash mid-append: a truncated trailing line.
    let day = chrono::DateTime::<chrono::Utc>::from_timestamp(now, 0)
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_default();
    let path = tmp.path().join(format!("transactions/transactions_{day}.jsonl"));
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.write_all(b"{\"name\":\"torn")?;

    let recent = log.read_recent(10, None);
    assert_eq!(recent.len(), 2);
    Ok(())
}

#[test]
fn since_filter_drops_old_records() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = TransactionLog::open(tmp.path(), 1 << 20)?;
    let now = epoch_secs();

    log.append(&tx("old", now - 10 * 86_400, TxStatus::Granted))?;
    log.append(&tx("new", now, TxStatus::Granted))?;

    let recent = log.read_recent(10, Some(now - 86_400));
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].card, "new");
    Ok(())
}

#[test]
fn eviction_removes_oldest_but_preserves_today() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = TransactionLog::open(tmp.path(), 600)?;
    let now = epoch_secs();

    // Three old day files plus today's, each a few hundred bytes.
    for day in [3i64, 2, 1, 0] {
        for i in 0..3 {
            log.append(&tx(&format!("d{day}i{i}"), now - day * 86_400, TxStatus::Granted))?;
        }
    }
    assert!(log.total_bytes() > 600);

    let removed = log.evict(0.95, 0.5);
    assert!(removed >= 1, "expected at least one day file evicted");

    // Today's records survive.
    let cards: Vec<String> =
        log.read_recent(100, Some(now - 3600)).into_iter().map(|t| t.card).collect();
    assert_eq!(cards.len(), 3);
    assert!(cards.iter().all(|c| c.starts_with("d0")));
    Ok(())
}

#[test]
fn eviction_is_a_noop_under_trigger() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = TransactionLog::open(tmp.path(), 1 << 20)?;
    log.append(&tx("1", epoch_secs(), TxStatus::Granted))?;
    assert_eq!(log.evict(0.95, 0.5), 0);
    Ok(())
}

#[test]
fn today_stats_counts_by_status() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = TransactionLog::open(tmp.path(), 1 << 20)?;
    let now = epoch_secs();

    log.append(&tx("1", now, TxStatus::Granted))?;
    log.append(&tx("2", now, TxStatus::Granted))?;
    log.append(&tx("3", now, TxStatus::Denied))?;
    log.append(&tx("4", now, TxStatus::Blocked))?;
    // Yesterday's record must not count.
    log.append(&tx("5", now - 86_400, TxStatus::Granted))?;

    let DayStats { total, granted, denied, blocked } = log.today_stats();
    assert_eq!((total, granted, denied, blocked), (4, 2, 1, 1));
    Ok(())
}

#[test]
fn access_log_line_written() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let log = TransactionLog::open(tmp.path(), 1 << 20)?;
    log.append(&tx("12345678", epoch_secs(), TxStatus::Blocked))?;

    let audit = std::fs::read_to_string(tmp.path().join("access.log"))?;
    assert!(audit.contains("card=12345678"));
    assert!(audit.contains("status=Blocked"));
    Ok(())
}
