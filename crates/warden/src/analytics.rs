// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Aggregation over the local transaction log for the dashboard: the server
//! computes, the dashboard only renders.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::txlog::{Transaction, TxStatus};

/// How many top cards the report carries.
pub const TOP_CARDS: usize = 10;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
    pub granted: u64,
    pub denied: u64,
    pub blocked: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardCount {
    pub card: String,
    pub name: String,
    pub count: u64,
}

/// Aggregates over a window of the local log.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub days: u32,
    pub total: u64,
    pub by_status: StatusCounts,
    pub by_reader: BTreeMap<u8, u64>,
    /// Index = hour of day, 0..23, UTC.
    pub by_hour: Vec<u64>,
    /// Keyed `YYYY-MM-DD`.
    pub by_day: BTreeMap<String, u64>,
    pub distinct_cards: u64,
    pub top_cards: Vec<CardCount>,
    pub peak_hour: Option<u8>,
    pub busiest_day: Option<String>,
    pub busiest_reader: Option<u8>,
}

/// Compute the full report for a slice of transactions.
pub fn report(transactions: &[Transaction], days: u32) -> Report {
    let mut by_status = StatusCounts::default();
    let mut by_reader: BTreeMap<u8, u64> = BTreeMap::new();
    let mut by_hour = vec![0u64; 24];
    let mut by_day: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_card: BTreeMap<String, (String, u64)> = BTreeMap::new();
    let mut cards: HashSet<&str> = HashSet::new();

    for tx in transactions {
        match tx.status {
            TxStatus::Granted => by_status.granted += 1,
            TxStatus::Denied => by_status.denied += 1,
            TxStatus::Blocked => by_status.blocked += 1,
        }
        *by_reader.entry(tx.reader).or_default() += 1;

        if let Some(when) = DateTime::<Utc>::from_timestamp(tx.timestamp, 0) {
            by_hour[when.hour() as usize] += 1;
            *by_day.entry(when.format("%Y-%m-%d").to_string()).or_default() += 1;
        }

        cards.insert(&tx.card);
        let entry = by_card.entry(tx.card.clone()).or_insert_with(|| (tx.name.clone(), 0));
        entry.1 += 1;
    }

    let mut top_cards: Vec<CardCount> = by_card
        .into_iter()
        .map(|(card, (name, count))| CardCount { card, name, count })
        .collect();
    top_cards.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.card.cmp(&b.card)));
    top_cards.truncate(TOP_CARDS);

    let peak_hour = argmax(by_hour.iter().enumerate().map(|(h, c)| (h as u8, *c)));
    let busiest_day = argmax(by_day.iter().map(|(d, c)| (d.clone(), *c)));
    let busiest_reader = argmax(by_reader.iter().map(|(r, c)| (*r, *c)));

    Report {
        days,
        total: transactions.len() as u64,
        by_status,
        by_reader,
        by_hour,
        by_day,
        distinct_cards: cards.len() as u64,
        top_cards,
        peak_hour,
        busiest_day,
        busiest_reader,
    }
}

/// Key of the largest count, `None` when every count is zero.
fn argmax<K>(pairs: impl Iterator<Item = (K, u64)>) -> Option<K> {
    let mut best: Option<(K, u64)> = None;
    for (key, count) in pairs {
        if count > 0 && best.as_ref().map(|(_, c)| count > *c).unwrap_or(true) {
            best = Some((key, count));
        }
    }
    best.map(|(k, _)| k)
}

/// Render transactions as CSV (newest-first, as given). The body travels
/// inside the JSON response envelope for dashboard compatibility.
pub fn to_csv(transactions: &[Transaction]) -> String {
    let mut out = String::from("timestamp,datetime,name,card,reader,status\n");
    for tx in transactions {
        let when = DateTime::<Utc>::from_timestamp(tx.timestamp, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            tx.timestamp,
            when,
            csv_field(&tx.name),
            csv_field(&tx.card),
            tx.reader,
            tx.status.as_str()
        ));
    }
    out
}

/// Quote a field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
#[path = "analytics_tests.rs"]
mod tests;
