// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access policy engine: the decision pipeline between a decoded card and
//! the relays, log, and uploader.
//!
//! Order matters and is load-bearing: the dedup gate runs first, the blocked
//! check strictly precedes any relay actuation, the entry/exit gate only
//! suppresses record creation (access was already granted or refused), and
//! the privacy gate suppresses every persisted record. Nothing on this path
//! performs network I/O; the uploader owns the remote.

use std::sync::Arc;

use crate::relay;
use crate::state::{epoch_secs, AppState};
use crate::txlog::{Transaction, TxStatus};

/// Handle one validated card scan from a reader. Returns the recorded
/// transaction, or `None` when a gate suppressed it.
pub async fn handle_scan(state: &Arc<AppState>, card: &str, reader: u8) -> Option<Transaction> {
    let now = epoch_secs();
    let settings = state.settings.get();

    // Dedup gate: drop repeat scans inside the configured window.
    {
        let window = settings.scan_delay_seconds as i64;
        let mut dedup = state.dedup.lock();
        if let Some(last) = dedup.get(card) {
            if now - last < window {
                tracing::debug!(card = %card, reader, "scan deduplicated");
                return None;
            }
        }
        dedup.retain(|_, last| now - *last < window);
        dedup.insert(card.to_owned(), now);
    }

    let user = state.users.get(card);
    let blocked = state.users.is_blocked(card);

    let (status, name, privacy) = if blocked {
        (TxStatus::Blocked, "Blocked".to_owned(), false)
    } else if let Some(ref user) = user {
        (TxStatus::Granted, user.name.clone(), user.privacy_protected)
    } else {
        (TxStatus::Denied, "Unknown".to_owned(), false)
    };

    match status {
        TxStatus::Granted => {
            tracing::info!(card = %card, reader, name = %name, "access granted");
            match state.relays.pulse_auto(reader as usize, relay::DEFAULT_PULSE) {
                Ok(true) => {}
                Ok(false) => {} // held relay; already logged by the driver
                Err(e) => tracing::warn!(reader, err = %e, "relay actuation failed"),
            }
        }
        TxStatus::Blocked => tracing::warn!(card = %card, reader, "blocked card scanned"),
        TxStatus::Denied => tracing::info!(card = %card, reader, "unknown card denied"),
    }

    // Entry/exit gate: when enabled, a card produces a record only after the
    // configured gap since its previous scan; the first-ever scan only arms
    // the tracker.
    if settings.entry_exit_tracking.enabled {
        let gap = settings.entry_exit_tracking.min_gap_seconds as i64;
        let mut tracker = state.entry_exit.lock();
        match tracker.get(card) {
            None => {
                tracker.insert(card.to_owned(), now);
                return None;
            }
            Some(last) if now - last < gap => return None,
            Some(_) => {
                tracker.insert(card.to_owned(), now);
            }
        }
    }

    // Privacy gate: access already handled above; no record of any kind.
    if privacy {
        return None;
    }

    let tx = Transaction { name, card: card.to_owned(), reader, status, timestamp: now };

    if let Err(e) = state.txlog.append(&tx) {
        // Actuation and logging are independent; the door already worked.
        tracing::error!(card = %card, err = %e, "failed to append transaction");
    }

    match state.upload_tx.try_send(tx.clone()) {
        Ok(()) => {}
        Err(tokio::sync::mpsc::error::TrySendError::Full(tx)) => {
            tracing::warn!(card = %tx.card, "upload queue full, caching directly");
            if let Err(e) = state.cache.append(&tx) {
                tracing::error!(err = %e, "failed to cache transaction");
            }
        }
        Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
            tracing::warn!("upload queue closed");
        }
    }

    Some(tx)
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
