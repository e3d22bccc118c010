// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay outputs with pulse / hold semantics and a manual-override state
//! machine.
//!
//! Each relay is `Idle`, `HeldOpen`, or `HeldClosed`. Automatic pulses from
//! the access pipeline are honored only in `Idle`; a held relay stays put
//! until an explicit admin command. Pulse releases run on short-lived tasks
//! so the access decision path never blocks on the pulse duration.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_PULSE: Duration = Duration::from_secs(1);

/// One physical digital output. Implementations must be cheap to call; the
/// driver serializes calls through a process-wide GPIO lock.
pub trait RelayLine: Send + Sync {
    fn set_active(&self, active: bool);
}

/// Inert line for development hosts without GPIO.
pub struct NullLine {
    pub relay: usize,
}

impl RelayLine for NullLine {
    fn set_active(&self, active: bool) {
        tracing::debug!(relay = self.relay, active, "gpio disabled, relay line no-op");
    }
}

/// Manual-override state of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    Idle,
    HeldOpen,
    HeldClosed,
}

struct Relay {
    line: Box<dyn RelayLine>,
    state: RelayState,
    /// Bumped on every state-affecting command; a pending pulse release only
    /// fires when its sequence number is still current.
    pulse_seq: u64,
}

type Slot = Arc<parking_lot::Mutex<Relay>>;

/// Driver over all configured relays. Relay numbers are 1-based to match
/// reader ids and the HTTP API.
pub struct RelayDriver {
    relays: Vec<Slot>,
    gpio_lock: Arc<parking_lot::Mutex<()>>,
}

fn drive(gpio_lock: &parking_lot::Mutex<()>, relay: &mut Relay, active: bool) {
    let _gpio = gpio_lock.lock();
    relay.line.set_active(active);
}

impl RelayDriver {
    pub fn new(lines: Vec<Box<dyn RelayLine>>) -> Self {
        let relays = lines
            .into_iter()
            .map(|line| {
                Arc::new(parking_lot::Mutex::new(Relay {
                    line,
                    state: RelayState::Idle,
                    pulse_seq: 0,
                }))
            })
            .collect();
        Self { relays, gpio_lock: Arc::new(parking_lot::Mutex::new(())) }
    }

    pub fn count(&self) -> usize {
        self.relays.len()
    }

    pub fn states(&self) -> Vec<RelayState> {
        self.relays.iter().map(|r| r.lock().state).collect()
    }

    fn slot(&self, relay: usize) -> anyhow::Result<&Slot> {
        self.relays
            .get(relay.wrapping_sub(1))
            .ok_or_else(|| anyhow::anyhow!("unknown relay {relay}"))
    }

    /// Pulse requested by the access pipeline. Ignored (returning false) when
    /// the relay is held by an admin: a card scan must never re-arm a
    /// manually held relay.
    pub fn pulse_auto(&self, relay: usize, duration: Duration) -> anyhow::Result<bool> {
        let slot = self.slot(relay)?;
        let mut guard = slot.lock();
        if guard.state != RelayState::Idle {
            tracing::info!(relay, state = ?guard.state, "automatic pulse suppressed by hold");
            return Ok(false);
        }
        self.start_pulse(slot, &mut guard, duration);
        Ok(true)
    }

    /// Pulse requested by an admin. On a held relay this is an explicit
    /// command, so it returns the relay to `Idle` first and then pulses.
    pub fn pulse_manual(&self, relay: usize, duration: Duration) -> anyhow::Result<()> {
        let slot = self.slot(relay)?;
        let mut guard = slot.lock();
        if guard.state != RelayState::Idle {
            tracing::info!(relay, state = ?guard.state, "manual pulse releasing hold");
            guard.state = RelayState::Idle;
        }
        self.start_pulse(slot, &mut guard, duration);
        Ok(())
    }

    fn start_pulse(&self, slot: &Slot, guard: &mut Relay, duration: Duration) {
        guard.pulse_seq += 1;
        let seq = guard.pulse_seq;
        drive(&self.gpio_lock, guard, true);

        let slot = Arc::clone(slot);
        let gpio_lock = Arc::clone(&self.gpio_lock);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut guard = slot.lock();
            // A hold or newer pulse issued meanwhile owns the line now.
            if guard.state == RelayState::Idle && guard.pulse_seq == seq {
                drive(&gpio_lock, &mut guard, false);
            }
        });
    }

    /// Drive active and latch until `normalize`.
    pub fn hold_open(&self, relay: usize) -> anyhow::Result<()> {
        let slot = self.slot(relay)?;
        let mut guard = slot.lock();
        guard.state = RelayState::HeldOpen;
        guard.pulse_seq += 1;
        drive(&self.gpio_lock, &mut guard, true);
        tracing::info!(relay, "relay held open");
        Ok(())
    }

    /// Drive inactive and latch until `normalize`.
    pub fn hold_closed(&self, relay: usize) -> anyhow::Result<()> {
        let slot = self.slot(relay)?;
        let mut guard = slot.lock();
        guard.state = RelayState::HeldClosed;
        guard.pulse_seq += 1;
        drive(&self.gpio_lock, &mut guard, false);
        tracing::info!(relay, "relay held closed");
        Ok(())
    }

    /// Release any hold and return to `Idle` (line inactive).
    pub fn normalize(&self, relay: usize) -> anyhow::Result<()> {
        let slot = self.slot(relay)?;
        let mut guard = slot.lock();
        guard.state = RelayState::Idle;
        guard.pulse_seq += 1;
        drive(&self.gpio_lock, &mut guard, false);
        tracing::info!(relay, "relay normalized");
        Ok(())
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
