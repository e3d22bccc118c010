// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiegand frame assembly and validation.
//!
//! Readers pulse one of two lines per bit (D0 = 0, D1 = 1). Edge handlers
//! inject bits through [`DecoderSupervisor::inject`]; one decoder task per
//! reader assembles frames, enforcing the inter-bit timeout and the parity
//! layout, and hands complete card numbers to the access policy engine.
//!
//! Frame layouts (bit 0 first on the wire):
//! - 26-bit: bit 0 even parity over bits 1..=12, bit 25 odd parity over
//!   bits 13..=24; 24 data bits.
//! - 34-bit: bit 0 even parity over bits 1..=16, bit 33 odd parity over
//!   bits 17..=32; 32 data bits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::policy;
use crate::settings::Settings;
use crate::state::AppState;

fn ones(bits: &[u8]) -> u32 {
    bits.iter().map(|b| u32::from(*b & 1)).sum()
}

/// Check both parity bits of a complete 26- or 34-bit frame.
pub fn parity_ok(bits: &[u8]) -> bool {
    let half = match bits.len() {
        26 => 12,
        34 => 16,
        _ => return false,
    };
    let leading = bits[0] & 1;
    let trailing = bits[bits.len() - 1] & 1;
    let even_half = &bits[1..=half];
    let odd_half = &bits[half + 1..bits.len() - 1];

    // Leading bit makes its half even; trailing bit makes its half odd.
    let even_ok = (ones(even_half) + u32::from(leading)) % 2 == 0;
    let odd_ok = (ones(odd_half) + u32::from(trailing)) % 2 == 1;
    even_ok && odd_ok
}

/// Strip the parity bits and read the data bits big-endian as a decimal
/// string, the card identity used everywhere else in the system.
pub fn card_number(bits: &[u8]) -> String {
    let data = &bits[1..bits.len() - 1];
    let mut value: u64 = 0;
    for bit in data {
        value = (value << 1) | u64::from(*bit & 1);
    }
    value.to_string()
}

/// Build a full frame (parity bits included) around a card value. Test and
/// diagnostics helper; the inverse of [`card_number`].
pub fn encode_frame(card: u64, width: usize) -> Vec<u8> {
    let data_bits = width - 2;
    let half = data_bits / 2;
    let mut data = Vec::with_capacity(data_bits);
    for i in (0..data_bits).rev() {
        data.push(((card >> i) & 1) as u8);
    }
    let leading = (ones(&data[..half]) % 2) as u8;
    let trailing = 1 - (ones(&data[half..]) % 2) as u8;

    let mut frame = Vec::with_capacity(width);
    frame.push(leading);
    frame.extend_from_slice(&data);
    frame.push(trailing);
    frame
}

// -- Decoder supervisor -------------------------------------------------------

struct Tap {
    tx: mpsc::UnboundedSender<u8>,
}

/// Owns the per-reader decoder tasks and the bit channels feeding them.
///
/// A restart (config change to bit widths or timeout) drops the old channels,
/// discarding in-flight partial frames, and respawns every decoder with the
/// new parameters. Edge handlers always inject through the supervisor, so
/// they keep working across restarts.
pub struct DecoderSupervisor {
    taps: parking_lot::Mutex<HashMap<u8, Tap>>,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
}

impl Default for DecoderSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderSupervisor {
    pub fn new() -> Self {
        Self {
            taps: parking_lot::Mutex::new(HashMap::new()),
            cancel: parking_lot::Mutex::new(None),
        }
    }

    /// Inject one bit for a reader. Returns false when the reader has no
    /// running decoder (unknown id, or mid-restart); the bit is dropped.
    pub fn inject(&self, reader: u8, bit: u8) -> bool {
        let taps = self.taps.lock();
        match taps.get(&reader) {
            Some(tap) => tap.tx.send(bit & 1).is_ok(),
            None => false,
        }
    }

    /// Tear down all decoders and respawn them from `settings`. Also used
    /// for the initial start. In-flight partial frames are discarded.
    pub async fn restart(&self, state: Arc<AppState>, settings: &Settings) {
        if let Some(old) = self.cancel.lock().take() {
            old.cancel();
        }
        self.taps.lock().clear();
        // Brief pause so edge handlers drain into dropped channels rather
        // than racing the new decoders with stale bits.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let token = CancellationToken::new();
        let timeout = Duration::from_millis(settings.wiegand_timeout_ms);
        let mut taps = HashMap::new();

        for reader in 1..=state.config.reader_count() as u8 {
            let bits = settings.bits_for_reader(reader) as usize;
            let (tx, rx) = mpsc::unbounded_channel();
            taps.insert(reader, Tap { tx });
            tokio::spawn(decode_loop(
                Arc::clone(&state),
                reader,
                bits,
                timeout,
                rx,
                token.clone(),
            ));
            tracing::info!(reader, bits, timeout_ms = settings.wiegand_timeout_ms, "decoder started");
        }

        *self.taps.lock() = taps;
        *self.cancel.lock() = Some(token);
    }

    /// Stop all decoders without respawning.
    pub fn stop(&self) {
        if let Some(old) = self.cancel.lock().take() {
            old.cancel();
        }
        self.taps.lock().clear();
    }
}

/// Assemble frames for one reader until cancelled or the channel closes.
async fn decode_loop(
    state: Arc<AppState>,
    reader: u8,
    width: usize,
    gap: Duration,
    mut rx: mpsc::UnboundedReceiver<u8>,
    cancel: CancellationToken,
) {
    let mut frame: Vec<u8> = Vec::with_capacity(width);

    loop {
        let next = if frame.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                bit = rx.recv() => bit,
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(gap, rx.recv()) => match result {
                    Ok(bit) => bit,
                    Err(_) => {
                        tracing::warn!(reader, received = frame.len(), "inter-bit timeout, frame discarded");
                        frame.clear();
                        continue;
                    }
                },
            }
        };

        let Some(bit) = next else {
            // Channel dropped: supervisor restart in progress.
            return;
        };
        frame.push(bit & 1);

        if frame.len() == width {
            if parity_ok(&frame) {
                let card = card_number(&frame);
                tracing::debug!(reader, card = %card, "frame decoded");
                policy::handle_scan(&state, &card, reader).await;
            } else {
                tracing::warn!(reader, width, "parity check failed, frame discarded");
            }
            frame.clear();
        }
    }
}

#[cfg(test)]
#[path = "wiegand_tests.rs"]
mod tests;
