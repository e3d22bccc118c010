// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real GPIO wiring through rppal (compiled only with the `rppal` feature).
//!
//! Relay outputs become [`RelayLine`]s; reader D0/D1 inputs get falling-edge
//! interrupts that inject bits into the decoder supervisor. Setup failures
//! are fatal (an appliance built for hardware must not come up half-wired);
//! per-edge callback work never fails.

use std::sync::Arc;

use rppal::gpio::{Gpio, InputPin, Trigger};

use crate::config::AppConfig;
use crate::relay::RelayLine;
use crate::state::AppState;

/// A relay output pin. rppal wants `&mut` for writes, so the pin sits behind
/// its own mutex; the driver additionally serializes through the process-wide
/// GPIO lock.
struct RppalLine {
    pin: parking_lot::Mutex<rppal::gpio::OutputPin>,
}

impl RelayLine for RppalLine {
    fn set_active(&self, active: bool) {
        let mut pin = self.pin.lock();
        if active {
            pin.set_high();
        } else {
            pin.set_low();
        }
    }
}

/// Claim the configured relay output pins.
pub fn relay_lines(config: &AppConfig) -> anyhow::Result<Vec<Box<dyn RelayLine>>> {
    let gpio = Gpio::new()?;
    let mut lines: Vec<Box<dyn RelayLine>> = Vec::new();
    for pin_no in config.relay_pin_list()? {
        let pin = gpio.get(pin_no)?.into_output_low();
        lines.push(Box::new(RppalLine { pin: parking_lot::Mutex::new(pin) }));
    }
    Ok(lines)
}

/// Keeps the reader input pins (and their interrupt registrations) alive.
pub struct ReaderInputs {
    _pins: Vec<InputPin>,
}

/// Attach falling-edge interrupts for every reader's D0/D1 pair.
pub fn attach_readers(state: &Arc<AppState>) -> anyhow::Result<ReaderInputs> {
    let gpio = Gpio::new()?;
    let mut pins = Vec::new();

    for (index, (d0, d1)) in state.config.reader_pin_list()?.into_iter().enumerate() {
        let reader = (index + 1) as u8;
        for (pin_no, bit) in [(d0, 0u8), (d1, 1u8)] {
            let mut pin = gpio.get(pin_no)?.into_input_pullup();
            let st = Arc::clone(state);
            pin.set_async_interrupt(Trigger::FallingEdge, None, move |_event| {
                if !st.decoders.inject(reader, bit) {
                    tracing::debug!(reader, bit, "edge dropped, decoder not running");
                }
            })?;
            pins.push(pin);
        }
        tracing::info!(reader, d0, d1, "reader inputs attached");
    }

    Ok(ReaderInputs { _pins: pins })
}
