// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted runtime configuration with validated hot updates.
//!
//! The settings object is one JSON file (`config.json`), atomically replaced
//! on every update. Unknown keys in the file are accepted (forward compat);
//! known keys reject on type mismatch. Whether an update requires a decoder
//! restart is the caller's concern; see [`Settings::requires_decoder_restart`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::persist;

pub const MIN_WIEGAND_TIMEOUT_MS: u64 = 10;
pub const MAX_WIEGAND_TIMEOUT_MS: u64 = 100;
pub const MIN_SCAN_DELAY_SECS: u64 = 1;
pub const MAX_SCAN_DELAY_SECS: u64 = 300;
pub const MIN_GAP_SECS: u64 = 1;
pub const MAX_GAP_SECS: u64 = 300;

/// Optional per-card minimum gap between recorded scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryExitTracking {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_min_gap")]
    pub min_gap_seconds: u64,
}

fn default_min_gap() -> u64 {
    60
}

impl Default for EntryExitTracking {
    fn default() -> Self {
        Self { enabled: false, min_gap_seconds: default_min_gap() }
    }
}

/// Runtime-adjustable appliance configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Per-reader Wiegand frame width, keyed `reader_1` .. `reader_N`.
    #[serde(default)]
    pub wiegand_bits: BTreeMap<String, u8>,
    #[serde(default = "default_timeout_ms")]
    pub wiegand_timeout_ms: u64,
    #[serde(default = "default_scan_delay")]
    pub scan_delay_seconds: u64,
    #[serde(default)]
    pub entry_exit_tracking: EntryExitTracking,
    #[serde(default = "default_entity")]
    pub entity_id: String,
    #[serde(default)]
    pub basic_auth_enabled: bool,
}

fn default_timeout_ms() -> u64 {
    50
}

fn default_scan_delay() -> u64 {
    5
}

fn default_entity() -> String {
    "main".to_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wiegand_bits: BTreeMap::new(),
            wiegand_timeout_ms: default_timeout_ms(),
            scan_delay_seconds: default_scan_delay(),
            entry_exit_tracking: EntryExitTracking::default(),
            entity_id: default_entity(),
            basic_auth_enabled: false,
        }
    }
}

impl Settings {
    /// Seed defaults for a fresh install: every reader at `default_bits`.
    pub fn seeded(reader_count: usize, default_bits: u8, entity_id: &str, scan_delay: u64) -> Self {
        let mut settings = Self {
            entity_id: entity_id.to_owned(),
            scan_delay_seconds: scan_delay,
            ..Self::default()
        };
        for reader in 1..=reader_count {
            settings.wiegand_bits.insert(format!("reader_{reader}"), default_bits);
        }
        settings
    }

    /// Frame width for a reader, defaulting to 26 when unconfigured.
    pub fn bits_for_reader(&self, reader: u8) -> u8 {
        self.wiegand_bits.get(&format!("reader_{reader}")).copied().unwrap_or(26)
    }

    pub fn validate(&self, reader_count: usize) -> anyhow::Result<()> {
        for (key, bits) in &self.wiegand_bits {
            if !matches!(bits, 26 | 34) {
                anyhow::bail!("{key}: wiegand bit width must be 26 or 34, got {bits}");
            }
            let valid_key = key
                .strip_prefix("reader_")
                .and_then(|n| n.parse::<usize>().ok())
                .map(|n| (1..=reader_count).contains(&n))
                .unwrap_or(false);
            if !valid_key {
                anyhow::bail!("unknown reader key: {key}");
            }
        }
        if !(MIN_WIEGAND_TIMEOUT_MS..=MAX_WIEGAND_TIMEOUT_MS).contains(&self.wiegand_timeout_ms) {
            anyhow::bail!(
                "wiegand_timeout_ms must be in [{MIN_WIEGAND_TIMEOUT_MS}, {MAX_WIEGAND_TIMEOUT_MS}]"
            );
        }
        if !(MIN_SCAN_DELAY_SECS..=MAX_SCAN_DELAY_SECS).contains(&self.scan_delay_seconds) {
            anyhow::bail!("scan_delay_seconds must be in [{MIN_SCAN_DELAY_SECS}, {MAX_SCAN_DELAY_SECS}]");
        }
        let gap = self.entry_exit_tracking.min_gap_seconds;
        if !(MIN_GAP_SECS..=MAX_GAP_SECS).contains(&gap) {
            anyhow::bail!("entry_exit_tracking.min_gap_seconds must be in [{MIN_GAP_SECS}, {MAX_GAP_SECS}]");
        }
        if self.entity_id.is_empty() {
            anyhow::bail!("entity_id must be non-empty");
        }
        Ok(())
    }

    /// True when switching from `self` to `next` must tear down and respawn
    /// the Wiegand decoders.
    pub fn requires_decoder_restart(&self, next: &Settings) -> bool {
        self.wiegand_bits != next.wiegand_bits
            || self.wiegand_timeout_ms != next.wiegand_timeout_ms
    }
}

/// Mutex-guarded settings with atomic persistence.
pub struct SettingsStore {
    path: PathBuf,
    reader_count: usize,
    inner: parking_lot::Mutex<Settings>,
}

impl SettingsStore {
    /// Load `config.json`, persisting `seed` on first boot.
    pub fn load(base_dir: &Path, reader_count: usize, seed: Settings) -> anyhow::Result<Self> {
        let path = base_dir.join("config.json");
        let settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str::<Settings>(&contents)?
        } else {
            persist::write_json(&path, &seed)?;
            seed
        };
        settings.validate(reader_count)?;
        Ok(Self { path, reader_count, inner: parking_lot::Mutex::new(settings) })
    }

    /// Defensive snapshot.
    pub fn get(&self) -> Settings {
        self.inner.lock().clone()
    }

    /// Validate and persist `next`, returning the previous settings so the
    /// caller can decide whether a decoder restart is needed. In-memory state
    /// only changes after the file write succeeds.
    pub fn update(&self, next: Settings) -> anyhow::Result<Settings> {
        next.validate(self.reader_count)?;
        let mut inner = self.inner.lock();
        persist::write_json(&self.path, &next)?;
        let prev = inner.clone();
        *inner = next;
        Ok(prev)
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
