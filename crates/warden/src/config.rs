// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Networked RFID access-control appliance.
#[derive(Debug, Clone, Parser)]
#[command(name = "warden", version, about)]
pub struct AppConfig {
    /// Base directory for all persisted state.
    #[arg(long, env = "WARDEN_BASE_DIR", default_value = "/var/lib/warden")]
    pub base_dir: PathBuf,

    /// Host address to bind on.
    #[arg(long, env = "WARDEN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "WARDEN_PORT", default_value_t = 5001)]
    pub port: u16,

    /// Admin username.
    #[arg(long, env = "WARDEN_ADMIN_USER", default_value = "admin")]
    pub admin_username: String,

    /// Admin password digest (SHA-256 hex, optional `sha256:` prefix).
    /// Defaults to the digest of "admin"; change it.
    #[arg(long, env = "WARDEN_ADMIN_DIGEST")]
    pub admin_password_digest: Option<String>,

    /// Session lifetime in hours.
    #[arg(long, env = "WARDEN_SESSION_TTL_HOURS", default_value_t = 12)]
    pub session_ttl_hours: u64,

    /// Transaction-log storage cap in gigabytes.
    #[arg(long, env = "WARDEN_STORAGE_CAP_GB", default_value_t = 1.0)]
    pub storage_cap_gb: f64,

    /// Fraction of the cap that triggers eviction.
    #[arg(long, env = "WARDEN_CLEANUP_TRIGGER", default_value_t = 0.95)]
    pub cleanup_trigger: f64,

    /// Fraction of the cap eviction shrinks the log back to.
    #[arg(long, env = "WARDEN_CLEANUP_FRACTION", default_value_t = 0.5)]
    pub cleanup_fraction: f64,

    /// Relay output GPIO pins, comma-separated (relay 1 first).
    #[arg(long, env = "WARDEN_RELAY_PINS", default_value = "17,27")]
    pub relay_pins: String,

    /// Wiegand reader pins as `d0:d1` pairs, comma-separated (reader 1 first).
    #[arg(long, env = "WARDEN_WIEGAND_PINS", default_value = "14:15,23:24")]
    pub wiegand_pins: String,

    /// Default Wiegand frame width for unconfigured readers (26 or 34).
    #[arg(long, env = "WARDEN_DEFAULT_BITS", default_value_t = 26)]
    pub default_bits: u8,

    /// Default dedup window seconds seeded into a fresh config.
    #[arg(long, env = "WARDEN_SCAN_DELAY", default_value_t = 5)]
    pub scan_delay_seconds: u64,

    /// Entity id attached to remote documents.
    #[arg(long, env = "WARDEN_ENTITY_ID", default_value = "main")]
    pub entity_id: String,

    /// Path to the remote document-store credentials JSON file.
    #[arg(long, env = "WARDEN_REMOTE_CREDENTIALS")]
    pub remote_credentials: Option<PathBuf>,

    /// Legacy shared API secret; when set, write routes also accept it via
    /// the `X-Api-Key` header.
    #[arg(long, env = "WARDEN_API_KEY")]
    pub api_key: Option<String>,
}

impl AppConfig {
    /// Parsed relay pin list.
    pub fn relay_pin_list(&self) -> anyhow::Result<Vec<u8>> {
        self.relay_pins
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<u8>()
                    .map_err(|_| anyhow::anyhow!("invalid relay pin: {p:?}"))
            })
            .collect()
    }

    /// Parsed `(d0, d1)` pin pairs, one per reader.
    pub fn reader_pin_list(&self) -> anyhow::Result<Vec<(u8, u8)>> {
        self.wiegand_pins
            .split(',')
            .map(|pair| {
                let (d0, d1) = pair
                    .trim()
                    .split_once(':')
                    .ok_or_else(|| anyhow::anyhow!("wiegand pins must be d0:d1 pairs, got {pair:?}"))?;
                Ok((
                    d0.parse::<u8>().map_err(|_| anyhow::anyhow!("invalid pin: {d0:?}"))?,
                    d1.parse::<u8>().map_err(|_| anyhow::anyhow!("invalid pin: {d1:?}"))?,
                ))
            })
            .collect()
    }

    pub fn reader_count(&self) -> usize {
        self.wiegand_pins.split(',').filter(|s| !s.trim().is_empty()).count()
    }

    pub fn session_ttl_secs(&self) -> i64 {
        (self.session_ttl_hours * 3600) as i64
    }

    pub fn storage_cap_bytes(&self) -> u64 {
        (self.storage_cap_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }

    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        let relays = self.relay_pin_list()?;
        let readers = self.reader_pin_list()?;

        if readers.is_empty() {
            anyhow::bail!("at least one wiegand reader must be configured");
        }
        if relays.len() < readers.len() {
            anyhow::bail!(
                "each reader needs a relay: {} readers but {} relays",
                readers.len(),
                relays.len()
            );
        }
        if !matches!(self.default_bits, 26 | 34) {
            anyhow::bail!("default bit width must be 26 or 34");
        }
        if !(0.0..=1.0).contains(&self.cleanup_fraction)
            || !(0.0..=1.0).contains(&self.cleanup_trigger)
        {
            anyhow::bail!("cleanup fractions must be within (0, 1]");
        }
        if self.cleanup_fraction > self.cleanup_trigger {
            anyhow::bail!("cleanup fraction must not exceed the trigger fraction");
        }
        if self.storage_cap_gb <= 0.0 {
            anyhow::bail!("storage cap must be positive");
        }
        if self.entity_id.is_empty() {
            anyhow::bail!("entity id must be non-empty");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
