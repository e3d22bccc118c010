// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: everything the handlers and workers share.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::relay::{RelayDriver, RelayLine};
use crate::remote::{Reachability, DEFAULT_PROBE_TARGET};
use crate::session::{sha256_hex, CredentialStore, SessionStore};
use crate::settings::SettingsStore;
use crate::txlog::{Transaction, TransactionLog};
use crate::upload::{FailedCache, UPLOAD_QUEUE_CAPACITY};
use crate::users::UserStore;
use crate::wiegand::DecoderSupervisor;

/// Shared appliance state, built once at startup and passed by reference.
pub struct AppState {
    pub config: AppConfig,
    pub settings: SettingsStore,
    pub users: UserStore,
    pub sessions: SessionStore,
    pub credentials: CredentialStore,
    pub txlog: TransactionLog,
    pub cache: Arc<FailedCache>,
    pub relays: Arc<RelayDriver>,
    pub decoders: DecoderSupervisor,
    pub upload_tx: mpsc::Sender<Transaction>,
    pub reachability: Arc<Reachability>,
    /// card → last accepted scan time, bounded by the dedup window.
    pub dedup: parking_lot::Mutex<HashMap<String, i64>>,
    /// card → last seen time for the entry/exit gate.
    pub entry_exit: parking_lot::Mutex<HashMap<String, i64>>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    /// Load every store under the base directory and wire the channels.
    /// Relay lines are injected so tests and GPIO-less hosts can run the
    /// full stack.
    pub fn initialize(
        config: AppConfig,
        relay_lines: Vec<Box<dyn RelayLine>>,
        probe_target: Option<String>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<(Arc<Self>, mpsc::Receiver<Transaction>)> {
        std::fs::create_dir_all(&config.base_dir)?;

        let seed = crate::settings::Settings::seeded(
            config.reader_count(),
            config.default_bits,
            &config.entity_id,
            config.scan_delay_seconds,
        );
        let settings = SettingsStore::load(&config.base_dir, config.reader_count(), seed)?;
        let users = UserStore::load(&config.base_dir)?;
        let sessions = SessionStore::new(config.session_ttl_secs());
        let digest = config
            .admin_password_digest
            .clone()
            .unwrap_or_else(|| {
                tracing::warn!("no admin digest configured, using default password");
                sha256_hex("admin")
            });
        let credentials =
            CredentialStore::load(&config.base_dir, config.admin_username.clone(), digest)?;
        let txlog = TransactionLog::open(&config.base_dir, config.storage_cap_bytes())?;
        let cache = Arc::new(FailedCache::open(&config.base_dir));
        let relays = Arc::new(RelayDriver::new(relay_lines));
        let (upload_tx, upload_rx) = mpsc::channel(UPLOAD_QUEUE_CAPACITY);
        let reachability = Arc::new(Reachability::new(
            probe_target.unwrap_or_else(|| DEFAULT_PROBE_TARGET.to_owned()),
            std::time::Duration::from_secs(30),
        ));

        let state = Arc::new(Self {
            config,
            settings,
            users,
            sessions,
            credentials,
            txlog,
            cache,
            relays,
            decoders: DecoderSupervisor::new(),
            upload_tx,
            reachability,
            dedup: parking_lot::Mutex::new(HashMap::new()),
            entry_exit: parking_lot::Mutex::new(HashMap::new()),
            shutdown,
            started_at: Instant::now(),
        });
        Ok((state, upload_rx))
    }

    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Current wall-clock time as epoch seconds.
pub fn epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
