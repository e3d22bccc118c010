// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit tests: an observable relay line, a canned process
//! config, and a fully wired [`AppState`] over a temp directory.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::relay::RelayLine;
use crate::session::sha256_hex;
use crate::state::AppState;
use crate::txlog::Transaction;

/// Relay line that records its drive state and activation count.
pub struct TestLine {
    handle: LineHandle,
}

/// Observer half of a [`TestLine`].
#[derive(Clone)]
pub struct LineHandle {
    active: Arc<AtomicBool>,
    activations: Arc<AtomicUsize>,
}

impl LineHandle {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// How many inactive→active transitions the line has seen.
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

impl RelayLine for TestLine {
    fn set_active(&self, active: bool) {
        let was = self.handle.active.swap(active, Ordering::SeqCst);
        if active && !was {
            self.handle.activations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Build `n` observable relay lines.
pub fn test_lines(n: usize) -> (Vec<Box<dyn RelayLine>>, Vec<LineHandle>) {
    let mut lines: Vec<Box<dyn RelayLine>> = Vec::new();
    let mut handles = Vec::new();
    for _ in 0..n {
        let handle = LineHandle {
            active: Arc::new(AtomicBool::new(false)),
            activations: Arc::new(AtomicUsize::new(0)),
        };
        handles.push(handle.clone());
        lines.push(Box::new(TestLine { handle }));
    }
    (lines, handles)
}

/// Process config rooted at a temp directory: two readers, two relays,
/// admin password "secret".
pub fn test_config(base_dir: &Path) -> AppConfig {
    AppConfig {
        base_dir: base_dir.to_path_buf(),
        host: "127.0.0.1".to_owned(),
        port: 0,
        admin_username: "admin".to_owned(),
        admin_password_digest: Some(sha256_hex("secret")),
        session_ttl_hours: 12,
        storage_cap_gb: 1.0,
        cleanup_trigger: 0.95,
        cleanup_fraction: 0.5,
        relay_pins: "17,27".to_owned(),
        wiegand_pins: "14:15,23:24".to_owned(),
        default_bits: 26,
        scan_delay_seconds: 5,
        entity_id: "test-site".to_owned(),
        remote_credentials: None,
        api_key: None,
    }
}

/// A fully wired state over a temp directory with observable relays.
pub struct TestRig {
    pub state: Arc<AppState>,
    pub upload_rx: mpsc::Receiver<Transaction>,
    pub lines: Vec<LineHandle>,
    pub dir: tempfile::TempDir,
}

pub fn rig() -> anyhow::Result<TestRig> {
    rig_with(|_| {})
}

/// Build a rig, letting the caller tweak the config first.
pub fn rig_with(tweak: impl FnOnce(&mut AppConfig)) -> anyhow::Result<TestRig> {
    let dir = tempfile::tempdir()?;
    let mut config = test_config(dir.path());
    tweak(&mut config);
    let (lines, handles) = test_lines(config.relay_pin_list()?.len());
    let (state, upload_rx) =
        AppState::initialize(config, lines, None, CancellationToken::new())?;
    Ok(TestRig { state, upload_rx, lines: handles, dir })
}

