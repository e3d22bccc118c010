// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Housekeeping workers and OS-facing probes: session sweep, log cap
//! enforcement, board temperature, and system-time control.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

use crate::state::{epoch_secs, AppState};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const LOG_MONITOR_INTERVAL: Duration = Duration::from_secs(120);

/// Spawn the periodic expired-session sweep.
pub fn spawn_session_sweeper(state: &Arc<AppState>) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            let removed = state.sessions.sweep(epoch_secs());
            if removed > 0 {
                tracing::debug!(removed, "expired sessions swept");
            }
        }
    });
}

/// Spawn the storage-cap monitor: runs log eviction and refreshes the
/// `daily_stats.json` snapshot the dashboard polls.
pub fn spawn_log_monitor(state: &Arc<AppState>) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(LOG_MONITOR_INTERVAL);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let removed =
                state.txlog.evict(state.config.cleanup_trigger, state.config.cleanup_fraction);
            if removed > 0 {
                tracing::info!(removed, "log eviction pass removed day files");
            }

            let stats = state.txlog.today_stats();
            let path = state.config.base_dir.join("daily_stats.json");
            if let Err(e) = crate::persist::write_json(&path, &stats) {
                tracing::warn!(err = %e, "failed to write daily stats snapshot");
            }
        }
    });
}

/// Board temperature in °C from the OS thermal interface; `None` on
/// platforms without one.
pub fn read_temperature() -> Option<f64> {
    let raw = std::fs::read_to_string("/sys/class/thermal/thermal_zone0/temp").ok()?;
    let millideg: i64 = raw.trim().parse().ok()?;
    Some(millideg as f64 / 1000.0)
}

// -- System time --------------------------------------------------------------

/// Failures from shelling out to the OS time utilities.
#[derive(Debug)]
pub enum TimeControlError {
    /// The utility is not present on this platform.
    Unsupported(String),
    /// The utility ran and failed; carries its stderr.
    Failed(String),
}

async fn run_time_command(program: &str, args: &[String]) -> Result<(), TimeControlError> {
    let output = match Command::new(program).args(args).output().await {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TimeControlError::Unsupported(format!("{program} not available")));
        }
        Err(e) => return Err(TimeControlError::Failed(e.to_string())),
    };

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        Err(TimeControlError::Failed(format!("{program} exited {}: {stderr}", output.status)))
    }
}

/// Set the wall clock. The utility is expected to be pre-authorized for the
/// service user.
pub async fn set_system_time(unix_seconds: i64) -> Result<(), TimeControlError> {
    run_time_command("date", &["-s".to_owned(), format!("@{unix_seconds}")]).await
}

/// Toggle NTP synchronization via `timedatectl`.
pub async fn enable_ntp(enabled: bool) -> Result<(), TimeControlError> {
    run_time_command(
        "timedatectl",
        &["set-ntp".to_owned(), if enabled { "true" } else { "false" }.to_owned()],
    )
    .await
}
