// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warden: networked RFID access-control appliance.

pub mod analytics;
pub mod config;
pub mod error;
#[cfg(feature = "rppal")]
pub mod hw;
pub mod monitor;
pub mod persist;
pub mod policy;
pub mod relay;
pub mod remote;
pub mod session;
pub mod settings;
pub mod state;
#[cfg(test)]
pub mod test_support;
pub mod transport;
pub mod txlog;
pub mod upload;
pub mod users;
pub mod wiegand;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::remote::HttpRemote;
use crate::state::AppState;
use crate::upload::DrainSchedule;

/// Run the appliance until shutdown.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;

    let shutdown = CancellationToken::new();
    let sd = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            sd.cancel();
        }
    });

    let remote =
        HttpRemote::from_credentials_file(config.remote_credentials.as_deref())?.map(Arc::new);
    if remote.is_none() {
        tracing::warn!("no remote credentials configured, uploads stay in the local cache");
    }
    let probe_target = remote.as_ref().and_then(|r| r.probe_target());

    #[cfg(feature = "rppal")]
    let relay_lines = hw::relay_lines(&config)?;
    #[cfg(not(feature = "rppal"))]
    let relay_lines: Vec<Box<dyn relay::RelayLine>> = {
        tracing::warn!("built without the rppal feature, relay outputs are inert");
        (1..=config.relay_pin_list()?.len())
            .map(|relay| Box::new(relay::NullLine { relay }) as Box<dyn relay::RelayLine>)
            .collect()
    };

    let (state, upload_rx) =
        AppState::initialize(config, relay_lines, probe_target, shutdown.clone())?;
    state.decoders.restart(Arc::clone(&state), &state.settings.get()).await;

    #[cfg(feature = "rppal")]
    let _reader_inputs = hw::attach_readers(&state)?;

    upload::spawn_uploader(
        Arc::clone(&state),
        upload_rx,
        remote.clone(),
        Arc::clone(&state.reachability),
    );
    upload::spawn_drainer(
        Arc::clone(&state),
        remote,
        Arc::clone(&state.reachability),
        DrainSchedule::default(),
    );
    monitor::spawn_session_sweeper(&state);
    monitor::spawn_log_monitor(&state);

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let router = transport::build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("warden listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    state.decoders.stop();
    Ok(())
}
