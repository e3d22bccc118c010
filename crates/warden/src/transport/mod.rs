// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the control plane.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the axum `Router` with all control-plane routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Public
        .route("/status", get(http::status))
        .route("/health", get(http::health))
        .route("/login", post(http::login))
        .route("/logout", post(http::logout))
        // Users & blocklist
        .route("/get_users", get(http::get_users))
        .route("/add_user", post(http::add_user))
        .route("/delete_user", post(http::delete_user))
        .route("/block_user", post(http::block_user))
        .route("/unblock_user", post(http::unblock_user))
        .route("/toggle_privacy", post(http::toggle_privacy))
        // Relays
        .route("/relay", post(http::relay))
        // Transactions & analytics
        .route("/get_transactions", get(http::get_transactions))
        .route("/get_today_stats", get(http::get_today_stats))
        .route("/get_analytics", get(http::get_analytics))
        .route("/get_user_report", get(http::get_user_report))
        .route("/export_csv", get(http::export_csv))
        // Configuration & security
        .route("/get_config", get(http::get_config))
        .route("/update_config", post(http::update_config))
        .route("/update_security", post(http::update_security))
        // System time
        .route("/get_system_time", get(http::get_system_time))
        .route("/set_system_time", post(http::set_system_time))
        .route("/enable_ntp", post(http::enable_ntp))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
