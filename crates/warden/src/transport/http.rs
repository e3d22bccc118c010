// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the control-plane API.
//!
//! Every response is JSON: success bodies carry `{"status":"success", ...}`,
//! failures the error envelope from [`crate::error`]. The CSV export returns
//! its body inside the JSON envelope; the dashboard depends on that shape.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::analytics;
use crate::error::ApiError;
use crate::monitor::{self, TimeControlError};
use crate::settings::Settings;
use crate::state::{epoch_secs, AppState};
use crate::transport::auth::bearer_token;
use crate::users::User;

const DEFAULT_TX_LIMIT: usize = 100;
const MAX_TX_LIMIT: usize = 1000;
const DEFAULT_ANALYTICS_DAYS: u32 = 7;
const DEFAULT_EXPORT_DAYS: u32 = 30;
const MAX_ANALYTICS_DAYS: u32 = 365;
/// Upper bound on log lines scanned for one analytics request.
const ANALYTICS_SCAN_LIMIT: usize = 100_000;

const MIN_PULSE_SECS: f64 = 0.1;
const MAX_PULSE_SECS: f64 = 60.0;

// -- Request types ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub privacy_protected: bool,
}

#[derive(Debug, Deserialize)]
pub struct CardRequest {
    #[serde(default)]
    pub card_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TogglePrivacyRequest {
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub enable: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayAction {
    Pulse,
    OpenHold,
    CloseHold,
    Normal,
}

#[derive(Debug, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub relay: Option<usize>,
    #[serde(default)]
    pub action: Option<RelayAction>,
    /// Pulse length override in seconds; default 1 s.
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub config: Settings,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSecurityRequest {
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub basic_auth_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetTimeRequest {
    #[serde(default)]
    pub unix_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NtpRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UserReportQuery {
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub days: Option<u32>,
}

// -- Helpers ------------------------------------------------------------------

fn analytics_window(days: Option<u32>, default: u32) -> (u32, i64) {
    let days = days.unwrap_or(default).clamp(1, MAX_ANALYTICS_DAYS);
    let since = epoch_secs() - i64::from(days) * 86_400;
    (days, since)
}

// -- Public handlers ----------------------------------------------------------

/// `GET /status`
pub async fn status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "state": "online",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": s.uptime_secs(),
    }))
}

/// `GET /health` — liveness plus the gauges the dashboard polls.
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let queue_depth = s.upload_tx.max_capacity() - s.upload_tx.capacity();
    Json(json!({
        "status": "success",
        "online": s.reachability.check().await,
        "upload_queue_depth": queue_depth,
        "cache_backlog": s.cache.len(),
        "temperature_c": monitor::read_temperature(),
        "relays": s.relays.states(),
        "live_sessions": s.sessions.live_count(),
    }))
}

/// `POST /login`
pub async fn login(
    State(s): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return ApiError::BadRequest
            .to_http_response("username and password are required")
            .into_response();
    };

    if !s.credentials.verify(&username, &password) {
        return ApiError::Unauthorized.to_http_response("invalid credentials").into_response();
    }

    let (token, session) = s.sessions.issue(&username, epoch_secs());
    tracing::info!(username = %username, "login");
    Json(json!({
        "status": "success",
        "token": token,
        "expires_at": session.expires_at,
    }))
    .into_response()
}

/// `POST /logout`
pub async fn logout(State(s): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = bearer_token(&headers) {
        s.sessions.revoke(token);
    }
    Json(json!({ "status": "success" }))
}

// -- User management ----------------------------------------------------------

/// `GET /get_users`
pub async fn get_users(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let users = s.users.list();
    Json(json!({ "status": "success", "count": users.len(), "users": users }))
}

/// `POST /add_user`
pub async fn add_user(
    State(s): State<Arc<AppState>>,
    Json(req): Json<AddUserRequest>,
) -> impl IntoResponse {
    let (Some(card_number), Some(id), Some(name)) = (req.card_number, req.id, req.name) else {
        return ApiError::BadRequest
            .to_http_response("card_number, id, and name are required")
            .into_response();
    };
    if card_number.is_empty() || id.is_empty() || name.is_empty() {
        return ApiError::BadRequest
            .to_http_response("card_number, id, and name must be non-empty")
            .into_response();
    }
    if !card_number.bytes().all(|b| b.is_ascii_digit()) {
        return ApiError::BadRequest
            .to_http_response("card_number must be decimal digits")
            .into_response();
    }

    let user = User {
        card_number: card_number.clone(),
        id,
        name,
        ref_id: req.ref_id,
        blocked: req.blocked,
        privacy_protected: req.privacy_protected,
    };
    match s.users.add(user) {
        Ok(()) => {
            tracing::info!(card = %card_number, "user added");
            Json(json!({ "status": "success", "card_number": card_number })).into_response()
        }
        Err(e) => {
            tracing::error!(err = %e, "failed to persist user");
            ApiError::Internal.to_http_response("failed to persist user").into_response()
        }
    }
}

fn require_card(card: Option<String>) -> Result<String, axum::response::Response> {
    match card {
        Some(card) if !card.is_empty() => Ok(card),
        _ => Err(ApiError::BadRequest.to_http_response("card_number is required").into_response()),
    }
}

/// `POST /delete_user`
pub async fn delete_user(
    State(s): State<Arc<AppState>>,
    Json(req): Json<CardRequest>,
) -> impl IntoResponse {
    let card = match require_card(req.card_number) {
        Ok(card) => card,
        Err(resp) => return resp,
    };
    match s.users.delete(&card) {
        Ok(true) => {
            tracing::info!(card = %card, "user deleted");
            Json(json!({ "status": "success", "card_number": card })).into_response()
        }
        Ok(false) => ApiError::NotFound.to_http_response("unknown card").into_response(),
        Err(e) => {
            tracing::error!(err = %e, "failed to persist user delete");
            ApiError::Internal.to_http_response("failed to persist change").into_response()
        }
    }
}

async fn set_blocked(s: Arc<AppState>, card: Option<String>, blocked: bool) -> axum::response::Response {
    let card = match require_card(card) {
        Ok(card) => card,
        Err(resp) => return resp,
    };
    match s.users.set_blocked(&card, blocked) {
        Ok(true) => {
            tracing::info!(card = %card, blocked, "blocklist updated");
            Json(json!({ "status": "success", "card_number": card, "blocked": blocked }))
                .into_response()
        }
        Ok(false) => ApiError::NotFound.to_http_response("unknown card").into_response(),
        Err(e) => {
            tracing::error!(err = %e, "failed to persist blocklist change");
            ApiError::Internal.to_http_response("failed to persist change").into_response()
        }
    }
}

/// `POST /block_user`
pub async fn block_user(
    State(s): State<Arc<AppState>>,
    Json(req): Json<CardRequest>,
) -> impl IntoResponse {
    set_blocked(s, req.card_number, true).await
}

/// `POST /unblock_user`
pub async fn unblock_user(
    State(s): State<Arc<AppState>>,
    Json(req): Json<CardRequest>,
) -> impl IntoResponse {
    set_blocked(s, req.card_number, false).await
}

/// `POST /toggle_privacy` — requires admin password re-verification in the
/// body; this switch suppresses audit records.
pub async fn toggle_privacy(
    State(s): State<Arc<AppState>>,
    Json(req): Json<TogglePrivacyRequest>,
) -> impl IntoResponse {
    let card = match require_card(req.card_number) {
        Ok(card) => card,
        Err(resp) => return resp,
    };
    let Some(enable) = req.enable else {
        return ApiError::BadRequest.to_http_response("enable is required").into_response();
    };
    if !req.password.map(|p| s.credentials.verify_password(&p)).unwrap_or(false) {
        return ApiError::Unauthorized.to_http_response("invalid credentials").into_response();
    }

    match s.users.set_privacy(&card, enable) {
        Ok(true) => {
            tracing::info!(card = %card, enable, "privacy protection toggled");
            Json(json!({ "status": "success", "card_number": card, "privacy_protected": enable }))
                .into_response()
        }
        Ok(false) => ApiError::NotFound.to_http_response("unknown card").into_response(),
        Err(e) => {
            tracing::error!(err = %e, "failed to persist privacy change");
            ApiError::Internal.to_http_response("failed to persist change").into_response()
        }
    }
}

// -- Relay control ------------------------------------------------------------

/// `POST /relay`
pub async fn relay(
    State(s): State<Arc<AppState>>,
    Json(req): Json<RelayRequest>,
) -> impl IntoResponse {
    let Some(relay) = req.relay else {
        return ApiError::BadRequest.to_http_response("relay is required").into_response();
    };
    let Some(action) = req.action else {
        return ApiError::BadRequest
            .to_http_response("action must be pulse, open_hold, close_hold, or normal")
            .into_response();
    };
    if relay == 0 || relay > s.relays.count() {
        return ApiError::BadRequest
            .to_http_response(format!("relay must be in 1..={}", s.relays.count()))
            .into_response();
    }

    let result = match action {
        RelayAction::Pulse => {
            let secs = req.duration_seconds.unwrap_or(1.0);
            if !(MIN_PULSE_SECS..=MAX_PULSE_SECS).contains(&secs) {
                return ApiError::BadRequest
                    .to_http_response(format!(
                        "duration_seconds must be in [{MIN_PULSE_SECS}, {MAX_PULSE_SECS}]"
                    ))
                    .into_response();
            }
            s.relays.pulse_manual(relay, Duration::from_secs_f64(secs))
        }
        RelayAction::OpenHold => s.relays.hold_open(relay),
        RelayAction::CloseHold => s.relays.hold_closed(relay),
        RelayAction::Normal => s.relays.normalize(relay),
    };

    match result {
        Ok(()) => {
            let states = s.relays.states();
            Json(json!({ "status": "success", "relay": relay, "states": states })).into_response()
        }
        Err(e) => ApiError::BadRequest.to_http_response(e.to_string()).into_response(),
    }
}

// -- Transactions & analytics -------------------------------------------------

/// `GET /get_transactions?limit=N`
pub async fn get_transactions(
    State(s): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_TX_LIMIT).clamp(1, MAX_TX_LIMIT);
    let transactions = s.txlog.read_recent(limit, None);
    Json(json!({
        "status": "success",
        "count": transactions.len(),
        "transactions": transactions,
    }))
}

/// `GET /get_today_stats`
pub async fn get_today_stats(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = s.txlog.today_stats();
    Json(json!({
        "status": "success",
        "date": Utc::now().format("%Y-%m-%d").to_string(),
        "stats": stats,
    }))
}

/// `GET /get_analytics?days=N`
pub async fn get_analytics(
    State(s): State<Arc<AppState>>,
    Query(q): Query<DaysQuery>,
) -> impl IntoResponse {
    let (days, since) = analytics_window(q.days, DEFAULT_ANALYTICS_DAYS);
    let transactions = s.txlog.read_recent(ANALYTICS_SCAN_LIMIT, Some(since));
    let report = analytics::report(&transactions, days);
    Json(json!({ "status": "success", "analytics": report }))
}

/// `GET /get_user_report?card_number=...&days=N`
pub async fn get_user_report(
    State(s): State<Arc<AppState>>,
    Query(q): Query<UserReportQuery>,
) -> impl IntoResponse {
    let card = match require_card(q.card_number) {
        Ok(card) => card,
        Err(resp) => return resp,
    };
    let (days, since) = analytics_window(q.days, DEFAULT_EXPORT_DAYS);
    let transactions: Vec<_> = s
        .txlog
        .read_recent(ANALYTICS_SCAN_LIMIT, Some(since))
        .into_iter()
        .filter(|tx| tx.card == card)
        .collect();
    let report = analytics::report(&transactions, days);
    Json(json!({
        "status": "success",
        "card_number": card,
        "user": s.users.get(&card),
        "report": report,
    }))
    .into_response()
}

/// `GET /export_csv?days=N` — CSV body inside the JSON envelope, as the
/// dashboard expects.
pub async fn export_csv(
    State(s): State<Arc<AppState>>,
    Query(q): Query<DaysQuery>,
) -> impl IntoResponse {
    let (days, since) = analytics_window(q.days, DEFAULT_EXPORT_DAYS);
    let transactions = s.txlog.read_recent(ANALYTICS_SCAN_LIMIT, Some(since));
    Json(json!({
        "status": "success",
        "days": days,
        "count": transactions.len(),
        "filename": format!("transactions_export_{}.csv", Utc::now().format("%Y%m%d")),
        "csv": analytics::to_csv(&transactions),
    }))
}

// -- Configuration ------------------------------------------------------------

/// `GET /get_config`
pub async fn get_config(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "success", "config": s.settings.get() }))
}

/// `POST /update_config` — validates, persists, and restarts the decoders
/// when the Wiegand parameters changed.
pub async fn update_config(
    State(s): State<Arc<AppState>>,
    Json(req): Json<UpdateConfigRequest>,
) -> impl IntoResponse {
    let next = req.config;
    if let Err(e) = next.validate(s.config.reader_count()) {
        return ApiError::BadRequest.to_http_response(e.to_string()).into_response();
    }

    let prev = match s.settings.update(next.clone()) {
        Ok(prev) => prev,
        Err(e) => {
            tracing::error!(err = %e, "failed to persist config");
            return ApiError::Internal.to_http_response("failed to persist config").into_response();
        }
    };

    let restarted = prev.requires_decoder_restart(&next);
    if restarted {
        tracing::info!("wiegand parameters changed, restarting decoders");
        s.decoders.restart(Arc::clone(&s), &next).await;
    }

    Json(json!({ "status": "success", "config": next, "decoders_restarted": restarted }))
        .into_response()
}

/// `POST /update_security` — rotate the admin password and/or toggle Basic
/// Auth. Always re-verifies the current password.
pub async fn update_security(
    State(s): State<Arc<AppState>>,
    Json(req): Json<UpdateSecurityRequest>,
) -> impl IntoResponse {
    if !req.current_password.map(|p| s.credentials.verify_password(&p)).unwrap_or(false) {
        return ApiError::Unauthorized.to_http_response("invalid credentials").into_response();
    }

    if let Some(ref new_password) = req.new_password {
        if new_password.is_empty() {
            return ApiError::BadRequest
                .to_http_response("new_password must be non-empty")
                .into_response();
        }
        if let Err(e) = s.credentials.rotate_password(new_password) {
            tracing::error!(err = %e, "failed to persist password rotation");
            return ApiError::Internal
                .to_http_response("failed to persist password")
                .into_response();
        }
        tracing::info!("admin password rotated");
    }

    if let Some(enabled) = req.basic_auth_enabled {
        let mut next = s.settings.get();
        next.basic_auth_enabled = enabled;
        if let Err(e) = s.settings.update(next) {
            tracing::error!(err = %e, "failed to persist basic auth toggle");
            return ApiError::Internal.to_http_response("failed to persist config").into_response();
        }
        tracing::info!(enabled, "basic auth toggled");
    }

    Json(json!({ "status": "success" })).into_response()
}

// -- System time --------------------------------------------------------------

/// `GET /get_system_time`
pub async fn get_system_time() -> impl IntoResponse {
    let now = epoch_secs();
    let utc = DateTime::<Utc>::from_timestamp(now, 0)
        .map(|d| d.to_rfc3339())
        .unwrap_or_default();
    Json(json!({ "status": "success", "unix_seconds": now, "utc": utc }))
}

fn time_control_response(result: Result<(), TimeControlError>) -> axum::response::Response {
    match result {
        Ok(()) => Json(json!({ "status": "success" })).into_response(),
        Err(TimeControlError::Unsupported(msg)) => {
            ApiError::NotImplemented.to_http_response(msg).into_response()
        }
        Err(TimeControlError::Failed(msg)) => {
            ApiError::Internal.to_http_response(msg).into_response()
        }
    }
}

/// `POST /set_system_time`
pub async fn set_system_time(Json(req): Json<SetTimeRequest>) -> impl IntoResponse {
    let Some(unix_seconds) = req.unix_seconds else {
        return ApiError::BadRequest.to_http_response("unix_seconds is required").into_response();
    };
    if unix_seconds < 0 {
        return ApiError::BadRequest
            .to_http_response("unix_seconds must be non-negative")
            .into_response();
    }
    tracing::info!(unix_seconds, "setting system time");
    time_control_response(monitor::set_system_time(unix_seconds).await)
}

/// `POST /enable_ntp`
pub async fn enable_ntp(Json(req): Json<NtpRequest>) -> impl IntoResponse {
    let Some(enabled) = req.enabled else {
        return ApiError::BadRequest.to_http_response("enabled is required").into_response();
    };
    tracing::info!(enabled, "toggling ntp");
    time_control_response(monitor::enable_ntp(enabled).await)
}
