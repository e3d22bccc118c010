// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication middleware: session token OR HTTP Basic, plus the legacy
//! opt-in shared secret on write routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;

use crate::error::ApiError;
use crate::session::constant_time_eq;
use crate::state::{epoch_secs, AppState};

/// Routes reachable without credentials.
const PUBLIC_PATHS: &[&str] = &["/status", "/health", "/login"];

/// Extract the bearer token from headers, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Verify an HTTP Basic header value against the admin credentials.
/// Username comparison is case-sensitive; the digest compare is
/// constant-time inside the credential store.
pub fn check_basic(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(encoded) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = pair.split_once(':') else {
        return false;
    };
    state.credentials.verify(username, password)
}

fn check_api_key(state: &AppState, headers: &HeaderMap, method: &Method) -> bool {
    let Some(ref expected) = state.config.api_key else {
        return false;
    };
    if *method != Method::POST {
        return false;
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|key| constant_time_eq(key, expected))
        .unwrap_or(false)
}

/// True when the request carries any accepted credential.
pub fn authenticated(state: &AppState, headers: &HeaderMap, method: &Method) -> bool {
    if let Some(token) = bearer_token(headers) {
        if state.sessions.validate(token, epoch_secs()).is_some() {
            return true;
        }
    }
    if state.settings.get().basic_auth_enabled && check_basic(state, headers) {
        return true;
    }
    check_api_key(state, headers, method)
}

/// Axum middleware enforcing authentication on everything but the public
/// routes. Failures carry the standard error envelope and never reveal which
/// credential was wrong.
pub async fn auth_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if PUBLIC_PATHS.contains(&path) {
        return next.run(req).await;
    }

    if !authenticated(&state, req.headers(), req.method()) {
        return ApiError::Unauthorized
            .to_http_response("authentication required")
            .into_response();
    }

    next.run(req).await
}
