// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the control-plane HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed, and no GPIO: relay
//! lines are the inert development implementation.

use std::path::Path;
use std::sync::Arc;

use axum_test::TestServer;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use warden::config::AppConfig;
use warden::relay::{NullLine, RelayLine};
use warden::session::sha256_hex;
use warden::state::{epoch_secs, AppState};
use warden::transport::build_router;
use warden::txlog::{Transaction, TxStatus};

fn test_config(base_dir: &Path) -> AppConfig {
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

fn test_state(config: AppConfig) -> Arc<AppState> {
    let lines: Vec<Box<dyn RelayLine>> =
        vec![Box::new(NullLine { relay: 1 }), Box::new(NullLine { relay: 2 })];
    let (state, _upload_rx) = AppState::initialize(config, lines, None, CancellationToken::new())
        .expect("failed to initialize state");
    state
}

fn test_server(state: Arc<AppState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

async fn login(server: &TestServer, password: &str) -> String {
    let resp =
        server.post("/login").json(&json!({"username": "admin", "password": password})).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    body["token"].as_str().map(str::to_owned).unwrap_or_default()
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

#[tokio::test]
async fn status_and_health_are_public() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));

    let resp = server.get("/status").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["state"], "online");

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["relays"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["cache_backlog"], 0);
    Ok(())
}

#[tokio::test]
async fn unauthenticated_requests_get_error_envelope() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));

    for path in ["/get_users", "/get_config", "/get_transactions"] {
        let resp = server.get(path).await;
        resp.assert_status_unauthorized();
        let body: Value = resp.json();
        assert_eq!(body["status"], "error", "path {path}");
        assert!(body["message"].is_string());
    }

    let resp = server.post("/add_user").json(&json!({"card_number": "1"})).await;
    resp.assert_status_unauthorized();
    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials_generically() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));

    for body in [
        json!({"username": "admin", "password": "wrong"}),
        json!({"username": "intruder", "password": "secret"}),
    ] {
        let resp = server.post("/login").json(&body).await;
        resp.assert_status_unauthorized();
        let parsed: Value = resp.json();
        assert_eq!(parsed["message"], "invalid credentials");
    }

    let resp = server.post("/login").json(&json!({"username": "admin"})).await;
    resp.assert_status_bad_request();
    Ok(())
}

#[tokio::test]
async fn login_token_grants_access_and_logout_revokes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));

    let token = login(&server, "secret").await;
    assert!(token.len() >= 43);

    let resp = server.get("/get_users").add_header("authorization", bearer(&token)).await;
    resp.assert_status_ok();

    let resp = server.post("/logout").add_header("authorization", bearer(&token)).await;
    resp.assert_status_ok();

    let resp = server.get("/get_users").add_header("authorization", bearer(&token)).await;
    resp.assert_status_unauthorized();
    Ok(())
}

#[tokio::test]
async fn user_roundtrip_and_blocklist() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));
    let token = login(&server, "secret").await;

    let resp = server
        .post("/add_user")
        .add_header("authorization", bearer(&token))
        .json(&json!({"card_number": "12345678", "id": "emp-1", "name": "John"}))
        .await;
    resp.assert_status_ok();

    let resp = server.get("/get_users").add_header("authorization", bearer(&token)).await;
    let body: Value = resp.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["users"][0]["card_number"], "12345678");
    assert_eq!(body["users"][0]["blocked"], false);

    let resp = server
        .post("/block_user")
        .add_header("authorization", bearer(&token))
        .json(&json!({"card_number": "12345678"}))
        .await;
    resp.assert_status_ok();

    let resp = server.get("/get_users").add_header("authorization", bearer(&token)).await;
    let body: Value = resp.json();
    assert_eq!(body["users"][0]["blocked"], true);

    let resp = server
        .post("/delete_user")
        .add_header("authorization", bearer(&token))
        .json(&json!({"card_number": "12345678"}))
        .await;
    resp.assert_status_ok();

    let resp = server.get("/get_users").add_header("authorization", bearer(&token)).await;
    let body: Value = resp.json();
    assert_eq!(body["count"], 0);

    // Unknown card after deletion.
    let resp = server
        .post("/block_user")
        .add_header("authorization", bearer(&token))
        .json(&json!({"card_number": "12345678"}))
        .await;
    resp.assert_status_not_found();
    Ok(())
}

#[tokio::test]
async fn add_user_validates_fields() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));
    let token = login(&server, "secret").await;

    for body in [
        json!({"id": "emp-1", "name": "John"}),
        json!({"card_number": "", "id": "emp-1", "name": "John"}),
        json!({"card_number": "12ab", "id": "emp-1", "name": "John"}),
    ] {
        let resp = server
            .post("/add_user")
            .add_header("authorization", bearer(&token))
            .json(&body)
            .await;
        resp.assert_status_bad_request();
        let parsed: Value = resp.json();
        assert_eq!(parsed["status"], "error");
    }
    Ok(())
}

#[tokio::test]
async fn toggle_privacy_requires_admin_password() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));
    let token = login(&server, "secret").await;

    server
        .post("/add_user")
        .add_header("authorization", bearer(&token))
        .json(&json!({"card_number": "99999", "id": "emp-2", "name": "CEO"}))
        .await
        .assert_status_ok();

    let resp = server
        .post("/toggle_privacy")
        .add_header("authorization", bearer(&token))
        .json(&json!({"card_number": "99999", "password": "wrong", "enable": true}))
        .await;
    resp.assert_status_unauthorized();

    let resp = server
        .post("/toggle_privacy")
        .add_header("authorization", bearer(&token))
        .json(&json!({"card_number": "99999", "password": "secret", "enable": true}))
        .await;
    resp.assert_status_ok();

    let resp = server.get("/get_users").add_header("authorization", bearer(&token)).await;
    let body: Value = resp.json();
    assert_eq!(body["users"][0]["privacy_protected"], true);
    Ok(())
}

#[tokio::test]
async fn relay_actions_and_validation() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(test_config(tmp.path()));
    let server = test_server(Arc::clone(&state));
    let token = login(&server, "secret").await;

    let resp = server
        .post("/relay")
        .add_header("authorization", bearer(&token))
        .json(&json!({"relay": 1, "action": "open_hold"}))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["states"][0], "held_open");
    assert_eq!(body["states"][1], "idle");

    let resp = server
        .post("/relay")
        .add_header("authorization", bearer(&token))
        .json(&json!({"relay": 1, "action": "normal"}))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["states"][0], "idle");

    // Out-of-range relay and unknown action are 400s.
    let resp = server
        .post("/relay")
        .add_header("authorization", bearer(&token))
        .json(&json!({"relay": 3, "action": "pulse"}))
        .await;
    resp.assert_status_bad_request();

    let resp = server
        .post("/relay")
        .add_header("authorization", bearer(&token))
        .json(&json!({"relay": 1}))
        .await;
    resp.assert_status_bad_request();
    Ok(())
}

#[tokio::test]
async fn config_roundtrip_and_validation() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));
    let token = login(&server, "secret").await;

    let resp = server.get("/get_config").add_header("authorization", bearer(&token)).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    let mut config = body["config"].clone();
    assert_eq!(config["wiegand_bits"]["reader_1"], 26);

    config["wiegand_bits"]["reader_1"] = json!(34);
    config["scan_delay_seconds"] = json!(10);
    let resp = server
        .post("/update_config")
        .add_header("authorization", bearer(&token))
        .json(&json!({"config": config}))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["decoders_restarted"], true);

    let resp = server.get("/get_config").add_header("authorization", bearer(&token)).await;
    let body: Value = resp.json();
    assert_eq!(body["config"], config, "update then get yields the same object");

    // Invalid bit width is a 400 and leaves the config untouched.
    let mut bad = config.clone();
    bad["wiegand_bits"]["reader_1"] = json!(33);
    let resp = server
        .post("/update_config")
        .add_header("authorization", bearer(&token))
        .json(&json!({"config": bad}))
        .await;
    resp.assert_status_bad_request();

    let resp = server.get("/get_config").add_header("authorization", bearer(&token)).await;
    let body: Value = resp.json();
    assert_eq!(body["config"], config);
    Ok(())
}

#[tokio::test]
async fn transactions_analytics_and_csv() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let state = test_state(test_config(tmp.path()));
    let now = epoch_secs();
    for i in 0..5 {
        state.txlog.append(&Transaction {
            name: "John".to_owned(),
            card: "12345678".to_owned(),
            reader: 1,
            status: if i == 0 { TxStatus::Denied } else { TxStatus::Granted },
            timestamp: now - 4 + i,
        })?;
    }
    let server = test_server(state);
    let token = login(&server, "secret").await;

    let resp = server
        .get("/get_transactions")
        .add_query_param("limit", 3)
        .add_header("authorization", bearer(&token))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["count"], 3);
    assert_eq!(body["transactions"][0]["timestamp"], now);

    let resp = server.get("/get_today_stats").add_header("authorization", bearer(&token)).await;
    let body: Value = resp.json();
    assert_eq!(body["stats"]["total"], 5);
    assert_eq!(body["stats"]["denied"], 1);

    let resp = server
        .get("/get_analytics")
        .add_query_param("days", 7)
        .add_header("authorization", bearer(&token))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["analytics"]["total"], 5);
    assert_eq!(body["analytics"]["by_status"]["granted"], 4);
    assert_eq!(body["analytics"]["distinct_cards"], 1);

    let resp = server
        .get("/get_user_report")
        .add_query_param("card_number", "12345678")
        .add_header("authorization", bearer(&token))
        .await;
    let body: Value = resp.json();
    assert_eq!(body["report"]["total"], 5);

    let resp = server.get("/export_csv").add_header("authorization", bearer(&token)).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "success");
    let csv = body["csv"].as_str().unwrap_or_default();
    assert!(csv.starts_with("timestamp,datetime,name,card,reader,status\n"));
    assert_eq!(csv.lines().count(), 6, "header plus five records");
    Ok(())
}

#[tokio::test]
async fn update_security_rotates_password_and_enables_basic() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));
    let token = login(&server, "secret").await;

    // Wrong current password is rejected.
    let resp = server
        .post("/update_security")
        .add_header("authorization", bearer(&token))
        .json(&json!({"current_password": "wrong", "new_password": "rotated"}))
        .await;
    resp.assert_status_unauthorized();

    let resp = server
        .post("/update_security")
        .add_header("authorization", bearer(&token))
        .json(&json!({"current_password": "secret", "new_password": "rotated", "basic_auth_enabled": true}))
        .await;
    resp.assert_status_ok();

    // Old password no longer works; new one does.
    let resp =
        server.post("/login").json(&json!({"username": "admin", "password": "secret"})).await;
    resp.assert_status_unauthorized();
    login(&server, "rotated").await;

    // Basic auth now accepted with the rotated password.
    use base64::Engine as _;
    let basic = base64::engine::general_purpose::STANDARD.encode("admin:rotated");
    let resp = server.get("/get_users").add_header("authorization", format!("Basic {basic}")).await;
    resp.assert_status_ok();

    // Wrong Basic credentials still rejected.
    let basic = base64::engine::general_purpose::STANDARD.encode("admin:nope");
    let resp = server.get("/get_users").add_header("authorization", format!("Basic {basic}")).await;
    resp.assert_status_unauthorized();
    Ok(())
}

#[tokio::test]
async fn basic_auth_disabled_by_default() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));

    use base64::Engine as _;
    let basic = base64::engine::general_purpose::STANDARD.encode("admin:secret");
    let resp = server.get("/get_users").add_header("authorization", format!("Basic {basic}")).await;
    resp.assert_status_unauthorized();
    Ok(())
}

#[tokio::test]
async fn legacy_api_key_accepted_on_write_routes_only() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut config = test_config(tmp.path());
    config.api_key = Some("legacy-shared-secret".to_owned());
    let server = test_server(test_state(config));

    let resp = server
        .post("/add_user")
        .add_header("x-api-key", "legacy-shared-secret")
        .json(&json!({"card_number": "555", "id": "emp-9", "name": "Kay"}))
        .await;
    resp.assert_status_ok();

    // Reads still require a session or Basic.
    let resp = server.get("/get_users").add_header("x-api-key", "legacy-shared-secret").await;
    resp.assert_status_unauthorized();

    let resp = server
        .post("/add_user")
        .add_header("x-api-key", "wrong")
        .json(&json!({"card_number": "556", "id": "emp-10", "name": "Lee"}))
        .await;
    resp.assert_status_unauthorized();
    Ok(())
}

#[tokio::test]
async fn get_system_time_reports_now() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let server = test_server(test_state(test_config(tmp.path())));
    let token = login(&server, "secret").await;

    let before = epoch_secs();
    let resp = server.get("/get_system_time").add_header("authorization", bearer(&token)).await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    let reported = body["unix_seconds"].as_i64().unwrap_or_default();
    assert!((reported - before).abs() <= 5);

    let resp = server
        .post("/set_system_time")
        .add_header("authorization", bearer(&token))
        .json(&json!({}))
        .await;
    resp.assert_status_bad_request();
    Ok(())
}
