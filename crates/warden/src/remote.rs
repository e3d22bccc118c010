// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote document-store client and the cached reachability probe.
//!
//! The store itself is an external collaborator; this module only implements
//! its write contract: each uploaded document carries the transaction fields
//! plus `entity_id`, and the server assigns its own creation timestamp and
//! document id.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;

/// Bounded timeout on every remote write. The hot path never waits on this;
/// only the uploader and drainer tasks do.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Write contract of the remote document store.
pub trait RemoteStore: Send + Sync + 'static {
    fn insert(&self, doc: serde_json::Value) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Credentials file pointed at by `--remote-credentials`.
#[derive(Debug, Deserialize)]
struct RemoteCredentials {
    url: String,
    #[serde(default)]
    token: Option<String>,
}

/// HTTP client for the remote document store.
pub struct HttpRemote {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        let client =
            reqwest::Client::builder().timeout(REMOTE_TIMEOUT).build().unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), token, client }
    }

    /// Load the client from the credentials file; `None` when the appliance
    /// runs without a remote (every record then stays in the cache).
    pub fn from_credentials_file(path: Option<&Path>) -> anyhow::Result<Option<Self>> {
        let Some(path) = path else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path)?;
        let creds: RemoteCredentials = serde_json::from_str(&contents)?;
        Ok(Some(Self::new(creds.url, creds.token)))
    }

    /// Host:port probe target derived from the remote URL (443 unless the
    /// URL is plain http).
    pub fn probe_target(&self) -> Option<String> {
        let rest = self
            .base_url
            .strip_prefix("https://")
            .or_else(|| self.base_url.strip_prefix("http://"))?;
        let default_port = if self.base_url.starts_with("https://") { 443 } else { 80 };
        let host = rest.split('/').next()?;
        if host.contains(':') {
            Some(host.to_owned())
        } else {
            Some(format!("{host}:{default_port}"))
        }
    }
}

impl RemoteStore for HttpRemote {
    async fn insert(&self, doc: serde_json::Value) -> anyhow::Result<()> {
        let mut req = self.client.post(format!("{}/documents", self.base_url)).json(&doc);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }
}

// -- Reachability -------------------------------------------------------------

/// Default probe when no remote is configured: a public resolver.
pub const DEFAULT_PROBE_TARGET: &str = "1.1.1.1:53";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Lightweight TCP reachability probe with a short-lived cached verdict, so
/// the uploader does not open a connection per transaction.
pub struct Reachability {
    target: String,
    ttl: Duration,
    cached: parking_lot::Mutex<Option<(Instant, bool)>>,
}

impl Reachability {
    pub fn new(target: String, ttl: Duration) -> Self {
        Self { target, ttl, cached: parking_lot::Mutex::new(None) }
    }

    /// Current verdict, probing at most once per TTL.
    pub async fn check(&self) -> bool {
        if let Some((at, verdict)) = *self.cached.lock() {
            if at.elapsed() < self.ttl {
                return verdict;
            }
        }

        let verdict = matches!(
            tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(&self.target))
                .await,
            Ok(Ok(_))
        );
        *self.cached.lock() = Some((Instant::now(), verdict));
        tracing::debug!(target = %self.target, reachable = verdict, "reachability probed");
        verdict
    }
}
