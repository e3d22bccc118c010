// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session tokens and the admin credential verifier.
//!
//! Tokens are opaque 256-bit random strings (URL-safe base64), valid until
//! their expiry and lost on restart. The password verifier is an unsalted
//! SHA-256 digest kept for compatibility with existing deployments; an
//! optional `sha256:` prefix tag on the stored digest is tolerated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::persist;

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Lowercase hex SHA-256 digest of `input`.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn strip_tag(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

// -- Sessions -----------------------------------------------------------------

/// A live login session.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Process-memory session map. A token is valid iff it is present and
/// unexpired; expired entries are removed on discovery and by the periodic
/// sweep.
pub struct SessionStore {
    ttl_secs: i64,
    sessions: parking_lot::Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self { ttl_secs, sessions: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Issue a fresh token for `username`.
    pub fn issue(&self, username: &str, now: i64) -> (String, Session) {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes[..]);
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);

        let session = Session {
            username: username.to_owned(),
            issued_at: now,
            expires_at: now + self.ttl_secs,
        };
        self.sessions.lock().insert(token.clone(), session.clone());
        (token, session)
    }

    /// Return the owning username when the token is live. Expired tokens are
    /// removed here rather than waiting for the sweep.
    pub fn validate(&self, token: &str, now: i64) -> Option<String> {
        let mut sessions = self.sessions.lock();
        match sessions.get(token) {
            Some(s) if now < s.expires_at => Some(s.username.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    /// Drop a token (logout). Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }

    /// Remove every expired session; returns how many were dropped.
    pub fn sweep(&self, now: i64) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| now < s.expires_at);
        before - sessions.len()
    }

    pub fn live_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

// -- Admin credentials --------------------------------------------------------

/// Persisted security overrides (`security.json`). Absent until the admin
/// rotates the password through the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecurityFile {
    password_digest: String,
}

/// Single admin identity with a rotatable password digest.
pub struct CredentialStore {
    username: String,
    digest: parking_lot::Mutex<String>,
    security_path: PathBuf,
}

impl CredentialStore {
    /// Build from the configured username/digest, preferring a digest
    /// previously rotated through the API (`security.json`).
    pub fn load(base_dir: &Path, username: String, env_digest: String) -> anyhow::Result<Self> {
        let security_path = base_dir.join("security.json");
        let digest = match persist::load_json_or::<Option<SecurityFile>>(&security_path, None)? {
            Some(file) => file.password_digest,
            None => env_digest,
        };
        Ok(Self {
            username,
            digest: parking_lot::Mutex::new(strip_tag(&digest).to_lowercase()),
            security_path,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Verify a password against the stored digest, constant-time.
    pub fn verify_password(&self, password: &str) -> bool {
        let stored = self.digest.lock().clone();
        constant_time_eq(&sha256_hex(password), &stored)
    }

    /// Verify a username/password pair. Username comparison is
    /// case-sensitive; the digest comparison runs regardless so both paths
    /// take the same time.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = username == self.username;
        let pass_ok = self.verify_password(password);
        user_ok && pass_ok
    }

    /// Rotate the password digest, persisting before updating memory.
    pub fn rotate_password(&self, new_password: &str) -> anyhow::Result<()> {
        let new_digest = sha256_hex(new_password);
        persist::write_json(
            &self.security_path,
            &SecurityFile { password_digest: new_digest.clone() },
        )?;
        *self.digest.lock() = new_digest;
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
