// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable card → user store plus the redundant blocklist set.
//!
//! The blocklist is derivable from the users' `blocked` flags but kept as a
//! separate set (and file) for O(1) lookup on the scan hot path. Every
//! mutation rewrites both files atomically under one mutex, so the two are
//! always consistent on disk after a successful call. Writes go to a scratch
//! copy first: a failed persist leaves the in-memory state untouched.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::persist;

/// A registered card holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Decimal card number; primary key.
    pub card_number: String,
    /// Stable internal id.
    pub id: String,
    pub name: String,
    /// Optional external reference (HR system, member DB, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub blocked: bool,
    /// Grants access but suppresses every persisted record of the scan.
    #[serde(default)]
    pub privacy_protected: bool,
}

#[derive(Clone, Default)]
struct Inner {
    users: HashMap<String, User>,
    blocked: HashSet<String>,
}

pub struct UserStore {
    users_path: PathBuf,
    blocked_path: PathBuf,
    inner: parking_lot::Mutex<Inner>,
}

impl UserStore {
    /// Load the store from `users.json` / `blocked_users.json` under
    /// `base_dir`; missing files start empty.
    pub fn load(base_dir: &Path) -> anyhow::Result<Self> {
        let users_path = base_dir.join("users.json");
        let blocked_path = base_dir.join("blocked_users.json");

        let users: HashMap<String, User> = persist::load_json_or(&users_path, HashMap::new())?;
        let blocked_list: Vec<String> = persist::load_json_or(&blocked_path, Vec::new())?;
        let mut blocked: HashSet<String> = blocked_list.into_iter().collect();

        // Re-derive the set from the flags in case the two files diverged
        // (e.g. a crash between historical non-atomic writes).
        for user in users.values() {
            if user.blocked {
                blocked.insert(user.card_number.clone());
            } else {
                blocked.remove(&user.card_number);
            }
        }

        Ok(Self { users_path, blocked_path, inner: parking_lot::Mutex::new(Inner { users, blocked }) })
    }

    fn persist(&self, next: &Inner) -> anyhow::Result<()> {
        persist::write_json(&self.users_path, &next.users)?;
        let mut list: Vec<&String> = next.blocked.iter().collect();
        list.sort();
        persist::write_json(&self.blocked_path, &list)?;
        Ok(())
    }

    pub fn get(&self, card: &str) -> Option<User> {
        self.inner.lock().users.get(card).cloned()
    }

    pub fn is_blocked(&self, card: &str) -> bool {
        self.inner.lock().blocked.contains(card)
    }

    /// All users, sorted by name then card for stable listings.
    pub fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.inner.lock().users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.card_number.cmp(&b.card_number)));
        users
    }

    /// Insert or replace a user. Card, id, and name must be non-empty and the
    /// card must be decimal digits.
    pub fn add(&self, user: User) -> anyhow::Result<()> {
        if user.card_number.is_empty() || user.id.is_empty() || user.name.is_empty() {
            anyhow::bail!("card_number, id, and name are required");
        }
        if !user.card_number.bytes().all(|b| b.is_ascii_digit()) {
            anyhow::bail!("card_number must be decimal digits");
        }

        let mut inner = self.inner.lock();
        let mut next = inner.clone();
        if user.blocked {
            next.blocked.insert(user.card_number.clone());
        } else {
            next.blocked.remove(&user.card_number);
        }
        next.users.insert(user.card_number.clone(), user);
        self.persist(&next)?;
        *inner = next;
        Ok(())
    }

    /// Remove a user (and its blocklist entry). Returns false when the card
    /// is unknown.
    pub fn delete(&self, card: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.users.contains_key(card) {
            return Ok(false);
        }
        let mut next = inner.clone();
        next.users.remove(card);
        next.blocked.remove(card);
        self.persist(&next)?;
        *inner = next;
        Ok(true)
    }

    /// Flip the blocked flag, keeping the set and the user record in sync.
    pub fn set_blocked(&self, card: &str, blocked: bool) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.users.contains_key(card) {
            return Ok(false);
        }
        let mut next = inner.clone();
        if let Some(user) = next.users.get_mut(card) {
            user.blocked = blocked;
        }
        if blocked {
            next.blocked.insert(card.to_owned());
        } else {
            next.blocked.remove(card);
        }
        self.persist(&next)?;
        *inner = next;
        Ok(true)
    }

    pub fn set_privacy(&self, card: &str, enabled: bool) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.users.contains_key(card) {
            return Ok(false);
        }
        let mut next = inner.clone();
        if let Some(user) = next.users.get_mut(card) {
            user.privacy_protected = enabled;
        }
        self.persist(&next)?;
        *inner = next;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod tests;
