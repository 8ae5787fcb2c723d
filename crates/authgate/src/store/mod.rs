// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential persistence and the authenticated-session marker.
//!
//! Both are narrow seams: the auth service only needs an existence check,
//! the stored pair, and a way to overwrite it; plus a boolean flag that
//! survives the process.  [`MemoryStore`] keeps both in memory,
//! [`persist::FileStore`] keeps both in one JSON file.

pub mod persist;

use parking_lot::Mutex;

/// Remember-me storage for one username/password pair.
pub trait CredentialStore: Send + Sync {
    fn has_credential(&self) -> bool;

    /// Stored username, empty when nothing is stored.
    fn username(&self) -> String;

    /// Stored password, empty when nothing is stored.
    fn password(&self) -> String;

    fn set_credentials(&self, username: &str, password: &str) -> anyhow::Result<()>;
}

/// Marker recording that the last known state was authenticated.
///
/// May be stale; callers pair it with the identity holder.
pub trait SessionFlag: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn set_authenticated(&self, authenticated: bool) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    credentials: Option<(String, String)>,
    authenticated: bool,
}

/// In-memory credential store and session flag.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with credentials and a flag value.
    pub fn seeded(username: &str, password: &str, authenticated: bool) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                credentials: Some((username.to_owned(), password.to_owned())),
                authenticated,
            }),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn has_credential(&self) -> bool {
        self.state.lock().credentials.is_some()
    }

    fn username(&self) -> String {
        self.state.lock().credentials.as_ref().map(|(u, _)| u.clone()).unwrap_or_default()
    }

    fn password(&self) -> String {
        self.state.lock().credentials.as_ref().map(|(_, p)| p.clone()).unwrap_or_default()
    }

    fn set_credentials(&self, username: &str, password: &str) -> anyhow::Result<()> {
        self.state.lock().credentials = Some((username.to_owned(), password.to_owned()));
        Ok(())
    }
}

impl SessionFlag for MemoryStore {
    fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    fn set_authenticated(&self, authenticated: bool) -> anyhow::Result<()> {
        self.state.lock().authenticated = authenticated;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
