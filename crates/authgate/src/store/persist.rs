// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: load/save to a JSON file with atomic writes.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{CredentialStore, SessionFlag};

/// File name used inside the state directory.
pub const SESSION_FILE: &str = "session.json";

/// Resolve the state directory for authgate data.
///
/// Checks `AUTHGATE_STATE_DIR`, then `$XDG_STATE_HOME/authgate`,
/// then `$HOME/.local/state/authgate`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AUTHGATE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("authgate");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/authgate");
    }
    PathBuf::from(".authgate")
}

/// Persisted session state.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub authenticated: bool,
}

/// Load persisted state from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedSession> {
    let contents = std::fs::read_to_string(path)?;
    let session: PersistedSession = serde_json::from_str(&contents)?;
    Ok(session)
}

/// Save persisted state to a JSON file atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
pub fn save(path: &Path, session: &PersistedSession) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(session)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Credential store and session flag backed by one JSON file.
///
/// The file is read once at open; every mutation rewrites it.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<PersistedSession>,
}

impl FileStore {
    /// Open `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let state = if path.exists() { load(&path)? } else { PersistedSession::default() };
        Ok(Self { path, state: Mutex::new(state) })
    }

    /// Open [`SESSION_FILE`] inside `dir`.
    pub fn in_dir(dir: &Path) -> anyhow::Result<Self> {
        Self::open(dir.join(SESSION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut PersistedSession)) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        f(&mut state);
        save(&self.path, &state)
    }
}

impl CredentialStore for FileStore {
    fn has_credential(&self) -> bool {
        let state = self.state.lock();
        state.username.is_some() && state.password.is_some()
    }

    fn username(&self) -> String {
        self.state.lock().username.clone().unwrap_or_default()
    }

    fn password(&self) -> String {
        self.state.lock().password.clone().unwrap_or_default()
    }

    fn set_credentials(&self, username: &str, password: &str) -> anyhow::Result<()> {
        self.update(|s| {
            s.username = Some(username.to_owned());
            s.password = Some(password.to_owned());
        })
    }
}

impl SessionFlag for FileStore {
    fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    fn set_authenticated(&self, authenticated: bool) -> anyhow::Result<()> {
        self.update(|s| s.authenticated = authenticated)
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
