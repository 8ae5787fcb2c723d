// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Holder for the authenticated user's profile record.

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::AuthError;

/// Last-known identity: a JSON object, or nothing.
#[derive(Debug, Default)]
pub struct IdentityHolder {
    inner: Mutex<Option<Map<String, Value>>>,
}

impl IdentityHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole identity.  Only objects are accepted.
    pub fn set(&self, value: Value) -> Result<(), AuthError> {
        match value {
            Value::Object(map) => {
                *self.inner.lock() = Some(map);
                Ok(())
            }
            _ => Err(AuthError::InvalidIdentity),
        }
    }

    /// Set one field, creating an empty identity first if needed.
    pub fn set_key(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().get_or_insert_with(Map::new).insert(key.into(), value);
    }

    /// The whole identity as a JSON object.
    pub fn get(&self) -> Option<Value> {
        self.inner.lock().clone().map(Value::Object)
    }

    /// One field of the identity; `None` when unset or missing.
    pub fn get_key(&self, key: &str) -> Option<Value> {
        self.inner.lock().as_ref()?.get(key).cloned()
    }

    pub fn has(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
