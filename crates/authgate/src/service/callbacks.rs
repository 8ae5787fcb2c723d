// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login/logout callbacks attached to attempt handles.
//!
//! Callbacks are registered as factories so each attempt gets a fresh set.
//! Each attached set is driven by its own task until the attempt settles.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AuthError;
use crate::pending::{AttemptHandle, AttemptState, Progress};

type SuccessFn = Box<dyn FnOnce(&Value) + Send>;
type ErrorFn = Box<dyn FnOnce(&AuthError) + Send>;
type ProgressFn = Box<dyn FnMut(Progress) + Send>;

/// Handlers for one attempt.  Unset handlers are skipped.
#[derive(Default)]
pub struct AttemptCallbacks {
    on_success: Option<SuccessFn>,
    on_error: Option<ErrorFn>,
    on_progress: Option<ProgressFn>,
}

impl AttemptCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce(&Value) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&AuthError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }
}

/// Builds a fresh [`AttemptCallbacks`] for each new attempt.
pub type CallbackFactory = Arc<dyn Fn() -> AttemptCallbacks + Send + Sync>;

/// Ordered login and logout callback factories.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    pub login: Vec<CallbackFactory>,
    pub logout: Vec<CallbackFactory>,
}

impl CallbackRegistry {
    pub fn on_login(mut self, factory: impl Fn() -> AttemptCallbacks + Send + Sync + 'static) -> Self {
        self.login.push(Arc::new(factory));
        self
    }

    pub fn on_logout(mut self, factory: impl Fn() -> AttemptCallbacks + Send + Sync + 'static) -> Self {
        self.logout.push(Arc::new(factory));
        self
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("login", &self.login.len())
            .field("logout", &self.logout.len())
            .finish()
    }
}

/// Build one callback set per factory and drive each against `handle`.
pub(crate) fn attach_all(handle: &AttemptHandle, factories: &[CallbackFactory]) {
    for factory in factories {
        tokio::spawn(drive(handle.clone(), factory()));
    }
}

async fn drive(mut handle: AttemptHandle, mut callbacks: AttemptCallbacks) {
    loop {
        match handle.next_state().await {
            AttemptState::Pending => {}
            AttemptState::Progress(progress) => {
                if let Some(f) = callbacks.on_progress.as_mut() {
                    f(progress);
                }
            }
            AttemptState::Settled(Ok(value)) => {
                if let Some(f) = callbacks.on_success.take() {
                    f(&value);
                }
                return;
            }
            AttemptState::Settled(Err(e)) => {
                if let Some(f) = callbacks.on_error.take() {
                    f(&e);
                }
                return;
            }
        }
    }
}
