// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use uuid::Uuid;

use crate::pending::{AttemptHandle, AttemptResolver, PendingRequest};

/// Where the current sign-in cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    /// Nothing pending, nothing in flight.
    Idle,
    /// Requests are suspended and no login exchange is running.
    AwaitingCredentials,
    /// A login exchange is in flight.
    Authenticating,
}

/// One sign-in cycle.
#[derive(Debug, Default)]
pub(crate) struct LoginAttempt {
    pub username: String,
    pub password: String,
    pub pending: Vec<PendingRequest>,
    /// Set while the login exchange is in flight.
    pub handle: Option<AttemptHandle>,
    pub must_terminate: bool,
    /// Resolvers of earlier attempts that only reported progress; they
    /// settle with this attempt's terminal outcome.
    pub superseded: Vec<AttemptResolver>,
}

impl LoginAttempt {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Whether this attempt is the one `id` was issued for.
    pub fn is_current(&self, id: Uuid) -> bool {
        self.handle.as_ref().is_some_and(|h| h.id() == id)
    }

    /// A fresh attempt that inherits the suspended requests and the
    /// still-unsettled resolvers of this one.
    pub fn recycle(self) -> Self {
        Self { pending: self.pending, superseded: self.superseded, ..Self::idle() }
    }

    pub fn stage(&self) -> AttemptStage {
        if self.handle.is_some() {
            AttemptStage::Authenticating
        } else if !self.pending.is_empty() {
            AttemptStage::AwaitingCredentials
        } else {
            AttemptStage::Idle
        }
    }
}

/// One sign-out cycle.  Always terminal on failure.
#[derive(Debug, Default)]
pub(crate) struct LogoutAttempt {
    pub handle: Option<AttemptHandle>,
}

impl LogoutAttempt {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_current(&self, id: Uuid) -> bool {
        self.handle.as_ref().is_some_and(|h| h.id() == id)
    }
}
