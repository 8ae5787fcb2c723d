// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Settle-once handles: attempt handles for sign-in/sign-out and pending
//! requests suspended on an authentication challenge.
//!
//! An attempt handle moves through `Pending`, any number of `Progress`
//! updates, and exactly one `Settled` result.  The resolver side is consumed
//! by [`AttemptResolver::settle`], so a second settlement cannot be written.
//! Dropping a resolver without settling reads as [`AuthError::Abandoned`].

use serde_json::Value;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::error::{AuthError, Rejection};
use crate::http::{HttpRequest, HttpResponse, RequestSummary};

/// Non-terminal update on an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The login exchange failed; credentials must be submitted again.
    LoginRequired,
}

/// Observable state of an attempt.
#[derive(Debug, Clone)]
pub enum AttemptState {
    Pending,
    Progress(Progress),
    Settled(Result<Value, AuthError>),
}

impl AttemptState {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }
}

/// Read side of an attempt.  Clones observe the same attempt.
#[derive(Debug, Clone)]
pub struct AttemptHandle {
    id: Uuid,
    rx: watch::Receiver<AttemptState>,
}

/// Write side of an attempt, owned by the auth service.
#[derive(Debug)]
pub struct AttemptResolver {
    id: Uuid,
    tx: watch::Sender<AttemptState>,
}

/// Create a fresh attempt in the `Pending` state.
pub fn attempt() -> (AttemptResolver, AttemptHandle) {
    let id = Uuid::new_v4();
    let (tx, rx) = watch::channel(AttemptState::Pending);
    (AttemptResolver { id, tx }, AttemptHandle { id, rx })
}

impl AttemptResolver {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publish a progress update.  The attempt stays unsettled.
    pub fn notify(&self, progress: Progress) {
        self.tx.send_replace(AttemptState::Progress(progress));
    }

    pub fn settle(self, result: Result<Value, AuthError>) {
        self.tx.send_replace(AttemptState::Settled(result));
    }
}

impl AttemptHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether both handles observe the same attempt.
    pub fn same_attempt(&self, other: &AttemptHandle) -> bool {
        self.id == other.id
    }

    /// Current state without waiting.
    pub fn state(&self) -> AttemptState {
        self.rx.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_settled()
    }

    /// Wait for the settled result, skipping progress updates.
    pub async fn wait(&self) -> Result<Value, AuthError> {
        let mut rx = self.rx.clone();
        loop {
            if let AttemptState::Settled(result) = &*rx.borrow_and_update() {
                return result.clone();
            }
            if rx.changed().await.is_err() {
                return match &*rx.borrow() {
                    AttemptState::Settled(result) => result.clone(),
                    _ => Err(AuthError::Abandoned),
                };
            }
        }
    }

    /// Wait for the next state this handle has not yet observed.
    ///
    /// Progress updates that arrive faster than they are observed coalesce
    /// into the latest one.
    /// Once settled, every call returns the settled state immediately.
    pub async fn next_state(&mut self) -> AttemptState {
        let current = self.rx.borrow().clone();
        if current.is_settled() {
            return current;
        }
        if self.rx.changed().await.is_err() {
            let last = self.rx.borrow().clone();
            return if last.is_settled() {
                last
            } else {
                AttemptState::Settled(Err(AuthError::Abandoned))
            };
        }
        self.rx.borrow_and_update().clone()
    }
}

/// A request suspended on a challenge, waiting for sign-in to finish.
#[derive(Debug)]
pub struct PendingRequest {
    summary: RequestSummary,
    request: HttpRequest,
    rejection: Rejection,
    tx: oneshot::Sender<Result<HttpResponse, Rejection>>,
}

/// The interceptor's side of a [`PendingRequest`].
#[derive(Debug)]
pub struct PendingOutcome {
    rx: oneshot::Receiver<Result<HttpResponse, Rejection>>,
    original: Rejection,
}

impl PendingRequest {
    pub fn new(
        summary: RequestSummary,
        request: HttpRequest,
        rejection: Rejection,
    ) -> (Self, PendingOutcome) {
        let (tx, rx) = oneshot::channel();
        let outcome = PendingOutcome { rx, original: rejection.clone() };
        (Self { summary, request, rejection, tx }, outcome)
    }

    pub fn summary(&self) -> &RequestSummary {
        &self.summary
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Settle with the outcome of the replayed request.
    pub fn settle(self, result: Result<HttpResponse, Rejection>) {
        let _ = self.tx.send(result);
    }

    /// Settle with the failure that suspended the request.
    pub fn reject(self) {
        let _ = self.tx.send(Err(self.rejection));
    }
}

impl PendingOutcome {
    /// Wait for the pending request to settle.
    ///
    /// A pending request dropped unsettled yields the original failure.
    pub async fn wait(self) -> Result<HttpResponse, Rejection> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(self.original),
        }
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
