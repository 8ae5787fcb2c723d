// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed authentication events and the broadcast bus that carries them.
//!
//! Every event has a stable dotted wire name (`signin.required`, ...) used
//! both as the serde tag and in logs.  Publishing never blocks: events sent
//! while nobody is subscribed are dropped, and slow subscribers observe
//! `Lagged` like any other `tokio::sync::broadcast` receiver.  Events
//! published from one task arrive in publish order.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::http::RequestSummary;

/// Events published by the interceptor and the auth service.
///
/// Credential events carry the username only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A request is about to be sent.
    #[serde(rename = "process.request")]
    ProcessRequest { request: RequestSummary },
    /// A request was answered with 401.
    #[serde(rename = "process.response")]
    ProcessResponse { request: RequestSummary, status: u16 },
    #[serde(rename = "credential.submitted")]
    CredentialSubmitted { username: String },
    #[serde(rename = "credential.restored")]
    CredentialRestored { username: String },
    #[serde(rename = "credential.stored")]
    CredentialStored { username: String },
    /// A challenge was parsed and the request is now pending.
    #[serde(rename = "authentication.header")]
    AuthenticationHeader { request: RequestSummary, scheme: String },
    /// A 401 arrived without a recognized challenge.
    #[serde(rename = "authentication.notFound")]
    AuthenticationNotFound { request: RequestSummary },
    /// Credentials are needed to resume a pending request.
    #[serde(rename = "signin.required")]
    SigninRequired { request: RequestSummary },
    /// The login exchange failed on an attempt that may be retried.
    #[serde(rename = "login.required")]
    LoginRequired,
    #[serde(rename = "login.successful")]
    LoginSuccessful { status: u16 },
    #[serde(rename = "login.error")]
    LoginError { status: Option<u16> },
    #[serde(rename = "logout.successful")]
    LogoutSuccessful { status: u16 },
    #[serde(rename = "logout.error")]
    LogoutError { status: Option<u16> },
}

impl AuthEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProcessRequest { .. } => "process.request",
            Self::ProcessResponse { .. } => "process.response",
            Self::CredentialSubmitted { .. } => "credential.submitted",
            Self::CredentialRestored { .. } => "credential.restored",
            Self::CredentialStored { .. } => "credential.stored",
            Self::AuthenticationHeader { .. } => "authentication.header",
            Self::AuthenticationNotFound { .. } => "authentication.notFound",
            Self::SigninRequired { .. } => "signin.required",
            Self::LoginRequired => "login.required",
            Self::LoginSuccessful { .. } => "login.successful",
            Self::LoginError { .. } => "login.error",
            Self::LogoutSuccessful { .. } => "logout.successful",
            Self::LogoutError { .. } => "logout.error",
        }
    }
}

/// Process-wide publish/subscribe channel for [`AuthEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: AuthEvent) {
        tracing::debug!(event = event.name(), "publish");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
