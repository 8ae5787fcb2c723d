// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::Value;

use crate::http::{HttpRequest, HttpResponse};

/// A failed exchange, shaped like the transport produced it.
///
/// Carries the request that failed so a challenged request can be replayed
/// and so callers can tell which endpoint rejected them.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} {} failed: {cause}", .request.method, .request.url)]
pub struct Rejection {
    pub request: HttpRequest,
    pub cause: Cause,
}

/// Why an exchange failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Cause {
    /// The server answered with a non-2xx status.
    #[error("status {}", .0.status)]
    Status(HttpResponse),
    /// No response was received.
    #[error("{0}")]
    Network(String),
}

impl Rejection {
    pub fn new(request: HttpRequest, cause: Cause) -> Self {
        Self { request, cause }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.cause {
            Cause::Status(resp) => Some(resp.status),
            Cause::Network(_) => None,
        }
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match &self.cause {
            Cause::Status(resp) => Some(resp),
            Cause::Network(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Response body, or `null` for network failures.
    pub fn body(&self) -> Value {
        self.response().map(|r| r.body.clone()).unwrap_or(Value::Null)
    }
}

/// Terminal outcomes of sign-in and sign-out attempts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The login exchange failed on an attempt that had to terminate.
    #[error("login failed{}", status_suffix(.status))]
    Login { status: Option<u16>, body: Value },
    /// The logout exchange failed.
    #[error("logout failed{}", status_suffix(.status))]
    Logout { status: Option<u16>, body: Value },
    /// The attempt was dropped before it settled.
    #[error("attempt abandoned before settling")]
    Abandoned,
    /// An identity must be a JSON object.
    #[error("identity must be a JSON object")]
    InvalidIdentity,
}

impl AuthError {
    pub fn login(rejection: &Rejection) -> Self {
        Self::Login { status: rejection.status(), body: rejection.body() }
    }

    pub fn logout(rejection: &Rejection) -> Self {
        Self::Logout { status: rejection.status(), body: rejection.body() }
    }

    /// The failure payload returned by the server, if any.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Login { body, .. } | Self::Logout { body, .. } => Some(body),
            Self::Abandoned | Self::InvalidIdentity => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
