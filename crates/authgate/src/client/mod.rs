// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential stamping for outgoing requests.
//!
//! An [`AuthClient`] becomes configured once a challenge has been parsed and
//! from then on writes an `Authorization` header into every request it is
//! handed.  Before that it leaves requests untouched.

pub mod basic;
pub mod digest;

use parking_lot::Mutex;

use crate::challenge::{Challenge, Scheme};
use crate::http::HttpRequest;

use self::digest::DigestSession;

/// Pluggable request-stamping scheme.
pub trait AuthClient: Send + Sync {
    /// Whether a scheme has been configured.
    fn is_configured(&self) -> bool;

    /// Adopt the scheme and parameters of a server challenge.
    fn configure(&self, challenge: &Challenge);

    /// Stamp `request` with credentials.  No-op when unconfigured.
    fn process_request(&self, username: &str, password: &str, request: &mut HttpRequest);
}

enum Configured {
    Basic,
    Digest(DigestSession),
}

/// The default client: answers Basic and Digest challenges.
#[derive(Default)]
pub struct ChallengeClient {
    state: Mutex<Option<Configured>>,
}

impl ChallengeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the configured scheme, if any.
    pub fn scheme(&self) -> Option<&'static str> {
        self.state.lock().as_ref().map(|s| match s {
            Configured::Basic => "Basic",
            Configured::Digest(_) => "Digest",
        })
    }
}

impl AuthClient for ChallengeClient {
    fn is_configured(&self) -> bool {
        self.state.lock().is_some()
    }

    fn configure(&self, challenge: &Challenge) {
        let next = match challenge.scheme {
            Scheme::Basic => Configured::Basic,
            Scheme::Digest(algorithm) => {
                Configured::Digest(DigestSession::new(algorithm, challenge.clone()))
            }
        };
        tracing::debug!(scheme = challenge.scheme.name(), realm = ?challenge.realm(), "client configured");
        *self.state.lock() = Some(next);
    }

    fn process_request(&self, username: &str, password: &str, request: &mut HttpRequest) {
        let mut state = self.state.lock();
        let value = match state.as_mut() {
            None => return,
            Some(Configured::Basic) => basic::authorization(username, password),
            Some(Configured::Digest(session)) => session.authorization(username, password, request),
        };
        request.set_header("authorization", &value);
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
