// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless credential responder: answers sign-in prompts on the event bus
//! with preconfigured credentials.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::AuthEvent;
use crate::service::AuthService;

/// A username/password pair.  The password never appears in `Debug`.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Why the responder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderExit {
    Cancelled,
    /// The server asked for credentials and none were available.
    CredentialsRequired,
    /// The event bus closed.
    Closed,
}

/// Spawn a task answering `signin.required` and `login.required`.
///
/// With credentials, each prompt submits them and signs in.  Without, a
/// `signin.required` signs in with whatever the credential store restores
/// and a `login.required` ends the task with
/// [`ResponderExit::CredentialsRequired`].
pub fn spawn_responder(
    service: Arc<AuthService>,
    credentials: Option<Credentials>,
    shutdown: CancellationToken,
) -> JoinHandle<ResponderExit> {
    let mut event_rx = service.events().subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => return ResponderExit::Cancelled,
                event = event_rx.recv() => event,
            };
            let event = match event {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "responder lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return ResponderExit::Closed,
            };

            match (event, credentials.as_ref()) {
                (AuthEvent::SigninRequired { request }, creds) => {
                    tracing::debug!(url = %request.url, "answering sign-in prompt");
                    if let Some(c) = creds {
                        service.submit_credentials(&c.username, &c.password);
                    }
                    service.sign_in();
                }
                (AuthEvent::LoginRequired, Some(c)) => {
                    service.submit_credentials(&c.username, &c.password);
                    service.sign_in();
                }
                (AuthEvent::LoginRequired, None) => {
                    tracing::warn!("server requires credentials and none are configured");
                    return ResponderExit::CredentialsRequired;
                }
                _ => {}
            }
        }
    })
}

#[cfg(test)]
#[path = "responder_tests.rs"]
mod tests;
