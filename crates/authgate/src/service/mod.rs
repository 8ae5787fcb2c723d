// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth service: the sign-in/sign-out state machine.
//!
//! Owns the single login attempt and the single logout attempt.  Concurrent
//! `sign_in()` callers coalesce on the in-flight handle; the attempt is only
//! replaced inside the continuation that settles it.  All state changes
//! happen under one short-lived lock that is never held across an await.

pub mod attempt;
pub mod callbacks;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::challenge::{parse_challenge, Challenge};
use crate::client::{AuthClient, ChallengeClient};
use crate::config::{AuthSettings, RememberPolicy};
use crate::error::{AuthError, Rejection};
use crate::events::{AuthEvent, EventBus};
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::identity::IdentityHolder;
use crate::pending::{self, AttemptHandle, AttemptResolver, PendingRequest, Progress};
use crate::store::{CredentialStore, MemoryStore, SessionFlag};

use self::attempt::{AttemptStage, LoginAttempt, LogoutAttempt};
use self::callbacks::attach_all;

struct Slots {
    login: LoginAttempt,
    logout: LogoutAttempt,
    /// Credentials of the last successful sign-in, used to stamp requests.
    session: Option<(String, String)>,
}

/// Coordinates sign-in, sign-out and suspended requests.
pub struct AuthService {
    settings: AuthSettings,
    transport: Arc<dyn Transport>,
    client: Arc<dyn AuthClient>,
    credentials: Arc<dyn CredentialStore>,
    flag: Arc<dyn SessionFlag>,
    identity: IdentityHolder,
    events: EventBus,
    slots: Mutex<Slots>,
}

/// Assembles an [`AuthService`] from its collaborators.
pub struct AuthServiceBuilder {
    settings: AuthSettings,
    transport: Arc<dyn Transport>,
    client: Option<Arc<dyn AuthClient>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    flag: Option<Arc<dyn SessionFlag>>,
    events: Option<EventBus>,
}

impl AuthServiceBuilder {
    pub fn client(mut self, client: Arc<dyn AuthClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn session_flag(mut self, flag: Arc<dyn SessionFlag>) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Missing collaborators default to a [`ChallengeClient`], one shared
    /// [`MemoryStore`] and a fresh [`EventBus`].
    pub fn build(self) -> Arc<AuthService> {
        let memory = Arc::new(MemoryStore::new());
        let default_credentials: Arc<dyn CredentialStore> = memory.clone();
        let default_flag: Arc<dyn SessionFlag> = memory;
        let default_client: Arc<dyn AuthClient> = Arc::new(ChallengeClient::new());
        Arc::new(AuthService {
            settings: self.settings,
            transport: self.transport,
            client: self.client.unwrap_or(default_client),
            credentials: self.credentials.unwrap_or(default_credentials),
            flag: self.flag.unwrap_or(default_flag),
            identity: IdentityHolder::new(),
            events: self.events.unwrap_or_default(),
            slots: Mutex::new(Slots {
                login: LoginAttempt::idle(),
                logout: LogoutAttempt::idle(),
                session: None,
            }),
        })
    }
}

impl AuthService {
    pub fn builder(settings: AuthSettings, transport: Arc<dyn Transport>) -> AuthServiceBuilder {
        AuthServiceBuilder {
            settings,
            transport,
            client: None,
            credentials: None,
            flag: None,
            events: None,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn identity(&self) -> &IdentityHolder {
        &self.identity
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn stage(&self) -> AttemptStage {
        self.slots.lock().login.stage()
    }

    /// Number of requests suspended on the current attempt.
    pub fn pending_count(&self) -> usize {
        self.slots.lock().login.pending.len()
    }

    /// Store credentials on the current attempt.  A manual submission makes
    /// the next failure terminal.
    pub fn submit_credentials(&self, username: &str, password: &str) {
        {
            let mut slots = self.slots.lock();
            slots.login.username = username.to_owned();
            slots.login.password = password.to_owned();
            slots.login.must_terminate = true;
        }
        tracing::debug!(username, "credentials submitted");
        self.events.publish(AuthEvent::CredentialSubmitted { username: username.to_owned() });
    }

    /// Start a sign-in, or join the one in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn sign_in(self: &Arc<Self>) -> AttemptHandle {
        let (resolver, handle, fresh_cycle) = {
            let mut slots = self.slots.lock();
            if let Some(ref handle) = slots.login.handle {
                return handle.clone();
            }

            if (self.flag.is_authenticated() || self.settings.automatic)
                && self.credentials.has_credential()
            {
                let username = self.credentials.username();
                slots.login.username = username.clone();
                slots.login.password = self.credentials.password();
                slots.login.must_terminate = true;
                self.events.publish(AuthEvent::CredentialRestored { username });
            }

            let (resolver, handle) = pending::attempt();
            slots.login.handle = Some(handle.clone());
            (resolver, handle, slots.login.superseded.is_empty())
        };

        // A recycled attempt reports through the callbacks attached to the
        // handle that started the cycle.
        if fresh_cycle {
            attach_all(&handle, &self.settings.callbacks.login);
        }
        let service = Arc::clone(self);
        tokio::spawn(async move { service.perform_login(resolver).await });
        handle
    }

    async fn perform_login(self: Arc<Self>, resolver: AttemptResolver) {
        let (username, password) = {
            let slots = self.slots.lock();
            (slots.login.username.clone(), slots.login.password.clone())
        };

        let mut request = self.settings.login.request();
        let stamped = self.stamp_with(&username, &password, &mut request);

        tracing::debug!(url = %request.url, "performing login");
        let mut result = self.transport.send(request).await;

        // An unstamped or stale login gets one immediate retry against the
        // challenge it was answered with.
        if let Err(ref rejection) = result {
            if let Some(challenge) = self.adopt_challenge(rejection) {
                let stale = challenge.param("stale").is_some_and(|s| s.eq_ignore_ascii_case("true"));
                if !username.is_empty() && (!stamped || stale) {
                    tracing::debug!(scheme = challenge.scheme.name(), "retrying login");
                    let mut retry = self.settings.login.request();
                    self.stamp_with(&username, &password, &mut retry);
                    result = self.transport.send(retry).await;
                    if let Err(ref rejection) = result {
                        self.adopt_challenge(rejection);
                    }
                }
            }
        }

        match result {
            Ok(response) => self.login_succeeded(resolver, username, password, response).await,
            Err(rejection) => self.login_failed(resolver, rejection),
        }
    }

    async fn login_succeeded(
        &self,
        resolver: AttemptResolver,
        username: String,
        password: String,
        response: HttpResponse,
    ) {
        let identity = match response.body {
            Value::Object(_) => response.body.clone(),
            _ => json!({}),
        };

        let pending = {
            let mut slots = self.slots.lock();
            // A sign-out that completed while this login was in flight wins.
            if !slots.login.is_current(resolver.id()) {
                drop(slots);
                tracing::info!(username = %username, "login completed after sign-out, discarding");
                resolver.settle(Err(AuthError::Abandoned));
                return;
            }

            tracing::info!(username = %username, "login successful");
            if let Err(e) = self.identity.set(identity.clone()) {
                tracing::warn!(err = %e, "failed to store identity");
            }
            if let Err(e) = self.flag.set_authenticated(true) {
                tracing::warn!(err = %e, "failed to persist session flag");
            }
            if self.settings.remember == RememberPolicy::Always {
                match self.credentials.set_credentials(&username, &password) {
                    Ok(()) => self
                        .events
                        .publish(AuthEvent::CredentialStored { username: username.clone() }),
                    Err(e) => tracing::warn!(err = %e, "failed to persist credentials"),
                }
            }
            self.events.publish(AuthEvent::LoginSuccessful { status: response.status });

            slots.session = Some((username, password));
            let done = std::mem::replace(&mut slots.login, LoginAttempt::idle());
            resolver.settle(Ok(identity.clone()));
            for earlier in done.superseded {
                earlier.settle(Ok(identity.clone()));
            }
            done.pending
        };

        futures_util::future::join_all(pending.into_iter().map(|p| self.replay(p))).await;
    }

    fn login_failed(&self, resolver: AttemptResolver, rejection: Rejection) {
        let mut slots = self.slots.lock();
        if !slots.login.is_current(resolver.id()) {
            resolver.settle(Err(AuthError::login(&rejection)));
            return;
        }

        if !slots.login.must_terminate {
            tracing::info!(status = ?rejection.status(), "login required");
            self.events.publish(AuthEvent::LoginRequired);
            resolver.notify(Progress::LoginRequired);
            let done = std::mem::replace(&mut slots.login, LoginAttempt::idle());
            slots.login = done.recycle();
            slots.login.superseded.push(resolver);
            return;
        }

        tracing::warn!(status = ?rejection.status(), "login error");
        self.events.publish(AuthEvent::LoginError { status: rejection.status() });
        let err = AuthError::login(&rejection);
        let done = std::mem::replace(&mut slots.login, LoginAttempt::idle());
        resolver.settle(Err(err.clone()));
        for earlier in done.superseded {
            earlier.settle(Err(err.clone()));
        }
        drop(slots);

        for pending in done.pending {
            pending.reject();
        }
    }

    /// Re-send a suspended request with the new credentials.
    async fn replay(&self, pending: PendingRequest) {
        let mut request = pending.request().clone();
        self.stamp(&mut request);
        let result = self.transport.send(request).await;
        tracing::debug!(
            url = %pending.summary().url,
            status = ?result.as_ref().map(|r| r.status).map_err(|e| e.status()),
            "replayed pending request"
        );
        pending.settle(result);
    }

    /// Start a sign-out, or join the one in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn sign_out(self: &Arc<Self>) -> AttemptHandle {
        let (resolver, handle) = {
            let mut slots = self.slots.lock();
            if let Some(ref handle) = slots.logout.handle {
                return handle.clone();
            }
            let (resolver, handle) = pending::attempt();
            slots.logout.handle = Some(handle.clone());
            (resolver, handle)
        };

        attach_all(&handle, &self.settings.callbacks.logout);
        let service = Arc::clone(self);
        tokio::spawn(async move { service.perform_logout(resolver).await });
        handle
    }

    async fn perform_logout(self: Arc<Self>, resolver: AttemptResolver) {
        let mut request = self.settings.logout.request();
        self.stamp(&mut request);

        tracing::debug!(url = %request.url, "performing logout");
        match self.transport.send(request).await {
            Ok(response) => {
                tracing::info!("logout successful");
                let dropped = {
                    let mut slots = self.slots.lock();
                    if let Err(e) = self.flag.set_authenticated(false) {
                        tracing::warn!(err = %e, "failed to persist session flag");
                    }
                    self.identity.clear();
                    slots.session = None;
                    std::mem::replace(&mut slots.login, LoginAttempt::idle())
                };
                for pending in dropped.pending {
                    pending.reject();
                }
                for earlier in dropped.superseded {
                    earlier.settle(Err(AuthError::Abandoned));
                }

                self.events.publish(AuthEvent::LogoutSuccessful { status: response.status });
                self.finish_logout(resolver, Ok(response.body));
            }
            Err(rejection) => {
                tracing::warn!(status = ?rejection.status(), "logout error");
                self.events.publish(AuthEvent::LogoutError { status: rejection.status() });
                self.finish_logout(resolver, Err(AuthError::logout(&rejection)));
            }
        }
    }

    fn finish_logout(&self, resolver: AttemptResolver, result: Result<Value, AuthError>) {
        let mut slots = self.slots.lock();
        if slots.logout.is_current(resolver.id()) {
            slots.logout = LogoutAttempt::idle();
        }
        resolver.settle(result);
    }

    /// Whether the session is authenticated, after any in-flight logout or
    /// login settles.
    ///
    /// A failed logout or a terminally failed login is returned as the error.
    pub async fn is_authenticated(&self) -> Result<bool, AuthError> {
        let (logout, login) = {
            let slots = self.slots.lock();
            (slots.logout.handle.clone(), slots.login.handle.clone())
        };
        if let Some(handle) = logout {
            handle.wait().await?;
        } else if let Some(handle) = login {
            handle.wait().await?;
        }
        Ok(self.authenticated_now())
    }

    /// Snapshot check: session flag set and identity present.
    pub fn authenticated_now(&self) -> bool {
        self.flag.is_authenticated() && self.identity.has()
    }

    /// Whether a 401 for this request must not start another challenge
    /// cycle.  True for the login and logout exchanges themselves.
    pub fn must_terminate(&self, rejection: &Rejection) -> bool {
        self.settings.login.matches(&rejection.request)
            || self.settings.logout.matches(&rejection.request)
    }

    pub(crate) fn challenge_of(&self, rejection: &Rejection) -> Option<Challenge> {
        let response = rejection.response()?;
        parse_challenge(&response.headers, &self.settings.challenge_header)
    }

    pub(crate) fn configure_client(&self, challenge: &Challenge) {
        self.client.configure(challenge);
    }

    /// Reconfigure the client from the challenge carried by `rejection`.
    fn adopt_challenge(&self, rejection: &Rejection) -> Option<Challenge> {
        let challenge = self.challenge_of(rejection)?;
        self.client.configure(&challenge);
        Some(challenge)
    }

    /// Bind a suspended request to the current attempt.
    pub(crate) fn bind_pending(&self, pending: PendingRequest) {
        self.slots.lock().login.pending.push(pending);
    }

    /// Stamp an application request with the session's credentials, falling
    /// back to those of the current attempt.
    pub(crate) fn stamp(&self, request: &mut HttpRequest) {
        if !self.client.is_configured() {
            return;
        }
        let (username, password) = {
            let slots = self.slots.lock();
            match slots.session {
                Some(ref creds) => creds.clone(),
                None => (slots.login.username.clone(), slots.login.password.clone()),
            }
        };
        self.stamp_with(&username, &password, request);
    }

    /// Stamp with explicit credentials.  Returns whether a header was written.
    fn stamp_with(&self, username: &str, password: &str, request: &mut HttpRequest) -> bool {
        if username.is_empty() || !self.client.is_configured() {
            return false;
        }
        // Digest hashes the request line, so stamp against the URL as sent.
        let resolved = self.transport.resolve(&request.url);
        let relative = std::mem::replace(&mut request.url, resolved);
        self.client.process_request(username, password, request);
        request.url = relative;
        true
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
