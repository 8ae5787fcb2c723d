// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request interceptor: stamps outgoing requests and turns recognized 401
//! challenges into suspended requests resumed by a successful sign-in.

use std::sync::Arc;

use crate::error::Rejection;
use crate::events::AuthEvent;
use crate::http::{HttpRequest, HttpResponse};
use crate::pending::PendingRequest;
use crate::service::AuthService;

/// Wraps the service's transport for application requests.
#[derive(Clone)]
pub struct Interceptor {
    service: Arc<AuthService>,
}

impl Interceptor {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<AuthService> {
        &self.service
    }

    /// Send `request`, suspending it on a recognized challenge until the
    /// current sign-in attempt settles.
    ///
    /// Non-401 failures, 401s on the login/logout exchanges and 401s without
    /// a recognized challenge are returned unchanged.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Rejection> {
        let summary = request.summary();
        let events = self.service.events();
        events.publish(AuthEvent::ProcessRequest { request: summary.clone() });

        let mut outgoing = request.clone();
        self.service.stamp(&mut outgoing);

        let rejection = match self.service.transport().send(outgoing).await {
            Ok(response) => return Ok(response),
            Err(rejection) if !rejection.is_unauthorized() => return Err(rejection),
            Err(rejection) => rejection,
        };

        events.publish(AuthEvent::ProcessResponse { request: summary.clone(), status: 401 });
        if self.service.must_terminate(&rejection) {
            return Err(rejection);
        }

        let Some(challenge) = self.service.challenge_of(&rejection) else {
            tracing::debug!(url = %summary.url, "401 without a recognized challenge");
            events.publish(AuthEvent::AuthenticationNotFound { request: summary });
            return Err(rejection);
        };
        self.service.configure_client(&challenge);

        let (pending, outcome) = PendingRequest::new(summary.clone(), request, rejection);
        self.service.bind_pending(pending);
        tracing::info!(url = %summary.url, scheme = challenge.scheme.name(), "request suspended");
        events.publish(AuthEvent::AuthenticationHeader {
            request: summary.clone(),
            scheme: challenge.scheme.name().to_owned(),
        });
        events.publish(AuthEvent::SigninRequired { request: summary });

        outcome.wait().await
    }
}
