// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authgate: HTTP authentication interceptor with a sign-in/sign-out state
//! machine that suspends challenged requests and replays them once signed in.

pub mod challenge;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod identity;
pub mod interceptor;
pub mod pending;
pub mod responder;
pub mod service;
pub mod store;
pub mod test_support;

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Cli, Command};
use crate::http::{HttpRequest, ReqwestTransport};
use crate::interceptor::Interceptor;
use crate::responder::{spawn_responder, Credentials, ResponderExit};
use crate::service::AuthService;
use crate::store::persist::FileStore;
use crate::store::{CredentialStore, SessionFlag};

pub use crate::error::{AuthError, Rejection};
pub use crate::events::{AuthEvent, EventBus};

/// Run one CLI command against the configured server.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.auth;
    let state_dir = config.state_dir();
    let store = Arc::new(FileStore::in_dir(&state_dir)?);
    tracing::debug!(path = %store.path().display(), "session store opened");

    let transport = Arc::new(ReqwestTransport::new(config.base_url.clone(), config.timeout()));
    let service = AuthService::builder(config.settings()?, transport)
        .credential_store(store.clone())
        .session_flag(store.clone())
        .build();

    let credentials = match (config.username, config.password) {
        (Some(username), Some(password)) => Some(Credentials::new(username, password)),
        _ => None,
    };

    let shutdown = CancellationToken::new();
    let mut responder = spawn_responder(Arc::clone(&service), credentials.clone(), shutdown.clone());

    let result = match cli.command {
        Command::Fetch { path } => {
            let interceptor = Interceptor::new(Arc::clone(&service));
            let work = async {
                interceptor.execute(HttpRequest::get(path)).await.map_err(anyhow::Error::from)
            };
            match until_answered(work, &mut responder).await {
                Ok(response) => print_json(&response.body),
                Err(e) => Err(e),
            }
        }
        Command::SignIn => {
            if let Some(ref c) = credentials {
                service.submit_credentials(&c.username, &c.password);
            }
            let handle = service.sign_in();
            let work = async { handle.wait().await.map_err(anyhow::Error::from) };
            match until_answered(work, &mut responder).await {
                Ok(identity) => print_json(&identity),
                Err(e) => Err(e),
            }
        }
        Command::SignOut => match service.sign_out().wait().await {
            Ok(_) => {
                println!("signed out");
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Command::Status => {
            if store.is_authenticated() && store.has_credential() {
                let handle = service.sign_in();
                let work = async { handle.wait().await.map_err(anyhow::Error::from) };
                if let Err(e) = until_answered(work, &mut responder).await {
                    tracing::warn!(err = %e, "stored session could not be restored");
                }
            }
            match service.is_authenticated().await {
                Ok(authenticated) => print_json(&serde_json::json!({
                    "authenticated": authenticated,
                    "identity": service.identity().get(),
                })),
                Err(e) => Err(e.into()),
            }
        }
    };

    shutdown.cancel();
    result
}

/// Drive `work` unless the responder gives up first.
async fn until_answered<T>(
    work: impl Future<Output = anyhow::Result<T>>,
    responder: &mut JoinHandle<ResponderExit>,
) -> anyhow::Result<T> {
    tokio::select! {
        result = work => result,
        exit = responder => match exit? {
            ResponderExit::CredentialsRequired => {
                anyhow::bail!("sign-in required: pass --username and --password")
            }
            other => anyhow::bail!("credential responder stopped: {other:?}"),
        },
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
