// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::json;
use tokio::sync::mpsc;

use super::callbacks::{AttemptCallbacks, CallbackRegistry};
use super::*;
use crate::challenge::parse_header_value;
use crate::error::Cause;
use crate::pending::AttemptState;
use crate::test_support::{drain_names, next_event, FakeTransport, Reply};

const WAIT: Duration = Duration::from_secs(2);

fn build(transport: Arc<FakeTransport>, settings: AuthSettings, store: Arc<MemoryStore>) -> Arc<AuthService> {
    AuthService::builder(settings, transport)
        .credential_store(store.clone())
        .session_flag(store)
        .build()
}

async fn settled(handle: &AttemptHandle) -> anyhow::Result<Result<Value, AuthError>> {
    Ok(tokio::time::timeout(WAIT, handle.wait()).await?)
}

fn challenge(header: &str) -> anyhow::Result<Challenge> {
    parse_header_value(header)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no challenge in {header}"))
}

fn basic_challenge() -> anyhow::Result<Challenge> {
    challenge("Basic realm=api")
}

fn digest_challenge(nonce: &str, extra: &str) -> String {
    format!(r#"Digest realm="api", nonce="{nonce}", algorithm=SHA-256, qop="auth"{extra}"#)
}

fn authorization(request: Option<&HttpRequest>) -> String {
    request.and_then(|r| r.header("authorization")).unwrap_or_default().to_owned()
}

#[tokio::test]
async fn sign_in_coalesces_while_in_flight() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 1})))
            .delay(Method::POST, "/signin", Duration::from_millis(50)),
    );
    let service = build(transport.clone(), AuthSettings::default(), Arc::new(MemoryStore::new()));

    let first = service.sign_in();
    let second = service.sign_in();
    assert!(first.same_attempt(&second));
    assert_eq!(service.stage(), AttemptStage::Authenticating);

    assert_eq!(settled(&first).await??, json!({"id": 1}));
    assert_eq!(settled(&second).await??, json!({"id": 1}));
    assert_eq!(transport.count(&Method::POST, "/signin"), 1);
    assert_eq!(service.stage(), AttemptStage::Idle);

    // A new call after settlement starts a new attempt.
    let third = service.sign_in();
    assert!(!third.same_attempt(&first));
    Ok(())
}

#[tokio::test]
async fn successful_sign_in_records_session() -> anyhow::Result<()> {
    let transport =
        Arc::new(FakeTransport::new().reply(Method::POST, "/signin", Reply::ok(json!({"id": 1, "name": "alice"}))));
    let store = Arc::new(MemoryStore::new());
    let service = build(transport, AuthSettings::default(), store.clone());
    let mut events = service.events().subscribe();

    service.submit_credentials("alice", "pw1");
    let identity = settled(&service.sign_in()).await??;

    assert_eq!(identity, json!({"id": 1, "name": "alice"}));
    assert_eq!(service.identity().get_key("name"), Some(json!("alice")));
    assert!(store.is_authenticated());
    assert_eq!(store.username(), "alice");
    assert_eq!(store.password(), "pw1");
    assert!(service.is_authenticated().await?);
    assert_eq!(
        drain_names(&mut events),
        vec!["credential.submitted", "credential.stored", "login.successful"]
    );
    Ok(())
}

#[tokio::test]
async fn remember_never_skips_credential_storage() -> anyhow::Result<()> {
    let transport = Arc::new(FakeTransport::new().reply(Method::POST, "/signin", Reply::ok(json!({"id": 1}))));
    let store = Arc::new(MemoryStore::new());
    let settings = AuthSettings { remember: RememberPolicy::Never, ..AuthSettings::default() };
    let service = build(transport, settings, store.clone());
    let mut events = service.events().subscribe();

    service.submit_credentials("alice", "pw1");
    settled(&service.sign_in()).await??;

    assert!(!store.has_credential());
    assert!(store.is_authenticated());
    assert!(!drain_names(&mut events).contains(&"credential.stored"));
    Ok(())
}

#[tokio::test]
async fn non_object_login_body_becomes_empty_identity() -> anyhow::Result<()> {
    let transport = Arc::new(FakeTransport::new().reply(Method::POST, "/signin", Reply::ok(json!("welcome"))));
    let service = build(transport, AuthSettings::default(), Arc::new(MemoryStore::new()));

    settled(&service.sign_in()).await??;
    assert_eq!(service.identity().get(), Some(json!({})));
    assert!(service.is_authenticated().await?);
    Ok(())
}

#[tokio::test]
async fn non_terminal_failure_reports_progress_and_recycles() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::status(401, Value::Null))
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 1, "name": "alice"}))),
    );
    let service = build(transport.clone(), AuthSettings::default(), Arc::new(MemoryStore::new()));
    let mut events = service.events().subscribe();

    let first = service.sign_in();
    next_event(&mut events, "login.required", WAIT).await?;
    assert!(matches!(first.state(), AttemptState::Progress(Progress::LoginRequired)));
    assert!(!first.is_settled());
    assert_eq!(service.stage(), AttemptStage::Idle);

    service.submit_credentials("alice", "pw1");
    let second = service.sign_in();
    assert!(!second.same_attempt(&first));

    assert_eq!(settled(&second).await??, json!({"id": 1, "name": "alice"}));
    // The handle that reported progress settles with the later outcome.
    assert_eq!(settled(&first).await??, json!({"id": 1, "name": "alice"}));
    assert_eq!(transport.count(&Method::POST, "/signin"), 2);
    Ok(())
}

#[tokio::test]
async fn terminal_failure_rejects_with_payload() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new().reply(Method::POST, "/signin", Reply::status(403, json!({"error": "locked"}))),
    );
    let store = Arc::new(MemoryStore::new());
    let service = build(transport, AuthSettings::default(), store.clone());
    let mut events = service.events().subscribe();

    service.submit_credentials("alice", "pw1");
    let err = settled(&service.sign_in()).await?.err();

    assert!(matches!(err, Some(AuthError::Login { status: Some(403), .. })));
    assert_eq!(err.as_ref().and_then(AuthError::body), Some(&json!({"error": "locked"})));
    assert!(!store.has_credential());
    assert!(!service.is_authenticated().await?);
    assert_eq!(service.stage(), AttemptStage::Idle);
    assert_eq!(drain_names(&mut events), vec!["credential.submitted", "login.error"]);
    Ok(())
}

#[tokio::test]
async fn terminal_failure_settles_superseded_handles() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::status(401, Value::Null))
            .reply(Method::POST, "/signin", Reply::status(401, json!("bad password"))),
    );
    let service = build(transport, AuthSettings::default(), Arc::new(MemoryStore::new()));
    let mut events = service.events().subscribe();

    let first = service.sign_in();
    next_event(&mut events, "login.required", WAIT).await?;

    service.submit_credentials("alice", "wrong");
    let second = service.sign_in();

    assert!(matches!(settled(&second).await?, Err(AuthError::Login { status: Some(401), .. })));
    assert!(matches!(settled(&first).await?, Err(AuthError::Login { status: Some(401), .. })));
    Ok(())
}

async fn sign_in_with_stored(flag: bool, automatic: bool) -> anyhow::Result<(bool, bool)> {
    let transport = Arc::new(FakeTransport::new().reply(Method::POST, "/signin", Reply::ok(json!({"id": 1}))));
    let store = Arc::new(MemoryStore::seeded("alice", "pw1", flag));
    let settings = AuthSettings { automatic, ..AuthSettings::default() };
    let service = build(transport.clone(), settings, store);
    service.configure_client(&basic_challenge()?);
    let mut events = service.events().subscribe();

    settled(&service.sign_in()).await??;

    let restored = drain_names(&mut events).contains(&"credential.restored");
    let stamped = transport.requests().iter().any(|r| r.header("authorization").is_some());
    Ok((restored, stamped))
}

#[tokio::test]
async fn session_flag_restores_stored_credentials() -> anyhow::Result<()> {
    assert_eq!(sign_in_with_stored(true, false).await?, (true, true));
    Ok(())
}

#[tokio::test]
async fn automatic_restores_stored_credentials() -> anyhow::Result<()> {
    assert_eq!(sign_in_with_stored(false, true).await?, (true, true));
    Ok(())
}

#[tokio::test]
async fn stored_credentials_ignored_without_flag_or_automatic() -> anyhow::Result<()> {
    assert_eq!(sign_in_with_stored(false, false).await?, (false, false));
    Ok(())
}

#[tokio::test]
async fn unstamped_login_retries_once_against_challenge() -> anyhow::Result<()> {
    let transport = Arc::new(FakeTransport::new().guarded(
        Method::POST,
        "/signin",
        Reply::ok(json!({"id": 1})),
        Reply::challenge(r#"Basic realm="api""#),
    ));
    let service = build(transport.clone(), AuthSettings::default(), Arc::new(MemoryStore::new()));

    service.submit_credentials("alice", "pw1");
    assert_eq!(settled(&service.sign_in()).await??, json!({"id": 1}));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header("authorization"), None);
    assert_eq!(requests[1].header("authorization"), Some("Basic YWxpY2U6cHcx"));
    Ok(())
}

#[tokio::test]
async fn stale_nonce_retries_login_once() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::challenge(&digest_challenge("n2", ", stale=true")))
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 1}))),
    );
    let service = build(transport.clone(), AuthSettings::default(), Arc::new(MemoryStore::new()));
    service.configure_client(&challenge(&digest_challenge("n1", ""))?);

    service.submit_credentials("alice", "pw1");
    assert_eq!(settled(&service.sign_in()).await??, json!({"id": 1}));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(authorization(requests.first()).contains(r#"nonce="n1""#));
    assert!(authorization(requests.get(1)).contains(r#"nonce="n2""#));
    Ok(())
}

#[tokio::test]
async fn stamped_login_without_stale_is_not_retried() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::challenge(&digest_challenge("n2", "")))
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 1}))),
    );
    let service = build(transport.clone(), AuthSettings::default(), Arc::new(MemoryStore::new()));
    service.configure_client(&challenge(&digest_challenge("n1", ""))?);

    service.submit_credentials("alice", "wrong");
    let result = settled(&service.sign_in()).await?;

    assert!(matches!(result, Err(AuthError::Login { status: Some(401), .. })));
    assert_eq!(transport.count(&Method::POST, "/signin"), 1);
    Ok(())
}

#[tokio::test]
async fn digest_uri_includes_base_path() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .with_base("http://api.local/v1/")
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 1}))),
    );
    let service = build(transport.clone(), AuthSettings::default(), Arc::new(MemoryStore::new()));
    service.configure_client(&challenge(&digest_challenge("n1", ""))?);

    service.submit_credentials("alice", "pw1");
    settled(&service.sign_in()).await??;

    let requests = transport.requests();
    let header = authorization(requests.first());
    assert!(header.contains(r#"uri="/v1/signin""#), "{header}");
    assert_eq!(requests.first().map(|r| r.url.as_str()), Some("/signin"));
    Ok(())
}

#[tokio::test]
async fn sign_out_during_login_discards_late_success() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 1})))
            .delay(Method::POST, "/signin", Duration::from_millis(200))
            .reply(Method::POST, "/signout", Reply::ok(Value::Null)),
    );
    let store = Arc::new(MemoryStore::new());
    let service = build(transport.clone(), AuthSettings::default(), store.clone());
    let mut events = service.events().subscribe();

    service.submit_credentials("alice", "pw1");
    let login = service.sign_in();
    settled(&service.sign_out()).await??;
    assert!(!service.is_authenticated().await?);

    assert!(matches!(settled(&login).await?, Err(AuthError::Abandoned)));
    assert!(!service.is_authenticated().await?);
    assert!(!store.is_authenticated());
    assert!(!store.has_credential());
    assert!(!service.identity().has());
    assert!(!drain_names(&mut events).contains(&"login.successful"));
    assert_eq!(transport.count(&Method::POST, "/signin"), 1);
    Ok(())
}

#[tokio::test]
async fn sign_out_clears_session() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 1})))
            .reply(Method::POST, "/signout", Reply::ok(json!({"bye": true}))),
    );
    let store = Arc::new(MemoryStore::new());
    let service = build(transport.clone(), AuthSettings::default(), store.clone());
    service.configure_client(&basic_challenge()?);

    service.submit_credentials("alice", "pw1");
    settled(&service.sign_in()).await??;
    assert!(service.is_authenticated().await?);

    let mut events = service.events().subscribe();
    let first = service.sign_out();
    let second = service.sign_out();
    assert!(first.same_attempt(&second));
    assert_eq!(settled(&first).await??, json!({"bye": true}));

    assert!(!service.is_authenticated().await?);
    assert!(!store.is_authenticated());
    assert!(!service.identity().has());
    assert_eq!(drain_names(&mut events), vec!["logout.successful"]);
    // The logout exchange carried the session credentials.
    let logout = transport
        .requests()
        .into_iter()
        .find(|r| r.request_target() == "/signout")
        .ok_or_else(|| anyhow::anyhow!("no logout request"))?;
    assert_eq!(logout.header("authorization"), Some("Basic YWxpY2U6cHcx"));
    Ok(())
}

#[tokio::test]
async fn sign_out_without_session_still_calls_server() -> anyhow::Result<()> {
    let transport = Arc::new(FakeTransport::new().reply(Method::POST, "/signout", Reply::ok(Value::Null)));
    let service = build(transport.clone(), AuthSettings::default(), Arc::new(MemoryStore::new()));

    settled(&service.sign_out()).await??;
    assert_eq!(transport.count(&Method::POST, "/signout"), 1);
    Ok(())
}

#[tokio::test]
async fn is_authenticated_waits_for_failed_logout() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signout", Reply::status(500, json!("boom")))
            .delay(Method::POST, "/signout", Duration::from_millis(50)),
    );
    let service = build(transport, AuthSettings::default(), Arc::new(MemoryStore::new()));
    let mut events = service.events().subscribe();

    let _handle = service.sign_out();
    let result = tokio::time::timeout(WAIT, service.is_authenticated()).await?;
    assert!(matches!(result, Err(AuthError::Logout { status: Some(500), .. })));
    next_event(&mut events, "logout.error", WAIT).await?;

    // The failed attempt is gone; the next check resolves from the snapshot.
    assert!(!service.is_authenticated().await?);
    Ok(())
}

#[tokio::test]
async fn is_authenticated_waits_for_login() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 1})))
            .delay(Method::POST, "/signin", Duration::from_millis(50)),
    );
    let service = build(transport, AuthSettings::default(), Arc::new(MemoryStore::new()));

    let _handle = service.sign_in();
    assert!(tokio::time::timeout(WAIT, service.is_authenticated()).await??);
    Ok(())
}

#[tokio::test]
async fn flag_without_identity_is_not_authenticated() -> anyhow::Result<()> {
    let transport = Arc::new(FakeTransport::new());
    let service = build(transport, AuthSettings::default(), Arc::new(MemoryStore::seeded("a", "b", true)));
    assert!(!service.is_authenticated().await?);
    Ok(())
}

#[test]
fn login_and_logout_exchanges_terminate() {
    let service = build(Arc::new(FakeTransport::new()), AuthSettings::default(), Arc::new(MemoryStore::new()));
    let rejection = |request: HttpRequest| {
        let response = HttpResponse { status: 401, headers: HeaderMap::new(), body: Value::Null };
        Rejection::new(request, Cause::Status(response))
    };

    assert!(service.must_terminate(&rejection(HttpRequest::post("/signin"))));
    assert!(service.must_terminate(&rejection(HttpRequest::post("http://api.local/signout"))));
    assert!(!service.must_terminate(&rejection(HttpRequest::get("/signin"))));
    assert!(!service.must_terminate(&rejection(HttpRequest::get("/orders"))));
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
    tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
}

#[tokio::test]
async fn callbacks_fire_once_per_sign_in_cycle() -> anyhow::Result<()> {
    let transport = Arc::new(
        FakeTransport::new()
            .reply(Method::POST, "/signin", Reply::status(401, Value::Null))
            .reply(Method::POST, "/signin", Reply::ok(json!({"id": 7})))
            .reply(Method::POST, "/signout", Reply::status(503, Value::Null)),
    );
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (login_tx, logout_tx) = (tx.clone(), tx);
    let callbacks = CallbackRegistry::default()
        .on_login(move || {
            let (ok, progress) = (login_tx.clone(), login_tx.clone());
            AttemptCallbacks::new()
                .on_success(move |v| {
                    let _ = ok.send(format!("login ok {}", v["id"]));
                })
                .on_progress(move |p| {
                    let _ = progress.send(format!("login progress {p:?}"));
                })
        })
        .on_logout(move || {
            let err = logout_tx.clone();
            AttemptCallbacks::new().on_error(move |e| {
                let _ = err.send(format!("logout error {e}"));
            })
        });
    let settings = AuthSettings { callbacks, ..AuthSettings::default() };
    let service = build(transport, settings, Arc::new(MemoryStore::new()));

    let first = service.sign_in();
    assert_eq!(recv(&mut rx).await.as_deref(), Some("login progress LoginRequired"));

    let second = service.sign_in();
    settled(&second).await??;
    settled(&first).await??;
    // The recycled attempt reuses the cycle's callbacks: one success only.
    assert_eq!(recv(&mut rx).await.as_deref(), Some("login ok 7"));

    let _ = settled(&service.sign_out()).await?;
    assert_eq!(recv(&mut rx).await.as_deref(), Some("logout error logout failed (status 503)"));
    Ok(())
}
