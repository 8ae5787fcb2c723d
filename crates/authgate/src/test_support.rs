// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted transport and assertion helpers.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{Cause, Rejection};
use crate::events::AuthEvent;
use crate::http::{HttpRequest, HttpResponse, Transport};

/// One scripted response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self { status, headers: HeaderMap::new(), body }
    }

    /// A 401 carrying `challenge` in `WWW-Authenticate`.
    pub fn challenge(challenge: &str) -> Self {
        Self::status(401, Value::Null).with_header("www-authenticate", challenge)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.append(n, v);
        }
        self
    }
}

enum Route {
    /// Replies served in order; the last one repeats.
    Script(VecDeque<Reply>, Option<Reply>),
    /// `ok` when the request carries an `Authorization` header, else `denied`.
    Guarded { ok: Reply, denied: Reply },
}

/// In-memory [`Transport`] answering from per-route scripts.
///
/// Unknown routes answer 404.  Every request is recorded.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    delays: Mutex<HashMap<(Method, String), Duration>>,
    requests: Mutex<Vec<HttpRequest>>,
    base_url: Option<String>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `reply` to the script for `method path`.
    pub fn reply(self, method: Method, path: &str, reply: Reply) -> Self {
        {
            let key = (method, path.to_owned());
            let mut routes = self.routes.lock();
            if let Some(Route::Script(queue, _)) = routes.get_mut(&key) {
                queue.push_back(reply);
            } else {
                routes.insert(key, Route::Script(VecDeque::from([reply]), None));
            }
        }
        self
    }

    /// Serve `ok` to stamped requests and `denied` to the rest.
    pub fn guarded(self, method: Method, path: &str, ok: Reply, denied: Reply) -> Self {
        self.routes.lock().insert((method, path.to_owned()), Route::Guarded { ok, denied });
        self
    }

    /// Delay every reply on `method path`.
    pub fn delay(self, method: Method, path: &str, delay: Duration) -> Self {
        self.delays.lock().insert((method, path.to_owned()), delay);
        self
    }

    /// Resolve relative URLs against `base_url`, as a real transport would.
    /// Routing still matches the unresolved path.
    pub fn with_base(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_owned());
        self
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests sent to `method path`.
    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| &r.method == method && r.request_target() == path)
            .count()
    }

    fn answer(&self, request: &HttpRequest) -> (Reply, Option<Duration>) {
        let key = (request.method.clone(), request.request_target());
        let delay = self.delays.lock().get(&key).copied();
        let mut routes = self.routes.lock();
        let reply = match routes.get_mut(&key) {
            None => Reply::status(404, Value::Null),
            Some(Route::Guarded { ok, denied }) => {
                if request.header("authorization").is_some() {
                    ok.clone()
                } else {
                    denied.clone()
                }
            }
            Some(Route::Script(queue, last)) => match queue.pop_front() {
                Some(reply) => {
                    *last = Some(reply.clone());
                    reply
                }
                None => last.clone().unwrap_or_else(|| Reply::status(404, Value::Null)),
            },
        };
        (reply, delay)
    }
}

impl Transport for FakeTransport {
    fn resolve(&self, url: &str) -> String {
        match self.base_url {
            Some(ref base) if url.starts_with('/') => format!("{base}{url}"),
            _ => url.to_owned(),
        }
    }

    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Rejection>> + Send + '_>> {
        Box::pin(async move {
            self.requests.lock().push(request.clone());
            let (reply, delay) = self.answer(&request);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let response = HttpResponse { status: reply.status, headers: reply.headers, body: reply.body };
            if response.is_success() {
                Ok(response)
            } else {
                Err(Rejection::new(request, Cause::Status(response)))
            }
        })
    }
}

/// Wait up to `timeout` for the next event named `name`, skipping others.
pub async fn next_event(
    rx: &mut broadcast::Receiver<AuthEvent>,
    name: &str,
    timeout: Duration,
) -> anyhow::Result<AuthEvent> {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if event.name() == name => return Ok(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => anyhow::bail!("event bus closed"),
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for {name}"))?
}

/// Names of the events already buffered on `rx`.
pub fn drain_names(rx: &mut broadcast::Receiver<AuthEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => names.push(event.name()),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return names,
        }
    }
}

/// Assert that `$expr` is `Err` and its message contains `$substr`.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
