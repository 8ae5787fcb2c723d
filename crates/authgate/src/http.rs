// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response values and the transport seam.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Cause, Rejection};

/// An outgoing request, owned so it can be suspended and replayed later.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: HeaderMap::new(), body: None }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a header, skipping names or values that are not valid header text.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(header = name, err = %e, "dropping invalid header name");
                return;
            }
        };
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(e) => tracing::warn!(header = %name, err = %e, "dropping invalid header value"),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path and query component, used as the Digest `uri` parameter.
    pub fn request_target(&self) -> String {
        match reqwest::Url::parse(&self.url) {
            Ok(url) => match url.query() {
                Some(q) => format!("{}?{q}", url.path()),
                None => url.path().to_owned(),
            },
            Err(_) => self.url.clone(),
        }
    }

    /// True when both requests address the same endpoint, ignoring the host
    /// part when one side is relative.
    pub fn targets(&self, method: &Method, url: &str) -> bool {
        if &self.method != method {
            return false;
        }
        if self.url == url {
            return true;
        }
        let mine = self.request_target();
        let theirs = HttpRequest::new(method.clone(), url).request_target();
        mine == theirs
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary { id: Uuid::new_v4(), method: self.method.to_string(), url: self.url.clone() }
    }
}

/// A received response with its body decoded as JSON when possible.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Lightweight description of a request carried in bus events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub id: Uuid,
    pub method: String,
    pub url: String,
}

/// Issues requests and reports non-2xx responses as rejections.
///
/// Object-safe for use as `Arc<dyn Transport>`.
pub trait Transport: Send + Sync + 'static {
    /// The absolute URL `url` is sent to.  Relative URLs pass through
    /// unchanged unless the transport joins them onto a base.
    fn resolve(&self, url: &str) -> String {
        url.to_owned()
    }

    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Rejection>> + Send + '_>>;
}

/// Transport backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    base_url: String,
    client: Client,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url: base_url.into().trim_end_matches('/').to_owned(), client }
    }

    fn url(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            return target.to_owned();
        }
        if target.starts_with('/') {
            format!("{}{target}", self.base_url)
        } else {
            format!("{}/{target}", self.base_url)
        }
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, Rejection> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.url))
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => return Err(Rejection::new(request, Cause::Network(e.to_string()))),
        };

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => return Err(Rejection::new(request, Cause::Network(e.to_string()))),
        };
        let response = HttpResponse { status, headers, body: decode_body(&bytes) };

        tracing::debug!(method = %request.method, url = %request.url, status, "response received");
        if response.is_success() {
            Ok(response)
        } else {
            Err(Rejection::new(request, Cause::Status(response)))
        }
    }
}

impl Transport for ReqwestTransport {
    fn resolve(&self, url: &str) -> String {
        self.url(url)
    }

    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Rejection>> + Send + '_>> {
        Box::pin(self.dispatch(request))
    }
}

/// Empty bodies become `null`, non-JSON bodies become a JSON string.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
