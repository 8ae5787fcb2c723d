// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use reqwest::header::HeaderMap;
use serde_json::json;

use super::*;

fn status_rejection(status: u16, body: Value) -> Rejection {
    let response = HttpResponse { status, headers: HeaderMap::new(), body };
    Rejection::new(HttpRequest::post("/signin"), Cause::Status(response))
}

#[test]
fn status_rejection_accessors() {
    let rejection = status_rejection(401, json!({"reason": "expired"}));
    assert_eq!(rejection.status(), Some(401));
    assert!(rejection.is_unauthorized());
    assert_eq!(rejection.body(), json!({"reason": "expired"}));
    assert_eq!(rejection.to_string(), "POST /signin failed: status 401");
}

#[test]
fn network_rejection_has_no_status() {
    let rejection = Rejection::new(HttpRequest::get("/orders"), Cause::Network("refused".into()));
    assert_eq!(rejection.status(), None);
    assert!(!rejection.is_unauthorized());
    assert!(rejection.response().is_none());
    assert_eq!(rejection.body(), Value::Null);
    assert_eq!(rejection.to_string(), "GET /orders failed: refused");
}

#[yare::parameterized(
    login_status   = { AuthError::login(&status_rejection(403, Value::Null)), "login failed (status 403)" },
    logout_status  = { AuthError::logout(&status_rejection(500, Value::Null)), "logout failed (status 500)" },
    abandoned      = { AuthError::Abandoned, "attempt abandoned before settling" },
    invalid        = { AuthError::InvalidIdentity, "identity must be a JSON object" },
)]
fn auth_error_display(err: AuthError, expected: &str) {
    assert_eq!(err.to_string(), expected);
}

#[test]
fn login_error_keeps_failure_payload() {
    let err = AuthError::login(&status_rejection(401, json!({"error": "bad password"})));
    assert_eq!(err.body(), Some(&json!({"error": "bad password"})));
    assert!(matches!(err, AuthError::Login { status: Some(401), .. }));

    let network = Rejection::new(HttpRequest::post("/signout"), Cause::Network("timeout".into()));
    let err = AuthError::logout(&network);
    assert_eq!(err.to_string(), "logout failed");
    assert_eq!(err.body(), Some(&Value::Null));
    assert_eq!(AuthError::Abandoned.body(), None);
}
