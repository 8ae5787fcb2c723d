// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Method;

use crate::challenge::DEFAULT_CHALLENGE_HEADER;
use crate::http::HttpRequest;
use crate::service::callbacks::CallbackRegistry;

/// Command-line entry point.
#[derive(Debug, Parser)]
#[command(name = "authgate", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// GET a path through the interceptor and print the JSON body.
    Fetch { path: String },
    /// Sign in with the configured or stored credentials.
    SignIn,
    /// Sign out of the current session.
    SignOut,
    /// Print whether the session is authenticated.
    Status,
}

/// Whether credentials are persisted after a successful sign-in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RememberPolicy {
    #[default]
    Always,
    Never,
}

/// Authentication and transport configuration.
#[derive(Debug, Clone, clap::Args)]
pub struct AuthConfig {
    /// Base URL that relative request paths are resolved against.
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "AUTHGATE_BASE_URL")]
    pub base_url: String,

    /// HTTP method of the login exchange.
    #[arg(long, default_value = "POST", env = "AUTHGATE_LOGIN_METHOD")]
    pub login_method: String,

    /// URL of the login exchange.
    #[arg(long, default_value = "/signin", env = "AUTHGATE_LOGIN_URL")]
    pub login_url: String,

    /// HTTP method of the logout exchange.
    #[arg(long, default_value = "POST", env = "AUTHGATE_LOGOUT_METHOD")]
    pub logout_method: String,

    /// URL of the logout exchange.
    #[arg(long, default_value = "/signout", env = "AUTHGATE_LOGOUT_URL")]
    pub logout_url: String,

    /// Restore stored credentials on sign-in even without a prior session.
    #[arg(long, env = "AUTHGATE_AUTOMATIC")]
    pub automatic: bool,

    /// Credential persistence policy after a successful sign-in.
    #[arg(long, value_enum, default_value_t = RememberPolicy::Always, env = "AUTHGATE_REMEMBER")]
    pub remember: RememberPolicy,

    /// Response header carrying the authentication challenge.
    #[arg(long, default_value = DEFAULT_CHALLENGE_HEADER, env = "AUTHGATE_CHALLENGE_HEADER")]
    pub challenge_header: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30000, env = "AUTHGATE_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Directory holding the persisted session file.
    #[arg(long, env = "AUTHGATE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Username submitted when the server asks for credentials.
    #[arg(long, env = "AUTHGATE_USERNAME")]
    pub username: Option<String>,

    /// Password submitted when the server asks for credentials.
    #[arg(long, env = "AUTHGATE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "AUTHGATE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "AUTHGATE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_method(&self.login_method)?;
        parse_method(&self.logout_method)?;

        if self.login_url.trim().is_empty() {
            anyhow::bail!("--login-url must not be empty");
        }
        if self.logout_url.trim().is_empty() {
            anyhow::bail!("--logout-url must not be empty");
        }
        if self.challenge_header.trim().is_empty() {
            anyhow::bail!("--challenge-header must not be empty");
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("--base-url must be an http(s) URL: {}", self.base_url);
        }
        if self.username.is_some() != self.password.is_some() {
            anyhow::bail!("--username and --password must be given together");
        }

        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Explicit `--state-dir`, else the default resolution.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(crate::store::persist::state_dir)
    }

    /// Runtime settings for the auth service.  Callbacks start empty.
    pub fn settings(&self) -> anyhow::Result<AuthSettings> {
        Ok(AuthSettings {
            login: Exchange::new(parse_method(&self.login_method)?, &self.login_url),
            logout: Exchange::new(parse_method(&self.logout_method)?, &self.logout_url),
            automatic: self.automatic,
            remember: self.remember,
            challenge_header: self.challenge_header.to_ascii_lowercase(),
            callbacks: CallbackRegistry::default(),
        })
    }
}

fn parse_method(s: &str) -> anyhow::Result<Method> {
    match s.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        other => anyhow::bail!("invalid HTTP method: {other}"),
    }
}

/// Method and URL of a login or logout exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub method: Method,
    pub url: String,
}

impl Exchange {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into() }
    }

    /// A fresh, unstamped request for this exchange.
    pub fn request(&self) -> HttpRequest {
        HttpRequest::new(self.method.clone(), self.url.clone())
    }

    /// Whether `request` addresses this exchange.
    pub fn matches(&self, request: &HttpRequest) -> bool {
        request.targets(&self.method, &self.url)
    }
}

/// Runtime configuration of the auth service, fixed at startup.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub login: Exchange,
    pub logout: Exchange,
    /// Restore stored credentials even when the session flag is clear.
    pub automatic: bool,
    pub remember: RememberPolicy,
    /// Lowercase header name carrying the challenge.
    pub challenge_header: String,
    pub callbacks: CallbackRegistry,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            login: Exchange::new(Method::POST, "/signin"),
            logout: Exchange::new(Method::POST, "/signout"),
            automatic: false,
            remember: RememberPolicy::Always,
            challenge_header: DEFAULT_CHALLENGE_HEADER.to_owned(),
            callbacks: CallbackRegistry::default(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
