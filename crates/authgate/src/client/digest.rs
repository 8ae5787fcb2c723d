// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP Digest (RFC 7616) with the MD5 and SHA-256 algorithm families.

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::challenge::{Challenge, DigestAlgorithm};
use crate::http::HttpRequest;

/// Digest state for one server nonce: the challenge and its request counter.
pub struct DigestSession {
    algorithm: DigestAlgorithm,
    challenge: Challenge,
    nc: u32,
}

/// Inputs of one digest computation.
pub struct DigestInput<'a> {
    pub algorithm: DigestAlgorithm,
    pub username: &'a str,
    pub realm: &'a str,
    pub password: &'a str,
    pub method: &'a str,
    pub uri: &'a str,
    pub nonce: &'a str,
    /// `(nc, cnonce)` when `qop=auth` is in use.
    pub qop_auth: Option<(&'a str, &'a str)>,
}

impl DigestSession {
    pub fn new(algorithm: DigestAlgorithm, challenge: Challenge) -> Self {
        Self { algorithm, challenge, nc: 0 }
    }

    /// Build the `Authorization` value for `request`, advancing `nc`.
    pub fn authorization(&mut self, username: &str, password: &str, request: &HttpRequest) -> String {
        self.nc = self.nc.wrapping_add(1);
        let realm = self.challenge.realm().unwrap_or_default();
        let nonce = self.challenge.param("nonce").unwrap_or_default();
        let uri = request.request_target();
        let method = request.method.as_str();
        let nc = format!("{:08x}", self.nc);
        let cnonce = generate_cnonce();
        let use_qop = self.challenge.offers_qop_auth();

        let response = compute_response(&DigestInput {
            algorithm: self.algorithm,
            username,
            realm,
            password,
            method,
            uri: &uri,
            nonce,
            qop_auth: use_qop.then_some((nc.as_str(), cnonce.as_str())),
        });

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}, response=\"{}\"",
            quote(username),
            quote(realm),
            quote(nonce),
            quote(&uri),
            self.algorithm.as_str(),
            response,
        );
        if let Some(opaque) = self.challenge.param("opaque") {
            header.push_str(&format!(", opaque=\"{}\"", quote(opaque)));
        }
        if use_qop {
            header.push_str(&format!(", qop=auth, nc={nc}, cnonce=\"{cnonce}\""));
        }
        header
    }
}

/// The `response` parameter: `H(HA1:nonce[:nc:cnonce:qop]:HA2)`.
pub fn compute_response(input: &DigestInput<'_>) -> String {
    let hash = |data: String| match input.algorithm {
        DigestAlgorithm::Md5 | DigestAlgorithm::Md5Sess => hex_digest::<Md5>(&data),
        DigestAlgorithm::Sha256 | DigestAlgorithm::Sha256Sess => hex_digest::<Sha256>(&data),
    };

    let mut ha1 = hash(format!("{}:{}:{}", input.username, input.realm, input.password));
    if input.algorithm.is_sess() {
        let cnonce = input.qop_auth.map(|(_, c)| c).unwrap_or_default();
        ha1 = hash(format!("{ha1}:{}:{cnonce}", input.nonce));
    }
    let ha2 = hash(format!("{}:{}", input.method, input.uri));
    match input.qop_auth {
        Some((nc, cnonce)) => hash(format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", input.nonce)),
        None => hash(format!("{ha1}:{}:{ha2}", input.nonce)),
    }
}

fn hex_digest<D: Digest>(data: &str) -> String {
    D::digest(data.as_bytes()).iter().map(|b| format!("{b:02x}")).collect()
}

fn generate_cnonce() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
