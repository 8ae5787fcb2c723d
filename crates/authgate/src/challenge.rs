// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication challenge parsing (RFC 7235 `WWW-Authenticate` syntax).
//!
//! A header value may hold several challenges, each either `Scheme token68`
//! or `Scheme k=v, k="quoted, value"`.  Only challenges the shipped client
//! can answer are recognized: `Basic`, and `Digest` with an MD5 or SHA-256
//! family algorithm and `qop` either absent or offering `auth`.

use std::collections::BTreeMap;

use reqwest::header::HeaderMap;

/// Default header carrying the server's challenge.
pub const DEFAULT_CHALLENGE_HEADER: &str = "www-authenticate";

/// Digest hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl DigestAlgorithm {
    /// A missing `algorithm` parameter means MD5 (RFC 7616 section 3.3).
    fn from_param(value: Option<&str>) -> Option<Self> {
        let Some(value) = value else {
            return Some(Self::Md5);
        };
        match value.to_ascii_uppercase().as_str() {
            "MD5" => Some(Self::Md5),
            "MD5-SESS" => Some(Self::Md5Sess),
            "SHA-256" => Some(Self::Sha256),
            "SHA-256-SESS" => Some(Self::Sha256Sess),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
        }
    }

    /// Session variants rehash HA1 with the nonce and cnonce.
    pub fn is_sess(&self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }
}

/// A recognized authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Basic,
    Digest(DigestAlgorithm),
}

impl Scheme {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Digest(_) => "Digest",
        }
    }
}

/// A parsed, recognized challenge.  Parameter names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: Scheme,
    pub params: BTreeMap<String, String>,
}

impl Challenge {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn realm(&self) -> Option<&str> {
        self.param("realm")
    }

    /// Whether the server offered `qop=auth`.
    pub fn offers_qop_auth(&self) -> bool {
        self.param("qop").is_some_and(|q| q.split(',').any(|v| v.trim() == "auth"))
    }
}

/// Find the strongest recognized challenge in the named header.
///
/// Digest is preferred over Basic when both are offered.
pub fn parse_challenge(headers: &HeaderMap, header_name: &str) -> Option<Challenge> {
    let mut found: Vec<Challenge> = headers
        .get_all(header_name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_header_value)
        .collect();
    found.sort_by_key(|c| match c.scheme {
        Scheme::Digest(_) => 0,
        Scheme::Basic => 1,
    });
    found.into_iter().next()
}

/// Parse every recognized challenge in one header value.
pub fn parse_header_value(value: &str) -> Vec<Challenge> {
    split_challenges(value).into_iter().filter_map(recognize).collect()
}

/// A syntactically valid challenge of any scheme.
#[derive(Debug, Default)]
struct RawChallenge {
    scheme: String,
    params: BTreeMap<String, String>,
}

fn recognize(raw: RawChallenge) -> Option<Challenge> {
    let scheme = match raw.scheme.to_ascii_lowercase().as_str() {
        "basic" => Scheme::Basic,
        "digest" => {
            raw.params.get("nonce")?;
            raw.params.get("realm")?;
            let algorithm =
                DigestAlgorithm::from_param(raw.params.get("algorithm").map(String::as_str))?;
            if let Some(qop) = raw.params.get("qop") {
                if !qop.split(',').any(|v| v.trim() == "auth") {
                    return None;
                }
            }
            Scheme::Digest(algorithm)
        }
        _ => return None,
    };
    Some(Challenge { scheme, params: raw.params })
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(src: &str) -> Self {
        Self { chars: src.chars().collect(), pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some(',')) {
            self.pos += 1;
        }
    }

    fn token(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ' ' || c == '\t' || c == ',' || c == '=' || c == '"' {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn quoted(&mut self) -> String {
        // Opening quote already peeked.
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '"' => break,
                '\\' => {
                    if let Some(escaped) = self.peek() {
                        out.push(escaped);
                        self.pos += 1;
                    }
                }
                other => out.push(other),
            }
        }
        out
    }

    /// Whether the text after the next comma is `name =` (another parameter
    /// of the current challenge) rather than a new scheme.
    fn comma_starts_param(&mut self) -> bool {
        let saved = self.pos;
        self.skip_separators();
        let is_param = !self.token().is_empty() && {
            self.skip_ws();
            self.peek() == Some('=')
        };
        self.pos = saved;
        is_param
    }
}

fn split_challenges(value: &str) -> Vec<RawChallenge> {
    let mut cur = Cursor::new(value);
    let mut out = Vec::new();

    loop {
        cur.skip_separators();
        let scheme = cur.token();
        if scheme.is_empty() {
            break;
        }
        let mut challenge = RawChallenge { scheme, ..RawChallenge::default() };

        loop {
            cur.skip_ws();
            match cur.peek() {
                None => break,
                Some(',') => {
                    if !cur.comma_starts_param() {
                        break;
                    }
                    cur.skip_separators();
                }
                Some(_) => {}
            }

            let name = cur.token();
            if name.is_empty() {
                // Stray quote or '=': skip it so parsing always advances.
                cur.pos += 1;
                continue;
            }
            cur.skip_ws();
            if cur.peek() != Some('=') {
                // token68 credentials carry nothing the client needs.
                continue;
            }

            // `name=` followed by more '=' or nothing is token68 padding.
            let eq_start = cur.pos;
            cur.pos += 1;
            cur.skip_ws();
            if matches!(cur.peek(), None | Some(',') | Some('=')) {
                cur.pos = eq_start;
                while cur.peek() == Some('=') {
                    cur.pos += 1;
                }
                continue;
            }
            let value = if cur.peek() == Some('"') { cur.quoted() } else { cur.token() };
            challenge.params.insert(name.to_ascii_lowercase(), value);
        }

        out.push(challenge);
        if cur.at_end() {
            break;
        }
    }
    out
}

#[cfg(test)]
#[path = "challenge_tests.rs"]
mod tests;
