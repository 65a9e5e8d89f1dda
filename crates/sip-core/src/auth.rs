//! Digest authentication (RFC 2617 / RFC 3261 §22)
//!
//! Registrars answer an unauthenticated REGISTER with `401 Unauthorized` and a
//! `WWW-Authenticate` header; proxies answer an INVITE with
//! `407 Proxy Authentication Required` and a `Proxy-Authenticate` header.
//! Both carry the same `Digest` challenge, and the client replies by
//! repeating the request with an `Authorization` or `Proxy-Authorization`
//! header computed here.
//!
//! ```rust
//! use wsphone_sip_core::auth::{DigestChallenge, DigestCredentials};
//!
//! let challenge = DigestChallenge::parse(r#"Digest realm="x", nonce="y""#).unwrap();
//! let creds = DigestCredentials::new("101", "secret");
//! let value = creds.authorize(&challenge, "REGISTER", "sip:local");
//! assert!(value.starts_with("Digest username=\"101\""));
//! ```

use std::fmt::Write;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::message::SipMessage;

/// Which pair of headers a challenge travels in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// `401 Unauthorized` from a registrar or UAS
    WwwAuthenticate,
    /// `407 Proxy Authentication Required` from a proxy
    ProxyAuthenticate,
}

impl ChallengeKind {
    /// Challenge kind for a response status, if the status is a challenge
    pub fn from_status(code: u16) -> Option<Self> {
        match code {
            401 => Some(ChallengeKind::WwwAuthenticate),
            407 => Some(ChallengeKind::ProxyAuthenticate),
            _ => None,
        }
    }

    /// Header carrying the server challenge
    pub fn challenge_header(self) -> &'static str {
        match self {
            ChallengeKind::WwwAuthenticate => "WWW-Authenticate",
            ChallengeKind::ProxyAuthenticate => "Proxy-Authenticate",
        }
    }

    /// Header carrying the client credentials
    pub fn credentials_header(self) -> &'static str {
        match self {
            ChallengeKind::WwwAuthenticate => "Authorization",
            ChallengeKind::ProxyAuthenticate => "Proxy-Authorization",
        }
    }
}

/// A parsed `Digest` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: String,
    /// `qop` options offered by the server, if any
    pub qop: Vec<String>,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` / `Proxy-Authenticate` header value
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (scheme, params) = value
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::InvalidChallenge(value.to_string()))?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(Error::InvalidChallenge(format!("unsupported scheme {scheme}")));
        }

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut algorithm = "MD5".to_string();
        let mut qop = Vec::new();

        for (key, val) in split_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(val),
                "nonce" => nonce = Some(val),
                "opaque" => opaque = Some(val),
                "algorithm" => algorithm = val,
                "qop" => {
                    qop = val
                        .split(',')
                        .map(|q| q.trim().to_string())
                        .filter(|q| !q.is_empty())
                        .collect()
                }
                _ => {}
            }
        }

        if !algorithm.eq_ignore_ascii_case("MD5") {
            return Err(Error::InvalidChallenge(format!("unsupported algorithm {algorithm}")));
        }

        Ok(Self {
            realm: realm.ok_or_else(|| Error::InvalidChallenge("missing realm".into()))?,
            nonce: nonce.ok_or_else(|| Error::InvalidChallenge("missing nonce".into()))?,
            opaque,
            algorithm,
            qop,
        })
    }

    /// Extract the challenge of `kind` from a response
    pub fn from_response(response: &SipMessage, kind: ChallengeKind) -> Result<Self> {
        Self::parse(response.require_header(kind.challenge_header())?)
    }

    fn supports_qop_auth(&self) -> bool {
        self.qop.iter().any(|q| q.eq_ignore_ascii_case("auth"))
    }
}

/// Split `a="b", c=d` into key/value pairs, honouring commas inside quotes
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut flush = |raw: &str| {
        if let Some((key, val)) = raw.split_once('=') {
            pairs.push((key.trim().to_string(), val.trim().trim_matches('"').to_string()));
        }
    };

    for ch in params.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                flush(&current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    flush(&current);
    pairs
}

/// Username/password pair used to answer challenges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub password: String,
}

impl DigestCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build the credentials header value for `method` on `uri`
    pub fn authorize(&self, challenge: &DigestChallenge, method: &str, uri: &str) -> String {
        let cnonce = Uuid::new_v4().simple().to_string();
        self.authorize_with_cnonce(challenge, method, uri, &cnonce)
    }

    /// Same as [`authorize`](Self::authorize) with a caller-chosen client nonce
    pub fn authorize_with_cnonce(
        &self,
        challenge: &DigestChallenge,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> String {
        let qop = challenge.supports_qop_auth().then_some(("auth", "00000001", cnonce));
        let response = self.response(challenge, method, uri, qop);

        let mut value = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
            self.username, challenge.realm, challenge.nonce, uri, response, challenge.algorithm
        );
        if let Some(opaque) = &challenge.opaque {
            let _ = write!(value, ", opaque=\"{opaque}\"");
        }
        if let Some((qop, nc, cnonce)) = qop {
            let _ = write!(value, ", qop={qop}, nc={nc}, cnonce=\"{cnonce}\"");
        }
        value
    }

    /// Digest `response` parameter
    pub fn response(
        &self,
        challenge: &DigestChallenge,
        method: &str,
        uri: &str,
        qop: Option<(&str, &str, &str)>,
    ) -> String {
        let ha1 = md5_hex(&format!("{}:{}:{}", self.username, challenge.realm, self.password));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        match qop {
            Some((qop, nc, cnonce)) => {
                md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}", challenge.nonce))
            }
            None => md5_hex(&format!("{ha1}:{}:{ha2}", challenge.nonce)),
        }
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
