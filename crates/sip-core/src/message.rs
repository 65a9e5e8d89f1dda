//! Text-level SIP message model
//!
//! A [`SipMessage`] is deliberately shallow: a start line, a flat header map
//! and a body. It carries exactly what the softphone call flows need to build
//! requests, echo headers back in responses and recognise inbound messages by
//! their content, without modelling the full RFC 3261 grammar.
//!
//! # Wire format
//!
//! ```text
//! <start-line>\r\n
//! <name>: <value>\r\n      (zero or more)
//! \r\n
//! <body>
//! ```
//!
//! Serialization always stamps the `User-Agent` header and fills in
//! `Content-Length` when the caller did not set it.
//!
//! # Examples
//!
//! ```rust
//! use wsphone_sip_core::SipMessage;
//!
//! let register = SipMessage::request("REGISTER", "sip:local")
//!     .with_header("CSeq", "8082 REGISTER")
//!     .with_header("Call-ID", "abc");
//!
//! let wire = register.to_wire();
//! let parsed: SipMessage = wire.parse().unwrap();
//! assert_eq!(parsed.header("CSeq"), Some("8082 REGISTER"));
//! assert_eq!(parsed.header("Content-Length"), Some("0"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::cseq::{self, CSeq};
use crate::error::{Error, Result};

/// Protocol token used in start lines
pub const SIP_VERSION: &str = "SIP/2.0";

/// Value stamped into the `User-Agent` header of every outgoing message
pub const USER_AGENT: &str = concat!("wsphone/", env!("CARGO_PKG_VERSION"));

const CRLF: &str = "\r\n";
const HEADER_SEPARATOR: &str = ": ";

/// A SIP request or response as plain text parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SipMessage {
    /// Request line (`INVITE sip:local SIP/2.0`) or status line (`SIP/2.0 200 OK`)
    pub start_line: String,
    /// Header map; one value per name, last write wins
    pub headers: BTreeMap<String, String>,
    /// Message body, usually SDP or empty
    pub body: String,
}

impl SipMessage {
    /// Create a message with the given start line and no headers
    pub fn new(start_line: impl Into<String>) -> Self {
        Self {
            start_line: start_line.into(),
            ..Default::default()
        }
    }

    /// Create a request with a `METHOD uri SIP/2.0` start line
    pub fn request(method: &str, uri: &str) -> Self {
        Self::new(format!("{method} {uri} {SIP_VERSION}"))
    }

    /// Create a response with a `SIP/2.0 code reason` status line
    pub fn response(code: u16, reason: &str) -> Self {
        Self::new(format!("{SIP_VERSION} {code} {reason}"))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Insert or replace a header
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Look up a header by name.
    ///
    /// The exact spelling is tried first; servers that use a different
    /// capitalisation (`Call-Id`, `cseq`) are matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    /// Header value or `MissingHeader`
    pub fn require_header(&self, name: &str) -> Result<&str> {
        self.header(name)
            .ok_or_else(|| Error::MissingHeader(name.to_string()))
    }

    pub fn is_response(&self) -> bool {
        self.start_line.starts_with(SIP_VERSION)
    }

    /// Method of a request, `None` for responses
    pub fn method(&self) -> Option<&str> {
        if self.is_response() {
            return None;
        }
        self.start_line.split_whitespace().next()
    }

    /// True if this is a request for `method`
    pub fn is_request(&self, method: &str) -> bool {
        self.method() == Some(method)
    }

    /// Status code of a response, `None` for requests
    pub fn status_code(&self) -> Option<u16> {
        if !self.is_response() {
            return None;
        }
        self.start_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
    }

    /// Reason phrase of a response, empty for requests
    pub fn reason_phrase(&self) -> &str {
        if !self.is_response() {
            return "";
        }
        self.start_line
            .splitn(3, ' ')
            .nth(2)
            .map(str::trim)
            .unwrap_or_default()
    }

    /// Request-URI of a request, `None` for responses
    pub fn request_uri(&self) -> Option<&str> {
        if self.is_response() {
            return None;
        }
        self.start_line.split_whitespace().nth(1)
    }

    /// Parsed CSeq header
    pub fn cseq(&self) -> Result<CSeq> {
        self.require_header("CSeq")?.parse()
    }

    /// Method named by the CSeq header, if it can be parsed
    pub fn cseq_method(&self) -> Option<String> {
        self.cseq().ok().map(|cseq| cseq.method)
    }

    /// Increment the CSeq sequence number by one, preserving the method.
    ///
    /// A message without a CSeq header is left as it is.
    pub fn increase_seq(&mut self) -> Result<()> {
        let Some(value) = self.headers.get_mut("CSeq") else {
            return Ok(());
        };
        *value = cseq::increment(value)?;
        Ok(())
    }

    /// Serialize to wire text
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(self.start_line.len() + self.body.len() + 256);
        out.push_str(&self.start_line);
        out.push_str(CRLF);

        let mut write_header = |name: &str, value: &str| {
            out.push_str(name);
            out.push_str(HEADER_SEPARATOR);
            out.push_str(value);
            out.push_str(CRLF);
        };

        for (name, value) in &self.headers {
            if name == "User-Agent" {
                continue;
            }
            write_header(name, value);
        }
        if !self.headers.contains_key("Content-Length") {
            write_header("Content-Length", &self.body.len().to_string());
        }
        write_header("User-Agent", USER_AGENT);

        out.push_str(CRLF);
        out.push_str(&self.body);
        out
    }

    /// Parse wire text
    pub fn parse(text: &str) -> Result<Self> {
        let (head, body) = text
            .split_once("\r\n\r\n")
            .ok_or_else(|| Error::malformed("no blank line between headers and body"))?;

        let mut lines = head.split(CRLF);
        let start_line = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or_else(|| Error::malformed("empty start line"))?;

        let mut headers = BTreeMap::new();
        for line in lines {
            let (name, value) = line
                .split_once(HEADER_SEPARATOR)
                .ok_or_else(|| Error::malformed(format!("header line without separator: {line:?}")))?;
            headers.insert(name.to_string(), value.to_string());
        }

        Ok(Self {
            start_line: start_line.to_string(),
            headers,
            body: body.to_string(),
        })
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromStr for SipMessage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SipMessage::parse(s)
    }
}
