pub mod ws;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Sub-protocol token negotiated on the WebSocket handshake (RFC 7118)
pub const SIP_SUBPROTOCOL: &str = "sip";

/// WebSocket flavour used to reach the SIP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Plain WebSocket
    #[default]
    Ws,
    /// WebSocket over TLS
    Wss,
}

impl TransportKind {
    /// URL scheme and `transport=` URI parameter value
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Ws => "ws",
            TransportKind::Wss => "wss",
        }
    }

    /// Token used in the `Via` sent-protocol (`SIP/2.0/WS`)
    pub fn via_token(&self) -> &'static str {
        match self {
            TransportKind::Ws => "WS",
            TransportKind::Wss => "WSS",
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, TransportKind::Wss)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ws" => Ok(TransportKind::Ws),
            "wss" => Ok(TransportKind::Wss),
            other => Err(Error::UnsupportedTransport(other.to_string())),
        }
    }
}

/// Build `scheme://host:port/path`
pub fn websocket_url(kind: TransportKind, host: &str, port: u16, path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        format!("{}://{}:{}", kind.as_str(), host, port)
    } else if path.starts_with('/') {
        format!("{}://{}:{}{}", kind.as_str(), host, port, path)
    } else {
        format!("{}://{}:{}/{}", kind.as_str(), host, port, path)
    }
}
