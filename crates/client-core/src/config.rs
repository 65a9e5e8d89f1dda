//! Softphone configuration
//!
//! [`SoftphoneConfig`] carries the account credentials and the address of the
//! SIP-over-WebSocket server. It deserializes from TOML (or any serde format)
//! with every field optional, falling back to the lab defaults:
//!
//! ```rust
//! use wsphone_client_core::SoftphoneConfig;
//! use wsphone_sip_transport::TransportKind;
//!
//! let config = SoftphoneConfig::new("201", "secret", "pbx.example.com")
//!     .with_server("10.0.0.5", 8089)
//!     .with_transport(TransportKind::Wss)
//!     .with_path("/ws");
//!
//! assert_eq!(config.server_url(), "wss://10.0.0.5:8089/ws");
//! assert_eq!(config.request_uri(), "sip:pbx.example.com");
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use wsphone_sip_transport::{websocket_url, TransportKind};

/// Expiry advertised in the Contact of REGISTER requests, in seconds
pub const REGISTER_EXPIRES: u32 = 600;

/// Expiry advertised in the Contact of INVITE and ACK requests, in seconds
pub const INVITE_EXPIRES: u32 = 200;

/// Configuration of one softphone instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftphoneConfig {
    /// Account user part, also the digest username
    pub username: String,
    pub password: String,
    /// SIP domain of the account
    pub domain: String,
    #[serde(
        serialize_with = "serialize_transport",
        deserialize_with = "deserialize_transport"
    )]
    pub transport: TransportKind,
    /// Host of the WebSocket server
    pub host: String,
    /// URL path of the WebSocket endpoint, may be empty
    pub path: String,
    pub port: u16,
    /// Give up on a REGISTER or INVITE with no final response after this many
    /// seconds. `None` waits indefinitely.
    pub response_timeout_secs: Option<u64>,
}

impl Default for SoftphoneConfig {
    fn default() -> Self {
        Self {
            username: "101".to_string(),
            password: "101".to_string(),
            domain: "local".to_string(),
            transport: TransportKind::Ws,
            host: "192.168.100.10".to_string(),
            path: String::new(),
            port: 5071,
            response_timeout_secs: None,
        }
    }
}

impl SoftphoneConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the final-response timeout.
    ///
    /// The timeout has whole-second resolution: fractions of a second are
    /// rounded up, so 500 ms becomes 1 s and 1.9 s becomes 2 s.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        let whole = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.response_timeout_secs = Some(whole.max(1));
        self
    }

    /// `ws(s)://host:port/path`
    pub fn server_url(&self) -> String {
        websocket_url(self.transport, &self.host, self.port, &self.path)
    }

    /// Request-URI of REGISTER
    pub fn request_uri(&self) -> String {
        format!("sip:{}", self.domain)
    }

    /// Address-of-record URI of `user` in the account domain
    pub fn user_uri(&self, user: &str) -> String {
        format!("sip:{}@{}", user, self.domain)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_secs.map(Duration::from_secs)
    }
}

fn serialize_transport<S: Serializer>(kind: &TransportKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.as_str())
}

fn deserialize_transport<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TransportKind, D::Error> {
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}
