//! SIP transport layer for wsphone
//!
//! This crate provides the single WebSocket connection a softphone uses to
//! talk to its SIP server, and the correlator registry that routes inbound
//! messages to the requests waiting for them.

pub mod correlator;
pub mod error;
pub mod transport;

pub use correlator::{handler, CorrelatorKey, CorrelatorRegistry, ResponseHandler};
pub use error::{Error, Result};
pub use transport::ws::WebSocketTransport;
pub use transport::{websocket_url, TransportKind, SIP_SUBPROTOCOL};

/// Connect a WebSocket transport to `kind://host:port/path`
pub async fn connect(
    kind: TransportKind,
    host: &str,
    port: u16,
    path: &str,
) -> Result<WebSocketTransport> {
    WebSocketTransport::connect(&websocket_url(kind, host, port, path)).await
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        connect, handler, websocket_url, CorrelatorKey, CorrelatorRegistry, Error,
        ResponseHandler, Result, TransportKind, WebSocketTransport,
    };
}
