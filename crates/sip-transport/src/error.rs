use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the WebSocket transport
#[derive(Error, Debug)]
pub enum Error {
    /// The WebSocket handshake or TCP connect failed
    #[error("Failed to connect to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    /// The transport kind is not one of `ws` / `wss`
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Writing a frame failed
    #[error("Failed to send message: {0}")]
    SendFailed(String),

    /// The connection has been closed or the reader loop has stopped
    #[error("Transport is closed")]
    TransportClosed,
}

impl Error {
    pub(crate) fn connect(url: &str, reason: impl ToString) -> Self {
        Error::ConnectFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
