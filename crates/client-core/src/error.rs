//! Error types for softphone operations

use std::time::Duration;

use thiserror::Error;

/// Result type for softphone operations
pub type SoftphoneResult<T> = Result<T, SoftphoneError>;

/// Failure reported by the external media engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct MediaError(pub String);

impl MediaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type for media engine operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can end a call flow
#[derive(Debug, Error)]
pub enum SoftphoneError {
    /// Transport dial, read or write failure
    #[error("Connection error: {0}")]
    Connection(#[from] wsphone_sip_transport::Error),

    /// A message could not be built or understood
    #[error("SIP message error: {0}")]
    Message(#[from] wsphone_sip_core::Error),

    /// The media engine rejected an offer or answer
    #[error("Media negotiation failed: {0}")]
    MediaNegotiation(#[from] MediaError),

    /// The server challenged a request that already carried credentials
    #[error("Authentication failed for {method}: credentials were challenged again")]
    AuthenticationExhausted { method: String },

    /// The server answered with a final failure response
    #[error("{method} rejected with {status} {reason}")]
    Rejected {
        method: String,
        status: u16,
        reason: String,
    },

    /// No final response arrived in time
    #[error("No final response to {method} within {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    /// `register()` has not connected the softphone yet
    #[error("Softphone is not connected")]
    NotConnected,

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl SoftphoneError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn exhausted(method: &str) -> Self {
        Self::AuthenticationExhausted {
            method: method.to_string(),
        }
    }
}
