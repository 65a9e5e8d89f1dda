//! # wsphone-sip-core
//!
//! Text-level building blocks for the wsphone signaling engine:
//!
//! - [`message`] - the [`SipMessage`] start-line/headers/body model and its
//!   wire serialization
//! - [`cseq`] - CSeq parsing and sequence arithmetic
//! - [`auth`] - Digest challenge parsing and credential computation
//! - [`sdp`] - the compatibility patch applied to remote session descriptions
//!
//! Nothing in this crate performs I/O.

pub mod auth;
pub mod cseq;
pub mod error;
pub mod message;
pub mod sdp;

pub use auth::{ChallengeKind, DigestChallenge, DigestCredentials};
pub use cseq::CSeq;
pub use error::{Error, Result};
pub use message::{SipMessage, SIP_VERSION, USER_AGENT};
pub use sdp::patch_sdp;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        patch_sdp, CSeq, ChallengeKind, DigestChallenge, DigestCredentials, Error, Result,
        SipMessage,
    };
}
