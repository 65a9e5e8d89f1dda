//! # wsphone-client-core
//!
//! Call-flow orchestration for a SIP softphone that signals over a single
//! WebSocket connection.
//!
//! A [`Softphone`] registers an account with digest authentication, places
//! outbound calls with [`invite`](Softphone::invite) and answers the first
//! inbound INVITE it accepts. Media is negotiated through the
//! [`MediaEngine`] and [`MediaPeer`] traits, so the crate itself carries no
//! RTP stack.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsphone_client_core::{Identity, MediaEngine, Softphone, SoftphoneConfig};
//!
//! async fn run<E: MediaEngine>(engine: E) -> wsphone_client_core::SoftphoneResult<()> {
//!     let identity = Arc::new(Identity::generate());
//!     let phone = Softphone::new(SoftphoneConfig::default(), identity, engine);
//!     phone.register().await?;
//!     phone.invite("102").await
//! }
//! ```

mod answer;
pub mod config;
pub mod error;
pub mod events;
mod flow;
pub mod identity;
mod invite;
pub mod media;
mod register;
pub mod softphone;

pub use config::SoftphoneConfig;
pub use error::{MediaError, MediaResult, SoftphoneError, SoftphoneResult};
pub use events::{CallAction, CallState, IncomingCallInfo, RegistrationState, SoftphoneEventHandler};
pub use identity::Identity;
pub use media::{CallRole, MediaEngine, MediaPeer, RemoteTrackCallback, SdpKind, SessionDescription};
pub use softphone::Softphone;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        CallAction, CallRole, CallState, Identity, IncomingCallInfo, MediaEngine, MediaError,
        MediaPeer, MediaResult, RegistrationState, SessionDescription, Softphone,
        SoftphoneConfig, SoftphoneError, SoftphoneEventHandler, SoftphoneResult,
    };
}
