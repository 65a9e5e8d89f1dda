//! # wsphone-media-webrtc
//!
//! [`MediaEngine`](wsphone_client_core::MediaEngine) implementation on top of
//! the `webrtc` crate. Every call gets its own `RTCPeerConnection` with Opus
//! audio and the default interceptor chain (NACK, RTCP reports, TWCC).

mod engine;
mod peer;
pub mod progress;

pub use engine::{WebRtcConfig, WebRtcEngine, DEFAULT_STUN_SERVER, OPUS_PAYLOAD_TYPE};
pub use peer::{LocalAudioTrack, RemoteAudioTrack, WebRtcPeer};
pub use progress::{drain_remote_track, RtpProgress};

use wsphone_client_core::MediaError;

/// Wrap a webrtc failure with what was being attempted
pub(crate) fn media_error(context: &'static str) -> impl FnOnce(webrtc::Error) -> MediaError {
    move |e| MediaError::new(format!("{context}: {e}"))
}
