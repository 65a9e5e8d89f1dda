//! Media engine abstraction
//!
//! The softphone negotiates sessions but never touches RTP itself. Everything
//! media related goes through [`MediaEngine`], which creates one
//! [`MediaPeer`] per call. Any WebRTC-style stack with offer/answer and ICE
//! gathering can sit behind these traits.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::MediaResult;

/// Which side of the offer/answer exchange a peer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    /// Sends the offer in an outbound INVITE
    Caller,
    /// Answers an inbound INVITE
    Callee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A typed session description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Callback fired once per remote track
pub type RemoteTrackCallback<T> = Box<dyn Fn(T) + Send + Sync>;

/// One media session
#[async_trait]
pub trait MediaPeer: Send + Sync + 'static {
    /// Handle to an inbound track
    type RemoteTrack: Send + 'static;
    /// Handle to the locally sent track
    type LocalTrack: Clone + Send + Sync + 'static;

    /// Add an outgoing audio track (caller side)
    async fn add_audio_track(&self) -> MediaResult<Self::LocalTrack>;

    /// Add an audio transceiver with no local source (callee side)
    async fn add_audio_transceiver(&self) -> MediaResult<()>;

    async fn create_offer(&self) -> MediaResult<SessionDescription>;

    async fn create_answer(&self) -> MediaResult<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> MediaResult<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> MediaResult<()>;

    /// Current local description, including gathered candidates
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Signal that resolves when ICE gathering has finished.
    ///
    /// Must be obtained before `set_local_description` so completion is not
    /// missed.
    async fn gathering_complete(&self) -> oneshot::Receiver<()>;

    /// Install the handler for remote tracks
    fn on_remote_track(&self, callback: RemoteTrackCallback<Self::RemoteTrack>);
}

/// Factory of media peers
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    type Peer: MediaPeer;

    async fn new_peer(&self, role: CallRole) -> MediaResult<Self::Peer>;
}
