use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;
use wsphone_client_core::{
    CallRole, MediaPeer, MediaResult, RemoteTrackCallback, SdpKind, SessionDescription,
};

use crate::engine::opus_capability;
use crate::media_error;

/// Inbound audio of a call
pub type RemoteAudioTrack = Arc<TrackRemote>;

/// Outbound audio of a call; write Opus samples into it
pub type LocalAudioTrack = Arc<TrackLocalStaticSample>;

/// A call's `RTCPeerConnection`
pub struct WebRtcPeer {
    connection: Arc<RTCPeerConnection>,
    role: CallRole,
}

impl WebRtcPeer {
    pub(crate) fn new(connection: Arc<RTCPeerConnection>, role: CallRole) -> Self {
        let peer = Self { connection, role };
        peer.log_state_changes();
        peer
    }

    pub fn connection(&self) -> &Arc<RTCPeerConnection> {
        &self.connection
    }

    pub fn role(&self) -> CallRole {
        self.role
    }

    pub async fn close(&self) -> MediaResult<()> {
        self.connection
            .close()
            .await
            .map_err(media_error("closing peer connection"))
    }

    fn log_state_changes(&self) {
        let role = self.role;
        self.connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                info!("{:?} ICE connection state: {}", role, state);
                Box::pin(async {})
            }));
        self.connection
            .on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
                debug!("{:?} ICE gathering state: {}", role, state);
                Box::pin(async {})
            }));
        self.connection
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                info!("{:?} peer connection state: {}", role, state);
                Box::pin(async {})
            }));
        self.connection
            .on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
                debug!("{:?} signaling state: {}", role, state);
                Box::pin(async {})
            }));
    }
}

fn to_rtc(desc: SessionDescription) -> MediaResult<RTCSessionDescription> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
    }
    .map_err(media_error("parsing session description"))
}

fn from_rtc(desc: RTCSessionDescription) -> SessionDescription {
    match desc.sdp_type {
        RTCSdpType::Offer => SessionDescription::offer(desc.sdp),
        _ => SessionDescription::answer(desc.sdp),
    }
}

#[async_trait]
impl MediaPeer for WebRtcPeer {
    type RemoteTrack = RemoteAudioTrack;
    type LocalTrack = LocalAudioTrack;

    async fn add_audio_track(&self) -> MediaResult<LocalAudioTrack> {
        let track = Arc::new(TrackLocalStaticSample::new(
            opus_capability(),
            "audio".to_owned(),
            "wsphone".to_owned(),
        ));
        let sender = self
            .connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(media_error("adding audio track"))?;

        // Incoming RTCP has to be read for the interceptors to process it.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(track)
    }

    async fn add_audio_transceiver(&self) -> MediaResult<()> {
        self.connection
            .add_transceiver_from_kind(RTPCodecType::Audio, None)
            .await
            .map_err(media_error("adding audio transceiver"))?;
        Ok(())
    }

    async fn create_offer(&self) -> MediaResult<SessionDescription> {
        let offer = self
            .connection
            .create_offer(None)
            .await
            .map_err(media_error("creating offer"))?;
        Ok(from_rtc(offer))
    }

    async fn create_answer(&self) -> MediaResult<SessionDescription> {
        let answer = self
            .connection
            .create_answer(None)
            .await
            .map_err(media_error("creating answer"))?;
        Ok(from_rtc(answer))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> MediaResult<()> {
        self.connection
            .set_local_description(to_rtc(desc)?)
            .await
            .map_err(media_error("applying local description"))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> MediaResult<()> {
        self.connection
            .set_remote_description(to_rtc(desc)?)
            .await
            .map_err(media_error("applying remote description"))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.connection.local_description().await.map(from_rtc)
    }

    async fn gathering_complete(&self) -> oneshot::Receiver<()> {
        let mut gathered = self.connection.gathering_complete_promise().await;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = gathered.recv().await;
            let _ = tx.send(());
        });
        rx
    }

    fn on_remote_track(&self, callback: RemoteTrackCallback<RemoteAudioTrack>) {
        let role = self.role;
        self.connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                info!(
                    "{:?} received remote {} track, ssrc {}",
                    role,
                    track.kind(),
                    track.ssrc()
                );
                callback(track);
                Box::pin(async {})
            },
        ));
    }
}
