use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine as RtcMediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use wsphone_client_core::{CallRole, MediaEngine, MediaResult};

use crate::media_error;
use crate::peer::WebRtcPeer;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Dynamic payload type advertised for Opus
pub const OPUS_PAYLOAD_TYPE: u8 = 111;

/// Peer connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN/TURN URLs; empty means host candidates only
    pub ice_servers: Vec<String>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

/// Creates one `RTCPeerConnection` per call
#[derive(Debug, Clone, Default)]
pub struct WebRtcEngine {
    config: WebRtcConfig,
}

impl WebRtcEngine {
    pub fn new(config: WebRtcConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebRtcConfig {
        &self.config
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

pub(crate) fn opus_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_owned(),
        clock_rate: 48000,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
        rtcp_feedback: vec![],
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    type Peer = WebRtcPeer;

    async fn new_peer(&self, role: CallRole) -> MediaResult<WebRtcPeer> {
        let mut media_engine = RtcMediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: opus_capability(),
                    payload_type: OPUS_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Audio,
            )
            .map_err(media_error("registering Opus"))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(media_error("registering interceptors"))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let connection = api
            .new_peer_connection(self.rtc_configuration())
            .await
            .map_err(media_error("creating peer connection"))?;
        debug!("Created {:?} peer connection", role);

        Ok(WebRtcPeer::new(Arc::new(connection), role))
    }
}
