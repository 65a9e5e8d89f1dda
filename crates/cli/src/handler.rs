use async_trait::async_trait;
use tracing::info;
use wsphone_client_core::{
    CallAction, CallState, IncomingCallInfo, RegistrationState, SoftphoneEventHandler,
};
use wsphone_media_webrtc::{drain_remote_track, LocalAudioTrack, RemoteAudioTrack, WebRtcPeer};

/// Logs softphone events and keeps remote audio flowing
pub struct ConsoleHandler {
    instance: usize,
    progress: bool,
}

impl ConsoleHandler {
    pub fn new(instance: usize, progress: bool) -> Self {
        Self { instance, progress }
    }
}

#[async_trait]
impl SoftphoneEventHandler<WebRtcPeer> for ConsoleHandler {
    async fn on_incoming_call(&self, call: IncomingCallInfo) -> CallAction {
        info!(
            "[{}] Incoming call {} from {}",
            self.instance, call.call_id, call.caller_uri
        );
        CallAction::Accept
    }

    async fn on_remote_track(&self, remote: RemoteAudioTrack, local: Option<LocalAudioTrack>) {
        info!(
            "[{}] Remote track ssrc {}, sending audio: {}",
            self.instance,
            remote.ssrc(),
            local.is_some()
        );
        let instance = self.instance;
        let progress = self.progress;
        tokio::spawn(async move {
            let totals = drain_remote_track(remote, progress).await;
            info!("[{}] Track finished: {}", instance, totals);
        });
    }

    async fn on_registration_state_changed(&self, state: RegistrationState) {
        info!("[{}] Registration: {:?}", self.instance, state);
    }

    async fn on_call_state_changed(&self, state: CallState) {
        info!("[{}] Call: {:?}", self.instance, state);
    }
}
