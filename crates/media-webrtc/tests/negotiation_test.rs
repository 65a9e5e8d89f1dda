//! Offer/answer between two local peer connections

use wsphone_client_core::{CallRole, MediaEngine, MediaPeer, SdpKind};
use wsphone_media_webrtc::{WebRtcConfig, WebRtcEngine};

fn host_only_engine() -> WebRtcEngine {
    WebRtcEngine::new(WebRtcConfig {
        ice_servers: Vec::new(),
    })
}

#[tokio::test]
async fn caller_offer_carries_opus_audio() {
    let engine = host_only_engine();
    let caller = engine.new_peer(CallRole::Caller).await.unwrap();
    caller.add_audio_track().await.unwrap();

    let offer = caller.create_offer().await.unwrap();
    assert_eq!(offer.kind, SdpKind::Offer);
    assert!(offer.sdp.contains("m=audio"));
    assert!(offer.sdp.contains("opus/48000"));
    assert!(offer.sdp.contains("a=sendrecv"));

    caller.close().await.unwrap();
}

#[tokio::test]
async fn callee_answers_caller_offer() {
    let engine = host_only_engine();
    let caller = engine.new_peer(CallRole::Caller).await.unwrap();
    caller.add_audio_track().await.unwrap();
    let offer = caller.create_offer().await.unwrap();

    let callee = engine.new_peer(CallRole::Callee).await.unwrap();
    callee.add_audio_transceiver().await.unwrap();
    callee.set_remote_description(offer).await.unwrap();

    let answer = callee.create_answer().await.unwrap();
    assert_eq!(answer.kind, SdpKind::Answer);
    assert!(answer.sdp.contains("m=audio"));
    assert!(answer.sdp.contains("opus/48000"));
    assert_eq!(callee.role(), CallRole::Callee);

    caller.close().await.unwrap();
    callee.close().await.unwrap();
}

#[tokio::test]
async fn garbage_remote_description_is_rejected() {
    let engine = host_only_engine();
    let callee = engine.new_peer(CallRole::Callee).await.unwrap();
    let err = callee
        .set_remote_description(wsphone_client_core::SessionDescription::offer("not sdp"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("session description"));
}
