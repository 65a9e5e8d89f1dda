//! Shared fixtures: a scripted SIP-over-WebSocket server, an in-memory media
//! engine and an event recorder.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use wsphone_client_core::{
    CallAction, CallRole, CallState, Identity, IncomingCallInfo, MediaEngine, MediaError,
    MediaPeer, MediaResult, RegistrationState, RemoteTrackCallback, SessionDescription, Softphone,
    SoftphoneConfig, SoftphoneEventHandler,
};
use wsphone_sip_core::SipMessage;

pub const WAIT: Duration = Duration::from_secs(5);

pub const FAKE_OFFER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\na=sendrecv\r\n";
pub const FAKE_ANSWER: &str = "v=0\r\no=- 2 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\na=sendrecv\r\n";

/// SDP as a PBX sends it, without mid or direction attributes
pub const PBX_SDP: &str = "v=0\r\no=- 7 7 IN IP4 10.0.0.9\r\ns=-\r\nc=IN IP4 10.0.0.9\r\nt=0 0\r\nm=audio 4000 RTP/AVP 111\r\na=rtpmap:111 opus/48000/2\r\n";

// ---------------------------------------------------------------------------
// SIP server

enum Outbound {
    Text(String),
    Close,
}

pub struct SipServer {
    pub port: u16,
    received: mpsc::UnboundedReceiver<SipMessage>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SipServer {
    /// Listen on a loopback port and accept a single WebSocket client
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = |_: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                resp.headers_mut()
                    .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("sip"));
                Ok(resp)
            };
            let ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();
            let (mut sink, mut source) = ws.split();

            tokio::spawn(async move {
                while let Some(command) = outbound_rx.recv().await {
                    match command {
                        Outbound::Text(text) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Outbound::Close => {
                            let _ = sink.close().await;
                            break;
                        }
                    }
                }
            });

            while let Some(Ok(frame)) = source.next().await {
                if let Message::Text(text) = frame {
                    let message = SipMessage::parse(&text).expect("client sent valid SIP");
                    if received_tx.send(message).is_err() {
                        break;
                    }
                }
            }
        });

        Self {
            port,
            received,
            outbound,
        }
    }

    /// Next message written by the client
    pub async fn recv(&mut self) -> SipMessage {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for the client")
            .expect("client connection ended")
    }

    /// Assert the client writes nothing for `period`
    pub async fn expect_silence(&mut self, period: Duration) {
        if let Ok(Some(message)) = tokio::time::timeout(period, self.received.recv()).await {
            panic!("unexpected message from client:\n{}", message);
        }
    }

    pub fn send(&self, message: &SipMessage) {
        self.send_text(message.to_wire());
    }

    pub fn send_text(&self, text: impl Into<String>) {
        self.outbound.send(Outbound::Text(text.into())).unwrap();
    }

    pub fn close(&self) {
        self.outbound.send(Outbound::Close).unwrap();
    }
}

/// Response to `request` carrying its transaction headers
pub fn reply(request: &SipMessage, code: u16, reason: &str) -> SipMessage {
    let mut response = SipMessage::response(code, reason);
    for name in ["Via", "From", "To", "Call-ID", "CSeq"] {
        if let Some(value) = request.header(name) {
            response.set_header(name, value);
        }
    }
    response
}

/// INVITE from extension 102 to the registered account
pub fn inbound_invite(call_id: &str) -> SipMessage {
    SipMessage::request("INVITE", "sip:101@local")
        .with_header("Via", "SIP/2.0/WS 10.0.0.9:5071;branch=z9hG4bKpbx1")
        .with_header("From", "\"Extension 102\" <sip:102@local>;tag=pbx-tag")
        .with_header("To", "<sip:101@local>")
        .with_header("Call-ID", call_id)
        .with_header("CSeq", "1 INVITE")
        .with_header("Contact", "<sip:102@10.0.0.9:5071;transport=ws>")
        .with_header("Content-Type", "application/sdp")
        .with_body(PBX_SDP)
}

// ---------------------------------------------------------------------------
// Media engine

#[derive(Default)]
struct PeerState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    gathering: Option<oneshot::Sender<()>>,
    on_track: Option<RemoteTrackCallback<String>>,
    tracks: usize,
    transceivers: usize,
}

pub struct FakePeer {
    pub role: CallRole,
    state: Mutex<PeerState>,
    reject_remote: Arc<AtomicBool>,
}

impl FakePeer {
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().remote.clone()
    }

    pub fn track_count(&self) -> usize {
        self.state.lock().unwrap().tracks
    }

    pub fn transceiver_count(&self) -> usize {
        self.state.lock().unwrap().transceivers
    }
}

#[async_trait]
impl MediaPeer for FakePeer {
    type RemoteTrack = String;
    type LocalTrack = String;

    async fn add_audio_track(&self) -> MediaResult<String> {
        self.state.lock().unwrap().tracks += 1;
        Ok("local-audio".to_string())
    }

    async fn add_audio_transceiver(&self) -> MediaResult<()> {
        self.state.lock().unwrap().transceivers += 1;
        Ok(())
    }

    async fn create_offer(&self) -> MediaResult<SessionDescription> {
        Ok(SessionDescription::offer(FAKE_OFFER))
    }

    async fn create_answer(&self) -> MediaResult<SessionDescription> {
        if self.state.lock().unwrap().remote.is_none() {
            return Err(MediaError::new("answer requested without a remote offer"));
        }
        Ok(SessionDescription::answer(FAKE_ANSWER))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> MediaResult<()> {
        let mut state = self.state.lock().unwrap();
        state.local = Some(desc);
        if let Some(done) = state.gathering.take() {
            let _ = done.send(());
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> MediaResult<()> {
        if self.reject_remote.load(Ordering::SeqCst) {
            return Err(MediaError::new("unsupported session description"));
        }
        let mut state = self.state.lock().unwrap();
        state.remote = Some(desc);
        if let Some(on_track) = &state.on_track {
            on_track("remote-audio".to_string());
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().local.clone()
    }

    async fn gathering_complete(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().gathering = Some(tx);
        rx
    }

    fn on_remote_track(&self, callback: RemoteTrackCallback<String>) {
        self.state.lock().unwrap().on_track = Some(callback);
    }
}

/// In-memory engine. Peers it creates reject every remote description while
/// [`FakeEngine::reject_remote`] is switched on.
#[derive(Default, Clone)]
pub struct FakeEngine {
    reject_remote: Arc<AtomicBool>,
}

impl FakeEngine {
    pub fn reject_remote(&self, reject: bool) {
        self.reject_remote.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    type Peer = FakePeer;

    async fn new_peer(&self, role: CallRole) -> MediaResult<FakePeer> {
        Ok(FakePeer {
            role,
            state: Mutex::new(PeerState::default()),
            reject_remote: Arc::clone(&self.reject_remote),
        })
    }
}

// ---------------------------------------------------------------------------
// Event recorder

#[derive(Debug)]
pub enum Event {
    Incoming(IncomingCallInfo),
    RemoteTrack(String, Option<String>),
    Registration(RegistrationState),
    Call(CallState),
}

pub struct RecordingHandler {
    action: CallAction,
    events: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl SoftphoneEventHandler<FakePeer> for RecordingHandler {
    async fn on_incoming_call(&self, call: IncomingCallInfo) -> CallAction {
        let _ = self.events.send(Event::Incoming(call));
        self.action
    }

    async fn on_remote_track(&self, remote: String, local: Option<String>) {
        let _ = self.events.send(Event::RemoteTrack(remote, local));
    }

    async fn on_registration_state_changed(&self, state: RegistrationState) {
        let _ = self.events.send(Event::Registration(state));
    }

    async fn on_call_state_changed(&self, state: CallState) {
        let _ = self.events.send(Event::Call(state));
    }
}

pub fn config(port: u16) -> SoftphoneConfig {
    SoftphoneConfig::new("101", "101", "local").with_server("127.0.0.1", port)
}

/// Softphone wired to a recorder answering inbound calls with `action`
pub fn new_phone(
    config: SoftphoneConfig,
    action: CallAction,
) -> (Softphone<FakeEngine>, mpsc::UnboundedReceiver<Event>) {
    new_phone_with_engine(config, action, FakeEngine::default())
}

/// Like [`new_phone`], keeping a handle on the engine
pub fn new_phone_with_engine(
    config: SoftphoneConfig,
    action: CallAction,
    engine: FakeEngine,
) -> (Softphone<FakeEngine>, mpsc::UnboundedReceiver<Event>) {
    let phone = Softphone::new(config, Arc::new(Identity::generate()), engine);
    let (events_tx, events) = mpsc::unbounded_channel();
    phone.set_event_handler(Arc::new(RecordingHandler {
        action,
        events: events_tx,
    }));
    (phone, events)
}

/// Run `register()` against `server`, accepting the first REGISTER
pub async fn register_without_challenge(phone: &Softphone<FakeEngine>, server: &mut SipServer) {
    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });
    let request = server.recv().await;
    assert!(request.is_request("REGISTER"));
    server.send(&reply(&request, 200, "OK"));
    task.await.unwrap().unwrap();
}

/// Skip events until one matches `predicate`
pub async fn wait_for_event<F>(events: &mut mpsc::UnboundedReceiver<Event>, predicate: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll until the softphone reports `state`
pub async fn wait_for_call_state(phone: &Softphone<FakeEngine>, state: CallState) {
    tokio::time::timeout(WAIT, async {
        while phone.call_state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("call state not reached");
}

/// Value of a quoted digest parameter
pub fn digest_param<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("{name}=\"");
    let start = header.find(&marker)? + marker.len();
    let end = header[start..].find('"')? + start;
    Some(&header[start..end])
}
