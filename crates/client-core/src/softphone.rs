//! The softphone orchestrator
//!
//! A [`Softphone`] owns one WebSocket connection to its SIP server, one
//! account and at most one call. The public operations are
//! [`register`](Softphone::register), [`invite`](Softphone::invite) and
//! [`answer`](Softphone::answer); each is implemented in its own module. This
//! module holds the shared state and the header builders they use.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;
use wsphone_sip_core::{DigestCredentials, SipMessage};
use wsphone_sip_transport::WebSocketTransport;

use crate::config::SoftphoneConfig;
use crate::error::{SoftphoneError, SoftphoneResult};
use crate::events::{CallState, RegistrationState, SoftphoneEventHandler};
use crate::identity::Identity;
use crate::media::{MediaEngine, MediaPeer};

/// Methods advertised in the Allow header of 200 OK answers
pub const ALLOWED_METHODS: &str =
    "ACK,BYE,CANCEL,INFO,INVITE,MESSAGE,NOTIFY,OPTIONS,PRACK,REFER,REGISTER,SUBSCRIBE";

/// First CSeq number of the REGISTER transaction
pub const REGISTER_BASE_SEQ: u32 = 8082;

/// First CSeq number of an outbound INVITE
pub const INVITE_BASE_SEQ: u32 = 8083;

pub(crate) type DynEventHandler<E> =
    Arc<dyn SoftphoneEventHandler<<E as MediaEngine>::Peer>>;

/// Dialog identifiers chosen when registration starts
#[derive(Debug, Clone)]
pub(crate) struct DialogIds {
    pub(crate) from_tag: String,
    pub(crate) call_id: String,
}

/// A SIP softphone over WebSocket
///
/// Cloning is cheap; clones drive the same softphone.
pub struct Softphone<E: MediaEngine> {
    pub(crate) inner: Arc<SoftphoneInner<E>>,
}

pub(crate) struct SoftphoneInner<E: MediaEngine> {
    pub(crate) config: SoftphoneConfig,
    pub(crate) identity: Arc<Identity>,
    pub(crate) media: E,
    pub(crate) credentials: DigestCredentials,
    pub(crate) handler: RwLock<Option<DynEventHandler<E>>>,
    pub(crate) transport: OnceLock<WebSocketTransport>,
    pub(crate) dialog: OnceLock<DialogIds>,
    pub(crate) last_authorization: RwLock<Option<String>>,
    pub(crate) registration_state: RwLock<RegistrationState>,
    pub(crate) call_state: RwLock<CallState>,
    /// Set once a call has been answered or placed
    pub(crate) call_taken: AtomicBool,
    /// Media session of the current call, kept alive for its duration
    pub(crate) active_peer: Mutex<Option<Arc<E::Peer>>>,
}

impl<E: MediaEngine> Clone for Softphone<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: MediaEngine> fmt::Debug for Softphone<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Softphone")
            .field("username", &self.inner.config.username)
            .field("server", &self.inner.config.server_url())
            .field("registration", &self.registration_state())
            .field("call", &self.call_state())
            .finish()
    }
}

impl<E: MediaEngine> Softphone<E> {
    /// Create a softphone. Nothing is sent until [`register`](Self::register).
    pub fn new(config: SoftphoneConfig, identity: Arc<Identity>, media: E) -> Self {
        let credentials = DigestCredentials::new(&config.username, &config.password);
        Self {
            inner: Arc::new(SoftphoneInner {
                config,
                identity,
                media,
                credentials,
                handler: RwLock::new(None),
                transport: OnceLock::new(),
                dialog: OnceLock::new(),
                last_authorization: RwLock::new(None),
                registration_state: RwLock::new(RegistrationState::Unregistered),
                call_state: RwLock::new(CallState::Idle),
                call_taken: AtomicBool::new(false),
                active_peer: Mutex::new(None),
            }),
        }
    }

    /// Install the application callbacks. Replaces any previous handler.
    pub fn set_event_handler(&self, handler: Arc<dyn SoftphoneEventHandler<E::Peer>>) {
        *self.inner.handler.write() = Some(handler);
    }

    pub fn config(&self) -> &SoftphoneConfig {
        &self.inner.config
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn registration_state(&self) -> RegistrationState {
        *self.inner.registration_state.read()
    }

    pub fn call_state(&self) -> CallState {
        *self.inner.call_state.read()
    }

    /// Most recently computed credentials header value
    pub fn last_authorization(&self) -> Option<String> {
        self.inner.last_authorization.read().clone()
    }

    /// Local tag of the From header, fixed once registration starts
    pub fn from_tag(&self) -> Option<&str> {
        self.inner.dialog.get().map(|ids| ids.from_tag.as_str())
    }

    /// Call-ID shared by REGISTER and INVITE, fixed once registration starts
    pub fn call_id(&self) -> Option<&str> {
        self.inner.dialog.get().map(|ids| ids.call_id.as_str())
    }

    /// Media session of the current call, if one is established
    pub fn active_peer(&self) -> Option<Arc<E::Peer>> {
        self.inner.active_peer.lock().clone()
    }

    /// True while the connection to the server is open
    pub fn is_connected(&self) -> bool {
        self.inner
            .transport
            .get()
            .map(|transport| !transport.is_closed())
            .unwrap_or(false)
    }

    /// Close the WebSocket connection
    pub async fn close(&self) -> SoftphoneResult<()> {
        let transport = self.transport()?;
        transport.close().await?;
        info!("Softphone {} closed its connection", self.inner.config.username);
        Ok(())
    }

    pub(crate) fn transport(&self) -> SoftphoneResult<&WebSocketTransport> {
        self.inner.transport.get().ok_or(SoftphoneError::NotConnected)
    }

    pub(crate) fn dialog(&self) -> SoftphoneResult<&DialogIds> {
        self.inner.dialog.get().ok_or(SoftphoneError::NotConnected)
    }

    pub(crate) fn event_handler(&self) -> Option<DynEventHandler<E>> {
        self.inner.handler.read().clone()
    }

    pub(crate) async fn set_registration_state(&self, state: RegistrationState) {
        let previous = std::mem::replace(&mut *self.inner.registration_state.write(), state);
        if previous == state {
            return;
        }
        debug!(
            "Registration of {}: {:?} -> {:?}",
            self.inner.config.username, previous, state
        );
        let handler = self.event_handler();
        if let Some(handler) = handler {
            handler.on_registration_state_changed(state).await;
        }
    }

    pub(crate) async fn set_call_state(&self, state: CallState) {
        let previous = std::mem::replace(&mut *self.inner.call_state.write(), state);
        if previous == state {
            return;
        }
        debug!(
            "Call of {}: {:?} -> {:?}",
            self.inner.config.username, previous, state
        );
        let handler = self.event_handler();
        if let Some(handler) = handler {
            handler.on_call_state_changed(state).await;
        }
    }

    /// Move to `state` only while the call is still in `from`
    pub(crate) async fn advance_call_state(&self, from: CallState, state: CallState) {
        {
            let mut current = self.inner.call_state.write();
            if *current != from {
                return;
            }
            *current = state;
        }
        debug!(
            "Call of {}: {:?} -> {:?}",
            self.inner.config.username, from, state
        );
        let handler = self.event_handler();
        if let Some(handler) = handler {
            handler.on_call_state_changed(state).await;
        }
    }

    pub(crate) fn remember_authorization(&self, value: &str) {
        *self.inner.last_authorization.write() = Some(value.to_string());
    }

    /// Route remote tracks of `peer` to the event handler
    pub(crate) fn bind_remote_tracks(
        &self,
        peer: &E::Peer,
        local: Option<<E::Peer as MediaPeer>::LocalTrack>,
    ) {
        let handler = self.event_handler();
        let username = self.inner.config.username.clone();
        peer.on_remote_track(Box::new(move |remote| {
            let Some(handler) = handler.clone() else {
                debug!("Softphone {} has no handler for its remote track", username);
                return;
            };
            let local = local.clone();
            tokio::spawn(async move {
                handler.on_remote_track(remote, local).await;
            });
        }));
    }

    // Header builders

    pub(crate) fn via(&self) -> String {
        format!(
            "SIP/2.0/{} {};branch={}",
            self.inner.config.transport.via_token(),
            self.inner.identity.domain(),
            new_branch()
        )
    }

    pub(crate) fn contact(&self, expires: u32) -> String {
        format!(
            "<sip:{};transport={}>;expires={}",
            self.inner.identity.address(),
            self.inner.config.transport.as_str(),
            expires
        )
    }

    /// `<sip:user@domain>;tag=<from tag>`
    pub(crate) fn from_header(&self, ids: &DialogIds) -> String {
        format!(
            "<{}>;tag={}",
            self.inner.config.user_uri(&self.inner.config.username),
            ids.from_tag
        )
    }

    pub(crate) fn address_of(&self, user: &str) -> String {
        format!("<{}>", self.inner.config.user_uri(user))
    }

    /// Attach credentials answering `challenge` to `request` and bump its CSeq
    pub(crate) fn authenticate(
        &self,
        request: &SipMessage,
        response: &SipMessage,
    ) -> SoftphoneResult<SipMessage> {
        let code = response.status_code().unwrap_or_default();
        let kind = wsphone_sip_core::ChallengeKind::from_status(code).ok_or_else(|| {
            SoftphoneError::invalid_state(format!("{code} is not an authentication challenge"))
        })?;
        let challenge = wsphone_sip_core::DigestChallenge::from_response(response, kind)?;
        let method = request.method().unwrap_or_default().to_string();
        let uri = request.request_uri().unwrap_or_default().to_string();

        let value = self.inner.credentials.authorize(&challenge, &method, &uri);
        self.remember_authorization(&value);

        let mut retry = request.clone();
        retry.set_header(kind.credentials_header(), value);
        retry.set_header("Via", self.via());
        retry.increase_seq()?;
        Ok(retry)
    }

    pub(crate) fn release_call(&self) {
        self.inner.call_taken.store(false, Ordering::Release);
    }
}

/// Fresh RFC 3261 branch parameter
pub(crate) fn new_branch() -> String {
    format!("z9hG4bK{}", Uuid::new_v4())
}

/// Fresh tag parameter
pub(crate) fn new_tag() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The URI inside a name-addr, or the value itself
pub(crate) fn uri_of(value: &str) -> &str {
    match (value.find('<'), value.find('>')) {
        (Some(start), Some(end)) if start < end => &value[start + 1..end],
        _ => value.split(';').next().unwrap_or_default().trim(),
    }
}
