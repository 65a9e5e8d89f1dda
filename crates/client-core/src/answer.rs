//! Inbound calls

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use wsphone_sip_core::{patch_sdp, SipMessage};
use wsphone_sip_transport::WebSocketTransport;

use crate::config::INVITE_EXPIRES;
use crate::error::{MediaError, MediaResult, SoftphoneResult};
use crate::events::{CallAction, CallState, IncomingCallInfo};
use crate::media::{CallRole, MediaEngine, MediaPeer, SessionDescription};
use crate::softphone::{new_tag, Softphone, ALLOWED_METHODS};

/// Headers a response echoes from the request it answers
const ECHOED_HEADERS: [&str; 4] = ["Via", "From", "CSeq", "Call-ID"];

impl<E: MediaEngine> Softphone<E> {
    /// Answer an inbound INVITE.
    ///
    /// Sends 100 Trying and 180 Ringing, negotiates media from the offer in
    /// the request body and sends 200 OK with the local answer once ICE
    /// gathering is complete. An offer the media engine cannot accept is
    /// declined with 488 Not Acceptable Here.
    pub async fn answer(&self, invite: SipMessage) -> SoftphoneResult<()> {
        let call_id = invite.header("Call-ID").unwrap_or_default().to_string();
        match self.answer_call(&invite).await {
            Ok(peer) => {
                *self.inner.active_peer.lock() = Some(peer);
                self.set_call_state(CallState::Connected).await;
                info!("{} answered call {}", self.inner.config.username, call_id);
                Ok(())
            }
            Err(e) => {
                error!("{} failed to answer call {}: {}", self.inner.config.username, call_id, e);
                self.release_call();
                self.set_call_state(CallState::Failed).await;
                Err(e)
            }
        }
    }

    async fn answer_call(&self, invite: &SipMessage) -> SoftphoneResult<Arc<E::Peer>> {
        let transport = self.transport()?;
        let to = format!("{};tag={}", invite.require_header("To")?, new_tag());

        let trying = echo_response(invite, 100, "Trying")
            .with_header("To", invite.require_header("To")?)
            .with_header("Supported", "outbound");
        transport.send(&trying, None).await?;

        let ringing = echo_response(invite, 180, "Ringing")
            .with_header("Contact", self.contact(INVITE_EXPIRES))
            .with_header("To", to.as_str())
            .with_header("Supported", "outbound");
        transport.send(&ringing, None).await?;
        self.set_call_state(CallState::Ringing).await;

        let (peer, answer) = match self.negotiate_answer(invite).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                let declined = echo_response(invite, 488, "Not Acceptable Here")
                    .with_header("To", to.as_str());
                if let Err(send_error) = transport.send(&declined, None).await {
                    warn!("Could not decline call: {}", send_error);
                }
                return Err(e.into());
            }
        };

        let ok = echo_response(invite, 200, "OK")
            .with_header("Contact", self.contact(INVITE_EXPIRES))
            .with_header("Content-Type", "application/sdp")
            .with_header("To", to.as_str())
            .with_header("Allow", ALLOWED_METHODS)
            .with_body(answer.sdp);
        transport.send(&ok, None).await?;
        Ok(peer)
    }

    /// Callee-side offer/answer, returning the peer and its gathered answer
    async fn negotiate_answer(
        &self,
        invite: &SipMessage,
    ) -> MediaResult<(Arc<E::Peer>, SessionDescription)> {
        let peer = Arc::new(self.inner.media.new_peer(CallRole::Callee).await?);
        self.bind_remote_tracks(&peer, None);
        peer.add_audio_transceiver().await?;
        peer.set_remote_description(SessionDescription::offer(patch_sdp(&invite.body)))
            .await?;

        let answer = peer.create_answer().await?;
        let gathered = peer.gathering_complete().await;
        peer.set_local_description(answer).await?;
        if gathered.await.is_err() {
            warn!("ICE gathering signal dropped, answering with the current description");
        }
        let answer = peer
            .local_description()
            .await
            .ok_or_else(|| MediaError::new("no local description after gathering"))?;
        Ok((peer, answer))
    }

    /// Feed every inbound INVITE on `transport` to the event handler
    pub(crate) fn listen_for_invites(&self, transport: &WebSocketTransport) {
        let phone = self.clone();
        transport.listen(move |text| {
            let phone = phone.clone();
            async move { phone.on_inbound_message(&text).await }
        });
    }

    async fn on_inbound_message(&self, text: &str) {
        let request = match SipMessage::parse(text) {
            Ok(message) if message.is_request("INVITE") => message,
            Ok(_) => return,
            Err(e) => {
                debug!("Dropping malformed inbound message: {}", e);
                return;
            }
        };

        let info = IncomingCallInfo::from_invite(&request);
        info!("Incoming call {} from {}", info.call_id, info.caller_uri);
        let handler = self.event_handler();
        let action = match handler {
            Some(handler) => handler.on_incoming_call(info).await,
            None => CallAction::Accept,
        };

        match action {
            CallAction::Accept => {
                if self.inner.call_taken.swap(true, Ordering::AcqRel) {
                    info!(
                        "Ignoring INVITE {}: a call is already in progress",
                        request.header("Call-ID").unwrap_or_default()
                    );
                    return;
                }
                let _ = self.answer(request).await;
            }
            CallAction::Reject => self.reject(&request).await,
            CallAction::Ignore => debug!("Incoming call ignored by handler"),
        }
    }

    async fn reject(&self, invite: &SipMessage) {
        let Ok(transport) = self.transport() else {
            return;
        };
        let to = format!("{};tag={}", invite.header("To").unwrap_or_default(), new_tag());
        let busy = echo_response(invite, 486, "Busy Here").with_header("To", to);
        if let Err(e) = transport.send(&busy, None).await {
            warn!("Could not reject call: {}", e);
        }
    }
}

/// Response skeleton copying Via, From, CSeq and Call-ID from `request`
fn echo_response(request: &SipMessage, code: u16, reason: &str) -> SipMessage {
    let mut response = SipMessage::response(code, reason);
    for name in ECHOED_HEADERS {
        if let Some(value) = request.header(name) {
            response.set_header(name, value);
        }
    }
    response
}
