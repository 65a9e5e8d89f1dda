//! Outbound calls

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};
use wsphone_sip_core::{patch_sdp, CSeq, SipMessage};
use wsphone_sip_transport::{handler, ResponseHandler};

use crate::config::INVITE_EXPIRES;
use crate::error::{MediaError, SoftphoneError, SoftphoneResult};
use crate::events::CallState;
use crate::flow::Flow;
use crate::media::{CallRole, MediaEngine, MediaPeer, SessionDescription};
use crate::softphone::{uri_of, DialogIds, Softphone, INVITE_BASE_SEQ};

/// State shared by the correlators of one outbound call
struct InviteTransaction<P> {
    peer: Arc<P>,
    challenged: AtomicBool,
}

impl<E: MediaEngine> Softphone<E> {
    /// Call `extension` in the account domain.
    ///
    /// Builds a local offer with one audio track, waits for ICE gathering to
    /// finish and sends it in an INVITE. One 401/407 challenge is answered
    /// with credentials in a fresh transaction. On 2xx the remote answer is
    /// applied and an ACK is sent.
    pub async fn invite(&self, extension: &str) -> SoftphoneResult<()> {
        let transport = self.transport()?.clone();
        let ids = self.dialog()?.clone();

        if self.inner.call_taken.swap(true, Ordering::AcqRel) {
            return Err(SoftphoneError::invalid_state("a call is already in progress"));
        }
        self.set_call_state(CallState::Calling).await;
        info!("{} calling {}", self.inner.config.username, extension);

        let (flow, waiter) = Flow::new("INVITE");
        let sent = self.send_invite(extension, &ids, flow).await;

        let outcome = match sent {
            Ok(()) => {
                waiter
                    .wait(&transport, self.inner.config.response_timeout())
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(peer) => {
                *self.inner.active_peer.lock() = Some(peer);
                self.set_call_state(CallState::Connected).await;
                info!("{} connected to {}", self.inner.config.username, extension);
                Ok(())
            }
            Err(e) => {
                error!("Call from {} to {} failed: {}", self.inner.config.username, extension, e);
                self.release_call();
                self.set_call_state(CallState::Failed).await;
                Err(e)
            }
        }
    }

    async fn send_invite(
        &self,
        extension: &str,
        ids: &DialogIds,
        flow: Arc<Flow<Arc<E::Peer>>>,
    ) -> SoftphoneResult<()> {
        let peer = Arc::new(self.inner.media.new_peer(CallRole::Caller).await?);
        let local_track = peer.add_audio_track().await?;
        self.bind_remote_tracks(&peer, Some(local_track));

        let offer = peer.create_offer().await?;
        let gathered = peer.gathering_complete().await;
        peer.set_local_description(offer).await?;
        if gathered.await.is_err() {
            warn!("ICE gathering signal dropped, sending the offer as it is");
        }
        let offer = peer
            .local_description()
            .await
            .ok_or_else(|| MediaError::new("no local description after gathering"))?;

        let request = self.invite_request(extension, ids, offer.sdp);
        let transaction = Arc::new(InviteTransaction {
            peer,
            challenged: AtomicBool::new(false),
        });
        let correlator = self.invite_correlator(Arc::clone(&flow), transaction, request.clone());
        let key = self.transport()?.send(&request, Some(correlator)).await?;
        flow.track(key);
        Ok(())
    }

    fn invite_request(&self, extension: &str, ids: &DialogIds, sdp: String) -> SipMessage {
        let config = &self.inner.config;
        SipMessage::request("INVITE", &config.user_uri(extension))
            .with_header("Call-ID", ids.call_id.as_str())
            .with_header("Contact", self.contact(INVITE_EXPIRES))
            .with_header("Content-Type", "application/sdp")
            .with_header("CSeq", CSeq::new(INVITE_BASE_SEQ, "INVITE").to_string())
            .with_header("From", self.from_header(ids))
            .with_header("Max-Forwards", "70")
            .with_header("Supported", "replaces, outbound,ice")
            .with_header("To", self.address_of(extension))
            .with_header("Via", self.via())
            .with_body(sdp)
    }

    fn invite_correlator(
        &self,
        flow: Arc<Flow<Arc<E::Peer>>>,
        transaction: Arc<InviteTransaction<E::Peer>>,
        request: SipMessage,
    ) -> ResponseHandler {
        let phone = self.clone();
        let request = Arc::new(request);
        handler(move |text| {
            let phone = phone.clone();
            let flow = Arc::clone(&flow);
            let transaction = Arc::clone(&transaction);
            let request = Arc::clone(&request);
            async move {
                phone
                    .on_invite_response(flow, transaction, &request, &text)
                    .await
            }
        })
    }

    /// Correlator body for one INVITE transaction
    async fn on_invite_response(
        &self,
        flow: Arc<Flow<Arc<E::Peer>>>,
        transaction: Arc<InviteTransaction<E::Peer>>,
        request: &SipMessage,
        text: &str,
    ) -> bool {
        let response = match SipMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                trace!("Ignoring unparsable message: {}", e);
                return false;
            }
        };
        if !response.is_response() || response.cseq_method().as_deref() != Some("INVITE") {
            return false;
        }
        // A retried INVITE runs under its own correlator; only look at the
        // responses of this one.
        if response.cseq().ok().map(|c| c.seq) != request.cseq().ok().map(|c| c.seq) {
            return false;
        }
        let Some(code) = response.status_code() else {
            return false;
        };

        match code {
            180 | 183 => {
                self.advance_call_state(CallState::Calling, CallState::Ringing)
                    .await;
                false
            }
            100..=199 => false,
            200..=299 => {
                let outcome = self
                    .complete_invite(&transaction.peer, &response)
                    .await
                    .map(|()| Arc::clone(&transaction.peer));
                flow.complete(outcome);
                true
            }
            401 | 407 => {
                self.acknowledge_failure(request, &response).await;
                if transaction.challenged.swap(true, Ordering::AcqRel) {
                    warn!("Authenticated INVITE was challenged again");
                    flow.complete(Err(SoftphoneError::exhausted("INVITE")));
                    return true;
                }

                let retry = match self.authenticate(request, &response) {
                    Ok(retry) => retry,
                    Err(e) => {
                        flow.complete(Err(e));
                        return true;
                    }
                };
                debug!("Answering {} challenge to INVITE", code);

                let correlator =
                    self.invite_correlator(Arc::clone(&flow), transaction, retry.clone());
                let sent = match self.transport() {
                    Ok(transport) => transport.send(&retry, Some(correlator)).await.map_err(Into::into),
                    Err(e) => Err(e),
                };
                match sent {
                    Ok(key) => flow.track(key),
                    Err(e) => {
                        flow.complete(Err(e));
                    }
                }
                true
            }
            _ => {
                self.acknowledge_failure(request, &response).await;
                flow.complete(Err(SoftphoneError::Rejected {
                    method: "INVITE".to_string(),
                    status: code,
                    reason: response.reason_phrase().to_string(),
                }));
                true
            }
        }
    }

    /// Apply the remote answer and send the ACK.
    ///
    /// The 2xx is acknowledged even when the answer is unusable; the dialog
    /// is then ended with a BYE.
    async fn complete_invite(&self, peer: &E::Peer, response: &SipMessage) -> SoftphoneResult<()> {
        let answer = SessionDescription::answer(patch_sdp(&response.body));
        let applied = peer.set_remote_description(answer).await;

        let ids = self.dialog()?;
        let config = &self.inner.config;
        let target = response
            .header("Contact")
            .map(|contact| uri_of(contact).to_string())
            .unwrap_or_else(|| config.user_uri(&config.username));
        let cseq = response.cseq()?;
        let from = response.require_header("From")?;
        let to = response.require_header("To")?;

        let ack = SipMessage::request("ACK", &target)
            .with_header("Call-ID", ids.call_id.as_str())
            .with_header("Contact", self.contact(INVITE_EXPIRES))
            .with_header("CSeq", cseq.with_method("ACK").to_string())
            .with_header("From", from)
            .with_header("Max-Forwards", "70")
            .with_header("To", to)
            .with_header("Via", self.via());
        self.transport()?.send(&ack, None).await?;

        if let Err(e) = applied {
            warn!("Remote answer rejected, ending the call: {}", e);
            let bye = SipMessage::request("BYE", &target)
                .with_header("Call-ID", ids.call_id.as_str())
                .with_header("CSeq", CSeq::new(cseq.seq + 1, "BYE").to_string())
                .with_header("From", from)
                .with_header("Max-Forwards", "70")
                .with_header("To", to)
                .with_header("Via", self.via());
            if let Err(send_error) = self.transport()?.send(&bye, None).await {
                debug!("Could not send BYE: {}", send_error);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// ACK a non-2xx final response within its INVITE transaction
    async fn acknowledge_failure(&self, request: &SipMessage, response: &SipMessage) {
        let (Some(uri), Ok(cseq)) = (request.request_uri(), request.cseq()) else {
            return;
        };
        let mut ack = SipMessage::request("ACK", uri)
            .with_header("CSeq", cseq.with_method("ACK").to_string())
            .with_header("Max-Forwards", "70");
        for name in ["Call-ID", "From", "Via"] {
            if let Some(value) = request.header(name) {
                ack.set_header(name, value);
            }
        }
        if let Some(to) = response.header("To") {
            ack.set_header("To", to);
        }

        if let Ok(transport) = self.transport() {
            if let Err(e) = transport.send(&ack, None).await {
                debug!("Could not acknowledge {:?}: {}", response.status_code(), e);
            }
        }
    }
}
