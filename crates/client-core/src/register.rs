//! Connection setup and REGISTER with digest authentication

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;
use wsphone_sip_core::{CSeq, SipMessage};
use wsphone_sip_transport::{connect, handler, ResponseHandler};

use crate::config::REGISTER_EXPIRES;
use crate::error::{SoftphoneError, SoftphoneResult};
use crate::events::RegistrationState;
use crate::flow::Flow;
use crate::media::MediaEngine;
use crate::softphone::{new_tag, DialogIds, Softphone, REGISTER_BASE_SEQ};

/// State shared by the correlator of one REGISTER transaction
struct RegisterTransaction {
    request: SipMessage,
    challenged: AtomicBool,
    /// CSeq number of the REGISTER currently in flight
    expected_seq: AtomicU32,
}

impl<E: MediaEngine> Softphone<E> {
    /// Connect to the server and register the account.
    ///
    /// The first REGISTER carries no credentials. A 401 or 407 challenge is
    /// answered once with a digest computed from the configured password;
    /// the call resolves when a 2xx to REGISTER arrives. Inbound INVITEs are
    /// handled only once registration has succeeded.
    pub async fn register(&self) -> SoftphoneResult<()> {
        if self.inner.transport.get().is_some() {
            return Err(SoftphoneError::invalid_state("register() was already called"));
        }

        let config = &self.inner.config;
        let url = config.server_url();
        let connected = connect(config.transport, &config.host, config.port, &config.path).await;
        let transport = match connected {
            Ok(transport) => transport,
            Err(e) => {
                error!("Softphone {} could not connect to {}: {}", config.username, url, e);
                self.set_registration_state(RegistrationState::Failed).await;
                return Err(e.into());
            }
        };
        if self.inner.transport.set(transport.clone()).is_err() {
            let _ = transport.close().await;
            return Err(SoftphoneError::invalid_state("register() was already called"));
        }

        let ids = self
            .inner
            .dialog
            .get_or_init(|| DialogIds {
                from_tag: new_tag(),
                call_id: Uuid::new_v4().to_string(),
            })
            .clone();

        let request = self.register_request(&ids);
        let (flow, waiter) = Flow::new("REGISTER");
        let transaction = Arc::new(RegisterTransaction {
            request: request.clone(),
            challenged: AtomicBool::new(false),
            expected_seq: AtomicU32::new(REGISTER_BASE_SEQ),
        });

        self.set_registration_state(RegistrationState::AwaitingChallenge)
            .await;
        info!("Registering {} with {}", self.inner.config.username, url);

        let correlator = self.register_correlator(Arc::clone(&flow), transaction);
        match transport.send(&request, Some(correlator)).await {
            Ok(key) => flow.track(key),
            Err(e) => {
                self.set_registration_state(RegistrationState::Failed).await;
                return Err(e.into());
            }
        }
        drop(flow);

        match waiter
            .wait(&transport, self.inner.config.response_timeout())
            .await
        {
            Ok(()) => {
                self.listen_for_invites(&transport);
                self.set_registration_state(RegistrationState::Registered)
                    .await;
                info!("{} registered", self.inner.config.username);
                Ok(())
            }
            Err(e) => {
                error!("Registration of {} failed: {}", self.inner.config.username, e);
                self.set_registration_state(RegistrationState::Failed).await;
                Err(e)
            }
        }
    }

    fn register_request(&self, ids: &DialogIds) -> SipMessage {
        let config = &self.inner.config;
        SipMessage::request("REGISTER", &config.request_uri())
            .with_header("Call-ID", ids.call_id.as_str())
            .with_header("Contact", self.contact(REGISTER_EXPIRES))
            .with_header("Via", self.via())
            .with_header("From", self.from_header(ids))
            .with_header("To", self.address_of(&config.username))
            .with_header("CSeq", CSeq::new(REGISTER_BASE_SEQ, "REGISTER").to_string())
    }

    fn register_correlator(
        &self,
        flow: Arc<Flow<()>>,
        transaction: Arc<RegisterTransaction>,
    ) -> ResponseHandler {
        let phone = self.clone();
        handler(move |text| {
            let phone = phone.clone();
            let flow = Arc::clone(&flow);
            let transaction = Arc::clone(&transaction);
            async move { phone.on_register_response(&flow, &transaction, &text).await }
        })
    }

    /// Correlator body: returns `true` once the REGISTER outcome is known
    async fn on_register_response(
        &self,
        flow: &Flow<()>,
        transaction: &RegisterTransaction,
        text: &str,
    ) -> bool {
        let response = match SipMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                trace!("Ignoring unparsable message: {}", e);
                return false;
            }
        };
        if !response.is_response() || response.cseq_method().as_deref() != Some("REGISTER") {
            return false;
        }
        // Late responses to a REGISTER that was already retried are stale.
        let expected = transaction.expected_seq.load(Ordering::Acquire);
        if response.cseq().ok().map(|c| c.seq) != Some(expected) {
            trace!("Ignoring response to an earlier REGISTER");
            return false;
        }
        let Some(code) = response.status_code() else {
            return false;
        };

        match code {
            100..=199 => false,
            200..=299 => {
                flow.complete(Ok(()));
                true
            }
            401 | 407 => {
                if transaction.challenged.swap(true, Ordering::AcqRel) {
                    warn!(
                        "Authenticated REGISTER for {} was challenged again",
                        self.inner.config.username
                    );
                    flow.complete(Err(SoftphoneError::exhausted("REGISTER")));
                    return true;
                }

                let retry = match self.authenticate(&transaction.request, &response) {
                    Ok(retry) => retry,
                    Err(e) => {
                        flow.complete(Err(e));
                        return true;
                    }
                };
                debug!(
                    "Answering {} challenge for {}",
                    code, self.inner.config.username
                );
                self.set_registration_state(RegistrationState::Authenticating)
                    .await;

                if let Ok(cseq) = retry.cseq() {
                    transaction.expected_seq.store(cseq.seq, Ordering::Release);
                }

                let Ok(transport) = self.transport() else {
                    flow.complete(Err(SoftphoneError::NotConnected));
                    return true;
                };
                if let Err(e) = transport.send(&retry, None).await {
                    flow.complete(Err(e.into()));
                    return true;
                }
                // The same correlator keeps watching for the answer to the retry.
                false
            }
            _ => {
                flow.complete(Err(SoftphoneError::Rejected {
                    method: "REGISTER".to_string(),
                    status: code,
                    reason: response.reason_phrase().to_string(),
                }));
                true
            }
        }
    }
}
