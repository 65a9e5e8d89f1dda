//! Completion plumbing between correlators and the call awaiting them

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::warn;
use wsphone_sip_transport::{CorrelatorKey, WebSocketTransport};

use crate::error::{SoftphoneError, SoftphoneResult};

/// Completion side of a flow, owned by its correlators.
///
/// When every correlator holding it is dropped without completing, the
/// waiting side sees the transport as closed.
pub(crate) struct Flow<T> {
    completion: Mutex<Option<oneshot::Sender<SoftphoneResult<T>>>>,
    keys: Arc<Mutex<Vec<CorrelatorKey>>>,
}

/// Waiting side of a flow
pub(crate) struct FlowWaiter<T> {
    method: &'static str,
    outcome: oneshot::Receiver<SoftphoneResult<T>>,
    keys: Arc<Mutex<Vec<CorrelatorKey>>>,
}

impl<T> Flow<T> {
    pub(crate) fn new(method: &'static str) -> (Arc<Self>, FlowWaiter<T>) {
        let (tx, rx) = oneshot::channel();
        let keys = Arc::new(Mutex::new(Vec::new()));
        let flow = Arc::new(Self {
            completion: Mutex::new(Some(tx)),
            keys: Arc::clone(&keys),
        });
        let waiter = FlowWaiter {
            method,
            outcome: rx,
            keys,
        };
        (flow, waiter)
    }

    /// Deliver the outcome. Only the first call has any effect.
    pub(crate) fn complete(&self, outcome: SoftphoneResult<T>) -> bool {
        let sender = self.completion.lock().take();
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Remember a correlator serving this flow so a timeout can remove it
    pub(crate) fn track(&self, key: Option<CorrelatorKey>) {
        if let Some(key) = key {
            self.keys.lock().push(key);
        }
    }
}

impl<T> FlowWaiter<T> {
    pub(crate) async fn wait(
        self,
        transport: &WebSocketTransport,
        limit: Option<Duration>,
    ) -> SoftphoneResult<T> {
        let FlowWaiter {
            method,
            outcome,
            keys,
        } = self;

        let received = match limit {
            Some(limit) => match tokio::time::timeout(limit, outcome).await {
                Ok(received) => received,
                Err(_) => {
                    let pending: Vec<CorrelatorKey> = keys.lock().drain(..).collect();
                    for key in &pending {
                        transport.correlators().unregister(key);
                    }
                    warn!("No final response to {} within {:?}", method, limit);
                    return Err(SoftphoneError::Timeout {
                        method: method.to_string(),
                        timeout: limit,
                    });
                }
            },
            None => outcome.await,
        };

        received.unwrap_or(Err(SoftphoneError::Connection(
            wsphone_sip_transport::Error::TransportClosed,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_completion_counts() {
        let (flow, mut waiter) = Flow::<u16>::new("REGISTER");
        assert!(flow.complete(Ok(200)));
        assert!(!flow.complete(Ok(401)));
        assert_eq!(waiter.outcome.try_recv().unwrap().unwrap(), 200);
    }

    #[test]
    fn dropped_flow_closes_the_waiter() {
        let (flow, mut waiter) = Flow::<()>::new("INVITE");
        drop(flow);
        assert!(waiter.outcome.try_recv().is_err());
    }
}
