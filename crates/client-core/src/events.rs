//! Softphone events
//!
//! Applications observe a softphone through a [`SoftphoneEventHandler`]. The
//! handler decides what to do with inbound calls and receives the remote
//! media tracks once a call is set up.
//!
//! ```rust
//! use async_trait::async_trait;
//! use wsphone_client_core::events::{CallAction, IncomingCallInfo, SoftphoneEventHandler};
//! use wsphone_client_core::media::MediaPeer;
//!
//! struct AcceptFromAlice;
//!
//! #[async_trait]
//! impl<P: MediaPeer> SoftphoneEventHandler<P> for AcceptFromAlice {
//!     async fn on_incoming_call(&self, call: IncomingCallInfo) -> CallAction {
//!         if call.caller_uri.contains("alice") {
//!             CallAction::Accept
//!         } else {
//!             CallAction::Reject
//!         }
//!     }
//!
//!     async fn on_remote_track(&self, _remote: P::RemoteTrack, _local: Option<P::LocalTrack>) {}
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wsphone_sip_core::SipMessage;

use crate::media::MediaPeer;
use crate::softphone::uri_of;

/// Decision for an inbound INVITE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    /// Answer it, if no other inbound call has been answered yet
    Accept,
    /// Respond 486 Busy Here
    Reject,
    /// Do not respond at all
    Ignore,
}

/// Registration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Unregistered,
    /// Initial REGISTER sent, no final response yet
    AwaitingChallenge,
    /// Authenticated REGISTER sent
    Authenticating,
    Registered,
    Failed,
}

/// Progress of the single call a softphone handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    /// INVITE sent
    Calling,
    /// 180 sent or received
    Ringing,
    Connected,
    Failed,
}

/// Summary of an inbound INVITE
#[derive(Debug, Clone)]
pub struct IncomingCallInfo {
    pub call_id: String,
    /// URI from the From header
    pub caller_uri: String,
    /// URI from the To header
    pub callee_uri: String,
    pub caller_display_name: Option<String>,
    pub subject: Option<String>,
    pub received_at: DateTime<Utc>,
    /// The request as received
    pub request: SipMessage,
}

impl IncomingCallInfo {
    pub fn from_invite(request: &SipMessage) -> Self {
        let from = request.header("From").unwrap_or_default();
        Self {
            call_id: request.header("Call-ID").unwrap_or_default().to_string(),
            caller_uri: uri_of(from).to_string(),
            callee_uri: uri_of(request.header("To").unwrap_or_default()).to_string(),
            caller_display_name: display_name(from),
            subject: request.header("Subject").map(str::to_string),
            received_at: Utc::now(),
            request: request.clone(),
        }
    }
}

fn display_name(value: &str) -> Option<String> {
    let start = value.find('<')?;
    let name = value[..start].trim().trim_matches('"').trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Application callbacks of a softphone
#[async_trait]
pub trait SoftphoneEventHandler<P: MediaPeer>: Send + Sync {
    /// Called once for every inbound INVITE
    async fn on_incoming_call(&self, call: IncomingCallInfo) -> CallAction {
        let _ = call;
        CallAction::Accept
    }

    /// A remote track arrived. `local` is the track the softphone sends on
    /// the same call, when it placed the call itself.
    async fn on_remote_track(&self, remote: P::RemoteTrack, local: Option<P::LocalTrack>);

    async fn on_registration_state_changed(&self, state: RegistrationState) {
        let _ = state;
    }

    async fn on_call_state_changed(&self, state: CallState) {
        let _ = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_caller_details() {
        let invite = SipMessage::request("INVITE", "sip:101@local")
            .with_header("From", "\"Alice\" <sip:alice@local>;tag=abc")
            .with_header("To", "<sip:101@local>")
            .with_header("Call-ID", "c-1")
            .with_header("Subject", "hello");

        let info = IncomingCallInfo::from_invite(&invite);
        assert_eq!(info.caller_uri, "sip:alice@local");
        assert_eq!(info.callee_uri, "sip:101@local");
        assert_eq!(info.caller_display_name.as_deref(), Some("Alice"));
        assert_eq!(info.subject.as_deref(), Some("hello"));
        assert_eq!(info.call_id, "c-1");
    }

    #[test]
    fn bare_uri_without_brackets() {
        assert_eq!(uri_of("sip:bob@local;tag=1"), "sip:bob@local");
        assert_eq!(display_name("sip:bob@local"), None);
        assert_eq!(display_name("<sip:bob@local>"), None);
    }
}
