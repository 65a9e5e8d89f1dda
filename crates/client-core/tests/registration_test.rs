//! REGISTER flow against a scripted server

mod common;

use std::time::Duration;

use common::*;
use tokio::net::TcpListener;
use wsphone_client_core::{CallAction, RegistrationState, SoftphoneError};
use wsphone_sip_core::{DigestChallenge, DigestCredentials};

const CHALLENGE: &str = r#"Digest realm="asterisk", nonce="1f2e3d4c", algorithm=MD5"#;

#[tokio::test]
async fn register_answers_digest_challenge() {
    let mut server = SipServer::start().await;
    let (phone, mut events) = new_phone(config(server.port), CallAction::Accept);
    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });

    let first = server.recv().await;
    assert!(first.is_request("REGISTER"));
    assert_eq!(first.request_uri(), Some("sip:local"));
    assert_eq!(first.header("CSeq"), Some("8082 REGISTER"));
    assert_eq!(first.header("To"), Some("<sip:101@local>"));
    assert!(first.header("Authorization").is_none());
    assert!(first.header("Via").unwrap().starts_with("SIP/2.0/WS "));
    assert!(first.header("Via").unwrap().contains(";branch=z9hG4bK"));
    assert!(first
        .header("Contact")
        .unwrap()
        .ends_with(";transport=ws>;expires=600"));
    let from = first.header("From").unwrap().to_string();
    assert!(from.starts_with("<sip:101@local>;tag="));

    server.send(&reply(&first, 401, "Unauthorized").with_header("WWW-Authenticate", CHALLENGE));

    let second = server.recv().await;
    assert!(second.is_request("REGISTER"));
    assert_eq!(second.header("CSeq"), Some("8083 REGISTER"));
    assert_eq!(second.header("Call-ID"), first.header("Call-ID"));
    assert_eq!(second.header("From"), first.header("From"));
    assert_ne!(second.header("Via"), first.header("Via"));

    let authorization = second.header("Authorization").unwrap().to_string();
    let challenge = DigestChallenge::parse(CHALLENGE).unwrap();
    let expected =
        DigestCredentials::new("101", "101").response(&challenge, "REGISTER", "sip:local", None);
    assert_eq!(digest_param(&authorization, "response"), Some(expected.as_str()));
    assert_eq!(digest_param(&authorization, "username"), Some("101"));
    assert_eq!(digest_param(&authorization, "realm"), Some("asterisk"));
    assert_eq!(digest_param(&authorization, "uri"), Some("sip:local"));

    server.send(&reply(&second, 200, "OK"));
    task.await.unwrap().unwrap();

    assert_eq!(phone.registration_state(), RegistrationState::Registered);
    assert_eq!(phone.last_authorization(), Some(authorization));
    assert_eq!(phone.call_id(), first.header("Call-ID"));
    assert!(from.ends_with(phone.from_tag().unwrap()));

    for expected in [
        RegistrationState::AwaitingChallenge,
        RegistrationState::Authenticating,
        RegistrationState::Registered,
    ] {
        let event = wait_for_event(&mut events, |e| matches!(e, Event::Registration(_))).await;
        assert!(matches!(event, Event::Registration(state) if state == expected));
    }
}

#[tokio::test]
async fn unrelated_messages_do_not_complete_registration() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(config(server.port), CallAction::Accept);
    let mut task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });

    let request = server.recv().await;
    server.send(&reply(&request, 100, "Trying"));
    server.send_text("this is not SIP");
    server.send(&reply(&request, 200, "OK").with_header("CSeq", "8082 OPTIONS"));

    assert!(tokio::time::timeout(Duration::from_millis(300), &mut task)
        .await
        .is_err());
    assert_eq!(phone.registration_state(), RegistrationState::AwaitingChallenge);

    server.send(&reply(&request, 200, "OK"));
    task.await.unwrap().unwrap();
    assert_eq!(phone.registration_state(), RegistrationState::Registered);
    assert_eq!(phone.last_authorization(), None);
}

#[tokio::test]
async fn second_challenge_exhausts_authentication() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(config(server.port), CallAction::Accept);
    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });

    let first = server.recv().await;
    server.send(&reply(&first, 401, "Unauthorized").with_header("WWW-Authenticate", CHALLENGE));
    let second = server.recv().await;
    server.send(&reply(&second, 401, "Unauthorized").with_header("WWW-Authenticate", CHALLENGE));

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, SoftphoneError::AuthenticationExhausted { ref method } if method == "REGISTER"));
    assert_eq!(phone.registration_state(), RegistrationState::Failed);
    server.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn proxy_challenge_uses_proxy_authorization() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(config(server.port), CallAction::Accept);
    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });

    let first = server.recv().await;
    server.send(
        &reply(&first, 407, "Proxy Authentication Required")
            .with_header("Proxy-Authenticate", CHALLENGE),
    );
    let second = server.recv().await;
    assert!(second.header("Proxy-Authorization").is_some());
    assert!(second.header("Authorization").is_none());

    server.send(&reply(&second, 200, "OK"));
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn final_failure_is_reported_as_rejection() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(config(server.port), CallAction::Accept);
    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });

    let request = server.recv().await;
    server.send(&reply(&request, 403, "Forbidden"));

    match task.await.unwrap() {
        Err(SoftphoneError::Rejected {
            method,
            status,
            reason,
        }) => {
            assert_eq!(method, "REGISTER");
            assert_eq!(status, 403);
            assert_eq!(reason, "Forbidden");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(phone.registration_state(), RegistrationState::Failed);
}

#[tokio::test]
async fn silent_server_times_out() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(
        config(server.port).with_response_timeout(Duration::from_secs(1)),
        CallAction::Accept,
    );

    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });
    server.recv().await;

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, SoftphoneError::Timeout { ref method, .. } if method == "REGISTER"));
    assert_eq!(phone.registration_state(), RegistrationState::Failed);
}

#[tokio::test]
async fn server_closing_fails_pending_registration() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(config(server.port), CallAction::Accept);
    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });

    server.recv().await;
    server.close();

    let err = tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, SoftphoneError::Connection(_)));
    assert!(!phone.is_connected());
}

#[tokio::test]
async fn unreachable_server_fails_registration() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (phone, _events) = new_phone(config(port), CallAction::Accept);
    let err = phone.register().await.unwrap_err();
    assert!(matches!(err, SoftphoneError::Connection(_)));
    assert_eq!(phone.registration_state(), RegistrationState::Failed);
    assert!(phone.call_id().is_none());
}

#[tokio::test]
async fn register_runs_once() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(config(server.port), CallAction::Accept);
    register_without_challenge(&phone, &mut server).await;

    let err = phone.register().await.unwrap_err();
    assert!(matches!(err, SoftphoneError::InvalidState(_)));
}

#[tokio::test]
async fn failed_registration_does_not_answer_calls() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(config(server.port), CallAction::Accept);
    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });

    let request = server.recv().await;
    server.send(&reply(&request, 403, "Forbidden"));
    assert!(task.await.unwrap().is_err());
    assert!(phone.is_connected());

    server.send(&inbound_invite("call-after-403"));
    server.expect_silence(Duration::from_millis(300)).await;
    assert!(phone.active_peer().is_none());
}

#[tokio::test]
async fn stale_challenge_after_retry_is_ignored() {
    let mut server = SipServer::start().await;
    let (phone, _events) = new_phone(config(server.port), CallAction::Accept);
    let task = tokio::spawn({
        let phone = phone.clone();
        async move { phone.register().await }
    });

    let first = server.recv().await;
    let challenge = reply(&first, 401, "Unauthorized").with_header("WWW-Authenticate", CHALLENGE);
    server.send(&challenge);
    let second = server.recv().await;
    assert_eq!(second.header("CSeq"), Some("8083 REGISTER"));

    // Retransmission of the first challenge racing the final answer
    server.send(&challenge);
    server.send(&reply(&second, 200, "OK"));

    task.await.unwrap().unwrap();
    assert_eq!(phone.registration_state(), RegistrationState::Registered);
    server.expect_silence(Duration::from_millis(200)).await;
}
