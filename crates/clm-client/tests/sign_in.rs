//! Registration, email OTP and Google sign-in against a local mock backend.

mod support;

use clm_auth::{Session, SessionEvent};
use clm_client::FailureKind;
use common::Secret;
use support::*;
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn register_with_token_pair_signs_in() {
    let backend = Backend::accepting(ISSUED_ACCESS);
    let url = start(backend.clone()).await;
    let session = Session::in_memory();
    let mut events = session.subscribe();
    let client = client(&url, session.clone());

    let resp = client
        .register("grace@example.com", &Secret::new(PASSWORD.to_string()), "Grace Hopper")
        .await;

    assert!(resp.success, "{resp:?}");
    assert_eq!(session.store().access_token().as_deref(), Some(ISSUED_ACCESS));
    assert_eq!(session.store().refresh_token().as_deref(), Some(ISSUED_REFRESH));
    assert_eq!(session.user().unwrap().display_name(), "Grace Hopper");
    assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedIn);
    assert!(client.is_authenticated());

    let body = backend.seen_bodies.lock().unwrap().last().cloned().unwrap();
    assert_eq!(body["email"], "grace@example.com");
    assert_eq!(body["password"], PASSWORD);
    assert_eq!(body["full_name"], "Grace Hopper");
}

#[tokio::test]
async fn register_pending_verification_leaves_session_alone() {
    let backend = Backend::accepting(ISSUED_ACCESS);
    let url = start(backend.clone()).await;
    let session = Session::in_memory();
    let mut events = session.subscribe();
    let client = client(&url, session.clone());

    let resp = client
        .register(PENDING_EMAIL, &Secret::new(PASSWORD.to_string()), "Pending User")
        .await;

    assert!(resp.success);
    assert_eq!(resp.status, 201);
    assert_eq!(resp.data.unwrap()["detail"], "Verification code sent");
    assert!(!session.is_authenticated());
    assert!(!client.is_authenticated());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn verified_email_otp_signs_in_without_bearer() {
    let backend = Backend::accepting(ISSUED_ACCESS);
    let url = start(backend.clone()).await;
    let session = Session::in_memory();
    let mut events = session.subscribe();
    let client = client(&url, session.clone());

    let resp = client.verify_email_otp(PENDING_EMAIL, GOOD_OTP).await;

    assert!(resp.success, "{resp:?}");
    assert_eq!(resp.data.unwrap().access, ISSUED_ACCESS);
    assert_eq!(session.store().access_token().as_deref(), Some(ISSUED_ACCESS));
    assert_eq!(session.user().unwrap().email, PENDING_EMAIL);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedIn);
    assert_eq!(backend.last_auth(), None, "sign-in calls carry no bearer");
}

#[tokio::test]
async fn wrong_otp_is_an_application_error() {
    let backend = Backend::accepting("at_existing");
    let url = start(backend.clone()).await;
    let session = session_with(Some("at_existing"), Some(GOOD_REFRESH));
    let mut events = session.subscribe();
    let client = client(&url, session.clone());

    let resp = client.verify_email_otp(PENDING_EMAIL, "000000").await;

    assert!(!resp.success);
    assert_eq!(resp.status, 400);
    assert_eq!(resp.kind, Some(FailureKind::Application));
    assert_eq!(resp.error.as_deref(), Some("Invalid or expired code"));
    assert_eq!(session.store().access_token().as_deref(), Some("at_existing"));
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(backend.refresh_calls(), 0);
}

#[tokio::test]
async fn google_credential_signs_in() {
    let backend = Backend::accepting(ISSUED_ACCESS);
    let url = start(backend.clone()).await;
    let session = Session::in_memory();
    let mut events = session.subscribe();
    let client = client(&url, session.clone());

    let resp = client.login_with_google(GOOGLE_CREDENTIAL).await;

    assert!(resp.success, "{resp:?}");
    assert_eq!(session.store().access_token().as_deref(), Some(ISSUED_ACCESS));
    assert_eq!(session.store().refresh_token().as_deref(), Some(ISSUED_REFRESH));
    assert_eq!(session.user().unwrap().email, "ada@gmail.example");
    assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedIn);

    assert!(client.health().await.success);
    assert_eq!(backend.last_auth(), Some(format!("Bearer {ISSUED_ACCESS}")));
}

#[tokio::test]
async fn rejected_google_credential_does_not_touch_session() {
    let backend = Backend::accepting("at_existing");
    let url = start(backend.clone()).await;
    let session = session_with(Some("at_existing"), Some(GOOD_REFRESH));
    let client = client(&url, session.clone());

    let resp = client.login_with_google("forged").await;

    assert_eq!(resp.status, 401);
    assert_eq!(resp.kind, Some(FailureKind::Application));
    assert_eq!(resp.error.as_deref(), Some("Invalid Google credential"));
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(session.store().access_token().as_deref(), Some("at_existing"));
    assert!(session.is_authenticated());
}
