use std::sync::Arc;

use eventhub_client::auth::{LOGOUT_PATH, ME_PATH, REQUEST_OTP_PATH, VERIFY_OTP_PATH};
use eventhub_client::client::REFRESH_PATH;
use eventhub_client::{
    ApiClient, AuthFlow, AuthState, ClientConfig, MemoryStorage, Role, SessionEvent,
    SessionStorage, SessionStore, StorageKey, VerifyOutcome,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn login_body() -> serde_json::Value {
    json!({
        "accessToken": "a1",
        "refreshToken": "r1",
        "user": { "id": "u1", "email": "ada@example.com", "role": "admin", "name": "Ada" }
    })
}

fn setup(server: &MockServer) -> (AuthFlow, Arc<MemoryStorage>, Arc<SessionStore>) {
    let storage = Arc::new(MemoryStorage::new());
    let session = Arc::new(SessionStore::restore(storage.clone()).unwrap());
    let client = ApiClient::new(
        &ClientConfig::default().with_base_url(server.uri()),
        session.clone(),
    )
    .unwrap();
    (AuthFlow::new(client), storage, session)
}

async fn mount_request_otp(server: &MockServer, device_id: &str) {
    Mock::given(method("POST"))
        .and(path(REQUEST_OTP_PATH))
        .and(body_partial_json(
            json!({ "email": "ada@example.com", "deviceId": device_id }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "sent" })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn otp_login_establishes_session() {
    let server = MockServer::start().await;
    let (mut flow, storage, session) = setup(&server);
    mount_request_otp(&server, session.device_id()).await;

    Mock::given(method("POST"))
        .and(path(VERIFY_OTP_PATH))
        .and(body_partial_json(json!({ "otp": "123456", "forceLogout": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .expect(1)
        .mount(&server)
        .await;

    let mut events = session.subscribe();

    flow.request_otp(" ada@example.com ").await.unwrap();
    assert_eq!(
        flow.state(),
        &AuthState::OtpRequested {
            email: "ada@example.com".to_string()
        }
    );

    let outcome = flow.verify_otp("123456").await.unwrap();
    let VerifyOutcome::LoggedIn(user) = outcome else {
        panic!("expected login, got {outcome:?}");
    };
    assert_eq!(user.role, Role::Admin);
    assert_eq!(flow.state(), &AuthState::Authenticated(user.clone()));

    assert_eq!(
        storage.get(StorageKey::AccessToken).unwrap().as_deref(),
        Some("a1")
    );
    assert!(storage.get(StorageKey::User).unwrap().unwrap().contains("ada@example.com"));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedIn(user));
}

#[tokio::test]
async fn device_conflict_resolved_by_logging_out_other_devices() {
    let server = MockServer::start().await;
    let (mut flow, _storage, session) = setup(&server);
    mount_request_otp(&server, session.device_id()).await;

    Mock::given(method("POST"))
        .and(path(VERIFY_OTP_PATH))
        .and(body_partial_json(json!({ "forceLogout": false })))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "message": "Already signed in on another device" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(VERIFY_OTP_PATH))
        .and(body_partial_json(json!({ "otp": "654321", "forceLogout": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .expect(1)
        .mount(&server)
        .await;

    flow.request_otp("ada@example.com").await.unwrap();
    let outcome = flow.verify_otp("654321").await.unwrap();
    assert_eq!(
        outcome,
        VerifyOutcome::Conflict {
            message: "Already signed in on another device".to_string()
        }
    );
    assert_eq!(flow.state().name(), "otp_conflict");
    assert!(!session.is_authenticated());

    let user = flow.logout_other_devices().await.unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(flow.state().name(), "authenticated");
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn device_conflict_can_be_aborted() {
    let server = MockServer::start().await;
    let (mut flow, _storage, session) = setup(&server);
    mount_request_otp(&server, session.device_id()).await;

    Mock::given(method("POST"))
        .and(path(VERIFY_OTP_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "message": "busy" })))
        .mount(&server)
        .await;

    flow.request_otp("ada@example.com").await.unwrap();
    flow.verify_otp("000000").await.unwrap();
    flow.abort().unwrap();
    assert_eq!(flow.state(), &AuthState::Anonymous);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn wrong_code_keeps_otp_requested() {
    let server = MockServer::start().await;
    let (mut flow, _storage, session) = setup(&server);
    mount_request_otp(&server, session.device_id()).await;

    Mock::given(method("POST"))
        .and(path(VERIFY_OTP_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "message": "Invalid code" })))
        .mount(&server)
        .await;

    flow.request_otp("ada@example.com").await.unwrap();
    let err = flow.verify_otp("999999").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(flow.state().name(), "otp_requested");
}

#[tokio::test]
async fn logout_clears_session_even_when_backend_fails() {
    let server = MockServer::start().await;
    let (mut flow, storage, session) = setup(&server);
    mount_request_otp(&server, session.device_id()).await;

    Mock::given(method("POST"))
        .and(path(VERIFY_OTP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(LOGOUT_PATH))
        .and(header("Authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    flow.request_otp("ada@example.com").await.unwrap();
    flow.verify_otp("123456").await.unwrap();

    let mut events = session.subscribe();
    let err = flow.logout().await.unwrap_err();
    assert_eq!(err.status(), Some(503));

    assert_eq!(flow.state(), &AuthState::Anonymous);
    assert_eq!(storage.get(StorageKey::AccessToken).unwrap(), None);
    assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
}

#[tokio::test]
async fn logout_with_expired_token_does_not_refresh() {
    let server = MockServer::start().await;
    let (mut flow, storage, session) = setup(&server);
    mount_request_otp(&server, session.device_id()).await;

    Mock::given(method("POST"))
        .and(path(VERIFY_OTP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(LOGOUT_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "jwt expired" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(0)
        .mount(&server)
        .await;

    flow.request_otp("ada@example.com").await.unwrap();
    flow.verify_otp("123456").await.unwrap();

    let mut events = session.subscribe();
    flow.logout().await.unwrap();

    assert_eq!(flow.state(), &AuthState::Anonymous);
    assert_eq!(storage.get(StorageKey::RefreshToken).unwrap(), None);
    assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    assert!(events.try_recv().is_err(), "logout is not reported as an expiry");
}

#[tokio::test]
async fn refresh_profile_updates_stored_user() {
    let server = MockServer::start().await;
    let (mut flow, _storage, session) = setup(&server);
    mount_request_otp(&server, session.device_id()).await;

    Mock::given(method("POST"))
        .and(path(VERIFY_OTP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(ME_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1", "email": "ada@example.com", "role": "super_admin", "name": "Ada L."
        })))
        .mount(&server)
        .await;

    flow.request_otp("ada@example.com").await.unwrap();
    flow.verify_otp("123456").await.unwrap();

    let user = flow.refresh_profile().await.unwrap();
    assert_eq!(user.role, Role::SuperAdmin);
    assert_eq!(session.user().unwrap().display_name(), "Ada L.");
}
