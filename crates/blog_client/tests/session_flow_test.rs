//! Integration tests for session transitions against a mock API

mod common;

use std::sync::Arc;
use std::time::Duration;

use blog_client::{
    cancellable, Access, ApiError, CancellationToken, KeyValueStore, MemoryStore, SessionEvent,
    SessionPhase, TokenStore, REFRESH_TOKEN_KEY,
};
use blog_core::{LoginCredentials, RegisterData, TokenPair};
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

fn registration() -> RegisterData {
    RegisterData {
        email: "user1@example.com".to_string(),
        username: "user1".to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        password: "secret-pass".to_string(),
        password_confirm: "secret-pass".to_string(),
    }
}

#[tokio::test]
async fn test_login_populates_store_and_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .and(body_json(json!({"email": "user1@example.com", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_json(1, "A1", "R1")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server).await;
    let mut events = session.events();
    let user = session
        .login(&LoginCredentials::new("user1@example.com", "secret"))
        .await
        .expect("login");

    assert_eq!(user.id, 1);
    assert!(session.is_authenticated());
    assert_eq!(session.user(), Some(user.clone()));
    assert_eq!(session.guard(), Access::Granted(user.clone()));
    assert_eq!(
        session.api().tokens().pair().await.unwrap(),
        Some(TokenPair::new("A1", "R1"))
    );
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedIn(user));
}

#[tokio::test]
async fn test_failed_login_leaves_session_untouched() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "non_field_errors": ["Invalid credentials"]
        })))
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server).await;
    let err = session
        .login(&LoginCredentials::new("user1@example.com", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "Invalid credentials");
    assert!(!session.is_authenticated());
    assert_eq!(session.api().tokens().pair().await.unwrap(), None);
}

#[tokio::test]
async fn test_register_surfaces_field_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/register/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "email": ["user with this email already exists."],
            "password_confirm": ["Passwords don't match."]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server).await;
    let err = session.register(&registration()).await.unwrap_err();

    let fields = err.field_errors().expect("field errors");
    assert_eq!(fields.first("email"), Some("user with this email already exists."));
    assert_eq!(fields.first("password_confirm"), Some("Passwords don't match."));
    assert!(fields.general_messages().is_empty());
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_register_logs_in() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/register/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(auth_json(7, "A7", "R7")))
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server).await;
    let user = session.register(&registration()).await.expect("register");

    assert_eq!(user.id, 7);
    assert!(session.is_authenticated());
    assert_eq!(session.api().tokens().access().await.unwrap().as_deref(), Some("A7"));
}

#[tokio::test]
async fn test_initialize_restores_user() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/profile/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json(3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, "A1", "R1").await;
    let restored = session.initialize().await.expect("initialize");

    assert_eq!(restored.map(|user| user.id), Some(3));
    assert_eq!(session.snapshot().phase, SessionPhase::Ready);
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_stored_token_pending_before_initialize() {
    let mock_server = MockServer::start().await;

    let session = logged_in_session(&mock_server, "A1", "R1").await;
    assert_eq!(session.snapshot().phase, SessionPhase::Initializing);
    assert_eq!(session.guard(), Access::Pending);

    let anonymous = session_for(&mock_server).await;
    assert_eq!(anonymous.guard(), Access::RedirectToLogin);
}

#[tokio::test]
async fn test_initialize_with_only_refresh_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/profile/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json(4)))
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/profile/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .and(body_json(json!({"refresh": "R1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = Arc::new(MemoryStore::new());
    backend.set(REFRESH_TOKEN_KEY, "R1").await.unwrap();
    let session = session_with_store(&mock_server, TokenStore::new(backend)).await;
    assert_eq!(session.guard(), Access::Pending);

    let restored = session.initialize().await.expect("initialize");
    assert_eq!(restored.map(|user| user.id), Some(4));
    assert_eq!(
        session.api().tokens().pair().await.unwrap(),
        Some(TokenPair::new("A2", "R1"))
    );
}

#[tokio::test]
async fn test_initialize_failure_resets_to_anonymous() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/profile/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, "A1", "R1").await;
    let err = session.initialize().await.unwrap_err();

    assert!(matches!(err, ApiError::Http { status: 503, .. }));
    assert!(!session.is_authenticated());
    assert_eq!(session.guard(), Access::RedirectToLogin);
    assert_eq!(
        session.api().tokens().pair().await.unwrap(),
        Some(TokenPair::new("A1", "R1"))
    );
}

#[tokio::test]
async fn test_guard_pending_while_initializing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/profile/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(user_json(1))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;

    let session = logged_in_session(&mock_server, "A1", "R1").await;
    let mut changes = session.subscribe();
    let background = session.clone();
    let init = tokio::spawn(async move { background.initialize().await });

    changes
        .wait_for(|snapshot| snapshot.phase == SessionPhase::Initializing)
        .await
        .expect("initializing");
    assert_eq!(session.guard(), Access::Pending);

    init.await.unwrap().expect("initialize");
    assert!(matches!(session.guard(), Access::Granted(_)));
}

#[tokio::test]
async fn test_logout_clears_everything_once_logged_in() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_json(1, "A1", "R1")))
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server).await;
    session
        .login(&LoginCredentials::new("user1@example.com", "secret"))
        .await
        .expect("login");

    session.logout().await.expect("logout");
    session.logout().await.expect("second logout");

    assert!(!session.is_authenticated());
    assert_eq!(session.api().tokens().pair().await.unwrap(), None);
    assert!(matches!(session.require_user(), Err(ApiError::LoginRequired)));
    // Logout never talks to the server.
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancelled_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/blogs/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_json(0, &[]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let session = session_for(&mock_server).await;
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = cancellable(&token, session.api().list_blogs(1, None)).await;
    assert!(matches!(result, Err(ApiError::Cancelled)));
}

#[tokio::test]
async fn test_tokens_survive_restart_with_file_store() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().expect("tempdir");
    let token_file = dir.path().join("tokens.json");

    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_json(1, "A1", "R1")))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/profile/"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json(1)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let first = session_with_store(&mock_server, TokenStore::file(&token_file)).await;
    first
        .login(&LoginCredentials::new("user1@example.com", "secret"))
        .await
        .expect("login");
    drop(first);

    let second = session_with_store(&mock_server, TokenStore::file(&token_file)).await;
    let restored = second.initialize().await.expect("initialize");
    assert_eq!(restored.map(|user| user.id), Some(1));
}
