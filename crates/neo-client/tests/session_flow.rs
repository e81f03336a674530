//! Session Flow Integration Tests
//!
//! Drives the two-factor login flow against a mock gateway and checks
//! every state transition the manager promises: success paths, broker
//! rejections, expiry recovery, and the 401 expiry signal raised by
//! authenticated endpoint calls.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use neo_client::{
    ApiError, AuthError, ConsumerCredentials, Credential, Environment, NeoConfig, OrderApi,
    RetryPolicy, SessionManager, SessionState, TransportClient, TransportError,
};

const LOGIN_PATH: &str = "/login/1.0/login/v6/totp/login";
const VALIDATE_PATH: &str = "/login/1.0/login/v6/totp/validate";
const LOGOFF_PATH: &str = "/login/1.0/login/v2/logoff";

fn test_config() -> NeoConfig {
    let mut config = NeoConfig::new(
        ConsumerCredentials::new("consumer-key".to_string(), "consumer-secret".to_string()),
        Environment::Uat,
    );
    config.retry = RetryPolicy {
        max_attempts: 1,
        base_backoff: Duration::from_millis(5),
        jitter_fraction: 0.0,
        ..RetryPolicy::default()
    };
    config
}

/// A manager pointed at the mock gateway, plus the transport it shares
/// with the endpoint layer.
fn session_for(server: &MockServer) -> (Arc<SessionManager>, Arc<TransportClient>) {
    let config = test_config();
    let transport = Arc::new(TransportClient::new(&config).unwrap());
    let session = Arc::new(
        SessionManager::new(&config, Arc::clone(&transport)).with_base_url(server.uri()),
    );
    (session, transport)
}

fn trade_credential() -> Credential {
    Credential {
        view_token: Some("view-token".to_string()),
        edit_token: Some("edit-token".to_string()),
        edit_session_id: Some("edit-sid".to_string()),
        edit_request_id: Some("rid-1".to_string()),
        base_session_id: Some("base-sid".to_string()),
        server_id: Some("server1".to_string()),
        issued_at: Utc::now(),
    }
}

async fn mount_login_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .and(header("Authorization", "consumer-key"))
        .and(header("neo-fin-key", "neotradeapi"))
        .and(body_json(serde_json::json!({
            "mobileNumber": "+919876543210",
            "ucc": "ABC12",
            "totp": "123456"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "token": "view-token", "sid": "base-sid" }
        })))
        .mount(server)
        .await;
}

async fn mount_validate_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(VALIDATE_PATH))
        .and(header("Authorization", "consumer-key"))
        .and(header("sid", "base-sid"))
        .and(header("Auth", "view-token"))
        .and(body_json(serde_json::json!({ "mpin": "000000" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "token": "edit-token",
                "sid": "edit-sid",
                "rid": "rid-1",
                "hsServerId": "server1"
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_transitions_to_view_authenticated() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    let (session, _transport) = session_for(&server);

    let credential = session
        .login("+919876543210", "ABC12", "123456")
        .await
        .unwrap();

    assert_eq!(credential.view_token.as_deref(), Some("view-token"));
    assert_eq!(credential.base_session_id.as_deref(), Some("base-sid"));
    assert!(credential.trade_tokens().is_none());

    assert_eq!(session.state(), SessionState::ViewAuthenticated);
    assert!(session.require_view().is_ok());
    assert!(session.require_trade_authenticated().is_err());
}

#[tokio::test]
async fn test_login_rejection_leaves_state_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": [{ "message": "Invalid Totp" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (session, _transport) = session_for(&server);

    let error = session
        .login("+919876543210", "ABC12", "999999")
        .await
        .unwrap_err();

    assert!(matches!(error, AuthError::InvalidCredentials));
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(session.snapshot().is_none());
}

#[tokio::test]
async fn test_full_two_factor_flow_reaches_trade_authenticated() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    mount_validate_ok(&server).await;
    let (session, _transport) = session_for(&server);

    session
        .login("+919876543210", "ABC12", "123456")
        .await
        .unwrap();
    let credential = session.validate("000000").await.unwrap();

    assert_eq!(session.state(), SessionState::TradeAuthenticated);
    assert_eq!(credential.trade_tokens(), Some(("edit-token", "edit-sid")));
    assert_eq!(credential.server_id.as_deref(), Some("server1"));
    // The first-factor tokens survive the upgrade.
    assert_eq!(credential.view_token.as_deref(), Some("view-token"));
    assert_eq!(credential.base_session_id.as_deref(), Some("base-sid"));

    assert!(session.require_trade_authenticated().is_ok());
}

#[tokio::test]
async fn test_validate_rejection_preserves_view_session() {
    let server = MockServer::start().await;
    mount_login_ok(&server).await;
    Mock::given(method("POST"))
        .and(path(VALIDATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": [{ "message": "Invalid MPIN" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (session, _transport) = session_for(&server);

    session
        .login("+919876543210", "ABC12", "123456")
        .await
        .unwrap();
    let error = session.validate("111111").await.unwrap_err();

    assert!(matches!(error, AuthError::InvalidPin));
    assert_eq!(session.state(), SessionState::ViewAuthenticated);
    // Read access is intact; only the trading upgrade failed.
    assert!(session.require_view().is_ok());
    assert!(session.require_trade_authenticated().is_err());
}

#[tokio::test]
async fn test_expired_session_recovers_through_validate() {
    let server = MockServer::start().await;
    mount_validate_ok(&server).await;
    let (session, _transport) = session_for(&server);

    session.restore(trade_credential());
    session.mark_expired();
    assert_eq!(session.state(), SessionState::Expired);
    assert!(session.require_trade_authenticated().is_err());

    session.validate("000000").await.unwrap();
    assert_eq!(session.state(), SessionState::TradeAuthenticated);
    assert!(session.require_trade_authenticated().is_ok());
}

#[tokio::test]
async fn test_unauthorized_report_call_marks_the_session_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Orders/2.0/quick/user/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_string("session lapsed"))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config();
    let transport = Arc::new(TransportClient::new(&config).unwrap());
    let session = Arc::new(SessionManager::new(&config, Arc::clone(&transport)));
    session.restore(trade_credential());

    let orders = OrderApi::new(&config, Arc::clone(&session), transport)
        .with_base_url(server.uri());
    let error = orders.order_book().await.unwrap_err();

    assert!(matches!(
        error,
        ApiError::Transport(TransportError::ClientError { status: 401, .. })
    ));
    // The expiry signal is recorded before the error surfaces, so the
    // next call fails the gate locally instead of hitting the gateway.
    assert_eq!(session.state(), SessionState::Expired);
    assert!(matches!(
        orders.order_book().await.unwrap_err(),
        ApiError::Auth(AuthError::SessionNotReady { .. })
    ));
}

#[tokio::test]
async fn test_logout_clears_local_state_even_when_server_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGOFF_PATH))
        .and(header("Auth", "edit-token"))
        .and(header("Sid", "edit-sid"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let (session, _transport) = session_for(&server);

    session.restore(trade_credential());
    session.logout().await;

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(session.snapshot().is_none());
    assert!(session.require_view().is_err());
}
