//! Billing login against a mocked provider API

use std::time::Duration;

use billrelay::billing::{AuthOutcome, Authenticator, BillingClient};
use billrelay::config::BillingConfig;
use billrelay::Error;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_client(server: &MockServer, max_retries: u32) -> BillingClient {
    BillingClient::new(&BillingConfig {
        api_url: server.uri(),
        auth_endpoint: "/auth/login".to_string(),
        timeout: Duration::from_secs(5),
        max_retries,
    })
    .unwrap()
}

#[tokio::test]
async fn test_successful_login_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"username": "ivan", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc123"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server, 0);
    match client.authenticate("ivan", "secret").await.unwrap() {
        AuthOutcome::Authenticated(token) => assert_eq!(token.expose(), "abc123"),
        AuthOutcome::Rejected => panic!("expected a token"),
    }
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server, 3);
    let outcome = client.authenticate("ivan", "wrong").await.unwrap();
    assert!(matches!(outcome, AuthOutcome::Rejected));
}

#[tokio::test]
async fn test_response_without_token_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": "ivan"})))
        .mount(&server)
        .await;

    let client = create_test_client(&server, 0);
    let err = client.authenticate("ivan", "secret").await.unwrap_err();
    assert!(matches!(err, Error::Billing(_)));
}

#[tokio::test]
async fn test_server_error_without_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server, 0);
    let err = client.authenticate("ivan", "secret").await.unwrap_err();
    assert!(matches!(err, Error::Billing(_)));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc123"})))
        .mount(&server)
        .await;

    let client = create_test_client(&server, 3);
    let outcome = client.authenticate("ivan", "secret").await.unwrap();
    assert!(matches!(outcome, AuthOutcome::Authenticated(_)));
}
