//! HTTP client for the provider's login endpoint

use std::time::Duration;

use async_trait::async_trait;
use exponential_backoff::Backoff;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AuthOutcome, Authenticator, BillingToken};
use crate::config::BillingConfig;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Client for the billing provider API
#[derive(Debug, Clone)]
pub struct BillingClient {
    client: Client,
    auth_url: String,
    backoff: Backoff,
}

impl BillingClient {
    /// Create a client from configuration
    pub fn new(config: &BillingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("billrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            auth_url: config.auth_url(),
            backoff: Backoff::new(
                config.max_retries,
                Duration::from_millis(200),
                Some(Duration::from_secs(5)),
            ),
        })
    }
}

#[async_trait]
impl Authenticator for BillingClient {
    async fn authenticate(&self, login: &str, password: &str) -> Result<AuthOutcome> {
        let body = LoginRequest {
            username: login,
            password,
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let failure = match self.client.post(&self.auth_url).json(&body).send().await {
                Ok(response) => match response.status() {
                    StatusCode::OK => {
                        let parsed: LoginResponse = response
                            .json()
                            .await
                            .map_err(|e| Error::billing(format!("invalid login response: {e}")))?;
                        return match parsed.token.filter(|t| !t.trim().is_empty()) {
                            Some(token) => {
                                info!(login, "Billing login succeeded");
                                Ok(AuthOutcome::Authenticated(BillingToken::new(token)))
                            }
                            None => Err(Error::billing("login response contains no token")),
                        };
                    }
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        warn!(login, status = %response.status(), "Billing login rejected");
                        return Ok(AuthOutcome::Rejected);
                    }
                    status => format!("unexpected status {status}"),
                },
                Err(e) if e.is_timeout() => "request timed out".to_string(),
                Err(e) => format!("network error: {e}"),
            };

            match self.backoff.next(attempt) {
                Some(delay) => {
                    debug!(login, attempt, error = %failure, ?delay, "Retrying billing login");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(login, attempt, error = %failure, "Billing login failed");
                    return Err(Error::billing(format!(
                        "login failed after {attempt} attempts: {failure}"
                    )));
                }
            }
        }
    }
}
