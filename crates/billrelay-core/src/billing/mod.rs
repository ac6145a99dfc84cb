//! Billing provider credential exchange

mod client;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::BillingClient;

use crate::error::Result;

/// Token issued by the billing provider. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingToken(String);

impl BillingToken {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for storage
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BillingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BillingToken(<redacted>)")
    }
}

/// Result of a login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials accepted
    Authenticated(BillingToken),
    /// Credentials refused (401 or 403)
    Rejected,
}

/// Something that can check provider credentials
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchange a login and password for a token
    async fn authenticate(&self, login: &str, password: &str) -> Result<AuthOutcome>;
}
