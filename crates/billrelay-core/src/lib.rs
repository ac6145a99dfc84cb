//! # BillRelay
//!
//! Balance notifications for billing-provider customers over Telegram.
//!
//! Users sign in with their billing credentials through the bot, set a
//! balance threshold for their account, and receive one alert when the
//! balance drops below it. State lives in a Google spreadsheet shared with
//! the provider's back office.
//!
//! ## Architecture
//!
//! - **Billing**: credential exchange against the provider API
//! - **Store**: row-oriented spreadsheet access behind a cached repository
//! - **Alerting**: notification poller and daily maintenance jobs
//! - **Bot**: chat conversations and their Telegram rendering
//! - **API**: health, manual checks and Prometheus metrics
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the bot, the poller and the HTTP API
//! billrelay serve
//!
//! # Run a single notification check
//! billrelay check --format json
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod api;
pub mod billing;
pub mod bot;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{ChatNotifier, NotificationChecker};
    pub use crate::billing::{Authenticator, BillingClient};
    pub use crate::bot::Assistant;
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::store::{Repository, RowStore};
}
