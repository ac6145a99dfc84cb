//! Balance alerting
//!
//! Periodic threshold checks, alert delivery and daily maintenance jobs.

pub mod checker;
pub mod maintenance;
pub mod notifier;

pub use checker::{CheckSummary, NotificationChecker};
pub use maintenance::DailyJob;
pub use notifier::{ChatNotifier, TelegramNotifier};
