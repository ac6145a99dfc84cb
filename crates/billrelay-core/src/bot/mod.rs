//! Chat front end
//!
//! [`Assistant`] holds the conversation logic and produces [`Reply`] values;
//! [`telegram`] renders them through the Bot API.

mod assistant;
mod callback;
pub mod messages;
mod reply;
pub mod telegram;
pub mod validators;

pub use assistant::Assistant;
pub use callback::{Callback, UnknownCallback};
pub use reply::{Button, Markup, Reply};
