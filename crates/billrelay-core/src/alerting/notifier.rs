//! Alert delivery

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::debug;

use crate::error::Result;

/// Delivers alert text to a chat
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Send `text` to `chat_id`
    async fn notify(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Sends alerts through the Telegram Bot API
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    /// Create a notifier sharing the bot's client
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatNotifier for TelegramNotifier {
    async fn notify(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        debug!(chat_id, "Alert delivered");
        Ok(())
    }
}
