//! Telegram transport for the [`Assistant`]

use std::sync::Arc;

use dashmap::DashMap;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use teloxide::types::{
    BotCommand, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
    KeyboardRemove, MessageId, ReplyMarkup,
};
use tracing::{debug, info, warn};

use super::assistant::Assistant;
use super::reply::{main_menu_rows, Button, Markup, Reply};
use crate::models::ChatProfile;

/// Renders assistant replies through the Bot API
pub struct TelegramFrontend {
    assistant: Arc<Assistant>,
    /// Last prompt per chat, deleted on [`Reply::DeletePrompt`]
    prompts: DashMap<i64, MessageId>,
}

impl TelegramFrontend {
    /// Create a frontend
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            assistant,
            prompts: DashMap::new(),
        }
    }

    async fn render(
        &self,
        bot: &Bot,
        chat: ChatId,
        incoming: Option<MessageId>,
        edited: Option<MessageId>,
        replies: Vec<Reply>,
    ) -> ResponseResult<()> {
        for reply in replies {
            match reply {
                Reply::Text { text, markup } => {
                    let request = bot.send_message(chat, text);
                    match reply_markup(markup) {
                        Some(markup) => request.reply_markup(markup).await?,
                        None => request.await?,
                    };
                }
                Reply::Prompt { text } => {
                    let sent = bot.send_message(chat, text).await?;
                    self.prompts.insert(chat.0, sent.id);
                }
                Reply::Edit { text, buttons } => {
                    let keyboard = inline_keyboard(buttons);
                    match edited {
                        Some(message_id) => {
                            if let Err(e) = bot
                                .edit_message_text(chat, message_id, text)
                                .reply_markup(keyboard)
                                .await
                            {
                                debug!(chat_id = chat.0, error = %e, "Message edit failed");
                            }
                        }
                        None => {
                            bot.send_message(chat, text).reply_markup(keyboard).await?;
                        }
                    }
                }
                Reply::DeleteIncoming => {
                    if let Some(message_id) = incoming {
                        if let Err(e) = bot.delete_message(chat, message_id).await {
                            warn!(chat_id = chat.0, error = %e, "Failed to delete incoming message");
                        }
                    }
                }
                Reply::DeletePrompt => {
                    if let Some((_, message_id)) = self.prompts.remove(&chat.0) {
                        if let Err(e) = bot.delete_message(chat, message_id).await {
                            debug!(chat_id = chat.0, error = %e, "Failed to delete prompt");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn inline_keyboard(rows: Vec<Vec<Button>>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.into_iter().map(|row| {
        row.into_iter()
            .map(|button| InlineKeyboardButton::callback(button.label, button.callback.to_string()))
            .collect::<Vec<_>>()
    }))
}

fn reply_markup(markup: Markup) -> Option<ReplyMarkup> {
    match markup {
        Markup::None => None,
        Markup::MainMenu => {
            let rows = main_menu_rows()
                .into_iter()
                .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>());
            Some(ReplyMarkup::Keyboard(KeyboardMarkup::new(rows).resize_keyboard()))
        }
        Markup::RemoveKeyboard => Some(ReplyMarkup::KeyboardRemove(KeyboardRemove::new())),
        Markup::Inline(rows) => Some(ReplyMarkup::InlineKeyboard(inline_keyboard(rows))),
    }
}

fn profile_of(user: &teloxide::types::User) -> ChatProfile {
    ChatProfile {
        user_id: i64::try_from(user.id.0).unwrap_or_default(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone().unwrap_or_default(),
        username: user.username.clone().unwrap_or_default(),
    }
}

async fn on_message(bot: Bot, msg: Message, frontend: Arc<TelegramFrontend>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let profile = msg.from.as_ref().map(profile_of).unwrap_or_default();
    let replies = frontend
        .assistant
        .handle_message(msg.chat.id.0, &profile, text)
        .await;

    frontend.render(&bot, msg.chat.id, Some(msg.id), None, replies).await
}

async fn on_callback(bot: Bot, q: CallbackQuery, frontend: Arc<TelegramFrontend>) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let (chat, message_id) = match &q.message {
        Some(message) => (message.chat().id, Some(message.id())),
        None => (ChatId(i64::try_from(q.from.id.0).unwrap_or_default()), None),
    };

    let replies = frontend.assistant.handle_callback(chat.0, data).await;
    frontend.render(&bot, chat, None, message_id, replies).await
}

/// Register the command list shown by Telegram clients
pub async fn set_commands(bot: &Bot) -> ResponseResult<()> {
    bot.set_my_commands(vec![
        BotCommand::new("start", "Registration and sign in"),
        BotCommand::new("help", "Show help"),
        BotCommand::new("cancel", "Cancel the current action"),
        BotCommand::new("logout", "Log out"),
    ])
    .await?;
    Ok(())
}

/// Dispatch updates until `cancel` fires or the dispatcher stops on its own
pub async fn run_bot(bot: Bot, assistant: Arc<Assistant>, cancel: CancellationToken) {
    if let Err(e) = set_commands(&bot).await {
        warn!(error = %e, "Failed to register bot commands");
    }

    let frontend = Arc::new(TelegramFrontend::new(assistant));
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    info!("Starting Telegram dispatcher");
    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![frontend])
        .build();
    let shutdown = dispatcher.shutdown_token();

    let dispatch = dispatcher.dispatch();
    tokio::pin!(dispatch);
    tokio::select! {
        () = &mut dispatch => {}
        () = cancel.cancelled() => {
            // an idle dispatcher has nothing to drain
            if shutdown.shutdown().is_ok() {
                dispatch.await;
            }
        }
    }
    info!("Telegram dispatcher stopped");
}
