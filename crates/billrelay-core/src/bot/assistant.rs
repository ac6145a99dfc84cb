//! Chat conversation engine
//!
//! Turns incoming text and button presses into [`Reply`] values. Dialog
//! state is kept per chat in memory and lost on restart, which only aborts
//! half-finished dialogs.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, info, warn};

use super::callback::Callback;
use super::messages;
use super::reply::{back_row, notifications_menu, Button, Markup, Reply};
use super::validators::{is_valid_email, is_valid_login, parse_amount};
use crate::billing::{AuthOutcome, Authenticator};
use crate::error::Result;
use crate::models::{actions, AuthStatus, ChatProfile, CheckTime, DirectoryEntry, LogLevel, User};
use crate::store::Repository;

/// Where a chat is in a multi-step dialog
#[derive(Debug, Clone, PartialEq)]
enum Dialog {
    AwaitingLogin,
    AwaitingEmail {
        entry: DirectoryEntry,
    },
    AwaitingPassword {
        entry: DirectoryEntry,
        email: String,
    },
    AwaitingAmount,
    AwaitingTime {
        threshold: f64,
    },
    AwaitingCustomTime {
        threshold: f64,
    },
    ConfirmNotification {
        threshold: f64,
        check_time: Option<CheckTime>,
    },
}

/// Bot commands understood by [`Assistant::handle_message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Help,
    Cancel,
    Logout,
}

impl Command {
    fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?.split('@').next()?;
        match name.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "cancel" => Some(Self::Cancel),
            "logout" => Some(Self::Logout),
            _ => None,
        }
    }
}

/// Conversation engine shared by every chat
pub struct Assistant {
    repo: Arc<Repository>,
    auth: Arc<dyn Authenticator>,
    time_options: Vec<CheckTime>,
    dialogs: DashMap<i64, Dialog>,
}

impl Assistant {
    /// Create an assistant offering `time_options` as preset check times
    pub fn new(
        repo: Arc<Repository>,
        auth: Arc<dyn Authenticator>,
        time_options: Vec<CheckTime>,
    ) -> Self {
        Self {
            repo,
            auth,
            time_options,
            dialogs: DashMap::new(),
        }
    }

    /// Whether the chat is in the middle of a dialog
    pub fn in_dialog(&self, chat_id: i64) -> bool {
        self.dialogs.contains_key(&chat_id)
    }

    /// Handle a text message
    pub async fn handle_message(&self, chat_id: i64, profile: &ChatProfile, text: &str) -> Vec<Reply> {
        match self.dispatch_message(chat_id, profile, text.trim()).await {
            Ok(replies) => replies,
            Err(e) => {
                error!(chat_id, error = %e, "Failed to handle message");
                self.dialogs.remove(&chat_id);
                vec![Reply::text(messages::GENERIC_ERROR)]
            }
        }
    }

    /// Handle a button press carrying `data`
    pub async fn handle_callback(&self, chat_id: i64, data: &str) -> Vec<Reply> {
        let callback: Callback = match data.parse() {
            Ok(callback) => callback,
            Err(e) => {
                warn!(chat_id, data = %e.0, "Unknown callback data");
                return vec![Reply::edit(messages::EXPIRED_ACTION)];
            }
        };

        match self.dispatch_callback(chat_id, callback).await {
            Ok(replies) => replies,
            Err(e) => {
                error!(chat_id, ?callback, error = %e, "Failed to handle callback");
                self.dialogs.remove(&chat_id);
                vec![Reply::edit(messages::GENERIC_ERROR)]
            }
        }
    }

    async fn dispatch_message(&self, chat_id: i64, profile: &ChatProfile, text: &str) -> Result<Vec<Reply>> {
        if let Some(command) = Command::parse(text) {
            return match command {
                Command::Start => self.start(chat_id).await,
                Command::Help => self.help(chat_id).await,
                Command::Cancel => self.cancel(chat_id).await,
                Command::Logout => self.request_logout(chat_id).await,
            };
        }

        match text {
            messages::BTN_BALANCE => {
                self.dialogs.remove(&chat_id);
                return self.show_balance(chat_id).await;
            }
            messages::BTN_NOTIFICATIONS => {
                self.dialogs.remove(&chat_id);
                return self.show_notifications_menu(chat_id).await;
            }
            messages::BTN_HELP => {
                self.dialogs.remove(&chat_id);
                return self.help(chat_id).await;
            }
            _ => {}
        }

        let dialog = self.dialogs.get(&chat_id).map(|d| d.clone());
        match dialog {
            Some(Dialog::AwaitingLogin) => self.on_login(chat_id, text).await,
            Some(Dialog::AwaitingEmail { entry }) => Ok(self.on_email(chat_id, entry, text)),
            Some(Dialog::AwaitingPassword { entry, email }) => {
                self.on_password(chat_id, profile, entry, email, text).await
            }
            Some(Dialog::AwaitingAmount) => Ok(self.on_amount(chat_id, text)),
            Some(Dialog::AwaitingCustomTime { threshold }) => Ok(self.on_custom_time(chat_id, threshold, text)),
            Some(Dialog::AwaitingTime { .. } | Dialog::ConfirmNotification { .. }) => {
                Ok(vec![Reply::text(messages::UNKNOWN_INPUT)])
            }
            None => match self.repo.get_user(chat_id).await? {
                Some(user) if user.is_authenticated() => {
                    Ok(vec![Reply::with_markup(messages::UNKNOWN_INPUT, Markup::MainMenu)])
                }
                _ => Ok(vec![Reply::text(messages::NOT_REGISTERED)]),
            },
        }
    }

    async fn dispatch_callback(&self, chat_id: i64, callback: Callback) -> Result<Vec<Reply>> {
        match callback {
            Callback::ConfirmLogout => return self.logout(chat_id).await,
            Callback::CancelLogout => return Ok(vec![Reply::edit(messages::LOGOUT_CANCELLED)]),
            Callback::Cancel => {
                self.dialogs.remove(&chat_id);
                return Ok(vec![Reply::edit(messages::CANCELLED)]);
            }
            _ => {}
        }

        let user = match self.authorize(chat_id).await? {
            Ok(user) => user,
            Err(replies) => return Ok(replies),
        };

        match callback {
            Callback::Back => {
                self.dialogs.remove(&chat_id);
                Ok(vec![Reply::edit_with(messages::NOTIFICATIONS_MENU, notifications_menu())])
            }
            Callback::SetNotification => {
                self.dialogs.insert(chat_id, Dialog::AwaitingAmount);
                Ok(vec![Reply::edit_with(
                    messages::AMOUNT_REQUEST,
                    vec![vec![Button::new(messages::BTN_CANCEL, Callback::Cancel)]],
                )])
            }
            Callback::Time(check_time) => {
                let Some(Dialog::AwaitingTime { threshold }) = self.current_dialog(chat_id) else {
                    return Ok(vec![Reply::edit(messages::EXPIRED_ACTION)]);
                };
                self.dialogs.insert(chat_id, Dialog::ConfirmNotification { threshold, check_time });
                Ok(vec![Reply::edit_with(
                    messages::confirm_notification(threshold, check_time),
                    confirm_buttons(),
                )])
            }
            Callback::CustomTime => {
                let Some(Dialog::AwaitingTime { threshold }) = self.current_dialog(chat_id) else {
                    return Ok(vec![Reply::edit(messages::EXPIRED_ACTION)]);
                };
                self.dialogs.insert(chat_id, Dialog::AwaitingCustomTime { threshold });
                Ok(vec![Reply::edit_with(
                    messages::CUSTOM_TIME_REQUEST,
                    vec![vec![Button::new(messages::BTN_CANCEL, Callback::Cancel)]],
                )])
            }
            Callback::ConfirmSet => self.confirm_notification(&user).await,
            Callback::ListNotifications => self.list_notifications(chat_id).await,
            Callback::DeleteMenu => self.delete_menu(chat_id).await,
            Callback::Delete(id) => {
                let notification = self
                    .repo
                    .user_notifications(chat_id)
                    .await?
                    .into_iter()
                    .find(|n| n.id == id);
                Ok(vec![match notification {
                    Some(notification) => Reply::edit_with(
                        messages::confirm_delete(&notification),
                        vec![vec![
                            Button::new(messages::BTN_CONFIRM, Callback::ConfirmDelete(id)),
                            Button::new(messages::BTN_CANCEL, Callback::Back),
                        ]],
                    ),
                    None => Reply::edit_with(messages::NOTIFICATION_NOT_FOUND, vec![back_row()]),
                }])
            }
            Callback::ConfirmDelete(id) => {
                if !self.repo.delete_notification(chat_id, id).await? {
                    return Ok(vec![Reply::edit_with(messages::NOTIFICATION_NOT_FOUND, vec![back_row()])]);
                }
                self.audit(
                    LogLevel::Success,
                    actions::NOTIFICATION_DELETED,
                    format!("Chat {chat_id} deleted notification #{id}"),
                )
                .await;
                Ok(vec![Reply::edit_with(messages::notification_deleted(id), vec![back_row()])])
            }
            Callback::Rearm(id) => {
                if !self.repo.rearm_notification(chat_id, id).await? {
                    return Ok(vec![Reply::edit_with(messages::NOTIFICATION_NOT_FOUND, vec![back_row()])]);
                }
                self.audit(
                    LogLevel::Success,
                    actions::NOTIFICATION_REARMED,
                    format!("Chat {chat_id} re-armed notification #{id}"),
                )
                .await;
                Ok(vec![Reply::edit_with(messages::notification_rearmed(id), vec![back_row()])])
            }
            Callback::ConfirmLogout | Callback::CancelLogout | Callback::Cancel => Ok(Vec::new()),
        }
    }

    fn current_dialog(&self, chat_id: i64) -> Option<Dialog> {
        self.dialogs.get(&chat_id).map(|d| d.clone())
    }

    /// Write an audit log entry; failures are only logged
    async fn audit(&self, level: LogLevel, action: &str, message: String) {
        if let Err(e) = self.repo.add_log(level, action, message).await {
            warn!(action, error = %e, "Failed to write audit log");
        }
    }

    /// Check that the chat may use the menu. The error side carries the
    /// replies explaining why not.
    async fn authorize(&self, chat_id: i64) -> Result<std::result::Result<User, Vec<Reply>>> {
        let Some(user) = self.repo.get_user(chat_id).await? else {
            return Ok(Err(vec![Reply::text(messages::NOT_REGISTERED)]));
        };
        if !user.is_authenticated() {
            return Ok(Err(vec![Reply::with_markup(messages::AUTH_EXPIRED, Markup::RemoveKeyboard)]));
        }

        // revoked users are re-read on every attempt
        let recheck = !user.is_admin || user.needs_admin_recheck(self.repo.now());
        if recheck && !self.repo.recheck_admin(chat_id, &user.user_login).await? {
            self.dialogs.remove(&chat_id);
            self.audit(
                LogLevel::Warning,
                actions::ACCESS_REVOKED,
                format!("Chat {chat_id} ({}) is no longer an admin", user.user_login),
            )
            .await;
            return Ok(Err(vec![Reply::with_markup(messages::ACCESS_REVOKED, Markup::RemoveKeyboard)]));
        }

        if let Err(e) = self.repo.touch_activity(chat_id).await {
            warn!(chat_id, error = %e, "Failed to record activity");
        }
        Ok(Ok(user))
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn start(&self, chat_id: i64) -> Result<Vec<Reply>> {
        self.dialogs.remove(&chat_id);

        if let Some(user) = self.repo.get_user(chat_id).await? {
            if user.is_authenticated() {
                return Ok(vec![Reply::with_markup(
                    messages::greeting(user.display_name()),
                    Markup::MainMenu,
                )]);
            }
        }

        self.dialogs.insert(chat_id, Dialog::AwaitingLogin);
        Ok(vec![Reply::with_markup(messages::WELCOME, Markup::RemoveKeyboard)])
    }

    async fn help(&self, chat_id: i64) -> Result<Vec<Reply>> {
        let registered = self
            .repo
            .get_user(chat_id)
            .await?
            .is_some_and(|user| user.is_authenticated());
        let markup = if registered { Markup::MainMenu } else { Markup::None };
        Ok(vec![Reply::with_markup(messages::HELP, markup)])
    }

    async fn cancel(&self, chat_id: i64) -> Result<Vec<Reply>> {
        self.dialogs.remove(&chat_id);
        let registered = self
            .repo
            .get_user(chat_id)
            .await?
            .is_some_and(|user| user.is_authenticated());
        let markup = if registered { Markup::MainMenu } else { Markup::None };
        Ok(vec![Reply::with_markup(messages::CANCELLED, markup)])
    }

    async fn request_logout(&self, chat_id: i64) -> Result<Vec<Reply>> {
        self.dialogs.remove(&chat_id);
        match self.repo.get_user(chat_id).await? {
            Some(user) if user.is_authenticated() => Ok(vec![Reply::with_markup(
                messages::LOGOUT_CONFIRM,
                Markup::Inline(vec![vec![
                    Button::new(messages::BTN_LOGOUT, Callback::ConfirmLogout),
                    Button::new(messages::BTN_CANCEL, Callback::CancelLogout),
                ]]),
            )]),
            _ => Ok(vec![Reply::text(messages::NOT_REGISTERED)]),
        }
    }

    async fn logout(&self, chat_id: i64) -> Result<Vec<Reply>> {
        self.dialogs.remove(&chat_id);
        match self.repo.get_user(chat_id).await? {
            Some(user) if user.is_authenticated() => {}
            _ => return Ok(vec![Reply::edit(messages::NOT_REGISTERED)]),
        }

        let removed = self.repo.logout(chat_id).await?;
        self.audit(
            LogLevel::Info,
            actions::LOGOUT,
            format!("Chat {chat_id} logged out, {removed} notifications removed"),
        )
        .await;
        info!(chat_id, removed, "Chat logged out");

        Ok(vec![
            Reply::edit(messages::logged_out(removed)),
            Reply::with_markup(messages::LOGOUT_HINT, Markup::RemoveKeyboard),
        ])
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    async fn on_login(&self, chat_id: i64, text: &str) -> Result<Vec<Reply>> {
        if !is_valid_login(text) {
            return Ok(vec![Reply::text(messages::LOGIN_INVALID)]);
        }

        let Some(entry) = self.repo.find_directory_entry(text).await? else {
            info!(chat_id, login = text, "Login not found in directory");
            return Ok(vec![Reply::text(messages::LOGIN_NOT_FOUND)]);
        };

        if !entry.is_admin {
            self.dialogs.remove(&chat_id);
            info!(chat_id, login = %entry.user_login, "Registration refused, not an admin");
            return Ok(vec![Reply::text(messages::NOT_ADMIN)]);
        }

        self.dialogs.insert(chat_id, Dialog::AwaitingEmail { entry });
        Ok(vec![Reply::text(messages::EMAIL_REQUEST)])
    }

    fn on_email(&self, chat_id: i64, entry: DirectoryEntry, text: &str) -> Vec<Reply> {
        if !is_valid_email(text) {
            return vec![Reply::text(messages::EMAIL_INVALID)];
        }

        self.dialogs.insert(
            chat_id,
            Dialog::AwaitingPassword {
                entry,
                email: text.to_string(),
            },
        );
        vec![Reply::Prompt {
            text: messages::PASSWORD_REQUEST.to_string(),
        }]
    }

    async fn on_password(
        &self,
        chat_id: i64,
        profile: &ChatProfile,
        entry: DirectoryEntry,
        email: String,
        password: &str,
    ) -> Result<Vec<Reply>> {
        self.dialogs.remove(&chat_id);
        let mut replies = vec![Reply::DeleteIncoming, Reply::DeletePrompt];

        let token = match self.auth.authenticate(&entry.user_login, password).await {
            Ok(AuthOutcome::Authenticated(token)) => token,
            Ok(AuthOutcome::Rejected) => {
                replies.push(Reply::text(messages::AUTH_FAILED));
                return Ok(replies);
            }
            Err(e) => {
                warn!(chat_id, error = %e, "Billing login unavailable");
                replies.push(Reply::text(messages::AUTH_UNAVAILABLE));
                return Ok(replies);
            }
        };

        let now = self.repo.now();
        let registered_at = self
            .repo
            .get_user(chat_id)
            .await?
            .and_then(|existing| existing.registered_at)
            .unwrap_or(now);

        let mut user = User {
            chat_id,
            profile: profile.clone(),
            user_login: entry.user_login.clone(),
            account_login: entry.account_login.clone(),
            is_admin: entry.is_admin,
            email,
            token: Some(token),
            auth_status: AuthStatus::Passed,
            last_check: None,
            next_check: None,
            registered_at: Some(registered_at),
            last_activity: Some(now),
        };
        user.mark_checked(now, entry.is_admin);

        self.repo.register_user(user).await?;
        self.audit(
            LogLevel::Success,
            actions::REGISTRATION,
            format!(
                "Chat {chat_id} registered as {} (account {})",
                entry.user_login, entry.account_login
            ),
        )
        .await;
        info!(chat_id, login = %entry.user_login, "Chat registered");

        replies.push(Reply::with_markup(messages::AUTH_SUCCESS, Markup::MainMenu));
        Ok(replies)
    }

    // ------------------------------------------------------------------
    // Menu
    // ------------------------------------------------------------------

    async fn show_balance(&self, chat_id: i64) -> Result<Vec<Reply>> {
        let user = match self.authorize(chat_id).await? {
            Ok(user) => user,
            Err(replies) => return Ok(replies),
        };

        let Some(balance) = self.repo.account_balance(&user.account_login).await? else {
            warn!(chat_id, account = %user.account_login, "No balance row for account");
            return Ok(vec![Reply::with_markup(messages::BALANCE_ERROR, Markup::MainMenu)]);
        };

        self.audit(
            LogLevel::Info,
            actions::BALANCE_VIEW,
            format!("Chat {chat_id} viewed balance of {}", user.account_login),
        )
        .await;

        let today = self.repo.now().date();
        Ok(vec![Reply::with_markup(balance.format_message(today), Markup::MainMenu)])
    }

    async fn show_notifications_menu(&self, chat_id: i64) -> Result<Vec<Reply>> {
        if let Err(replies) = self.authorize(chat_id).await? {
            return Ok(replies);
        }
        Ok(vec![Reply::with_markup(
            messages::NOTIFICATIONS_MENU,
            Markup::Inline(notifications_menu()),
        )])
    }

    fn on_amount(&self, chat_id: i64, text: &str) -> Vec<Reply> {
        let Some(threshold) = parse_amount(text) else {
            return vec![Reply::text(messages::AMOUNT_INVALID)];
        };

        self.dialogs.insert(chat_id, Dialog::AwaitingTime { threshold });

        let mut rows: Vec<Vec<Button>> = Vec::new();
        if !self.time_options.is_empty() {
            rows.push(
                self.time_options
                    .iter()
                    .map(|t| Button::new(t.to_string(), Callback::Time(Some(*t))))
                    .collect(),
            );
        }
        rows.push(vec![
            Button::new(messages::BTN_CUSTOM_TIME, Callback::CustomTime),
            Button::new(messages::BTN_EVERY_CHECK, Callback::Time(None)),
        ]);
        rows.push(vec![Button::new(messages::BTN_CANCEL, Callback::Cancel)]);

        vec![Reply::with_markup(messages::TIME_REQUEST, Markup::Inline(rows))]
    }

    fn on_custom_time(&self, chat_id: i64, threshold: f64, text: &str) -> Vec<Reply> {
        let Ok(check_time) = text.parse::<CheckTime>() else {
            return vec![Reply::text(messages::TIME_INVALID)];
        };

        self.dialogs.insert(
            chat_id,
            Dialog::ConfirmNotification {
                threshold,
                check_time: Some(check_time),
            },
        );
        vec![Reply::with_markup(
            messages::confirm_notification(threshold, Some(check_time)),
            Markup::Inline(confirm_buttons()),
        )]
    }

    async fn confirm_notification(&self, user: &User) -> Result<Vec<Reply>> {
        let chat_id = user.chat_id;
        let Some(Dialog::ConfirmNotification { threshold, check_time }) = self.current_dialog(chat_id) else {
            return Ok(vec![Reply::edit(messages::EXPIRED_ACTION)]);
        };
        self.dialogs.remove(&chat_id);

        let notification = self
            .repo
            .upsert_notification(chat_id, &user.account_login, threshold, check_time)
            .await?;
        self.audit(
            LogLevel::Success,
            actions::NOTIFICATION_CREATED,
            format!(
                "Chat {chat_id} set notification #{} for {} at threshold {}",
                notification.id,
                notification.account_login,
                crate::models::format_amount(threshold)
            ),
        )
        .await;

        Ok(vec![Reply::edit_with(
            messages::notification_set(&notification),
            vec![back_row()],
        )])
    }

    async fn list_notifications(&self, chat_id: i64) -> Result<Vec<Reply>> {
        let notifications = self.repo.user_notifications(chat_id).await?;
        if notifications.is_empty() {
            return Ok(vec![Reply::edit_with(messages::NO_NOTIFICATIONS, vec![back_row()])]);
        }

        let mut rows: Vec<Vec<Button>> = notifications
            .iter()
            .filter(|n| n.sent)
            .map(|n| vec![Button::new(messages::rearm_button(n.id), Callback::Rearm(n.id))])
            .collect();
        rows.push(back_row());

        Ok(vec![Reply::edit_with(messages::notification_list(&notifications), rows)])
    }

    async fn delete_menu(&self, chat_id: i64) -> Result<Vec<Reply>> {
        let notifications = self.repo.user_notifications(chat_id).await?;
        if notifications.is_empty() {
            return Ok(vec![Reply::edit_with(messages::NO_NOTIFICATIONS, vec![back_row()])]);
        }

        let mut rows: Vec<Vec<Button>> = notifications
            .iter()
            .map(|n| vec![Button::new(messages::delete_button(n), Callback::Delete(n.id))])
            .collect();
        rows.push(back_row());

        Ok(vec![Reply::edit_with(messages::DELETE_SELECT, rows)])
    }
}

fn confirm_buttons() -> Vec<Vec<Button>> {
    vec![vec![
        Button::new(messages::BTN_CONFIRM, Callback::ConfirmSet),
        Button::new(messages::BTN_CANCEL, Callback::Cancel),
    ]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/START@billrelay_bot"), Some(Command::Start));
        assert_eq!(Command::parse("/logout now"), Some(Command::Logout));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("start"), None);
        assert_eq!(Command::parse(""), None);
    }
}
