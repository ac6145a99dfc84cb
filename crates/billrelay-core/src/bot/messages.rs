//! Texts sent by the bot

#![allow(missing_docs)]

use crate::models::{format_amount, CheckTime, Notification};

pub const WELCOME: &str = "Welcome!\n\n\
    This bot shows your billing account balance and warns you when it runs low.\n\n\
    To get started, enter your provider login:";
pub const LOGIN_INVALID: &str = "A login has at least 3 characters. Try again:";
pub const LOGIN_NOT_FOUND: &str = "Login not found.\n\n\
    Check the spelling or contact your administrator. Enter your login again:";
pub const NOT_ADMIN: &str = "Access to the bot is limited to account administrators.\n\n\
    Contact your administrator if you think this is a mistake.";
pub const EMAIL_REQUEST: &str = "Now enter your email:";
pub const EMAIL_INVALID: &str = "Invalid email format. Try again:";
pub const PASSWORD_REQUEST: &str = "Enter your provider password.\n\n\
    The message with your password is deleted right after the check.";
pub const AUTH_SUCCESS: &str = "Signed in successfully!\n\nAll bot features are now available.";
pub const AUTH_FAILED: &str = "Wrong login or password.\n\nTry again: /start";
pub const AUTH_UNAVAILABLE: &str = "The billing service is not responding.\n\nTry again later: /start";
pub const ALREADY_REGISTERED: &str = "You are already registered!";
pub const NOT_REGISTERED: &str = "You are not registered.\n\nUse /start to register.";
pub const AUTH_EXPIRED: &str = "Your session has ended.\n\nSign in again: /start";
pub const ACCESS_REVOKED: &str = "Your administrator access has been revoked.\n\n\
    Contact your administrator to restore it.";
pub const GENERIC_ERROR: &str = "Something went wrong.\n\nPlease try again later.";
pub const BALANCE_ERROR: &str = "Balance information is not available.\n\nPlease try again later.";
pub const CANCELLED: &str = "Cancelled.";
pub const UNKNOWN_INPUT: &str = "Please use the menu buttons or /help.";
pub const EXPIRED_ACTION: &str = "This action has expired. Open the menu again.";

pub const NOTIFICATIONS_MENU: &str = "Balance notifications\n\nChoose an action:";
pub const NO_NOTIFICATIONS: &str = "You have no active notifications.";
pub const AMOUNT_REQUEST: &str = "Enter the balance at or below which you want to be notified.\n\n\
    For example: 5000";
pub const AMOUNT_INVALID: &str = "Invalid amount.\n\nEnter a positive number (for example: 5000):";
pub const TIME_REQUEST: &str = "Choose when to check the balance.\n\n\
    The alert is sent at that time if the balance is at or below the threshold.";
pub const CUSTOM_TIME_REQUEST: &str = "Enter the time as HH:MM\n\nFor example: 09:30 or 18:00";
pub const TIME_INVALID: &str = "Invalid time.\n\nEnter the time as HH:MM (for example: 09:30):";
pub const DELETE_SELECT: &str = "Select the notification to delete:";
pub const NOTIFICATION_NOT_FOUND: &str = "Notification not found.";

pub const LOGOUT_CONFIRM: &str = "Do you want to log out?\n\n\
    Your notifications will be removed.";
pub const LOGOUT_CANCELLED: &str = "Logout cancelled.";
pub const LOGOUT_HINT: &str = "Use /start to sign in again.";

pub const HELP: &str = "Available commands:\n\n\
    /start - Registration and sign in\n\
    /logout - Log out\n\
    /cancel - Cancel the current action\n\
    /help - Show this help\n\n\
    Balance - Your account balance\n\
    Notifications - Low balance notifications";

pub const BTN_BALANCE: &str = "💰 Balance";
pub const BTN_NOTIFICATIONS: &str = "🔔 Notifications";
pub const BTN_HELP: &str = "❓ Help";
pub const BTN_SET_NOTIFICATION: &str = "➕ Set new";
pub const BTN_MY_NOTIFICATIONS: &str = "📋 My notifications";
pub const BTN_DELETE: &str = "🗑 Delete";
pub const BTN_BACK: &str = "⬅️ Back";
pub const BTN_CONFIRM: &str = "✅ Confirm";
pub const BTN_CANCEL: &str = "❌ Cancel";
pub const BTN_CUSTOM_TIME: &str = "🕐 Custom time";
pub const BTN_EVERY_CHECK: &str = "🔁 Every check";
pub const BTN_LOGOUT: &str = "✅ Log out";

fn time_label(check_time: Option<CheckTime>) -> String {
    check_time.map_or_else(|| "every check".to_string(), |t| t.to_string())
}

pub fn greeting(name: &str) -> String {
    format!("{ALREADY_REGISTERED}\n\nHello, {name}. Use the menu below.")
}

pub fn confirm_notification(threshold: f64, check_time: Option<CheckTime>) -> String {
    format!(
        "Confirm the notification:\n\n\
         Threshold: {}\n\
         Check time: {}\n\n\
         You are notified when the balance is at or below the threshold.",
        format_amount(threshold),
        time_label(check_time)
    )
}

pub fn notification_set(notification: &Notification) -> String {
    format!(
        "Notification set!\n\n\
         Threshold: {}\n\
         Check time: {}\n\n\
         You will get a message when the balance drops to the threshold.",
        format_amount(notification.threshold),
        time_label(notification.check_time)
    )
}

pub fn notification_list(notifications: &[Notification]) -> String {
    let mut text = String::from("Your notifications:\n");
    for notification in notifications {
        let state = if notification.sent {
            "sent, waiting for re-arm"
        } else {
            "armed"
        };
        text.push_str(&format!(
            "\n#{} · {} · threshold {} · {} · {}",
            notification.id,
            notification.account_login,
            format_amount(notification.threshold),
            time_label(notification.check_time),
            state
        ));
        if let Some(balance) = notification.last_balance {
            text.push_str(&format!(" (last balance {})", format_amount(balance)));
        }
    }
    text
}

pub fn confirm_delete(notification: &Notification) -> String {
    format!(
        "Delete this notification?\n\n\
         ID: {}\n\
         Threshold: {}\n\
         Time: {}",
        notification.id,
        format_amount(notification.threshold),
        time_label(notification.check_time)
    )
}

pub fn notification_deleted(id: u64) -> String {
    format!("Notification #{id} deleted.")
}

pub fn notification_rearmed(id: u64) -> String {
    format!("Notification #{id} is armed again.")
}

pub fn logged_out(removed: usize) -> String {
    format!("You have logged out. Notifications removed: {removed}.")
}

pub fn rearm_button(id: u64) -> String {
    format!("🔄 Re-arm #{id}")
}

pub fn delete_button(notification: &Notification) -> String {
    format!(
        "🗑 #{} · {} · {}",
        notification.id,
        format_amount(notification.threshold),
        time_label(notification.check_time)
    )
}
