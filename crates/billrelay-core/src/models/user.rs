//! Registered chat users

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::billing::BillingToken;
use crate::store::layout::{self, cell, chats as col, non_empty, parse_timestamp};

use super::directory::parse_admin_flag;

/// How long an admin check stays valid
pub const ADMIN_RECHECK_INTERVAL_DAYS: i64 = 365;

/// Authentication state of a chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// Registration completed
    Passed,
    /// User logged out
    LoggedOut,
    /// Anything else found in the sheet
    #[default]
    Unknown,
}

impl AuthStatus {
    /// Value stored in the sheet
    pub fn as_cell(&self) -> &'static str {
        match self {
            Self::Passed => layout::AUTH_STATUS_PASSED,
            Self::LoggedOut => layout::AUTH_STATUS_LOGGED_OUT,
            Self::Unknown => "",
        }
    }

    /// Parse a stored value
    pub fn from_cell(value: &str) -> Self {
        match value.trim() {
            layout::AUTH_STATUS_PASSED => Self::Passed,
            layout::AUTH_STATUS_LOGGED_OUT => Self::LoggedOut,
            _ => Self::Unknown,
        }
    }
}

/// Telegram profile fields copied into the chat row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatProfile {
    /// Telegram user id
    pub user_id: i64,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// `@username` without the `@`
    pub username: String,
}

/// A chat registered with the bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Telegram chat id
    pub chat_id: i64,

    /// Telegram profile
    #[serde(flatten)]
    pub profile: ChatProfile,

    /// Provider login
    pub user_login: String,

    /// Billing account the login belongs to
    pub account_login: String,

    /// Admin flag at the last check
    pub is_admin: bool,

    /// Contact email
    pub email: String,

    /// Provider token from the last successful login
    #[serde(skip)]
    pub token: Option<BillingToken>,

    /// Authentication state
    pub auth_status: AuthStatus,

    /// Last directory check
    pub last_check: Option<NaiveDateTime>,

    /// Next directory check
    pub next_check: Option<NaiveDateTime>,

    /// Registration time
    pub registered_at: Option<NaiveDateTime>,

    /// Last interaction
    pub last_activity: Option<NaiveDateTime>,
}

impl User {
    /// Parse a chat row; `None` when the chat id does not parse.
    pub fn from_row(cells: &[String]) -> Option<Self> {
        let chat_id = cell(cells, col::CHAT_ID).parse().ok()?;

        Some(Self {
            chat_id,
            profile: ChatProfile {
                user_id: cell(cells, col::USER_ID).parse().unwrap_or_default(),
                first_name: cell(cells, col::FIRST_NAME).to_string(),
                last_name: cell(cells, col::LAST_NAME).to_string(),
                username: cell(cells, col::USERNAME).to_string(),
            },
            user_login: cell(cells, col::USER_LOGIN).to_string(),
            account_login: cell(cells, col::ACCOUNT_LOGIN).to_string(),
            is_admin: parse_admin_flag(cell(cells, col::IS_ADMIN)),
            email: cell(cells, col::EMAIL).to_string(),
            token: non_empty(cells, col::TOKEN).map(BillingToken::new),
            auth_status: AuthStatus::from_cell(cell(cells, col::AUTH_STATUS)),
            last_check: non_empty(cells, col::LAST_CHECK).and_then(parse_timestamp),
            next_check: non_empty(cells, col::NEXT_CHECK).and_then(parse_timestamp),
            registered_at: non_empty(cells, col::REGISTERED_AT).and_then(parse_timestamp),
            last_activity: non_empty(cells, col::LAST_ACTIVITY).and_then(parse_timestamp),
        })
    }

    /// Cells of the row, in sheet order
    pub fn to_row(&self) -> Vec<String> {
        let mut cells = vec![String::new(); col::WIDTH];
        cells[col::CHAT_ID] = self.chat_id.to_string();
        cells[col::USER_ID] = self.profile.user_id.to_string();
        cells[col::FIRST_NAME] = self.profile.first_name.clone();
        cells[col::LAST_NAME] = self.profile.last_name.clone();
        cells[col::USERNAME] = self.profile.username.clone();
        cells[col::USER_LOGIN] = self.user_login.clone();
        cells[col::ACCOUNT_LOGIN] = self.account_login.clone();
        cells[col::IS_ADMIN] = admin_cell(self.is_admin).to_string();
        cells[col::EMAIL] = self.email.clone();
        cells[col::TOKEN] = self
            .token
            .as_ref()
            .map(|t| t.expose().to_string())
            .unwrap_or_default();
        cells[col::AUTH_STATUS] = self.auth_status.as_cell().to_string();
        cells[col::LAST_CHECK] = layout::format_optional_timestamp(self.last_check.as_ref());
        cells[col::NEXT_CHECK] = layout::format_optional_timestamp(self.next_check.as_ref());
        cells[col::REGISTERED_AT] = layout::format_optional_timestamp(self.registered_at.as_ref());
        cells[col::LAST_ACTIVITY] = layout::format_optional_timestamp(self.last_activity.as_ref());
        cells
    }

    /// Whether the chat completed registration and has not logged out
    pub fn is_authenticated(&self) -> bool {
        self.auth_status == AuthStatus::Passed
    }

    /// Whether the admin flag has to be re-read from the directory
    pub fn needs_admin_recheck(&self, now: NaiveDateTime) -> bool {
        self.next_check.map_or(true, |next| next <= now)
    }

    /// Record a directory check made at `now`
    pub fn mark_checked(&mut self, now: NaiveDateTime, is_admin: bool) {
        self.is_admin = is_admin;
        self.last_check = Some(now);
        self.next_check = Some(now + Duration::days(ADMIN_RECHECK_INTERVAL_DAYS));
    }

    /// Name to greet the user with
    pub fn display_name(&self) -> &str {
        if self.profile.first_name.is_empty() {
            &self.user_login
        } else {
            &self.profile.first_name
        }
    }
}

/// Stored admin flag
pub fn admin_cell(is_admin: bool) -> &'static str {
    if is_admin {
        layout::ADMIN_YES
    } else {
        layout::ADMIN_NO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn create_test_user() -> User {
        User {
            chat_id: 1001,
            profile: ChatProfile {
                user_id: 42,
                first_name: "Ivan".to_string(),
                last_name: String::new(),
                username: "ivan".to_string(),
            },
            user_login: "ivan".to_string(),
            account_login: "acme".to_string(),
            is_admin: true,
            email: "ivan@example.com".to_string(),
            token: Some(BillingToken::new("secret")),
            auth_status: AuthStatus::Passed,
            last_check: Some(ts(1, 9)),
            next_check: Some(ts(1, 9) + Duration::days(ADMIN_RECHECK_INTERVAL_DAYS)),
            registered_at: Some(ts(1, 9)),
            last_activity: None,
        }
    }

    #[test]
    fn test_row_mapping() {
        let user = create_test_user();
        let cells = user.to_row();

        assert_eq!(cells.len(), col::WIDTH);
        assert_eq!(cells[col::IS_ADMIN], "да");
        assert_eq!(cells[col::AUTH_STATUS], "Пройдена");
        assert_eq!(cells[col::TOKEN], "secret");
        assert_eq!(cells[col::NEXT_CHECK], "2027-03-01 09:00:00");

        let parsed = User::from_row(&cells).unwrap();
        assert_eq!(parsed, user);
    }

    #[test]
    fn test_needs_admin_recheck() {
        let mut user = create_test_user();
        assert!(!user.needs_admin_recheck(ts(2, 9)));

        user.next_check = Some(ts(2, 9));
        assert!(user.needs_admin_recheck(ts(2, 9)));

        user.next_check = None;
        assert!(user.needs_admin_recheck(ts(2, 9)));
    }

    #[test]
    fn test_mark_checked() {
        let mut user = create_test_user();
        user.mark_checked(ts(5, 12), false);

        assert!(!user.is_admin);
        assert_eq!(user.last_check, Some(ts(5, 12)));
        assert_eq!(user.next_check, Some(ts(5, 12) + Duration::days(365)));
    }

    #[test]
    fn test_logged_out_user_is_not_authenticated() {
        let mut user = create_test_user();
        user.auth_status = AuthStatus::from_cell("Выход");
        assert!(!user.is_authenticated());
        assert_eq!(AuthStatus::from_cell("garbage"), AuthStatus::Unknown);
    }
}
