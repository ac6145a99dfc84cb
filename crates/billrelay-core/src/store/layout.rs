//! Sheet names, column positions and cell vocabulary of the shared spreadsheet
//!
//! The spreadsheet is maintained together with the billing team, so the
//! names and status values below are data, not presentation.

use chrono::NaiveDateTime;

/// Directory of provider logins, maintained by the billing team
pub const SHEET_DIRECTORY: &str = "Пользователи";
/// Nightly balance export
pub const SHEET_BALANCES: &str = "Данные";
/// Registered chats
pub const SHEET_CHATS: &str = "Чаты";
/// Balance notifications
pub const SHEET_NOTIFICATIONS: &str = "Уведомления";
/// Audit log
pub const SHEET_LOGS: &str = "Logs";

/// Every sheet the repository touches
pub const ALL_SHEETS: [&str; 5] = [
    SHEET_DIRECTORY,
    SHEET_BALANCES,
    SHEET_CHATS,
    SHEET_NOTIFICATIONS,
    SHEET_LOGS,
];

/// Columns of [`SHEET_DIRECTORY`]
pub mod directory {
    pub const LOGIN: usize = 5;
    pub const ACCOUNT: usize = 6;
    pub const UTC_OFFSET: usize = 8;
    pub const IS_ADMIN: usize = 9;
}

/// Columns of [`SHEET_BALANCES`]
pub mod balances {
    pub const ACCOUNT: usize = 1;
    pub const ORGANIZATION: usize = 2;
    pub const TARIFF: usize = 6;
    pub const AVG_CHARGE: usize = 7;
    pub const ACTIVE_OBJECTS: usize = 9;
    pub const BALANCE: usize = 10;
    pub const DAYS_LEFT: usize = 11;
}

/// Columns of [`SHEET_CHATS`]
pub mod chats {
    pub const CHAT_ID: usize = 0;
    pub const USER_ID: usize = 1;
    pub const FIRST_NAME: usize = 2;
    pub const LAST_NAME: usize = 3;
    pub const USERNAME: usize = 4;
    pub const USER_LOGIN: usize = 5;
    pub const ACCOUNT_LOGIN: usize = 6;
    pub const IS_ADMIN: usize = 7;
    pub const EMAIL: usize = 8;
    pub const TOKEN: usize = 9;
    pub const AUTH_STATUS: usize = 10;
    pub const LAST_CHECK: usize = 11;
    pub const NEXT_CHECK: usize = 12;
    pub const REGISTERED_AT: usize = 13;
    pub const LAST_ACTIVITY: usize = 14;
    pub const WIDTH: usize = 15;
}

/// Columns of [`SHEET_NOTIFICATIONS`]
pub mod notifications {
    pub const CHAT_ID: usize = 0;
    pub const ACCOUNT: usize = 1;
    pub const AUTH_STATUS: usize = 2;
    pub const ID: usize = 3;
    pub const STATUS: usize = 4;
    pub const THRESHOLD: usize = 5;
    pub const CHECK_TIME: usize = 6;
    pub const LAST_BALANCE: usize = 7;
    pub const SEND_STATUS: usize = 8;
    pub const LAST_CHECKED: usize = 9;
    pub const WIDTH: usize = 10;
}

/// Columns of [`SHEET_LOGS`]
pub mod logs {
    pub const DATE: usize = 0;
    pub const TIME: usize = 1;
    pub const LEVEL: usize = 2;
    pub const ACTION: usize = 3;
    pub const MESSAGE: usize = 4;
    pub const WIDTH: usize = 5;
}

/// Auth status of a chat that completed registration
pub const AUTH_STATUS_PASSED: &str = "Пройдена";
/// Auth status after `/logout`
pub const AUTH_STATUS_LOGGED_OUT: &str = "Выход";

/// Notification row is in effect
pub const NOTIFICATION_ACTIVE: &str = "Установлено";
/// Notification row was removed by the user
pub const NOTIFICATION_DELETED: &str = "Удалено";

/// Notification is armed: the next crossing sends an alert
pub const SEND_STATUS_ARMED: &str = "Отправить";
/// Alert was sent; the row waits for a re-arm
pub const SEND_STATUS_SENT: &str = "Ожидание";

/// Admin flag value written by the billing team
pub const ADMIN_YES: &str = "да";
/// Admin flag value for non-admins
pub const ADMIN_NO: &str = "нет";

/// Format of timestamps stored in the sheet (store timezone)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Format of the log date column
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Format of the log time column
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Trimmed cell value, empty when the row is shorter than `idx`.
///
/// The Sheets API drops trailing empty cells, so rows are ragged.
pub fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map_or("", |value| value.trim())
}

/// Optional cell value; empty cells are `None`.
pub fn non_empty(row: &[String], idx: usize) -> Option<&str> {
    Some(cell(row, idx)).filter(|value| !value.is_empty())
}

/// Header row written when a sheet is created by the memory backend
pub fn headers(sheet: &str) -> Vec<String> {
    let names: &[&str] = match sheet {
        SHEET_DIRECTORY => &[
            "", "", "", "", "", "Login", "Account", "", "Timezone", "Is Admin",
        ],
        SHEET_BALANCES => &[
            "",
            "Account",
            "Organization",
            "",
            "",
            "",
            "Tariff",
            "Avg charge",
            "",
            "Active objects",
            "Balance",
            "Days left",
        ],
        SHEET_CHATS => &[
            "chat_id",
            "user_id",
            "first_name",
            "last_name",
            "username",
            "user_login",
            "account_login",
            "is_admin",
            "email",
            "token",
            "auth_status",
            "last_check",
            "next_check",
            "registration_date",
            "last_activity",
        ],
        SHEET_NOTIFICATIONS => &[
            "chat_id",
            "account_login",
            "auth_status",
            "notification_id",
            "status",
            "threshold",
            "notification_time",
            "current_balance",
            "send_status",
            "last_checked",
        ],
        SHEET_LOGS => &["date", "time", "status", "action", "message"],
        _ => &[],
    };
    names.iter().map(ToString::to_string).collect()
}

/// Column letters for a 0-based index: 0 -> `A`, 25 -> `Z`, 26 -> `AA`.
pub fn column_letter(idx: usize) -> String {
    let mut n = idx + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Quote a sheet name for use in an A1 range
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()
}

/// Format a timestamp for storage
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Optional timestamp formatted for storage; empty when unset
pub fn format_optional_timestamp(value: Option<&NaiveDateTime>) -> String {
    value.map(format_timestamp).unwrap_or_default()
}

/// Parse a number written with Russian formatting (`"12 345,67"`).
pub fn parse_number(value: &str) -> Option<f64> {
    let normalized: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
