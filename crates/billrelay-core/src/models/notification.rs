//! Balance notification models

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::store::layout::{
    self, cell, non_empty, notifications as col, parse_number, parse_timestamp,
};

static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").expect("valid time pattern"));

/// Local time of day at which a notification is checked (`HH:MM`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CheckTime(NaiveTime);

impl CheckTime {
    /// Build from hour and minute; `None` when out of range.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Underlying time of day
    pub fn time(self) -> NaiveTime {
        self.0
    }

    /// Hour component
    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    /// Minute component
    pub fn minute(self) -> u32 {
        self.0.minute()
    }
}

impl Default for CheckTime {
    fn default() -> Self {
        Self(NaiveTime::MIN)
    }
}

impl FromStr for CheckTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = TIME_PATTERN
            .captures(trimmed)
            .ok_or_else(|| Error::validation(format!("invalid time '{trimmed}', expected HH:MM")))?;
        let hour: u32 = caps[1]
            .parse()
            .map_err(|_| Error::validation(format!("invalid hour in '{trimmed}'")))?;
        let minute: u32 = caps[2]
            .parse()
            .map_err(|_| Error::validation(format!("invalid minute in '{trimmed}'")))?;
        Self::new(hour, minute).ok_or_else(|| Error::validation(format!("invalid time '{trimmed}'")))
    }
}

impl TryFrom<String> for CheckTime {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CheckTime> for String {
    fn from(value: CheckTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CheckTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Whether a notification row is in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Notification is checked by the poller
    #[default]
    Active,
    /// Notification was removed by the user
    Deleted,
}

impl NotificationStatus {
    /// Value stored in the sheet
    pub fn as_cell(self) -> &'static str {
        match self {
            Self::Active => layout::NOTIFICATION_ACTIVE,
            Self::Deleted => layout::NOTIFICATION_DELETED,
        }
    }

    /// Parse a stored value; anything but the active marker counts as deleted.
    pub fn from_cell(value: &str) -> Self {
        if value.trim() == layout::NOTIFICATION_ACTIVE {
            Self::Active
        } else {
            Self::Deleted
        }
    }
}

/// A balance threshold a chat subscribed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Position of the row in the sheet (0 is the header)
    #[serde(skip)]
    pub row: usize,

    /// Notification id, unique within the sheet
    pub id: u64,

    /// Chat that receives the alert
    pub chat_id: i64,

    /// Billing account being watched
    pub account_login: String,

    /// Auth status copied from the chat row when the notification was set
    pub auth_status: String,

    /// Row status
    pub status: NotificationStatus,

    /// Alert when the balance drops to or below this amount
    pub threshold: f64,

    /// Local time of day of the daily check; checked every cycle when unset
    pub check_time: Option<CheckTime>,

    /// Balance seen by the last check
    pub last_balance: Option<f64>,

    /// An alert was sent and the row waits for a re-arm
    pub sent: bool,

    /// Time of the last check, in the store timezone
    pub last_checked: Option<NaiveDateTime>,
}

impl Notification {
    /// Parse a sheet row; `None` for rows without a chat or notification id.
    pub fn from_row(row: usize, cells: &[String]) -> Option<Self> {
        let chat_id = cell(cells, col::CHAT_ID).parse().ok()?;
        let id = cell(cells, col::ID).parse().ok()?;

        Some(Self {
            row,
            id,
            chat_id,
            account_login: cell(cells, col::ACCOUNT).to_string(),
            auth_status: cell(cells, col::AUTH_STATUS).to_string(),
            status: NotificationStatus::from_cell(cell(cells, col::STATUS)),
            threshold: parse_number(cell(cells, col::THRESHOLD)).unwrap_or(0.0),
            check_time: non_empty(cells, col::CHECK_TIME).and_then(|t| t.parse().ok()),
            last_balance: parse_number(cell(cells, col::LAST_BALANCE)),
            sent: cell(cells, col::SEND_STATUS) == layout::SEND_STATUS_SENT,
            last_checked: non_empty(cells, col::LAST_CHECKED).and_then(parse_timestamp),
        })
    }

    /// Cells of the row, in sheet order
    pub fn to_row(&self) -> Vec<String> {
        let mut cells = vec![String::new(); col::WIDTH];
        cells[col::CHAT_ID] = self.chat_id.to_string();
        cells[col::ACCOUNT] = self.account_login.clone();
        cells[col::AUTH_STATUS] = self.auth_status.clone();
        cells[col::ID] = self.id.to_string();
        cells[col::STATUS] = self.status.as_cell().to_string();
        cells[col::THRESHOLD] = super::format_amount(self.threshold);
        cells[col::CHECK_TIME] = self.check_time.map(|t| t.to_string()).unwrap_or_default();
        cells[col::LAST_BALANCE] = self.last_balance.map(super::format_amount).unwrap_or_default();
        cells[col::SEND_STATUS] = send_status_cell(self.sent).to_string();
        cells[col::LAST_CHECKED] = layout::format_optional_timestamp(self.last_checked.as_ref());
        cells
    }

    /// Whether the poller looks at this row
    pub fn is_active(&self) -> bool {
        self.status == NotificationStatus::Active
    }

    /// Whether `balance` should trigger an alert for this row
    pub fn crossed(&self, balance: f64) -> bool {
        !self.sent && balance <= self.threshold
    }

    /// Whether `other` is the same active subscription with the same
    /// threshold, check time and sent flag. Thresholds compare to the cent.
    pub fn same_settings(&self, other: &Self) -> bool {
        self.id == other.id
            && self.chat_id == other.chat_id
            && self.is_active()
            && other.is_active()
            && self.account_login == other.account_login
            && (self.threshold - other.threshold).abs() < 0.005
            && self.check_time == other.check_time
            && self.sent == other.sent
    }
}

/// Stored send status for the sent flag
pub fn send_status_cell(sent: bool) -> &'static str {
    if sent {
        layout::SEND_STATUS_SENT
    } else {
        layout::SEND_STATUS_ARMED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn create_test_notification() -> Notification {
        Notification {
            row: 3,
            id: 7,
            chat_id: 1001,
            account_login: "acme".to_string(),
            auth_status: layout::AUTH_STATUS_PASSED.to_string(),
            status: NotificationStatus::Active,
            threshold: 5000.0,
            check_time: CheckTime::new(10, 0),
            last_balance: None,
            sent: false,
            last_checked: None,
        }
    }

    #[rstest]
    #[case("10:00", Some((10, 0)))]
    #[case("9:05", Some((9, 5)))]
    #[case("23:59", Some((23, 59)))]
    #[case(" 07:30 ", Some((7, 30)))]
    #[case("24:00", None)]
    #[case("12:60", None)]
    #[case("12", None)]
    #[case("noon", None)]
    fn test_check_time_parsing(#[case] input: &str, #[case] expected: Option<(u32, u32)>) {
        let parsed = input.parse::<CheckTime>().ok().map(|t| (t.hour(), t.minute()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_check_time_display_is_zero_padded() {
        assert_eq!(CheckTime::new(9, 5).unwrap().to_string(), "09:05");
    }

    #[test]
    fn test_same_settings() {
        let original = create_test_notification();
        let mut stored = original.clone();
        stored.threshold = 5000.001;
        stored.last_balance = Some(10.0);
        assert!(original.same_settings(&stored));

        let mut rearmed = original.clone();
        rearmed.threshold = 500.0;
        assert!(!original.same_settings(&rearmed));

        let mut sent = original.clone();
        sent.sent = true;
        assert!(!original.same_settings(&sent));

        let mut deleted = original.clone();
        deleted.status = NotificationStatus::Deleted;
        assert!(!original.same_settings(&deleted));
    }

    #[test]
    fn test_crossed_respects_sent_flag() {
        let mut notification = create_test_notification();
        assert!(notification.crossed(5000.0));
        assert!(notification.crossed(-10.0));
        assert!(!notification.crossed(5000.01));

        notification.sent = true;
        assert!(!notification.crossed(100.0));
    }

    #[test]
    fn test_row_mapping() {
        let mut notification = create_test_notification();
        notification.sent = true;
        notification.last_balance = Some(4200.5);

        let cells = notification.to_row();
        assert_eq!(cells[col::SEND_STATUS], layout::SEND_STATUS_SENT);
        assert_eq!(cells[col::CHECK_TIME], "10:00");
        assert_eq!(cells[col::LAST_BALANCE], "4200.50");

        let parsed = Notification::from_row(3, &cells).unwrap();
        assert_eq!(parsed, notification);
    }

    #[test]
    fn test_from_row_tolerates_short_rows() {
        let cells: Vec<String> = ["1001", "acme", "", "4", "Установлено", "1 000,5"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let parsed = Notification::from_row(1, &cells).unwrap();
        assert!(parsed.is_active());
        assert!((parsed.threshold - 1000.5).abs() < f64::EPSILON);
        assert_eq!(parsed.check_time, None);
        assert!(!parsed.sent);
    }

    #[test]
    fn test_from_row_requires_ids() {
        let cells = vec!["chat_id".to_string(), "account_login".to_string()];
        assert!(Notification::from_row(0, &cells).is_none());
    }
}
