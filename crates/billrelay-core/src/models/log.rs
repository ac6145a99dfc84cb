//! Audit log entries

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::store::layout::{self, cell, logs as col};

/// Log entry level, stored in the `status` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Informational
    #[default]
    Info,
    /// A user action completed
    Success,
    /// Something unusual
    Warning,
    /// An operation failed
    Error,
}

impl LogLevel {
    /// Value stored in the sheet
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was written, in the store timezone
    pub timestamp: NaiveDateTime,
    /// Level
    pub level: LogLevel,
    /// Action code, e.g. `REGISTRATION`
    pub action: String,
    /// Free-form message
    pub message: String,
}

impl LogEntry {
    /// Cells of the row, in sheet order
    pub fn to_row(&self) -> Vec<String> {
        let mut cells = vec![String::new(); col::WIDTH];
        cells[col::DATE] = self.timestamp.format(layout::DATE_FORMAT).to_string();
        cells[col::TIME] = self.timestamp.format(layout::TIME_FORMAT).to_string();
        cells[col::LEVEL] = self.level.as_str().to_string();
        cells[col::ACTION] = self.action.clone();
        cells[col::MESSAGE] = self.message.clone();
        cells
    }

    /// Date and time of a stored row, if both cells parse
    pub fn row_timestamp(cells: &[String]) -> Option<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(cell(cells, col::DATE), layout::DATE_FORMAT).ok()?;
        let time = NaiveTime::parse_from_str(cell(cells, col::TIME), layout::TIME_FORMAT)
            .unwrap_or(NaiveTime::MIN);
        Some(date.and_time(time))
    }
}

/// Action codes written to the audit log
pub mod actions {
    /// Registration completed
    pub const REGISTRATION: &str = "REGISTRATION";
    /// Balance viewed
    pub const BALANCE_VIEW: &str = "BALANCE_VIEW";
    /// Notification set or updated
    pub const NOTIFICATION_CREATED: &str = "NOTIFICATION_CREATED";
    /// Notification re-armed
    pub const NOTIFICATION_REARMED: &str = "NOTIFICATION_REARMED";
    /// Notification deleted
    pub const NOTIFICATION_DELETED: &str = "NOTIFICATION_DELETED";
    /// Alert delivered
    pub const NOTIFICATION_SENT: &str = "NOTIFICATION_SENT";
    /// User logged out
    pub const LOGOUT: &str = "LOGOUT";
    /// Access refused after an admin recheck
    pub const ACCESS_REVOKED: &str = "ACCESS_REVOKED";
    /// Old log rows removed
    pub const LOG_CLEANUP: &str = "LOG_CLEANUP";
    /// Repository cache flushed
    pub const CACHE_CLEAR: &str = "CACHE_CLEAR";
}
