//! Inline button payloads

use std::fmt;
use std::str::FromStr;

use crate::models::CheckTime;

/// Action carried by an inline button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    /// Start setting a threshold
    SetNotification,
    /// List active notifications
    ListNotifications,
    /// Choose a notification to delete
    DeleteMenu,
    /// Ask to confirm deleting a notification
    Delete(u64),
    /// Delete a notification
    ConfirmDelete(u64),
    /// Pick a preset check time, or every check when `None`
    Time(Option<CheckTime>),
    /// Enter a check time by hand
    CustomTime,
    /// Save the notification being set
    ConfirmSet,
    /// Abort the notification dialog
    Cancel,
    /// Back to the notifications menu
    Back,
    /// Arm a sent notification again
    Rearm(u64),
    /// Log out
    ConfirmLogout,
    /// Keep the session
    CancelLogout,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetNotification => f.write_str("notif:set"),
            Self::ListNotifications => f.write_str("notif:list"),
            Self::DeleteMenu => f.write_str("notif:delete"),
            Self::Delete(id) => write!(f, "notif:del:{id}"),
            Self::ConfirmDelete(id) => write!(f, "notif:confirm_del:{id}"),
            Self::Time(Some(time)) => write!(f, "notif:time:{time}"),
            Self::Time(None) => f.write_str("notif:time:any"),
            Self::CustomTime => f.write_str("notif:custom_time"),
            Self::ConfirmSet => f.write_str("notif:confirm_set"),
            Self::Cancel => f.write_str("notif:cancel"),
            Self::Back => f.write_str("notif:back"),
            Self::Rearm(id) => write!(f, "notif:rearm:{id}"),
            Self::ConfirmLogout => f.write_str("logout:confirm"),
            Self::CancelLogout => f.write_str("logout:cancel"),
        }
    }
}

/// Unknown or malformed callback data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCallback(pub String);

impl FromStr for Callback {
    type Err = UnknownCallback;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownCallback(s.to_string());
        let id = |value: &str| value.parse::<u64>().map_err(|_| unknown());

        let parsed = match s {
            "notif:set" => Self::SetNotification,
            "notif:list" => Self::ListNotifications,
            "notif:delete" => Self::DeleteMenu,
            "notif:time:any" => Self::Time(None),
            "notif:custom_time" => Self::CustomTime,
            "notif:confirm_set" => Self::ConfirmSet,
            "notif:cancel" => Self::Cancel,
            "notif:back" => Self::Back,
            "logout:confirm" => Self::ConfirmLogout,
            "logout:cancel" => Self::CancelLogout,
            _ => {
                if let Some(rest) = s.strip_prefix("notif:confirm_del:") {
                    Self::ConfirmDelete(id(rest)?)
                } else if let Some(rest) = s.strip_prefix("notif:del:") {
                    Self::Delete(id(rest)?)
                } else if let Some(rest) = s.strip_prefix("notif:rearm:") {
                    Self::Rearm(id(rest)?)
                } else if let Some(rest) = s.strip_prefix("notif:time:") {
                    Self::Time(Some(rest.parse().map_err(|_| unknown())?))
                } else {
                    return Err(unknown());
                }
            }
        };
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payloads_parse_back() {
        let all = [
            Callback::SetNotification,
            Callback::ListNotifications,
            Callback::DeleteMenu,
            Callback::Delete(12),
            Callback::ConfirmDelete(12),
            Callback::Time(CheckTime::new(9, 30)),
            Callback::Time(None),
            Callback::CustomTime,
            Callback::ConfirmSet,
            Callback::Cancel,
            Callback::Back,
            Callback::Rearm(3),
            Callback::ConfirmLogout,
            Callback::CancelLogout,
        ];
        for callback in all {
            let data = callback.to_string();
            assert!(data.len() <= 64, "{data} exceeds the Telegram limit");
            assert_eq!(data.parse::<Callback>(), Ok(callback));
        }
    }

    #[test]
    fn test_malformed_payloads() {
        assert!("notif:del:abc".parse::<Callback>().is_err());
        assert!("notif:time:25:00".parse::<Callback>().is_err());
        assert!("something_else".parse::<Callback>().is_err());
    }
}
