//! Provider directory entries

use serde::{Deserialize, Serialize};

use crate::store::layout::{self, cell, directory as col};

/// A login listed in the billing team's directory sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Login of the person
    pub user_login: String,

    /// Billing account the login belongs to
    pub account_login: String,

    /// Whether the login may use the bot
    pub is_admin: bool,

    /// Offset of the user's local time from UTC, in hours
    pub utc_offset_hours: Option<i32>,
}

impl DirectoryEntry {
    /// Parse a directory row; `None` when the login cell is empty.
    pub fn from_row(cells: &[String]) -> Option<Self> {
        let user_login = cell(cells, col::LOGIN);
        if user_login.is_empty() {
            return None;
        }

        Some(Self {
            user_login: user_login.to_string(),
            account_login: cell(cells, col::ACCOUNT).to_string(),
            is_admin: parse_admin_flag(cell(cells, col::IS_ADMIN)),
            utc_offset_hours: parse_utc_offset(cell(cells, col::UTC_OFFSET)),
        })
    }
}

/// Admin flag as written by the billing team (`да`, also `yes`/`true`/`1`)
pub fn parse_admin_flag(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == layout::ADMIN_YES || matches!(value.as_str(), "yes" | "true" | "1")
}

/// UTC offset cell: `3`, `+3`, `UTC+3`, `-5`
pub fn parse_utc_offset(value: &str) -> Option<i32> {
    let value = value.trim();
    let value = value
        .strip_prefix("UTC")
        .or_else(|| value.strip_prefix("GMT"))
        .unwrap_or(value)
        .trim();
    let offset: i32 = value.trim_start_matches('+').parse().ok()?;
    (-12..=14).contains(&offset).then_some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn directory_row(login: &str, account: &str, tz: &str, admin: &str) -> Vec<String> {
        let mut cells = vec![String::new(); 10];
        cells[col::LOGIN] = login.to_string();
        cells[col::ACCOUNT] = account.to_string();
        cells[col::UTC_OFFSET] = tz.to_string();
        cells[col::IS_ADMIN] = admin.to_string();
        cells
    }

    #[test]
    fn test_from_row() {
        let entry = DirectoryEntry::from_row(&directory_row("ivan", "acme", "5", "Да")).unwrap();
        assert_eq!(entry.account_login, "acme");
        assert!(entry.is_admin);
        assert_eq!(entry.utc_offset_hours, Some(5));
    }

    #[test]
    fn test_from_row_skips_empty_login() {
        assert!(DirectoryEntry::from_row(&directory_row("", "acme", "", "да")).is_none());
        assert!(DirectoryEntry::from_row(&[]).is_none());
    }

    #[rstest]
    #[case("да", true)]
    #[case("ДА", true)]
    #[case("yes", true)]
    #[case("нет", false)]
    #[case("", false)]
    fn test_parse_admin_flag(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(parse_admin_flag(input), expected);
    }

    #[rstest]
    #[case("3", Some(3))]
    #[case("+7", Some(7))]
    #[case("UTC+5", Some(5))]
    #[case("-5", Some(-5))]
    #[case("", None)]
    #[case("42", None)]
    fn test_parse_utc_offset(#[case] input: &str, #[case] expected: Option<i32>) {
        assert_eq!(parse_utc_offset(input), expected);
    }
}
