//! Account balance rows from the nightly billing export

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::layout::{balances as col, cell, parse_number};

use super::format_amount;

/// Balance and usage figures of one billing account.
///
/// Cells are kept as exported; numeric accessors parse them leniently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Billing account
    pub account_login: String,
    /// Organization name
    pub organization: String,
    /// Tariff per object
    pub tariff: String,
    /// Average daily charge
    pub avg_daily_charge: String,
    /// Number of active objects
    pub active_objects: String,
    /// Remaining balance
    pub balance: String,
    /// Days until the balance runs out
    pub days_left: String,
}

impl AccountBalance {
    /// Parse a balance row; `None` when the account cell is empty.
    pub fn from_row(cells: &[String]) -> Option<Self> {
        let account_login = cell(cells, col::ACCOUNT);
        if account_login.is_empty() {
            return None;
        }

        Some(Self {
            account_login: account_login.to_string(),
            organization: cell(cells, col::ORGANIZATION).to_string(),
            tariff: cell(cells, col::TARIFF).to_string(),
            avg_daily_charge: cell(cells, col::AVG_CHARGE).to_string(),
            active_objects: cell(cells, col::ACTIVE_OBJECTS).to_string(),
            balance: cell(cells, col::BALANCE).to_string(),
            days_left: cell(cells, col::DAYS_LEFT).to_string(),
        })
    }

    /// Balance as a number
    pub fn balance_value(&self) -> Option<f64> {
        parse_number(&self.balance)
    }

    /// Remaining days as a number
    pub fn days_left_value(&self) -> Option<f64> {
        parse_number(&self.days_left)
    }

    /// Message shown by the "Balance" menu item
    pub fn format_message(&self, date: NaiveDate) -> String {
        let mut lines = vec![format!("Balance as of {}", date.format("%d.%m.%Y"))];
        lines.push(String::new());
        if !self.organization.is_empty() {
            lines.push(format!("Organization: {}", self.organization));
        }
        lines.push(format!("Account: {}", self.account_login));
        lines.push(format!(
            "Balance: {}",
            self.balance_value()
                .map_or_else(|| dash(&self.balance), format_amount)
        ));
        lines.push(format!(
            "Days left: {}",
            self.days_left_value()
                .map_or_else(|| dash(&self.days_left), |d| format!("{d:.0}"))
        ));
        lines.push(format!("Active objects: {}", dash(&self.active_objects)));
        lines.push(format!("Tariff per object: {}", dash(&self.tariff)));
        lines.push(format!("Average daily charge: {}", dash(&self.avg_daily_charge)));
        lines.join("\n")
    }
}

fn dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}
