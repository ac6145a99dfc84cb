//! Data models for BillRelay
//!
//! Every model maps to a row of one sheet of the shared spreadsheet.

mod balance;
mod directory;
mod log;
mod notification;
mod user;

pub use balance::*;
pub use directory::*;
pub use log::*;
pub use notification::*;
pub use user::*;

/// Format an amount the way the bot shows and stores it: whole amounts
/// without decimals, everything else with two.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(5000.0), "5000");
        assert_eq!(format_amount(-12.0), "-12");
        assert_eq!(format_amount(1234.5), "1234.50");
        assert_eq!(format_amount(0.126), "0.13");
    }
}
