//! Input validation for chat dialogs

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

/// Minimum length of a provider login
pub const MIN_LOGIN_LEN: usize = 3;

/// Whether `email` looks like an email address
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email.trim())
}

/// Whether `login` is long enough to look up
pub fn is_valid_login(login: &str) -> bool {
    login.trim().chars().count() >= MIN_LOGIN_LEN
}

/// Parse a positive amount; a comma is accepted as decimal separator
pub fn parse_amount(text: &str) -> Option<f64> {
    let normalized: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}
