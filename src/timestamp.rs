//! Millisecond wall-clock timestamps as carried on the `/rtt` endpoint.
//!
//! Timestamps travel as decimal strings of Unix epoch milliseconds.

use chrono::Utc;

/// Returns the current Unix time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parses a decimal millisecond timestamp, ignoring surrounding whitespace.
#[must_use]
pub fn parse_millis(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

/// Groups the digits of `text` in threes, separated by spaces.
///
/// Only a leading run of ASCII digits is grouped; anything after it
/// (a fraction, a unit) is appended unchanged. Non-numeric input is
/// returned as-is.
#[must_use]
pub fn group_thousands(text: &str) -> String {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, tail) = rest.split_at(digits_end);
    if digits.is_empty() {
        return text.to_string();
    }

    let mut grouped = String::with_capacity(text.len() + digits.len() / 3);
    grouped.push_str(sign);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    grouped.push_str(tail);
    grouped
}
