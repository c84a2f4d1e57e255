//! Pull frequency parsing and next-pull computation

use chrono::{DateTime, Duration, Utc};

/// Period used when a frequency expression cannot be understood
pub const FALLBACK_MINUTES: i64 = 1440;

/// Longest accepted period, ten years
pub const MAX_MINUTES: i64 = 10 * 365 * 1440;

/// Convert a frequency such as `"30 mins"`, `"2 hrs"` or `"1 day"` to minutes.
///
/// A bare integer counts minutes. Units are case-insensitive and may be
/// singular or plural. Anything unparseable, a non-positive count, or a
/// period beyond [`MAX_MINUTES`] yields [`FALLBACK_MINUTES`].
pub fn frequency_to_minutes(expression: &str) -> i64 {
    parse_frequency(expression).unwrap_or(FALLBACK_MINUTES)
}

fn parse_frequency(expression: &str) -> Option<i64> {
    let cleaned = expression.trim().trim_matches('"').trim().to_ascii_lowercase();
    let mut parts = cleaned.split_whitespace();

    let count: i64 = parts.next()?.parse().ok()?;
    if count <= 0 {
        return None;
    }

    let multiplier = match parts.next() {
        None => 1,
        Some("min" | "mins" | "minute" | "minutes") => 1,
        Some("hr" | "hrs" | "hour" | "hours") => 60,
        Some("day" | "days") => 1440,
        Some(_) => return None,
    };
    if parts.next().is_some() {
        return None;
    }

    count
        .checked_mul(multiplier)
        .filter(|minutes| *minutes <= MAX_MINUTES)
}

/// Next pull time for a pull that completed at `last_pull`
pub fn next_pull_after(last_pull: DateTime<Utc>, frequency: &str) -> DateTime<Utc> {
    last_pull + Duration::minutes(frequency_to_minutes(frequency))
}
