//! Subscription billing intervals
//!
//! Subscription periods use fixed 28-day months regardless of calendar month
//! length. This is separate from the calendar-aware arithmetic in
//! [`crate::temporal`], which is used for tenant invoices.

use chrono::{DateTime, Duration, Utc};

use crate::temporal::{TemporalError, Timezone};

/// Days in a subscription month
pub const DAYS_PER_MONTH: u32 = 28;

/// Default interval code for new subscriptions
pub const DEFAULT_INTERVAL: &str = "1m";

/// Normalizes legacy interval labels to their `<N>m` code
fn alias(code: &str) -> &str {
    match code {
        "monthly" | "month" | "1mo" | "1month" => "1m",
        "yearly" | "annual" | "annually" | "12mo" | "12month" | "12months" => "12m",
        other => other,
    }
}

/// Trims, lowercases and resolves legacy labels (`"Monthly"` becomes `"1m"`)
pub fn normalize_interval(code: &str) -> String {
    let lower = code.trim().to_ascii_lowercase();
    alias(&lower).to_string()
}

/// Converts an interval code to a number of days
///
/// * `"<N>d"` is N days (at least 1)
/// * `"<N>m"` is N 28-day months (at least 1)
/// * legacy labels such as `"monthly"` or `"annual"` map to `1m` / `12m`
/// * empty or unrecognised codes fall back to 28 days
///
/// ```rust
/// use core_kernel::interval::interval_days;
///
/// assert_eq!(interval_days(Some("3m")), 84);
/// assert_eq!(interval_days(Some("30d")), 30);
/// assert_eq!(interval_days(None), 28);
/// ```
pub fn interval_days(code: Option<&str>) -> u32 {
    let raw = match code.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_ascii_lowercase(),
        _ => return DAYS_PER_MONTH,
    };

    if let Some(days) = raw.strip_suffix('d') {
        return days
            .parse::<i64>()
            .map(|n| n.clamp(1, u32::MAX as i64) as u32)
            .unwrap_or(DAYS_PER_MONTH);
    }

    let code = alias(&raw);
    if let Some(months) = code.strip_suffix('m') {
        let n = if months.is_empty() {
            1
        } else {
            months.parse::<i64>().unwrap_or(1)
        };
        let n = n.clamp(1, (u32::MAX / DAYS_PER_MONTH) as i64) as u32;
        return n * DAYS_PER_MONTH;
    }

    DAYS_PER_MONTH
}

/// Computes the end of a subscription period
///
/// Adds [`interval_days`] to `start`, then snaps the resulting local date to
/// 23:59:59.999999 in `tz`, returned as UTC.
pub fn compute_period_end(
    start: DateTime<Utc>,
    code: Option<&str>,
    tz: &Timezone,
) -> Result<DateTime<Utc>, TemporalError> {
    let days = interval_days(code);
    let end = start
        .checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| TemporalError::OutOfRange(format!("{} + {} days", start, days)))?;
    tz.end_of_day(tz.local_date(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Timelike};

    #[test]
    fn test_month_codes() {
        assert_eq!(interval_days(Some("1m")), 28);
        assert_eq!(interval_days(Some("3m")), 84);
        assert_eq!(interval_days(Some("6m")), 168);
        assert_eq!(interval_days(Some("12m")), 336);
        assert_eq!(interval_days(Some("m")), 28);
        assert_eq!(interval_days(Some("0m")), 28);
        assert_eq!(interval_days(Some("xm")), 28);
    }

    #[test]
    fn test_day_codes() {
        assert_eq!(interval_days(Some("30d")), 30);
        assert_eq!(interval_days(Some("0d")), 1);
        assert_eq!(interval_days(Some("-5d")), 1);
        assert_eq!(interval_days(Some("abcd")), 28);
    }

    #[test]
    fn test_aliases_and_fallbacks() {
        assert_eq!(interval_days(Some("Monthly")), 28);
        assert_eq!(interval_days(Some("annual")), 336);
        assert_eq!(interval_days(Some("12months")), 336);
        assert_eq!(interval_days(Some("")), 28);
        assert_eq!(interval_days(Some("weekly")), 28);
        assert_eq!(interval_days(None), 28);
    }

    #[test]
    fn test_normalize_interval() {
        assert_eq!(normalize_interval(" Monthly "), "1m");
        assert_eq!(normalize_interval("ANNUAL"), "12m");
        assert_eq!(normalize_interval("3m"), "3m");
    }

    #[test]
    fn test_period_end_snaps_to_local_end_of_day() {
        let tz = Timezone::new(chrono_tz::Asia::Kolkata);
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 6, 30, 0).unwrap();
        let end = compute_period_end(start, Some("1m"), &tz).unwrap();

        let local = end.with_timezone(&chrono_tz::Asia::Kolkata);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 29).unwrap());
        assert_eq!(local.hour(), 23);
        assert_eq!(local.minute(), 59);
        assert_eq!(local.second(), 59);
        assert_eq!(local.nanosecond(), 999_999_000);
    }
}
