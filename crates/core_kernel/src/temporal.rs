//! Calendar arithmetic and business-timezone handling
//!
//! Billing windows are computed on calendar dates: months have different
//! lengths, so adding a month to the 31st or aligning a check-in day into
//! February must clamp to the last valid day. All helpers here are pure.
//!
//! The [`Timezone`] wrapper maps UTC instants to the business-local date
//! ("today" for billing purposes) and back to UTC day boundaries.

use chrono::{DateTime, Datelike, LocalResult, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

/// Errors related to calendar operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid date: {year}-{month}-{day}")]
    InvalidDate {
        year: i32,
        month: u32,
        day: u32,
    },

    #[error("Date arithmetic out of range: {0}")]
    OutOfRange(String),

    #[error("Local time {0} does not exist in the configured timezone")]
    NonexistentLocalTime(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Timezone wrapper for the business locale
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Timezone {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tz::from_str(s.trim())
            .map(Timezone)
            .map_err(|_| TemporalError::InvalidTimezone(s.to_string()))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Returns the IANA name of the timezone
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Converts a UTC instant to the local calendar date
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        utc.with_timezone(&self.0).date_naive()
    }

    /// Returns today's local date
    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    /// Gets the start of day (00:00:00) in this timezone as UTC
    pub fn start_of_day(&self, date: NaiveDate) -> Result<DateTime<Utc>, TemporalError> {
        let local = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| TemporalError::OutOfRange(date.to_string()))?;
        match local.and_local_timezone(self.0) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(TemporalError::NonexistentLocalTime(local.to_string())),
        }
    }

    /// Gets the end of day (23:59:59.999999) in this timezone as UTC
    pub fn end_of_day(&self, date: NaiveDate) -> Result<DateTime<Utc>, TemporalError> {
        let local = date
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .ok_or_else(|| TemporalError::OutOfRange(date.to_string()))?;
        match local.and_local_timezone(self.0) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(_, latest) => Ok(latest.with_timezone(&Utc)),
            LocalResult::None => Err(TemporalError::NonexistentLocalTime(local.to_string())),
        }
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Returns the number of days in the given month
///
/// # Errors
///
/// Returns `TemporalError::InvalidDate` when `month` is outside 1..=12 or the
/// year is outside chrono's supported range.
pub fn last_day_of_month(year: i32, month: u32) -> Result<u32, TemporalError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .ok_or(TemporalError::InvalidDate { year, month, day: 1 })
}

/// Builds a date, clamping `day` into the month (day 31 in February becomes
/// the 28th or 29th; day 0 becomes the 1st)
pub fn clamp_day(year: i32, month: u32, day: u32) -> Result<NaiveDate, TemporalError> {
    let last = last_day_of_month(year, month)?;
    let safe_day = day.clamp(1, last);
    NaiveDate::from_ymd_opt(year, month, safe_day).ok_or(TemporalError::InvalidDate {
        year,
        month,
        day: safe_day,
    })
}

/// Adds `months` calendar months (negative to subtract), keeping the
/// day-of-month and clamping to the end of shorter months
///
/// Jan 31 + 1 month is Feb 28 (or Feb 29 in a leap year).
pub fn add_months(date: NaiveDate, months: i32) -> Result<NaiveDate, TemporalError> {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.ok_or_else(|| TemporalError::OutOfRange(format!("{} + {} months", date, months)))
}

/// Returns the first day of the date's month
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Returns true when the date is the first day of its month
pub fn is_first_of_month(date: NaiveDate) -> bool {
    date.day() == 1
}

/// Lists the first-of-month dates from `from`'s month through `to`'s month
/// inclusive; empty when `from` is after `to`
pub fn month_starts(from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>, TemporalError> {
    let end = first_of_month(to);
    let mut current = first_of_month(from);
    let mut months = Vec::new();
    while current <= end {
        months.push(current);
        current = add_months(current, 1)?;
    }
    Ok(months)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2025, 2).unwrap(), 28);
        assert_eq!(last_day_of_month(2024, 2).unwrap(), 29);
        assert_eq!(last_day_of_month(2025, 4).unwrap(), 30);
        assert_eq!(last_day_of_month(2025, 12).unwrap(), 31);
        assert!(last_day_of_month(2025, 13).is_err());
    }

    #[test]
    fn test_clamp_day() {
        assert_eq!(clamp_day(2025, 2, 31).unwrap(), date(2025, 2, 28));
        assert_eq!(clamp_day(2024, 2, 31).unwrap(), date(2024, 2, 29));
        assert_eq!(clamp_day(2025, 3, 0).unwrap(), date(2025, 3, 1));
        assert_eq!(clamp_day(2025, 3, 15).unwrap(), date(2025, 3, 15));
    }

    #[test]
    fn test_add_months_clamps() {
        assert_eq!(add_months(date(2025, 1, 31), 1).unwrap(), date(2025, 2, 28));
        assert_eq!(add_months(date(2024, 1, 31), 1).unwrap(), date(2024, 2, 29));
        assert_eq!(add_months(date(2025, 12, 15), 1).unwrap(), date(2026, 1, 15));
        assert_eq!(add_months(date(2025, 3, 31), -1).unwrap(), date(2025, 2, 28));
    }

    #[test]
    fn test_month_starts() {
        let months = month_starts(date(2025, 11, 20), date(2026, 2, 3)).unwrap();
        assert_eq!(
            months,
            vec![date(2025, 11, 1), date(2025, 12, 1), date(2026, 1, 1), date(2026, 2, 1)]
        );
        assert!(month_starts(date(2025, 3, 1), date(2025, 2, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_end_of_day_in_kolkata() {
        let tz = Timezone::new(chrono_tz::Asia::Kolkata);
        let eod = tz.end_of_day(date(2025, 1, 31)).unwrap();

        // 23:59:59.999999 IST is 18:29:59.999999 UTC
        assert_eq!(eod.date_naive(), date(2025, 1, 31));
        assert_eq!(eod.hour(), 18);
        assert_eq!(eod.minute(), 29);
        assert_eq!(eod.nanosecond(), 999_999_000);
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        let tz = Timezone::new(chrono_tz::Asia::Kolkata);
        let utc = Utc.with_ymd_and_hms(2025, 1, 31, 20, 0, 0).unwrap();
        assert_eq!(tz.local_date(utc), date(2025, 2, 1));
    }

    #[test]
    fn test_timezone_parse() {
        let tz: Timezone = "Asia/Kolkata".parse().unwrap();
        assert_eq!(tz.name(), "Asia/Kolkata");
        assert!("Mars/Olympus".parse::<Timezone>().is_err());
    }
}
