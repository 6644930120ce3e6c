//! Tests for calendar arithmetic and subscription intervals
//!
//! Covers month clamping, month addition across year boundaries, business
//! timezone day boundaries, and interval code parsing.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use core_kernel::interval::{compute_period_end, interval_days, DAYS_PER_MONTH};
use core_kernel::temporal::{
    add_months, clamp_day, first_of_month, is_first_of_month, last_day_of_month, month_starts,
};
use core_kernel::Timezone;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

mod month_arithmetic {
    use super::*;

    #[test]
    fn test_add_months_across_year_boundary() {
        assert_eq!(add_months(date(2025, 11, 30), 3).unwrap(), date(2026, 2, 28));
        assert_eq!(add_months(date(2026, 1, 15), -2).unwrap(), date(2025, 11, 15));
    }

    #[test]
    fn test_add_zero_months_is_identity() {
        assert_eq!(add_months(date(2025, 5, 17), 0).unwrap(), date(2025, 5, 17));
    }

    #[test]
    fn test_clamp_day_leap_years() {
        assert_eq!(clamp_day(2000, 2, 30).unwrap(), date(2000, 2, 29));
        assert_eq!(clamp_day(1900, 2, 30).unwrap(), date(1900, 2, 28));
    }

    #[test]
    fn test_first_of_month() {
        assert_eq!(first_of_month(date(2025, 1, 31)), date(2025, 1, 1));
        assert!(is_first_of_month(date(2025, 2, 1)));
        assert!(!is_first_of_month(date(2025, 2, 2)));
    }

    #[test]
    fn test_month_starts_single_month() {
        let months = month_starts(date(2025, 4, 10), date(2025, 4, 30)).unwrap();
        assert_eq!(months, vec![date(2025, 4, 1)]);
    }
}

mod timezone {
    use super::*;

    #[test]
    fn test_start_of_day_in_kolkata() {
        let tz = Timezone::new(chrono_tz::Asia::Kolkata);
        let sod = tz.start_of_day(date(2025, 3, 1)).unwrap();
        assert_eq!(sod, Utc.with_ymd_and_hms(2025, 2, 28, 18, 30, 0).unwrap());
    }

    #[test]
    fn test_default_timezone_is_utc() {
        let tz = Timezone::default();
        assert_eq!(tz.name(), "UTC");
        let utc = Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap();
        assert_eq!(tz.local_date(utc), date(2025, 3, 1));
    }

    #[test]
    fn test_timezone_serde() {
        let tz = Timezone::new(chrono_tz::Asia::Kolkata);
        let json = serde_json::to_string(&tz).unwrap();
        assert_eq!(json, "\"Asia/Kolkata\"");
        let back: Timezone = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tz);
    }
}

mod intervals {
    use super::*;

    #[test]
    fn test_three_month_period_end() {
        let tz = Timezone::default();
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = compute_period_end(start, Some("3m"), &tz).unwrap();

        assert_eq!(end.date_naive(), date(2025, 3, 26));
        assert_eq!(end, tz.end_of_day(date(2025, 3, 26)).unwrap());
    }

    #[test]
    fn test_missing_code_uses_one_month() {
        let tz = Timezone::default();
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap();
        let end = compute_period_end(start, None, &tz).unwrap();
        assert_eq!(end.date_naive(), date(2025, 3, 1));
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(interval_days(Some("  6M ")), 6 * DAYS_PER_MONTH);
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn add_one_month_lands_in_next_month(
            year in 1990i32..2100,
            month in 1u32..=12,
            day in 1u32..=31,
        ) {
            let start = clamp_day(year, month, day).unwrap();
            let next = add_months(start, 1).unwrap();

            let expected_month = if month == 12 { 1 } else { month + 1 };
            prop_assert_eq!(next.month(), expected_month);
            prop_assert!(next.day() <= start.day());
            prop_assert!(next.day() == start.day() || next.day() == last_day_of_month(next.year(), next.month()).unwrap());
        }

        #[test]
        fn clamp_day_stays_in_month(
            year in 1990i32..2100,
            month in 1u32..=12,
            day in 0u32..=40,
        ) {
            let clamped = clamp_day(year, month, day).unwrap();
            prop_assert_eq!(clamped.month(), month);
            prop_assert_eq!(clamped.year(), year);
        }

        #[test]
        fn month_codes_are_multiples_of_28(n in 1u32..=120) {
            let code = format!("{}m", n);
            prop_assert_eq!(interval_days(Some(&code)), n * 28);
        }
    }
}
