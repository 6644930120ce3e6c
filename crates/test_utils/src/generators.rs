//! Property-Based Test Generators
//!
//! Proptest strategies producing values that respect the domain's input
//! rules: INR amounts with two decimals, dates in a bounded range and
//! payment sequences against a single invoice.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::Money;
use domain_billing::BookingStatus;

/// Amounts from 0.01 to 1,000,000.00
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|minor| Decimal::new(minor, 2))
}

/// Amounts from 0 to 1,000,000.00
pub fn non_negative_amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|minor| Decimal::new(minor, 2))
}

pub fn inr_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_strategy().prop_map(Money::inr)
}

/// Signed balance deltas, as produced by payment edits
pub fn delta_strategy() -> impl Strategy<Value = Money> {
    (-100_000_000i64..100_000_000i64).prop_map(|minor| Money::inr(Decimal::new(minor, 2)))
}

/// Dates between 2020-01-01 and the end of 2030
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
    (0i64..4018i64).prop_map(move |days| base + Duration::days(days))
}

/// Month-end days and their neighbours are over-represented
pub fn day_of_month_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![
        3 => 1u32..=31u32,
        2 => 28u32..=31u32,
        1 => Just(1u32),
    ]
}

/// Interval codes including aliases and the canonical forms
pub fn interval_code_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u32..=36u32).prop_map(|n| format!("{}m", n)),
        (1u32..=60u32).prop_map(|n| format!("{}d", n)),
        Just("monthly".to_string()),
        Just("annual".to_string()),
        Just(" 3M ".to_string()),
    ]
}

pub fn booking_status_strategy() -> impl Strategy<Value = BookingStatus> {
    proptest::sample::select(BookingStatus::ALL.to_vec())
}

/// Payment amounts to apply one after another
pub fn payment_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Money>> {
    proptest::collection::vec(inr_money_strategy(), 1..=max_len)
}
