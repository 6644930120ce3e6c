//! Unit tests for the Money module
//!
//! Tests cover money creation, checked arithmetic, rounding, currency
//! parsing, and rate application.

use core_kernel::{Money, Currency, MoneyError, Rate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_rounds_to_four_decimal_places() {
        let m = Money::inr(dec!(100.123456789));
        assert_eq!(m.amount(), dec!(100.1235));
    }

    #[test]
    fn test_zero_creates_zero_amount() {
        let m = Money::zero(Currency::INR);
        assert!(m.is_zero());
        assert!(!m.is_positive());
        assert!(!m.is_negative());
    }

    #[test]
    fn test_fits_currency_scale() {
        assert!(Money::inr(dec!(100.50)).fits_currency_scale());
        assert!(Money::inr(dec!(100.5000)).fits_currency_scale());
        assert!(!Money::inr(dec!(0.0001)).fits_currency_scale());
        assert!(!Money::inr(dec!(12.345)).fits_currency_scale());
    }

    #[test]
    fn test_default_currency_is_inr() {
        assert_eq!(Currency::default(), Currency::INR);
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_sum_of_amounts() {
        let parts = vec![
            Money::inr(dec!(10000)),
            Money::inr(dec!(500)),
            Money::inr(dec!(5000)),
        ];
        let total = Money::sum(Currency::INR, &parts).unwrap();
        assert_eq!(total.amount(), dec!(15500));
    }

    #[test]
    fn test_sum_rejects_mixed_currency() {
        let parts = vec![Money::inr(dec!(1)), Money::new(dec!(1), Currency::USD)];
        let result = Money::sum(Currency::INR, &parts);
        assert!(matches!(result, Err(MoneyError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn test_negation() {
        let m = -Money::inr(dec!(250));
        assert_eq!(m.amount(), dec!(-250));
        assert!(m.is_negative());
    }

    #[test]
    fn test_round_to_currency_half_up() {
        assert_eq!(Money::inr(dec!(10.005)).round_to_currency().amount(), dec!(10.01));
        assert_eq!(Money::inr(dec!(10.004)).round_to_currency().amount(), dec!(10.00));
    }
}

mod display {
    use super::*;

    #[test]
    fn test_display_uses_symbol_and_two_places() {
        let m = Money::inr(dec!(15500));
        assert_eq!(m.to_string(), "₹ 15500.00");
    }

    #[test]
    fn test_currency_code_round_trip() {
        for currency in [Currency::INR, Currency::USD, Currency::EUR, Currency::GBP] {
            let parsed: Currency = currency.code().parse().unwrap();
            assert_eq!(parsed, currency);
        }
    }
}

mod rates {
    use super::*;

    #[test]
    fn test_rate_percentage_round_trip() {
        let rate = Rate::from_percentage(dec!(18));
        assert_eq!(rate.as_decimal(), dec!(0.18));
        assert_eq!(rate.as_percentage(), dec!(18));
    }

    #[test]
    fn test_rate_of_zero_is_zero() {
        let rate = Rate::new(Decimal::ZERO);
        assert!(rate.apply(&Money::inr(dec!(999))).is_zero());
    }
}
