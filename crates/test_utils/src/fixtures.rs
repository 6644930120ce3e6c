//! Pre-built Test Fixtures
//!
//! Ready-made data for the billing scenarios the suites keep returning to:
//! a tenant checking in on 2025-01-31 at 10000 rent, 500 maintenance and a
//! 5000 deposit, billed in Asia/Kolkata.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use rust_decimal_macros::dec;
use uuid::Uuid;

use core_kernel::{Actor, BookingId, BuildingId, Money, OwnerId, PlanId, Timezone, UserId};
use domain_subscription::{FeatureKey, Limit, LimitKey, PlanFeatures, PlanLimits, SubscriptionPlan};

/// Business timezone used across the suites
pub static KOLKATA: Lazy<Timezone> = Lazy::new(|| Timezone::new(chrono_tz::Asia::Kolkata));

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn rent() -> Money {
        Money::inr(dec!(10000))
    }

    pub fn maintenance() -> Money {
        Money::inr(dec!(500))
    }

    pub fn deposit() -> Money {
        Money::inr(dec!(5000))
    }

    /// Rent plus maintenance plus deposit
    pub fn first_invoice_total() -> Money {
        Money::inr(dec!(15500))
    }

    /// Rent plus maintenance
    pub fn recurring_total() -> Money {
        Money::inr(dec!(10500))
    }

    pub fn zero() -> Money {
        Money::zero(core_kernel::Currency::INR)
    }
}

/// Fixture for calendar test data
pub struct DateFixtures;

impl DateFixtures {
    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
    }

    /// Check-in on the last day of January
    pub fn checkin() -> NaiveDate {
        Self::date(2025, 1, 31)
    }

    /// End of the first window for the check-in
    pub fn first_window_end() -> NaiveDate {
        Self::date(2025, 2, 28)
    }

    pub fn mid_february() -> NaiveDate {
        Self::date(2025, 2, 15)
    }

    /// Confirmation timestamp on the check-in morning, Kolkata time
    pub fn confirmed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 31, 4, 30, 0).unwrap()
    }

    /// Clock used by subscription scenarios
    pub fn subscription_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
    }
}

/// Deterministic identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn owner_user() -> UserId {
        UserId::from_uuid(Uuid::from_u128(0x0192_f0a0_0000_7000_8000_0000_0000_0001))
    }

    pub fn owner() -> OwnerId {
        OwnerId::from(Self::owner_user())
    }

    pub fn staff_user() -> UserId {
        UserId::from_uuid(Uuid::from_u128(0x0192_f0a0_0000_7000_8000_0000_0000_0002))
    }

    pub fn building() -> BuildingId {
        BuildingId::from_uuid(Uuid::from_u128(0x0192_f0a0_0000_7000_8000_0000_0000_0010))
    }

    pub fn booking() -> BookingId {
        BookingId::from_uuid(Uuid::from_u128(0x0192_f0a0_0000_7000_8000_0000_0000_0100))
    }

    /// Id of the plan seeded by the initial migration
    pub fn basic_plan() -> PlanId {
        PlanId::from_uuid(Uuid::from_u128(0x0192_f0a0_0000_7000_8000_0000_0000_0149))
    }
}

/// Acting users
pub struct ActorFixtures;

impl ActorFixtures {
    pub fn admin() -> Actor {
        Actor::admin(IdFixtures::owner_user())
    }

    pub fn staff() -> Actor {
        Actor::staff(IdFixtures::staff_user(), IdFixtures::owner_user())
    }

    pub fn system() -> Actor {
        Actor::system()
    }
}

/// Subscription plans
pub struct PlanFixtures;

impl PlanFixtures {
    /// The plan the initial migration seeds
    pub fn basic() -> SubscriptionPlan {
        let mut plan = SubscriptionPlan::basic();
        plan.id = IdFixtures::basic_plan();
        plan
    }

    /// Five buildings, unlimited tenants, bookings and reports enabled
    pub fn standard() -> SubscriptionPlan {
        let mut plan = SubscriptionPlan::new("Standard", "standard", dec!(999))
            .with_limits(
                PlanLimits::new()
                    .with(LimitKey::MaxBuildings, Limit::Max(5))
                    .with(LimitKey::MaxStaff, Limit::Max(5))
                    .with(LimitKey::MaxTenants, Limit::Unlimited),
            )
            .with_features(
                PlanFeatures::new()
                    .with(FeatureKey::Bookings, true)
                    .with(FeatureKey::Payments, true)
                    .with(FeatureKey::Reports, true),
            );
        plan.price_yearly = dec!(9990);
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_totals() {
        let first = MoneyFixtures::rent()
            .checked_add(&MoneyFixtures::maintenance())
            .and_then(|m| m.checked_add(&MoneyFixtures::deposit()))
            .unwrap();
        assert_eq!(first, MoneyFixtures::first_invoice_total());
    }

    #[test]
    fn test_staff_resolves_to_fixture_owner() {
        assert_eq!(ActorFixtures::staff().owner_id(), Some(IdFixtures::owner()));
        assert_eq!(KOLKATA.name(), "Asia/Kolkata");
    }

    #[test]
    fn test_basic_plan_matches_seed() {
        let plan = PlanFixtures::basic();
        assert_eq!(plan.slug, "basic");
        assert_eq!(plan.id.as_uuid().to_string(), "0192f0a0-0000-7000-8000-000000000149");
    }
}
