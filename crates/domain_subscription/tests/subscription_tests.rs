//! Integration tests for domain_subscription

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use core_kernel::{Actor, CoreError, OwnerId, Timezone, UserId};

use domain_subscription::ports::mock::InMemorySubscriptionStore;
use domain_subscription::{
    ChangePlanRequest, FeatureKey, Limit, LimitKey, PlanFeatures, PlanLimits, PlanSelector,
    Subscription, SubscriptionError, SubscriptionGate, SubscriptionPlan, SubscriptionStatus,
    SubscriptionStore,
};

// ============================================================================
// Helpers
// ============================================================================

fn kolkata() -> Timezone {
    Timezone::new(chrono_tz::Asia::Kolkata)
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
}

fn standard_plan() -> SubscriptionPlan {
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

struct Harness {
    store: Arc<InMemorySubscriptionStore>,
    gate: SubscriptionGate,
    admin: UserId,
    basic: SubscriptionPlan,
    standard: SubscriptionPlan,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let basic = SubscriptionPlan::basic();
        let standard = standard_plan();
        store.put_plan(standard.clone()).await;
        store.put_plan(basic.clone()).await;
        let gate = SubscriptionGate::new(store.clone()).with_timezone(kolkata());
        Self {
            store,
            gate,
            admin: UserId::new(),
            basic,
            standard,
        }
    }

    fn owner(&self) -> OwnerId {
        OwnerId::from(self.admin)
    }

    fn actor(&self) -> Actor {
        Actor::admin(self.admin)
    }

    fn staff(&self) -> Actor {
        Actor::staff(UserId::new(), self.admin)
    }

    /// Stores a paid subscription on `plan` starting at `start`
    async fn subscribe(&self, plan: &SubscriptionPlan, start: DateTime<Utc>) -> Subscription {
        let sub = Subscription::start(self.owner(), plan, "1m", start, &kolkata()).unwrap();
        self.store.insert_current(sub).await.unwrap()
    }
}

// ============================================================================
// Current subscription
// ============================================================================

mod current_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_access_provisions_free_month_on_cheapest_plan() {
        let h = Harness::new().await;

        let current = h.gate.current_subscription(&h.actor(), now()).await.unwrap();

        assert_eq!(current.plan.slug, "basic");
        assert_eq!(current.subscription.status, SubscriptionStatus::Active);
        assert_eq!(current.subscription.billing_interval, "1m");
        assert!(current.subscription.meta.free_month);
        assert_eq!(current.limit(LimitKey::MaxBedsPerRoom, Limit::Unlimited), Limit::Max(5));
        assert_eq!(current.limit(LimitKey::MaxTenants, Limit::Unlimited), Limit::Max(100));

        let end = current.subscription.current_period_end.unwrap();
        assert_eq!(
            kolkata().local_date(end),
            chrono::NaiveDate::from_ymd_opt(2025, 4, 7).unwrap()
        );
    }

    #[tokio::test]
    async fn test_free_month_is_granted_once() {
        let h = Harness::new().await;
        h.gate.current_subscription(&h.actor(), now()).await.unwrap();
        h.gate.current_subscription(&h.staff(), now()).await.unwrap();

        assert_eq!(h.store.subscriptions_for(h.owner()).await.len(), 1);

        // After the free month lapses the owner has rows, so nothing new is provisioned
        let later = now() + Duration::days(40);
        let err = h.gate.current_subscription(&h.actor(), later).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Expired));

        let err = h.gate.current_subscription(&h.actor(), later).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::NoSubscription));
        assert_eq!(h.store.subscriptions_for(h.owner()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_row_is_released() {
        let h = Harness::new().await;
        h.subscribe(&h.standard, now() - Duration::days(60)).await;

        let err = h.gate.current_subscription(&h.actor(), now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Expired));

        let rows = h.store.subscriptions_for(h.owner()).await;
        assert_eq!(rows[0].status, SubscriptionStatus::Expired);
        assert!(!rows[0].is_current);
        assert!(h.store.current_subscription(h.owner()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_status_is_hidden() {
        let h = Harness::new().await;
        let mut sub = h.subscribe(&h.standard, now()).await;
        sub.status = SubscriptionStatus::PastDue;
        h.store.update_subscription(sub).await.unwrap();

        let err = h.gate.current_subscription(&h.actor(), now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Inactive));
        assert!(err.is_missing_subscription());
    }

    #[tokio::test]
    async fn test_missing_period_end_is_backfilled() {
        let h = Harness::new().await;
        let mut sub = h.subscribe(&h.standard, now()).await;
        let expected = sub.current_period_end;
        sub.current_period_end = None;
        h.store.update_subscription(sub).await.unwrap();

        let current = h.gate.current_subscription(&h.actor(), now()).await.unwrap();
        assert_eq!(current.subscription.current_period_end, expected);

        let stored = h.store.current_subscription(h.owner()).await.unwrap().unwrap();
        assert_eq!(stored.current_period_end, expected);
    }

    #[tokio::test]
    async fn test_no_active_plans() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mut retired = SubscriptionPlan::basic();
        retired.is_active = false;
        store.put_plan(retired).await;
        let gate = SubscriptionGate::new(store);

        let err = gate
            .current_subscription(&Actor::admin(UserId::new()), now())
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::NoActivePlans));
    }

    #[tokio::test]
    async fn test_system_actor_has_no_owner() {
        let h = Harness::new().await;
        let err = h.gate.current_subscription(&Actor::system(), now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Core(CoreError::Unauthorized(_))));
    }
}

// ============================================================================
// Features and limits
// ============================================================================

mod gate_tests {
    use super::*;

    #[tokio::test]
    async fn test_plan_features() {
        let h = Harness::new().await;
        h.subscribe(&h.standard, now()).await;

        assert!(h.gate.has_feature(&h.actor(), FeatureKey::Reports, now()).await.unwrap());
        assert!(!h.gate.has_feature(&h.actor(), FeatureKey::StaffMedia, now()).await.unwrap());
        h.gate.ensure_feature(&h.staff(), FeatureKey::Bookings, now()).await.unwrap();

        let err = h
            .gate
            .ensure_feature(&h.actor(), FeatureKey::TenantMedia, now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Your subscription does not include 'tenant_media'.");
    }

    #[tokio::test]
    async fn test_meta_features_replace_plan_features() {
        let h = Harness::new().await;
        let mut sub = h.subscribe(&h.standard, now()).await;
        sub.meta.features = Some(PlanFeatures::new().with(FeatureKey::TenantMedia, true));
        h.store.update_subscription(sub).await.unwrap();

        assert!(h.gate.has_feature(&h.actor(), FeatureKey::TenantMedia, now()).await.unwrap());
        assert!(!h.gate.has_feature(&h.actor(), FeatureKey::Reports, now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_limit_resolution() {
        let h = Harness::new().await;
        h.subscribe(&h.standard, now()).await;
        let actor = h.actor();

        let limit = h.gate.get_limit(&actor, LimitKey::MaxBuildings, Limit::Max(0), now()).await.unwrap();
        assert_eq!(limit, Limit::Max(5));

        // explicit null
        let limit = h.gate.get_limit(&actor, LimitKey::MaxTenants, Limit::Max(0), now()).await.unwrap();
        assert_eq!(limit, Limit::Unlimited);

        // absent key
        let limit = h.gate.get_limit(&actor, LimitKey::StorageMb, Limit::Max(512), now()).await.unwrap();
        assert_eq!(limit, Limit::Max(512));
    }

    #[tokio::test]
    async fn test_meta_limits_replace_plan_limits() {
        let h = Harness::new().await;
        let mut sub = h.subscribe(&h.standard, now()).await;
        sub.meta.limits = Some(PlanLimits::new().with(LimitKey::MaxStaff, Limit::Max(1)));
        h.store.update_subscription(sub).await.unwrap();

        let limit = h.gate.get_limit(&h.actor(), LimitKey::MaxStaff, Limit::Unlimited, now()).await.unwrap();
        assert_eq!(limit, Limit::Max(1));
        let limit = h.gate.get_limit(&h.actor(), LimitKey::MaxBuildings, Limit::Unlimited, now()).await.unwrap();
        assert_eq!(limit, Limit::Unlimited);
    }

    #[tokio::test]
    async fn test_invalid_subscription_uses_defaults() {
        let h = Harness::new().await;
        h.subscribe(&h.standard, now() - Duration::days(60)).await;

        assert!(!h.gate.has_feature(&h.actor(), FeatureKey::Reports, now()).await.unwrap());
        let limit = h.gate.get_limit(&h.actor(), LimitKey::MaxBuildings, Limit::Max(2), now()).await.unwrap();
        assert_eq!(limit, Limit::Max(2));

        // Checks never provision or expire
        let rows = h.store.subscriptions_for(h.owner()).await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_current);
    }

    #[tokio::test]
    async fn test_trialing_grants_access() {
        let h = Harness::new().await;
        let mut sub = h.subscribe(&h.standard, now()).await;
        sub.status = SubscriptionStatus::Trialing;
        h.store.update_subscription(sub).await.unwrap();

        assert!(h.gate.has_feature(&h.actor(), FeatureKey::Payments, now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_limit_not_exceeded() {
        let h = Harness::new().await;
        h.subscribe(&h.basic, now()).await;
        let staff = h.staff();

        h.gate
            .ensure_limit_not_exceeded(&staff, LimitKey::MaxBuildings, 0, now())
            .await
            .unwrap();

        let err = h
            .gate
            .ensure_limit_not_exceeded(&staff, LimitKey::MaxBuildings, 1, now())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Subscription limit reached for 'max_buildings' (used 1 of 1)."
        );

        // Absent limits do not restrict
        h.gate
            .ensure_limit_not_exceeded(&staff, LimitKey::MaxTenants, 10_000, now())
            .await
            .unwrap();
    }
}

// ============================================================================
// Plan changes and quotes
// ============================================================================

mod plan_change_tests {
    use super::*;

    fn to(slug: &str, interval: Option<&str>) -> ChangePlanRequest {
        ChangePlanRequest {
            plan: PlanSelector::Slug(slug.to_string()),
            interval: interval.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_upgrade_clears_free_month() {
        let h = Harness::new().await;
        h.gate.current_subscription(&h.actor(), now()).await.unwrap();

        let later = now() + Duration::days(5);
        let sub = h.gate.change_plan(&h.actor(), to("standard", Some("yearly")), later).await.unwrap();

        assert_eq!(sub.plan_id, h.standard.id);
        assert_eq!(sub.billing_interval, "12m");
        assert_eq!(sub.current_period_start, later);
        assert!(!sub.meta.free_month);
        assert!(sub.meta.limits.is_none());

        let limit = h.gate.get_limit(&h.actor(), LimitKey::MaxBuildings, Limit::Unlimited, later).await.unwrap();
        assert_eq!(limit, Limit::Max(5));
    }

    #[tokio::test]
    async fn test_downgrade_blocked_by_active_buildings() {
        let h = Harness::new().await;
        let before = h.subscribe(&h.standard, now()).await;
        h.store.set_active_buildings(h.owner(), 3).await;

        let err = h.gate.change_plan(&h.actor(), to("basic", None), now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::PlanLimitExceeded { used: 3, limit: 1 }));

        let after = h.store.current_subscription(h.owner()).await.unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_staff_cannot_change_plan() {
        let h = Harness::new().await;
        h.subscribe(&h.basic, now()).await;

        let err = h.gate.change_plan(&h.staff(), to("standard", None), now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::NotPermitted(_)));
    }

    #[tokio::test]
    async fn test_plan_and_interval_must_be_offered() {
        let h = Harness::new().await;
        h.subscribe(&h.standard, now()).await;

        let err = h.gate.change_plan(&h.actor(), to("enterprise", None), now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::PlanNotFound(_)));

        let err = h.gate.change_plan(&h.actor(), to("basic", Some("12m")), now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::IntervalUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_change_requires_current_subscription() {
        let h = Harness::new().await;
        let err = h.gate.change_plan(&h.actor(), to("standard", None), now()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::NoSubscription));
    }

    #[tokio::test]
    async fn test_quote_by_id() {
        let h = Harness::new().await;
        let quote = h
            .gate
            .quote(&PlanSelector::Id(h.basic.id), "1m", now())
            .await
            .unwrap();

        assert_eq!(quote.base.amount(), dec!(149));
        assert_eq!(quote.gst.amount(), dec!(26.82));
        assert_eq!(quote.gross.amount(), dec!(175.82));
    }

    #[tokio::test]
    async fn test_plans_listed_cheapest_first() {
        let h = Harness::new().await;
        let slugs: Vec<_> = h.gate.list_plans().await.unwrap().into_iter().map(|p| p.slug).collect();
        assert_eq!(slugs, vec!["basic", "standard"]);
    }
}

// ============================================================================
// Properties
// ============================================================================

mod property_tests {
    use super::*;
    use core_kernel::interval::{compute_period_end, interval_days};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn month_codes_are_28_day_multiples(n in 1u32..200) {
            prop_assert_eq!(interval_days(Some(&format!("{}m", n))), n * 28);
        }

        #[test]
        fn day_codes_are_at_least_one(n in -100i64..1000) {
            let expected = n.max(1) as u32;
            prop_assert_eq!(interval_days(Some(&format!("{}d", n))), expected);
        }

        #[test]
        fn period_end_covers_the_interval(offset_hours in 0i64..24 * 365, months in 1u32..13) {
            let tz = kolkata();
            let start = now() + Duration::hours(offset_hours);
            let code = format!("{}m", months);
            let end = compute_period_end(start, Some(&code), &tz).unwrap();

            prop_assert!(end >= start + Duration::days(i64::from(months * 28)));
            prop_assert!(end < start + Duration::days(i64::from(months * 28) + 1));
        }

        #[test]
        fn limit_refuses_exactly_at_the_ceiling(max in 0u64..1000, used in 0u64..1000) {
            prop_assert_eq!(Limit::Max(max).is_reached_by(used), used >= max);
            prop_assert!(!Limit::Unlimited.is_reached_by(used));
        }
    }
}
