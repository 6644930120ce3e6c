//! Owner subscriptions
//!
//! Each owner has at most one current subscription. Its `meta` can carry
//! temporary feature/limit overrides (the free first month) that take
//! precedence over the plan's own maps until the owner changes plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use core_kernel::interval::{compute_period_end, DEFAULT_INTERVAL};
use core_kernel::{OwnerId, PlanId, SubscriptionId, TemporalError, Timezone};

use crate::error::SubscriptionError;
use crate::plan::{FeatureKey, Limit, LimitKey, PlanFeatures, PlanLimits, SubscriptionPlan};

core_kernel::string_enum! {
    pub enum SubscriptionStatus {
        Active => "active",
        PastDue => "past_due",
        Canceled => "canceled",
        Expired => "expired",
        Trialing => "trialing",
    }
}

impl SubscriptionStatus {
    /// Statuses under which the plan's features and limits apply
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

/// Free-form subscription metadata with typed override slots
///
/// Keys this crate does not know about are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionMeta {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub free_month: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_days: Option<u32>,
    /// Replaces the plan's features while present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<PlanFeatures>,
    /// Replaces the plan's limits while present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<PlanLimits>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubscriptionMeta {
    /// Drops trial and free-month grants so the plan's own maps apply again
    pub fn clear_grants(&mut self) {
        self.free_month = false;
        self.free_started_at = None;
        self.free_ends_at = None;
        self.trial_days = None;
        self.features = None;
        self.limits = None;
        self.extra.remove("applied_coupon");
    }
}

/// An owner's subscription row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub owner_id: OwnerId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub billing_interval: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub is_current: bool,
    pub meta: SubscriptionMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Creates a current, active subscription starting at `now`
    pub fn start(
        owner_id: OwnerId,
        plan: &SubscriptionPlan,
        interval: &str,
        now: DateTime<Utc>,
        tz: &Timezone,
    ) -> Result<Self, TemporalError> {
        let end = compute_period_end(now, Some(interval), tz)?;
        Ok(Self {
            id: SubscriptionId::new_v7(),
            owner_id,
            plan_id: plan.id,
            status: SubscriptionStatus::Active,
            billing_interval: interval.to_string(),
            current_period_start: now,
            current_period_end: Some(end),
            trial_end: None,
            cancel_at_period_end: false,
            is_current: true,
            meta: SubscriptionMeta::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// The one-time free month granted to an owner's first subscription
    ///
    /// Uses `plan` for billing but overrides its limits with the stricter
    /// free-month caps.
    pub fn free_month(
        owner_id: OwnerId,
        plan: &SubscriptionPlan,
        now: DateTime<Utc>,
        tz: &Timezone,
    ) -> Result<Self, TemporalError> {
        let mut sub = Self::start(owner_id, plan, DEFAULT_INTERVAL, now, tz)?;
        sub.meta = SubscriptionMeta {
            free_month: true,
            free_started_at: Some(now),
            free_ends_at: sub.current_period_end,
            features: Some(plan.features.clone()),
            limits: Some(PlanLimits::free_month(&plan.limits)),
            ..SubscriptionMeta::default()
        };
        Ok(sub)
    }

    /// The stored period end, or one derived from the start and interval
    pub fn period_end(&self, tz: &Timezone) -> Result<DateTime<Utc>, TemporalError> {
        match self.current_period_end {
            Some(end) => Ok(end),
            None => compute_period_end(self.current_period_start, Some(&self.billing_interval), tz),
        }
    }

    /// Fills in a missing period end; returns true when the row changed
    pub fn backfill_period_end(&mut self, tz: &Timezone) -> Result<bool, TemporalError> {
        if self.current_period_end.is_some() {
            return Ok(false);
        }
        self.current_period_end = Some(self.period_end(tz)?);
        Ok(true)
    }

    /// True when the status grants access and the period has not ended
    ///
    /// A period end that cannot be computed counts as invalid.
    pub fn is_valid(&self, now: DateTime<Utc>, tz: &Timezone) -> bool {
        self.status.grants_access() && self.period_end(tz).map(|end| end > now).unwrap_or(false)
    }

    /// True when the period ended at or before `now`
    pub fn has_lapsed(&self, now: DateTime<Utc>, tz: &Timezone) -> bool {
        self.period_end(tz).map(|end| end <= now).unwrap_or(false)
    }

    /// Marks the subscription expired and releases the current slot
    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.status = SubscriptionStatus::Expired;
        self.is_current = false;
        self.updated_at = now;
    }

    /// Features in force: the meta override, else the plan's
    pub fn features<'a>(&'a self, plan: &'a SubscriptionPlan) -> &'a PlanFeatures {
        self.meta.features.as_ref().unwrap_or(&plan.features)
    }

    /// Limits in force: the meta override, else the plan's
    pub fn limits<'a>(&'a self, plan: &'a SubscriptionPlan) -> &'a PlanLimits {
        self.meta.limits.as_ref().unwrap_or(&plan.limits)
    }
}

/// A current subscription together with its plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSubscription {
    pub subscription: Subscription,
    pub plan: SubscriptionPlan,
}

impl CurrentSubscription {
    pub fn has_feature(&self, key: FeatureKey) -> bool {
        self.subscription.features(&self.plan).is_enabled(key)
    }

    /// The limit in force for `key`, or `default` when the key is absent
    pub fn limit(&self, key: LimitKey, default: Limit) -> Limit {
        self.subscription.limits(&self.plan).get(key).unwrap_or(default)
    }
}

/// A request to move the owner's current subscription onto another plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanChange {
    pub plan: SubscriptionPlan,
    /// Requested interval; `None` keeps the current one where possible
    pub interval: Option<String>,
}

/// Why a plan change was refused inside the store's transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanChangeRejection {
    NoCurrentSubscription,
    IntervalUnavailable { interval: String },
    BuildingLimitExceeded { used: u64, limit: u64 },
}

impl From<PlanChangeRejection> for SubscriptionError {
    fn from(rejection: PlanChangeRejection) -> Self {
        match rejection {
            PlanChangeRejection::NoCurrentSubscription => SubscriptionError::NoSubscription,
            PlanChangeRejection::IntervalUnavailable { interval } => {
                SubscriptionError::IntervalUnavailable { interval }
            }
            PlanChangeRejection::BuildingLimitExceeded { used, limit } => {
                SubscriptionError::PlanLimitExceeded { used, limit }
            }
        }
    }
}

/// Result of a plan change performed by a store
#[derive(Debug, Clone, PartialEq)]
pub enum PlanChangeOutcome {
    Changed(Box<Subscription>),
    Rejected(PlanChangeRejection),
}

impl PlanChange {
    pub fn new(plan: SubscriptionPlan, interval: Option<String>) -> Self {
        Self { plan, interval }
    }

    /// Applies the change to the locked current row
    ///
    /// Refuses when the owner's active buildings exceed the target plan's
    /// building cap. On success the subscription restarts at `now` on the
    /// new plan with trial and free-month grants cleared.
    pub fn apply(
        &self,
        current: &mut Subscription,
        active_buildings: u64,
        now: DateTime<Utc>,
        tz: &Timezone,
    ) -> Result<(), PlanChangeRejection> {
        let interval = self
            .plan
            .choose_interval(self.interval.as_deref(), Some(&current.billing_interval))
            .map_err(|_| PlanChangeRejection::IntervalUnavailable {
                interval: self.interval.clone().unwrap_or_default(),
            })?;

        if let Some(limit) = self.plan.limits.get(LimitKey::MaxBuildings).and_then(|l| l.max()) {
            if active_buildings > limit {
                return Err(PlanChangeRejection::BuildingLimitExceeded {
                    used: active_buildings,
                    limit,
                });
            }
        }

        // Interval codes are validated above, so this only fails at chrono's range limits
        let end = compute_period_end(now, Some(&interval), tz).map_err(|_| {
            PlanChangeRejection::IntervalUnavailable {
                interval: interval.clone(),
            }
        })?;

        current.plan_id = self.plan.id;
        current.billing_interval = interval;
        current.status = SubscriptionStatus::Active;
        current.cancel_at_period_end = false;
        current.current_period_start = now;
        current.current_period_end = Some(end);
        current.trial_end = None;
        current.meta.clear_grants();
        current.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn tz() -> Timezone {
        Timezone::new(chrono_tz::Asia::Kolkata)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_free_month_meta() {
        let plan = SubscriptionPlan::basic();
        let sub = Subscription::free_month(OwnerId::new(), &plan, now(), &tz()).unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.billing_interval, "1m");
        assert!(sub.is_current);
        assert!(sub.meta.free_month);
        assert_eq!(sub.meta.free_ends_at, sub.current_period_end);

        let limits = sub.limits(&plan);
        assert_eq!(limits.get(LimitKey::MaxBedsPerRoom), Some(Limit::Max(5)));
        assert_eq!(limits.get(LimitKey::MaxTenants), Some(Limit::Max(100)));
    }

    #[test]
    fn test_validity() {
        let plan = SubscriptionPlan::basic();
        let mut sub = Subscription::start(OwnerId::new(), &plan, "1m", now(), &tz()).unwrap();
        assert!(sub.is_valid(now(), &tz()));
        assert!(!sub.is_valid(now() + Duration::days(30), &tz()));

        sub.status = SubscriptionStatus::Trialing;
        assert!(sub.is_valid(now(), &tz()));

        sub.status = SubscriptionStatus::PastDue;
        assert!(!sub.is_valid(now(), &tz()));
    }

    #[test]
    fn test_missing_end_is_derived() {
        let plan = SubscriptionPlan::basic();
        let mut sub = Subscription::start(OwnerId::new(), &plan, "1m", now(), &tz()).unwrap();
        let stored = sub.current_period_end;
        sub.current_period_end = None;

        assert!(sub.is_valid(now() + Duration::days(27), &tz()));
        assert!(sub.backfill_period_end(&tz()).unwrap());
        assert_eq!(sub.current_period_end, stored);
        assert!(!sub.backfill_period_end(&tz()).unwrap());
    }

    #[test]
    fn test_meta_preserves_unknown_keys() {
        let meta: SubscriptionMeta = serde_json::from_value(json!({
            "free_month": true,
            "limits": {"buildings": 1},
            "applied_coupon": {"code": "WELCOME"},
            "source": "signup"
        }))
        .unwrap();
        assert!(meta.free_month);
        assert!(meta.extra.contains_key("source"));

        let mut cleared = meta.clone();
        cleared.clear_grants();
        assert_eq!(serde_json::to_value(&cleared).unwrap(), json!({"source": "signup"}));
    }

    #[test]
    fn test_plan_change_guards_buildings() {
        let plan = SubscriptionPlan::basic();
        let mut sub = Subscription::free_month(OwnerId::new(), &plan, now(), &tz()).unwrap();
        let change = PlanChange::new(plan.clone(), None);

        assert_eq!(
            change.apply(&mut sub, 2, now(), &tz()),
            Err(PlanChangeRejection::BuildingLimitExceeded { used: 2, limit: 1 })
        );
        assert!(sub.meta.free_month);

        let later = now() + Duration::days(3);
        change.apply(&mut sub, 1, later, &tz()).unwrap();
        assert_eq!(sub.current_period_start, later);
        assert!(!sub.meta.free_month);
        assert!(sub.meta.limits.is_none());
    }

    #[test]
    fn test_plan_change_interval() {
        let plan = SubscriptionPlan::new("Pro", "pro", dec!(1999));
        let mut sub = Subscription::start(OwnerId::new(), &plan, "3m", now(), &tz()).unwrap();

        PlanChange::new(plan.clone(), None).apply(&mut sub, 0, now(), &tz()).unwrap();
        assert_eq!(sub.billing_interval, "3m");

        PlanChange::new(plan.clone(), Some("yearly".into()))
            .apply(&mut sub, 0, now(), &tz())
            .unwrap();
        assert_eq!(sub.billing_interval, "12m");

        assert!(matches!(
            PlanChange::new(plan, Some("5m".into())).apply(&mut sub, 0, now(), &tz()),
            Err(PlanChangeRejection::IntervalUnavailable { .. })
        ));
    }
}
