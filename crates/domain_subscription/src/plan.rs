//! Subscription plans with typed limits and features
//!
//! Plan limits and feature flags are stored as JSON objects. They are parsed
//! into [`PlanLimits`] and [`PlanFeatures`] at the boundary: unknown keys and
//! non-integer limit values are rejected when the JSON is read, so the gate
//! never has to second-guess a stored value.
//!
//! A limit of `null` means unlimited. Older rows use short key names
//! (`buildings`, `floors`, ...) next to the `max_*` caps; both spellings map
//! onto the same [`LimitKey`], with the `max_*` spelling taking precedence.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use core_kernel::interval::{normalize_interval, DEFAULT_INTERVAL};
use core_kernel::{CoreError, Currency, PlanId};

use crate::error::SubscriptionError;

/// Intervals offered when a plan does not list its own
pub const DEFAULT_AVAILABLE_INTERVALS: [&str; 4] = ["1m", "3m", "6m", "12m"];

/// Named quantity ceilings a plan can impose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LimitKey {
    MaxBuildings,
    MaxFloorsPerBuilding,
    MaxRoomsPerFloor,
    MaxBedsPerRoom,
    MaxStaff,
    MaxTenants,
    MaxTenantMediaPerTenant,
    StorageMb,
}

impl LimitKey {
    pub const ALL: &'static [LimitKey] = &[
        LimitKey::MaxBuildings,
        LimitKey::MaxFloorsPerBuilding,
        LimitKey::MaxRoomsPerFloor,
        LimitKey::MaxBedsPerRoom,
        LimitKey::MaxStaff,
        LimitKey::MaxTenants,
        LimitKey::MaxTenantMediaPerTenant,
        LimitKey::StorageMb,
    ];

    /// Canonical stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKey::MaxBuildings => "max_buildings",
            LimitKey::MaxFloorsPerBuilding => "max_floors_per_building",
            LimitKey::MaxRoomsPerFloor => "max_rooms_per_floor",
            LimitKey::MaxBedsPerRoom => "max_beds_per_room",
            LimitKey::MaxStaff => "max_staff",
            LimitKey::MaxTenants => "max_tenants",
            LimitKey::MaxTenantMediaPerTenant => "max_tenant_media_per_tenant",
            LimitKey::StorageMb => "storage_mb",
        }
    }

    /// Legacy spellings accepted on input
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            LimitKey::MaxBuildings => &["buildings"],
            LimitKey::MaxFloorsPerBuilding => &["floors", "max_floors"],
            LimitKey::MaxRoomsPerFloor => &["rooms", "max_rooms"],
            LimitKey::MaxBedsPerRoom => &["beds", "max_beds"],
            LimitKey::MaxStaff => &["staff"],
            LimitKey::MaxTenants => &["tenants"],
            LimitKey::MaxTenantMediaPerTenant | LimitKey::StorageMb => &[],
        }
    }

    /// Resolves a stored name; the flag is true when `name` is the canonical one
    fn lookup(name: &str) -> Option<(LimitKey, bool)> {
        Self::ALL.iter().find_map(|key| {
            if key.as_str() == name {
                Some((*key, true))
            } else if key.aliases().contains(&name) {
                Some((*key, false))
            } else {
                None
            }
        })
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s.trim())
            .map(|(key, _)| key)
            .ok_or_else(|| CoreError::validation(format!("'{}' is not a valid limit key", s)))
    }
}

impl Serialize for LimitKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LimitKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

core_kernel::string_enum! {
    /// Boolean capabilities a plan can enable
    #[derive(PartialOrd, Ord)]
    pub enum FeatureKey {
        Bookings => "bookings",
        Payments => "payments",
        TenantMedia => "tenant_media",
        StaffMedia => "staff_media",
        Reports => "reports",
    }
}

/// A quantity ceiling; `null` in JSON is [`Limit::Unlimited`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum Limit {
    Unlimited,
    Max(u64),
}

impl Limit {
    /// The ceiling, or `None` when unlimited
    pub fn max(&self) -> Option<u64> {
        match self {
            Limit::Unlimited => None,
            Limit::Max(n) => Some(*n),
        }
    }

    /// True when `used` items already reach the ceiling, so one more is refused
    pub fn is_reached_by(&self, used: u64) -> bool {
        matches!(self, Limit::Max(n) if used >= *n)
    }
}

impl From<Option<u64>> for Limit {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Limit::Unlimited, Limit::Max)
    }
}

impl From<Limit> for Option<u64> {
    fn from(limit: Limit) -> Self {
        limit.max()
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::Max(n) => write!(f, "{}", n),
        }
    }
}

/// Quantity ceilings keyed by [`LimitKey`]
///
/// An absent key is distinct from [`Limit::Unlimited`]: callers supply the
/// default for absent keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanLimits(BTreeMap<LimitKey, Limit>);

impl PlanLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, key: LimitKey, limit: Limit) -> Self {
        self.0.insert(key, limit);
        self
    }

    pub fn set(&mut self, key: LimitKey, limit: Limit) {
        self.0.insert(key, limit);
    }

    /// The stored limit, or `None` when the key is absent
    pub fn get(&self, key: LimitKey) -> Option<Limit> {
        self.0.get(&key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LimitKey, Limit)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Parses stored entries, accepting legacy key spellings
    ///
    /// When both a `max_*` key and its short alias are present the `max_*`
    /// value wins regardless of order.
    pub fn from_entries<I>(entries: I) -> Result<Self, SubscriptionError>
    where
        I: IntoIterator<Item = (String, Option<u64>)>,
    {
        let mut canonical = BTreeMap::new();
        let mut aliased = BTreeMap::new();
        for (name, value) in entries {
            match LimitKey::lookup(name.trim()) {
                Some((key, true)) => {
                    canonical.insert(key, Limit::from(value));
                }
                Some((key, false)) => {
                    aliased.insert(key, Limit::from(value));
                }
                None => {
                    return Err(SubscriptionError::validation(
                        "limits",
                        format!("Unknown limit key '{}'.", name),
                    ))
                }
            }
        }
        aliased.extend(canonical);
        Ok(Self(aliased))
    }

    /// The stricter limits granted for an owner's first free month
    pub fn free_month(base: &PlanLimits) -> PlanLimits {
        base.clone()
            .with(LimitKey::MaxBuildings, Limit::Max(1))
            .with(LimitKey::MaxStaff, Limit::Max(1))
            .with(LimitKey::MaxFloorsPerBuilding, Limit::Max(5))
            .with(LimitKey::MaxRoomsPerFloor, Limit::Max(5))
            .with(LimitKey::MaxBedsPerRoom, Limit::Max(5))
            .with(LimitKey::MaxTenants, Limit::Max(100))
    }
}

impl Serialize for PlanLimits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, limit) in &self.0 {
            map.serialize_entry(key.as_str(), &limit.max())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PlanLimits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<u64>>::deserialize(deserializer)?;
        PlanLimits::from_entries(raw).map_err(de::Error::custom)
    }
}

/// Feature flags keyed by [`FeatureKey`]; absent flags are disabled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanFeatures(BTreeMap<FeatureKey, bool>);

impl PlanFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: FeatureKey, enabled: bool) -> Self {
        self.0.insert(key, enabled);
        self
    }

    pub fn is_enabled(&self, key: FeatureKey) -> bool {
        self.0.get(&key).copied().unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

core_kernel::string_enum! {
    pub enum DiscountType {
        Percent => "percent",
        Amount => "amount",
    }
}

/// Discount configured on the plan itself, applied automatically in quotes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDiscount {
    pub active: bool,
    pub discount_type: DiscountType,
    pub value: Decimal,
    /// Currency of a fixed-amount discount; `None` matches any currency
    pub currency: Option<Currency>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Empty means every interval
    #[serde(default)]
    pub allowed_intervals: Vec<String>,
    pub description: Option<String>,
}

impl PlanDiscount {
    /// Returns true when the discount is active at `now` for `interval`
    pub fn applies(&self, interval: &str, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return false;
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return false;
        }
        let code = normalize_interval(interval);
        self.allowed_intervals.is_empty() || self.allowed_intervals.iter().any(|iv| *iv == code)
    }
}

/// A catalog plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: PlanId,
    pub name: String,
    pub slug: String,
    pub currency: Currency,
    pub price_monthly: Decimal,
    pub price_yearly: Decimal,
    /// Interval code to price; takes precedence over the monthly/yearly columns
    #[serde(default)]
    pub prices: BTreeMap<String, Decimal>,
    pub is_active: bool,
    #[serde(default)]
    pub features: PlanFeatures,
    #[serde(default)]
    pub limits: PlanLimits,
    #[serde(default)]
    pub available_intervals: Vec<String>,
    pub discount: Option<PlanDiscount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    /// Creates an active plan with no limits or features
    pub fn new(name: impl Into<String>, slug: impl Into<String>, price_monthly: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: PlanId::new_v7(),
            name: name.into(),
            slug: slug.into(),
            currency: Currency::INR,
            price_monthly,
            price_yearly: Decimal::ZERO,
            prices: BTreeMap::new(),
            is_active: true,
            features: PlanFeatures::new(),
            limits: PlanLimits::new(),
            available_intervals: Vec::new(),
            discount: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The default `basic` plan: INR 149 a month, one building
    pub fn basic() -> Self {
        let mut plan = Self::new("Basic", "basic", dec!(149));
        plan.prices.insert("1m".to_string(), dec!(149));
        plan.available_intervals = vec!["1m".to_string()];
        plan.limits = PlanLimits::new()
            .with(LimitKey::MaxBuildings, Limit::Max(1))
            .with(LimitKey::MaxFloorsPerBuilding, Limit::Max(5))
            .with(LimitKey::MaxRoomsPerFloor, Limit::Max(5))
            .with(LimitKey::MaxBedsPerRoom, Limit::Max(7))
            .with(LimitKey::MaxStaff, Limit::Max(1));
        plan
    }

    pub fn with_limits(mut self, limits: PlanLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_features(mut self, features: PlanFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_discount(mut self, discount: PlanDiscount) -> Self {
        self.discount = Some(discount);
        self
    }

    /// Interval codes the plan can be bought for
    pub fn intervals(&self) -> Vec<String> {
        if self.available_intervals.is_empty() {
            DEFAULT_AVAILABLE_INTERVALS.iter().map(|s| s.to_string()).collect()
        } else {
            self.available_intervals.clone()
        }
    }

    pub fn offers_interval(&self, code: &str) -> bool {
        self.intervals().iter().any(|iv| iv == code)
    }

    /// Picks the billing interval for a plan change
    ///
    /// A requested interval must be offered by the plan. Without one, the
    /// subscription keeps its current interval when the plan offers it, then
    /// falls back to `1m`, then to the plan's first interval.
    pub fn choose_interval(
        &self,
        requested: Option<&str>,
        current: Option<&str>,
    ) -> Result<String, SubscriptionError> {
        let offered = self.intervals();
        if let Some(raw) = requested.filter(|r| !r.trim().is_empty()) {
            let code = normalize_interval(raw);
            if !offered.contains(&code) {
                return Err(SubscriptionError::IntervalUnavailable { interval: code });
            }
            return Ok(code);
        }
        if let Some(code) = current.filter(|c| offered.iter().any(|iv| iv == c)) {
            return Ok(code.to_string());
        }
        if offered.iter().any(|iv| iv == DEFAULT_INTERVAL) {
            return Ok(DEFAULT_INTERVAL.to_string());
        }
        Ok(offered
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_INTERVAL.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_limits_accept_aliases_with_canonical_precedence() {
        let limits: PlanLimits = serde_json::from_value(json!({
            "buildings": 3,
            "max_buildings": 1,
            "floors": 5,
            "max_staff": null
        }))
        .unwrap();

        assert_eq!(limits.get(LimitKey::MaxBuildings), Some(Limit::Max(1)));
        assert_eq!(limits.get(LimitKey::MaxFloorsPerBuilding), Some(Limit::Max(5)));
        assert_eq!(limits.get(LimitKey::MaxStaff), Some(Limit::Unlimited));
        assert_eq!(limits.get(LimitKey::MaxTenants), None);
    }

    #[test]
    fn test_limits_reject_unknown_keys_and_bad_values() {
        assert!(serde_json::from_value::<PlanLimits>(json!({"max_parking": 2})).is_err());
        assert!(serde_json::from_value::<PlanLimits>(json!({"max_buildings": "two"})).is_err());
        assert!(serde_json::from_value::<PlanLimits>(json!({"max_buildings": -1})).is_err());
        assert!(serde_json::from_value::<PlanLimits>(json!({"max_buildings": 1.5})).is_err());
    }

    #[test]
    fn test_limits_serialize_canonical_names() {
        let limits = PlanLimits::new()
            .with(LimitKey::MaxBedsPerRoom, Limit::Max(4))
            .with(LimitKey::StorageMb, Limit::Unlimited);
        assert_eq!(
            serde_json::to_value(&limits).unwrap(),
            json!({"max_beds_per_room": 4, "storage_mb": null})
        );
    }

    #[test]
    fn test_features_reject_unknown_keys() {
        let features: PlanFeatures =
            serde_json::from_value(json!({"reports": true, "bookings": false})).unwrap();
        assert!(features.is_enabled(FeatureKey::Reports));
        assert!(!features.is_enabled(FeatureKey::Bookings));
        assert!(!features.is_enabled(FeatureKey::Payments));

        assert!(serde_json::from_value::<PlanFeatures>(json!({"sms": true})).is_err());
        assert!(serde_json::from_value::<PlanFeatures>(json!({"reports": "yes"})).is_err());
    }

    #[test]
    fn test_limit_reached() {
        assert!(Limit::Max(1).is_reached_by(1));
        assert!(!Limit::Max(2).is_reached_by(1));
        assert!(Limit::Max(0).is_reached_by(0));
        assert!(!Limit::Unlimited.is_reached_by(u64::MAX));
    }

    #[test]
    fn test_free_month_limits_override_base() {
        let base = PlanLimits::new()
            .with(LimitKey::MaxBuildings, Limit::Max(10))
            .with(LimitKey::MaxTenantMediaPerTenant, Limit::Max(2));
        let free = PlanLimits::free_month(&base);

        assert_eq!(free.get(LimitKey::MaxBuildings), Some(Limit::Max(1)));
        assert_eq!(free.get(LimitKey::MaxBedsPerRoom), Some(Limit::Max(5)));
        assert_eq!(free.get(LimitKey::MaxTenants), Some(Limit::Max(100)));
        assert_eq!(free.get(LimitKey::MaxTenantMediaPerTenant), Some(Limit::Max(2)));
    }

    #[test]
    fn test_basic_plan_seed() {
        let plan = SubscriptionPlan::basic();
        assert_eq!(plan.slug, "basic");
        assert_eq!(plan.price_monthly, dec!(149));
        assert_eq!(plan.limits.get(LimitKey::MaxBuildings), Some(Limit::Max(1)));
        assert_eq!(plan.limits.get(LimitKey::MaxBedsPerRoom), Some(Limit::Max(7)));
        assert_eq!(plan.intervals(), vec!["1m".to_string()]);
    }

    #[test]
    fn test_choose_interval() {
        let plan = SubscriptionPlan::new("Standard", "standard", dec!(999));

        assert_eq!(plan.choose_interval(Some("Annual"), None).unwrap(), "12m");
        assert_eq!(plan.choose_interval(None, Some("6m")).unwrap(), "6m");
        assert_eq!(plan.choose_interval(None, Some("2m")).unwrap(), "1m");
        assert!(matches!(
            plan.choose_interval(Some("2m"), None),
            Err(SubscriptionError::IntervalUnavailable { .. })
        ));

        let mut yearly_only = plan.clone();
        yearly_only.available_intervals = vec!["12m".to_string()];
        assert_eq!(yearly_only.choose_interval(None, Some("1m")).unwrap(), "12m");
    }

    #[test]
    fn test_discount_window_and_intervals() {
        let now = Utc::now();
        let discount = PlanDiscount {
            active: true,
            discount_type: DiscountType::Percent,
            value: dec!(10),
            currency: None,
            valid_from: Some(now - chrono::Duration::days(1)),
            valid_until: Some(now + chrono::Duration::days(1)),
            allowed_intervals: vec!["12m".to_string()],
            description: None,
        };
        assert!(discount.applies("yearly", now));
        assert!(!discount.applies("1m", now));
        assert!(!discount.applies("12m", now + chrono::Duration::days(2)));

        let inactive = PlanDiscount { active: false, ..discount };
        assert!(!inactive.applies("12m", now));
    }
}
