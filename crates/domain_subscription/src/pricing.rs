//! Plan pricing: interval price, plan-level discount and GST

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::interval::normalize_interval;
use core_kernel::{Money, PlanId, Rate};

use crate::error::SubscriptionError;
use crate::plan::{DiscountType, SubscriptionPlan};

/// GST charged on subscriptions unless configured otherwise
pub const DEFAULT_GST_PERCENT: Decimal = dec!(18);

/// Price of `plan` for an interval code
///
/// Looks up the plan's `prices` map first, then the monthly and yearly
/// columns, then derives `N` months from the monthly price. Codes that are
/// not month-based have no price.
///
/// ```rust
/// use domain_subscription::{price_for_plan, SubscriptionPlan};
/// use rust_decimal_macros::dec;
///
/// let plan = SubscriptionPlan::new("Standard", "standard", dec!(999));
/// assert_eq!(price_for_plan(&plan, "3m").unwrap().amount(), dec!(2997));
/// assert!(price_for_plan(&plan, "30d").is_none());
/// ```
pub fn price_for_plan(plan: &SubscriptionPlan, interval: &str) -> Option<Money> {
    let code = normalize_interval(interval);
    if let Some(price) = plan.prices.get(&code) {
        return Some(Money::new(*price, plan.currency));
    }
    match code.as_str() {
        "1m" => Some(Money::new(plan.price_monthly, plan.currency)),
        "12m" => Some(Money::new(plan.price_yearly, plan.currency)),
        _ => {
            let months = code.strip_suffix('m')?;
            let n = months.parse::<u32>().unwrap_or(1).max(1);
            Some(Money::new(plan.price_monthly, plan.currency).multiply(Decimal::from(n)))
        }
    }
}

/// Applies the plan's own discount, returning `(final, discount)`
///
/// Percentages are clamped to 0..=100. A fixed amount only applies when its
/// currency matches the price. The final amount never goes below zero.
pub fn apply_plan_discount(
    amount: Money,
    plan: &SubscriptionPlan,
    interval: &str,
    now: DateTime<Utc>,
) -> (Money, Money) {
    let currency = amount.currency();
    let none = (amount.round_to_currency(), Money::zero(currency));
    let discount = match plan.discount.as_ref() {
        Some(d) if d.applies(interval, now) => d,
        _ => return none,
    };

    let off = match discount.discount_type {
        DiscountType::Percent => {
            let pct = discount.value.clamp(Decimal::ZERO, dec!(100));
            Rate::from_percentage(pct).apply(&amount)
        }
        DiscountType::Amount => {
            if discount.currency.is_some_and(|c| c != currency) {
                return none;
            }
            Money::new(discount.value.max(Decimal::ZERO), currency).round_to_currency()
        }
    };

    let remaining = Money::new(amount.amount() - off.amount(), currency).floor_zero();
    (remaining.round_to_currency(), off)
}

/// Adds GST, returning `(gross, gst)` rounded to the currency
///
/// Negative amounts and percentages are treated as zero.
pub fn apply_gst(amount: Money, percent: Decimal) -> (Money, Money) {
    let net = amount.floor_zero();
    let gst = Rate::from_percentage(percent.max(Decimal::ZERO)).apply(&net);
    let gross = Money::new(net.amount() + gst.amount(), net.currency()).round_to_currency();
    (gross, gst)
}

/// Price breakdown for buying a plan at an interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub plan_id: PlanId,
    pub plan_slug: String,
    pub interval: String,
    pub base: Money,
    pub discount: Money,
    pub net: Money,
    pub gst_percent: Decimal,
    pub gst: Money,
    pub gross: Money,
    pub discount_description: Option<String>,
}

impl Quote {
    /// Prices `plan` for `interval` after the plan discount and GST
    pub fn for_plan(
        plan: &SubscriptionPlan,
        interval: &str,
        gst_percent: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, SubscriptionError> {
        let code = normalize_interval(interval);
        if !plan.offers_interval(&code) {
            return Err(SubscriptionError::IntervalUnavailable { interval: code });
        }
        let base = price_for_plan(plan, &code).ok_or_else(|| {
            SubscriptionError::validation("interval", format!("No price for interval '{}'.", code))
        })?;
        let (net, discount) = apply_plan_discount(base, plan, &code, now);
        let (gross, gst) = apply_gst(net, gst_percent);
        let discount_description = if discount.is_zero() {
            None
        } else {
            plan.discount.as_ref().and_then(|d| d.description.clone())
        };

        Ok(Self {
            plan_id: plan.id,
            plan_slug: plan.slug.clone(),
            interval: code,
            base,
            discount,
            net,
            gst_percent,
            gst,
            gross,
            discount_description,
        })
    }
}
