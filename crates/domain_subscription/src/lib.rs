//! Subscription Domain - Plans, limits and the owner gate
//!
//! Owners (pg_admin accounts) subscribe to a plan that caps how many
//! buildings, floors, rooms, beds, staff and tenants they can create and
//! which optional features they can use.
//!
//! # Components
//!
//! - **Plans** ([`plan`]): typed [`PlanLimits`] and [`PlanFeatures`] maps
//!   validated when parsed, plan-level discounts and interval selection
//! - **Subscriptions** ([`subscription`]): validity, the free first month,
//!   expiry and plan changes
//! - **Pricing** ([`pricing`]): interval prices, discounts and GST quotes
//! - **Gate** ([`gate`]): feature and limit enforcement for an [`core_kernel::Actor`]
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_subscription::{LimitKey, SubscriptionGate};
//!
//! let gate = SubscriptionGate::new(store).with_timezone(tz);
//!
//! // Before creating another building
//! gate.ensure_limit_not_exceeded(&actor, LimitKey::MaxBuildings, used, Utc::now())
//!     .await?;
//! ```

pub mod plan;
pub mod subscription;
pub mod pricing;
pub mod ports;
pub mod gate;
pub mod error;

pub use plan::{
    DiscountType, FeatureKey, Limit, LimitKey, PlanDiscount, PlanFeatures, PlanLimits,
    SubscriptionPlan,
};
pub use subscription::{
    CurrentSubscription, PlanChange, PlanChangeOutcome, PlanChangeRejection, Subscription,
    SubscriptionMeta, SubscriptionStatus,
};
pub use pricing::{apply_gst, apply_plan_discount, price_for_plan, Quote, DEFAULT_GST_PERCENT};
pub use ports::{PlanSelector, SubscriptionStore};
pub use gate::{ChangePlanRequest, SubscriptionGate};
pub use error::SubscriptionError;
