//! Subscription limit and feature gate
//!
//! Create operations elsewhere in the system ask the gate whether the
//! owner's plan enables a feature and whether one more item fits under a
//! quantity limit. Staff act on behalf of their pg_admin, so every check
//! resolves the owner first.
//!
//! Checks only read: an owner without a valid current subscription simply
//! gets no features and the caller's default limits. Provisioning the free
//! month and expiring lapsed rows happens in [`SubscriptionGate::current_subscription`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use core_kernel::{Actor, ActorRole, OwnerId, Timezone};

use crate::error::SubscriptionError;
use crate::plan::{FeatureKey, Limit, LimitKey, SubscriptionPlan};
use crate::ports::{PlanSelector, SubscriptionStore};
use crate::pricing::{Quote, DEFAULT_GST_PERCENT};
use crate::subscription::{CurrentSubscription, PlanChange, PlanChangeOutcome, Subscription};

/// Entry point for subscription checks
#[derive(Clone)]
pub struct SubscriptionGate {
    store: Arc<dyn SubscriptionStore>,
    tz: Timezone,
    gst_percent: Decimal,
}

impl std::fmt::Debug for SubscriptionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGate")
            .field("tz", &self.tz.name())
            .field("gst_percent", &self.gst_percent)
            .finish()
    }
}

/// Plan change requested by an owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePlanRequest {
    pub plan: PlanSelector,
    pub interval: Option<String>,
}

impl SubscriptionGate {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            store,
            tz: Timezone::default(),
            gst_percent: DEFAULT_GST_PERCENT,
        }
    }

    /// Sets the timezone whose day boundaries end subscription periods
    pub fn with_timezone(mut self, tz: Timezone) -> Self {
        self.tz = tz;
        self
    }

    pub fn with_gst_percent(mut self, percent: Decimal) -> Self {
        self.gst_percent = percent;
        self
    }

    pub fn timezone(&self) -> &Timezone {
        &self.tz
    }

    /// The pg_admin account whose subscription governs the actor
    pub fn resolve_owner(&self, actor: &Actor) -> Result<OwnerId, SubscriptionError> {
        Ok(actor.require_owner()?)
    }

    /// The owner's current row with its plan, without side effects
    #[instrument(skip(self))]
    pub async fn lookup(&self, owner: OwnerId) -> Result<Option<CurrentSubscription>, SubscriptionError> {
        let Some(subscription) = self.store.current_subscription(owner).await? else {
            return Ok(None);
        };
        let plan = self.store.get_plan(subscription.plan_id).await?;
        Ok(Some(CurrentSubscription { subscription, plan }))
    }

    /// The owner's current subscription if it is valid at `now`
    async fn valid_subscription(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Option<CurrentSubscription>, SubscriptionError> {
        let owner = self.resolve_owner(actor)?;
        Ok(self
            .lookup(owner)
            .await?
            .filter(|current| current.subscription.is_valid(now, &self.tz)))
    }

    /// Resolves the actor's current subscription for display
    ///
    /// An owner who has never had a subscription is provisioned a free
    /// month on the cheapest active plan. A row whose period has ended is
    /// marked expired and released.
    #[instrument(skip(self, actor), fields(role = %actor.role))]
    pub async fn current_subscription(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<CurrentSubscription, SubscriptionError> {
        let owner = self.resolve_owner(actor)?;

        let mut subscription = match self.store.current_subscription(owner).await? {
            Some(sub) => sub,
            None => self.provision_free_month(owner, now).await?,
        };

        if subscription.backfill_period_end(&self.tz)? {
            subscription = self.store.update_subscription(subscription).await?;
        }

        if !subscription.status.grants_access() {
            return Err(SubscriptionError::Inactive);
        }

        if subscription.has_lapsed(now, &self.tz) {
            subscription.expire(now);
            self.store.update_subscription(subscription).await?;
            info!(%owner, "Current subscription expired");
            return Err(SubscriptionError::Expired);
        }

        let plan = self.store.get_plan(subscription.plan_id).await?;
        Ok(CurrentSubscription { subscription, plan })
    }

    async fn provision_free_month(
        &self,
        owner: OwnerId,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        if self.store.has_any_subscription(owner).await? {
            return Err(SubscriptionError::NoSubscription);
        }
        let plan = self
            .store
            .list_active_plans()
            .await?
            .into_iter()
            .next()
            .ok_or(SubscriptionError::NoActivePlans)?;

        let subscription = Subscription::free_month(owner, &plan, now, &self.tz)?;
        match self.store.insert_current(subscription).await {
            Ok(created) => {
                info!(%owner, plan = %plan.slug, "Provisioned free month");
                Ok(created)
            }
            Err(err) if err.is_conflict() => {
                debug!(%owner, "Free month provisioned concurrently");
                self.store
                    .current_subscription(owner)
                    .await?
                    .ok_or(SubscriptionError::NoSubscription)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns true when the actor's valid subscription enables `key`
    ///
    /// The subscription's own feature overrides replace the plan's.
    #[instrument(skip(self, actor))]
    pub async fn has_feature(
        &self,
        actor: &Actor,
        key: FeatureKey,
        now: DateTime<Utc>,
    ) -> Result<bool, SubscriptionError> {
        Ok(self
            .valid_subscription(actor, now)
            .await?
            .is_some_and(|current| current.has_feature(key)))
    }

    /// The limit in force for `key`
    ///
    /// Falls back to `default` when the key is absent or the actor has no
    /// valid subscription.
    #[instrument(skip(self, actor))]
    pub async fn get_limit(
        &self,
        actor: &Actor,
        key: LimitKey,
        default: Limit,
        now: DateTime<Utc>,
    ) -> Result<Limit, SubscriptionError> {
        Ok(self
            .valid_subscription(actor, now)
            .await?
            .map_or(default, |current| current.limit(key, default)))
    }

    pub async fn ensure_feature(
        &self,
        actor: &Actor,
        key: FeatureKey,
        now: DateTime<Utc>,
    ) -> Result<(), SubscriptionError> {
        if self.has_feature(actor, key, now).await? {
            Ok(())
        } else {
            Err(SubscriptionError::FeatureNotIncluded { key })
        }
    }

    /// Refuses when `used` items already reach the limit for `key`
    ///
    /// An absent limit does not restrict.
    pub async fn ensure_limit_not_exceeded(
        &self,
        actor: &Actor,
        key: LimitKey,
        used: u64,
        now: DateTime<Utc>,
    ) -> Result<(), SubscriptionError> {
        let limit = self.get_limit(actor, key, Limit::Unlimited, now).await?;
        match limit {
            Limit::Max(max) if limit.is_reached_by(used) => {
                debug!(%key, used, max, "Subscription limit reached");
                Err(SubscriptionError::LimitReached { key, used, limit: max })
            }
            _ => Ok(()),
        }
    }

    async fn active_plan(&self, selector: &PlanSelector) -> Result<SubscriptionPlan, SubscriptionError> {
        self.store
            .find_active_plan(selector)
            .await?
            .ok_or_else(|| SubscriptionError::PlanNotFound(selector.to_string()))
    }

    /// Moves the actor's current subscription onto another plan
    ///
    /// Only the owner may change plan. The new period starts at `now`.
    #[instrument(skip(self, actor), fields(role = %actor.role))]
    pub async fn change_plan(
        &self,
        actor: &Actor,
        request: ChangePlanRequest,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        if actor.role == ActorRole::PgStaff {
            return Err(SubscriptionError::NotPermitted("Only PG Admin can change subscription"));
        }
        let owner = self.resolve_owner(actor)?;
        let plan = self.active_plan(&request.plan).await?;

        // Reject an unavailable interval before taking the row lock
        plan.choose_interval(request.interval.as_deref(), None)?;

        let change = PlanChange::new(plan, request.interval);
        match self.store.change_current_plan(owner, &change, now, &self.tz).await? {
            PlanChangeOutcome::Changed(subscription) => {
                info!(
                    %owner,
                    plan = %change.plan.slug,
                    interval = %subscription.billing_interval,
                    "Subscription plan changed"
                );
                Ok(*subscription)
            }
            PlanChangeOutcome::Rejected(rejection) => {
                warn!(%owner, plan = %change.plan.slug, ?rejection, "Plan change rejected");
                Err(rejection.into())
            }
        }
    }

    /// Prices a plan for an interval
    pub async fn quote(
        &self,
        plan: &PlanSelector,
        interval: &str,
        now: DateTime<Utc>,
    ) -> Result<Quote, SubscriptionError> {
        let plan = self.active_plan(plan).await?;
        Quote::for_plan(&plan, interval, self.gst_percent, now)
    }

    /// Active plans, cheapest first
    pub async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>, SubscriptionError> {
        Ok(self.store.list_active_plans().await?)
    }
}
