//! Storage port for plans and subscriptions

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{DomainPort, OwnerId, PlanId, PortError, Timezone};

use crate::plan::SubscriptionPlan;
use crate::subscription::{PlanChange, PlanChangeOutcome, Subscription};

/// Identifies a plan by slug or id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSelector {
    Slug(String),
    Id(PlanId),
}

impl std::fmt::Display for PlanSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanSelector::Slug(slug) => f.write_str(slug),
            PlanSelector::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Plan catalog and subscription persistence
#[async_trait]
pub trait SubscriptionStore: DomainPort {
    async fn get_plan(&self, id: PlanId) -> Result<SubscriptionPlan, PortError>;

    /// An active plan matching the selector
    async fn find_active_plan(&self, selector: &PlanSelector) -> Result<Option<SubscriptionPlan>, PortError>;

    /// Active plans ordered by monthly price, then id
    async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, PortError>;

    /// The owner's `is_current` subscription
    async fn current_subscription(&self, owner: OwnerId) -> Result<Option<Subscription>, PortError>;

    /// True when the owner has ever had a subscription row
    async fn has_any_subscription(&self, owner: OwnerId) -> Result<bool, PortError>;

    /// Makes `subscription` the owner's current row
    ///
    /// Any other current row is unset in the same transaction. Fails with
    /// [`PortError::Conflict`] when a concurrent insert won the slot.
    async fn insert_current(&self, subscription: Subscription) -> Result<Subscription, PortError>;

    async fn update_subscription(&self, subscription: Subscription) -> Result<Subscription, PortError>;

    /// Active buildings owned by `owner`
    async fn count_active_buildings(&self, owner: OwnerId) -> Result<u64, PortError>;

    /// Applies `change` to the owner's current row while holding its lock
    async fn change_current_plan(
        &self,
        owner: OwnerId,
        change: &PlanChange,
        now: DateTime<Utc>,
        tz: &Timezone,
    ) -> Result<PlanChangeOutcome, PortError>;
}

/// In-memory adapter for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use core_kernel::{AdapterHealth, HealthCheckResult, HealthCheckable};

    #[derive(Debug, Default)]
    struct State {
        plans: Vec<SubscriptionPlan>,
        subscriptions: Vec<Subscription>,
        active_buildings: HashMap<OwnerId, u64>,
    }

    /// In-memory implementation of [`SubscriptionStore`]
    #[derive(Debug, Clone, Default)]
    pub struct InMemorySubscriptionStore {
        state: Arc<RwLock<State>>,
    }

    impl InMemorySubscriptionStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn put_plan(&self, plan: SubscriptionPlan) {
            let mut state = self.state.write().await;
            state.plans.retain(|p| p.id != plan.id);
            state.plans.push(plan);
        }

        pub async fn set_active_buildings(&self, owner: OwnerId, count: u64) {
            self.state.write().await.active_buildings.insert(owner, count);
        }

        /// Every row for the owner, current or not
        pub async fn subscriptions_for(&self, owner: OwnerId) -> Vec<Subscription> {
            self.state
                .read()
                .await
                .subscriptions
                .iter()
                .filter(|s| s.owner_id == owner)
                .cloned()
                .collect()
        }
    }

    impl DomainPort for InMemorySubscriptionStore {}

    #[async_trait]
    impl HealthCheckable for InMemorySubscriptionStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "in_memory_subscriptions".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: None,
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl SubscriptionStore for InMemorySubscriptionStore {
        async fn get_plan(&self, id: PlanId) -> Result<SubscriptionPlan, PortError> {
            self.state
                .read()
                .await
                .plans
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| PortError::not_found("SubscriptionPlan", id))
        }

        async fn find_active_plan(&self, selector: &PlanSelector) -> Result<Option<SubscriptionPlan>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .plans
                .iter()
                .filter(|p| p.is_active)
                .find(|p| match selector {
                    PlanSelector::Slug(slug) => p.slug == *slug,
                    PlanSelector::Id(id) => p.id == *id,
                })
                .cloned())
        }

        async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, PortError> {
            let mut plans: Vec<_> = self
                .state
                .read()
                .await
                .plans
                .iter()
                .filter(|p| p.is_active)
                .cloned()
                .collect();
            plans.sort_by(|a, b| a.price_monthly.cmp(&b.price_monthly).then(a.id.cmp(&b.id)));
            Ok(plans)
        }

        async fn current_subscription(&self, owner: OwnerId) -> Result<Option<Subscription>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .subscriptions
                .iter()
                .find(|s| s.owner_id == owner && s.is_current)
                .cloned())
        }

        async fn has_any_subscription(&self, owner: OwnerId) -> Result<bool, PortError> {
            Ok(self.state.read().await.subscriptions.iter().any(|s| s.owner_id == owner))
        }

        async fn insert_current(&self, subscription: Subscription) -> Result<Subscription, PortError> {
            let mut state = self.state.write().await;
            for row in state
                .subscriptions
                .iter_mut()
                .filter(|s| s.owner_id == subscription.owner_id && s.is_current)
            {
                row.is_current = false;
            }
            state.subscriptions.push(subscription.clone());
            Ok(subscription)
        }

        async fn update_subscription(&self, subscription: Subscription) -> Result<Subscription, PortError> {
            let mut state = self.state.write().await;
            let row = state
                .subscriptions
                .iter_mut()
                .find(|s| s.id == subscription.id)
                .ok_or_else(|| PortError::not_found("Subscription", subscription.id))?;
            *row = subscription.clone();
            Ok(subscription)
        }

        async fn count_active_buildings(&self, owner: OwnerId) -> Result<u64, PortError> {
            Ok(self
                .state
                .read()
                .await
                .active_buildings
                .get(&owner)
                .copied()
                .unwrap_or(0))
        }

        async fn change_current_plan(
            &self,
            owner: OwnerId,
            change: &PlanChange,
            now: DateTime<Utc>,
            tz: &Timezone,
        ) -> Result<PlanChangeOutcome, PortError> {
            let mut state = self.state.write().await;
            let used = state.active_buildings.get(&owner).copied().unwrap_or(0);
            let Some(row) = state
                .subscriptions
                .iter_mut()
                .find(|s| s.owner_id == owner && s.is_current)
            else {
                return Ok(PlanChangeOutcome::Rejected(
                    crate::subscription::PlanChangeRejection::NoCurrentSubscription,
                ));
            };

            let mut updated = row.clone();
            match change.apply(&mut updated, used, now, tz) {
                Ok(()) => {
                    *row = updated.clone();
                    Ok(PlanChangeOutcome::Changed(Box::new(updated)))
                }
                Err(rejection) => Ok(PlanChangeOutcome::Rejected(rejection)),
            }
        }
    }
}
