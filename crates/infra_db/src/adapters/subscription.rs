//! PostgreSQL adapter for the subscription store
//!
//! Plan changes lock the owner's current row and count active buildings
//! inside the same transaction, so two concurrent changes cannot both pass
//! the building guard against stale data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    DomainPort, HealthCheckResult, HealthCheckable, OwnerId, PlanId, PortError, SubscriptionId,
    Timezone,
};
use domain_subscription::{
    PlanChange, PlanChangeOutcome, PlanChangeRejection, PlanSelector, Subscription,
    SubscriptionPlan, SubscriptionStore,
};

use super::{parse_column, ping};
use crate::error::DatabaseError;
use crate::repositories::{PlanRow, SubscriptionRepository, SubscriptionRow};

impl TryFrom<PlanRow> for SubscriptionPlan {
    type Error = DatabaseError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let discount = match row.discount {
            Some(value) if !value.is_null() => Some(serde_json::from_value(value)?),
            _ => None,
        };
        Ok(SubscriptionPlan {
            id: PlanId::from_uuid(row.id),
            name: row.name,
            slug: row.slug,
            currency: parse_column("currency", &row.currency)?,
            price_monthly: row.price_monthly,
            price_yearly: row.price_yearly,
            prices: serde_json::from_value(row.prices)?,
            is_active: row.is_active,
            features: serde_json::from_value(row.features)?,
            limits: serde_json::from_value(row.limits)?,
            available_intervals: serde_json::from_value(row.available_intervals)?,
            discount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DatabaseError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            owner_id: OwnerId::from_uuid(row.owner_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            status: parse_column("status", &row.status)?,
            billing_interval: row.billing_interval,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            trial_end: row.trial_end,
            cancel_at_period_end: row.cancel_at_period_end,
            is_current: row.is_current,
            meta: serde_json::from_value(row.meta)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<&Subscription> for SubscriptionRow {
    type Error = DatabaseError;

    fn try_from(sub: &Subscription) -> Result<Self, Self::Error> {
        Ok(SubscriptionRow {
            id: sub.id.into(),
            owner_id: sub.owner_id.into(),
            plan_id: sub.plan_id.into(),
            status: sub.status.as_str().to_string(),
            billing_interval: sub.billing_interval.clone(),
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            trial_end: sub.trial_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            is_current: sub.is_current,
            meta: serde_json::to_value(&sub.meta)?,
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        })
    }
}

/// PostgreSQL implementation of [`SubscriptionStore`]
#[derive(Debug, Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
    repository: SubscriptionRepository,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: SubscriptionRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PostgresSubscriptionStore {}

#[async_trait]
impl HealthCheckable for PostgresSubscriptionStore {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-subscription-store").await
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn get_plan(&self, id: PlanId) -> Result<SubscriptionPlan, PortError> {
        let row = self
            .repository
            .get_plan(id.into())
            .await?
            .ok_or_else(|| PortError::not_found("SubscriptionPlan", id))?;
        Ok(SubscriptionPlan::try_from(row)?)
    }

    async fn find_active_plan(&self, selector: &PlanSelector) -> Result<Option<SubscriptionPlan>, PortError> {
        let row = match selector {
            PlanSelector::Slug(slug) => self.repository.find_active_plan_by_slug(slug).await?,
            PlanSelector::Id(id) => self.repository.find_active_plan_by_id((*id).into()).await?,
        };
        Ok(row.map(SubscriptionPlan::try_from).transpose()?)
    }

    async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, PortError> {
        self.repository
            .list_active_plans()
            .await?
            .into_iter()
            .map(|row| SubscriptionPlan::try_from(row).map_err(PortError::from))
            .collect()
    }

    async fn current_subscription(&self, owner: OwnerId) -> Result<Option<Subscription>, PortError> {
        let row = self.repository.current(owner.into()).await?;
        Ok(row.map(Subscription::try_from).transpose()?)
    }

    async fn has_any_subscription(&self, owner: OwnerId) -> Result<bool, PortError> {
        Ok(self.repository.has_any(owner.into()).await?)
    }

    async fn insert_current(&self, subscription: Subscription) -> Result<Subscription, PortError> {
        let row = SubscriptionRow::try_from(&subscription)?;
        match self.repository.insert_current(&row).await {
            Ok(saved) => Ok(Subscription::try_from(saved)?),
            Err(e) if e.is_duplicate() => Err(PortError::conflict(format!(
                "owner {} already has a current subscription",
                subscription.owner_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_subscription(&self, subscription: Subscription) -> Result<Subscription, PortError> {
        let row = SubscriptionRow::try_from(&subscription)?;
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        let saved = SubscriptionRepository::update(&mut conn, &row).await?;
        Ok(Subscription::try_from(saved)?)
    }

    async fn count_active_buildings(&self, owner: OwnerId) -> Result<u64, PortError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        Ok(SubscriptionRepository::count_active_buildings(&mut conn, owner.into()).await?)
    }

    #[instrument(skip(self, change, tz), fields(plan = %change.plan.slug))]
    async fn change_current_plan(
        &self,
        owner: OwnerId,
        change: &PlanChange,
        now: DateTime<Utc>,
        tz: &Timezone,
    ) -> Result<PlanChangeOutcome, PortError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        let Some(row) = SubscriptionRepository::lock_current(&mut tx, owner.into()).await? else {
            return Ok(PlanChangeOutcome::Rejected(PlanChangeRejection::NoCurrentSubscription));
        };
        let used = SubscriptionRepository::count_active_buildings(&mut tx, owner.into()).await?;

        let mut subscription = Subscription::try_from(row)?;
        if let Err(rejection) = change.apply(&mut subscription, used, now, tz) {
            debug!(?rejection, used, "Plan change rejected under lock");
            tx.rollback().await.map_err(DatabaseError::from)?;
            return Ok(PlanChangeOutcome::Rejected(rejection));
        }

        let saved = SubscriptionRepository::update(&mut tx, &SubscriptionRow::try_from(&subscription)?).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        Ok(PlanChangeOutcome::Changed(Box::new(Subscription::try_from(saved)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_subscription::{Limit, LimitKey, SubscriptionStatus};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn plan_row() -> PlanRow {
        let now = Utc::now();
        PlanRow {
            id: Uuid::now_v7(),
            name: "Basic".into(),
            slug: "basic".into(),
            currency: "INR".into(),
            price_monthly: dec!(149),
            price_yearly: dec!(0),
            prices: json!({"1m": 149}),
            is_active: true,
            features: json!({}),
            limits: json!({"max_buildings": 1, "floors": 5, "max_beds_per_room": 7, "max_tenants": null}),
            available_intervals: json!(["1m"]),
            discount: Some(serde_json::Value::Null),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_plan_row_parses_typed_limits() {
        let plan = SubscriptionPlan::try_from(plan_row()).unwrap();
        assert_eq!(plan.limits.get(LimitKey::MaxBuildings), Some(Limit::Max(1)));
        assert_eq!(plan.limits.get(LimitKey::MaxFloorsPerBuilding), Some(Limit::Max(5)));
        assert_eq!(plan.limits.get(LimitKey::MaxTenants), Some(Limit::Unlimited));
        assert_eq!(plan.prices.get("1m"), Some(&dec!(149)));
        assert!(plan.discount.is_none());
    }

    #[test]
    fn test_unknown_limit_key_fails_mapping() {
        let mut row = plan_row();
        row.limits = json!({"bookings_media": {"max_per_booking": 3}});
        assert!(matches!(
            SubscriptionPlan::try_from(row),
            Err(DatabaseError::SerializationError(_))
        ));
    }

    #[test]
    fn test_subscription_meta_keeps_unknown_keys() {
        let now = Utc::now();
        let row = SubscriptionRow {
            id: Uuid::now_v7(),
            owner_id: Uuid::now_v7(),
            plan_id: Uuid::now_v7(),
            status: "trialing".into(),
            billing_interval: "1m".into(),
            current_period_start: now,
            current_period_end: None,
            trial_end: None,
            cancel_at_period_end: false,
            is_current: true,
            meta: json!({"free_month": true, "limits": {"max_buildings": 1}, "source": "signup"}),
            created_at: now,
            updated_at: now,
        };

        let sub = Subscription::try_from(row).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert!(sub.meta.free_month);
        assert_eq!(sub.meta.extra.get("source"), Some(&json!("signup")));

        let back = SubscriptionRow::try_from(&sub).unwrap();
        assert_eq!(back.meta["source"], json!("signup"));
        assert_eq!(back.meta["limits"]["max_buildings"], json!(1));
    }
}
