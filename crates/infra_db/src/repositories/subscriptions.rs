//! Plan catalog and subscription persistence
//!
//! JSONB columns are read as raw values; the adapter parses them into the
//! typed limit and feature maps so an unknown key surfaces as a mapping
//! error instead of being dropped.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub currency: String,
    pub price_monthly: Decimal,
    pub price_yearly: Decimal,
    pub prices: serde_json::Value,
    pub is_active: bool,
    pub features: serde_json::Value,
    pub limits: serde_json::Value,
    pub available_intervals: serde_json::Value,
    pub discount: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub billing_interval: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub is_current: bool,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_plan(&self, id: Uuid) -> Result<Option<PlanRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PlanRow>("SELECT * FROM subscription_plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_active_plan_by_slug(&self, slug: &str) -> Result<Option<PlanRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT * FROM subscription_plans WHERE slug = $1 AND is_active",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_active_plan_by_id(&self, id: Uuid) -> Result<Option<PlanRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT * FROM subscription_plans WHERE id = $1 AND is_active",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Active plans, cheapest monthly price first
    #[instrument(skip(self))]
    pub async fn list_active_plans(&self) -> Result<Vec<PlanRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PlanRow>(
            "SELECT * FROM subscription_plans WHERE is_active ORDER BY price_monthly, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn current(&self, owner_id: Uuid) -> Result<Option<SubscriptionRow>, DatabaseError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE owner_id = $1 AND is_current",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Reads and locks the owner's current row
    pub async fn lock_current(
        conn: &mut PgConnection,
        owner_id: Uuid,
    ) -> Result<Option<SubscriptionRow>, DatabaseError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions WHERE owner_id = $1 AND is_current FOR UPDATE",
        )
        .bind(owner_id)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    pub async fn has_any(&self, owner_id: Uuid) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE owner_id = $1)",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Makes `row` the owner's only current subscription
    ///
    /// A concurrent insert for the same owner trips the partial unique
    /// index and fails with [`DatabaseError::DuplicateEntry`].
    #[instrument(skip(self, row), fields(owner_id = %row.owner_id))]
    pub async fn insert_current(&self, row: &SubscriptionRow) -> Result<SubscriptionRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE subscriptions SET is_current = FALSE, updated_at = now() WHERE owner_id = $1 AND is_current",
        )
        .bind(row.owner_id)
        .execute(&mut *tx)
        .await?;

        let saved = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO subscriptions (
                id, owner_id, plan_id, status, billing_interval, current_period_start,
                current_period_end, trial_end, cancel_at_period_end, is_current, meta,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.owner_id)
        .bind(row.plan_id)
        .bind(&row.status)
        .bind(&row.billing_interval)
        .bind(row.current_period_start)
        .bind(row.current_period_end)
        .bind(row.trial_end)
        .bind(row.cancel_at_period_end)
        .bind(&row.meta)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(saved)
    }

    pub async fn update(conn: &mut PgConnection, row: &SubscriptionRow) -> Result<SubscriptionRow, DatabaseError> {
        let saved = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            UPDATE subscriptions SET
                plan_id = $2,
                status = $3,
                billing_interval = $4,
                current_period_start = $5,
                current_period_end = $6,
                trial_end = $7,
                cancel_at_period_end = $8,
                is_current = $9,
                meta = $10,
                updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.plan_id)
        .bind(&row.status)
        .bind(&row.billing_interval)
        .bind(row.current_period_start)
        .bind(row.current_period_end)
        .bind(row.trial_end)
        .bind(row.cancel_at_period_end)
        .bind(row.is_current)
        .bind(&row.meta)
        .bind(row.updated_at)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Subscription", row.id))?;
        Ok(saved)
    }

    pub async fn count_active_buildings(conn: &mut PgConnection, owner_id: Uuid) -> Result<u64, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM buildings WHERE owner_id = $1 AND is_active",
        )
        .bind(owner_id)
        .fetch_one(conn)
        .await?;
        Ok(count.max(0) as u64)
    }
}
