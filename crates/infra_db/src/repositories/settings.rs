//! Invoice settings persistence
//!
//! One row per (owner, building). The unique index treats a NULL building
//! as its own key, so the owner's global row is upserted like any other.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceSettingsRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub building_id: Option<Uuid>,
    pub generate_type: String,
    pub period: String,
    pub generate_on: String,
    pub monthly_cycle: String,
    pub monthly_custom_day: Option<i16>,
    pub weekly_cycle: String,
    pub weekly_custom_weekday: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Exact (owner, building) lookup; `None` matches the global row only
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        owner_id: Uuid,
        building_id: Option<Uuid>,
    ) -> Result<Option<InvoiceSettingsRow>, DatabaseError> {
        let row = sqlx::query_as::<_, InvoiceSettingsRow>(
            r#"
            SELECT * FROM invoice_settings
            WHERE owner_id = $1 AND building_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(owner_id)
        .bind(building_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Inserts the row or replaces the rule columns of the existing one
    ///
    /// The stored id and `created_at` survive an update.
    #[instrument(skip(self, row), fields(owner_id = %row.owner_id))]
    pub async fn upsert(&self, row: &InvoiceSettingsRow) -> Result<InvoiceSettingsRow, DatabaseError> {
        let saved = sqlx::query_as::<_, InvoiceSettingsRow>(
            r#"
            INSERT INTO invoice_settings (
                id, owner_id, building_id, generate_type, period, generate_on,
                monthly_cycle, monthly_custom_day, weekly_cycle, weekly_custom_weekday,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (owner_id, (COALESCE(building_id, '00000000-0000-0000-0000-000000000000'::uuid)))
            DO UPDATE SET
                generate_type = EXCLUDED.generate_type,
                period = EXCLUDED.period,
                generate_on = EXCLUDED.generate_on,
                monthly_cycle = EXCLUDED.monthly_cycle,
                monthly_custom_day = EXCLUDED.monthly_custom_day,
                weekly_cycle = EXCLUDED.weekly_cycle,
                weekly_custom_weekday = EXCLUDED.weekly_custom_weekday,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.owner_id)
        .bind(row.building_id)
        .bind(&row.generate_type)
        .bind(&row.period)
        .bind(&row.generate_on)
        .bind(&row.monthly_cycle)
        .bind(row.monthly_custom_day)
        .bind(&row.weekly_cycle)
        .bind(row.weekly_custom_weekday)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }
}
