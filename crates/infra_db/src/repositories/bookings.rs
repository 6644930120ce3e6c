//! Booking reads
//!
//! Bookings belong to the stay module; billing only reads them. The owner
//! comes from the booking's building.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::error::DatabaseError;

const SELECT_BOOKING: &str = r#"
    SELECT b.id, b.status, b.start_date, b.end_date, b.booked_at, b.currency,
           b.monthly_rent, b.security_deposit, b.discount_amount, b.maintenance_amount,
           b.building_id, bl.owner_id
    FROM bookings b
    LEFT JOIN buildings bl ON bl.id = b.building_id
"#;

/// Booking row joined with its building's owner
#[derive(Debug, Clone, FromRow)]
pub struct BookingRow {
    pub id: Uuid,
    pub status: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub booked_at: Option<DateTime<Utc>>,
    pub currency: String,
    pub monthly_rent: Decimal,
    pub security_deposit: Decimal,
    pub discount_amount: Decimal,
    pub maintenance_amount: Decimal,
    pub building_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct BookingRepository {
    pool: PgPool,
}

impl BookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<BookingRow>, DatabaseError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("{SELECT_BOOKING} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Confirmed bookings whose stay covers `today`, ordered by id
    #[instrument(skip(self))]
    pub async fn list_billable(&self, today: NaiveDate) -> Result<Vec<BookingRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "{SELECT_BOOKING}
             WHERE b.status = 'confirmed'
               AND (b.start_date IS NULL OR b.start_date <= $1)
               AND (b.end_date IS NULL OR b.end_date >= $1)
             ORDER BY b.id"
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
