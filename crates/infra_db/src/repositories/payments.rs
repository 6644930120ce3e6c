//! Payment persistence
//!
//! Inserts, updates and deletes run on the caller's connection: payment
//! writes always share a transaction with the invoice balance changes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub currency: String,
    pub amount: Decimal,
    pub method: Option<String>,
    pub reference: String,
    pub received_at: DateTime<Utc>,
    pub notes: String,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<PaymentRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<PaymentRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(row)
    }

    /// Payments against an invoice, oldest first
    #[instrument(skip(self))]
    pub async fn list_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<PaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE invoice_id = $1 ORDER BY received_at, id",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert(conn: &mut PgConnection, payment: &PaymentRow) -> Result<PaymentRow, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (
                id, invoice_id, currency, amount, method, reference, received_at,
                notes, created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(payment.invoice_id)
        .bind(&payment.currency)
        .bind(payment.amount)
        .bind(&payment.method)
        .bind(&payment.reference)
        .bind(payment.received_at)
        .bind(&payment.notes)
        .bind(payment.created_by)
        .bind(payment.updated_by)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_one(conn)
        .await?;
        Ok(row)
    }

    pub async fn update(conn: &mut PgConnection, payment: &PaymentRow) -> Result<PaymentRow, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            UPDATE payments SET
                invoice_id = $2,
                currency = $3,
                amount = $4,
                method = $5,
                reference = $6,
                received_at = $7,
                notes = $8,
                updated_by = $9,
                updated_at = $10
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(payment.invoice_id)
        .bind(&payment.currency)
        .bind(payment.amount)
        .bind(&payment.method)
        .bind(&payment.reference)
        .bind(payment.received_at)
        .bind(&payment.notes)
        .bind(payment.updated_by)
        .bind(payment.updated_at)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Payment", payment.id))?;
        Ok(row)
    }

    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Payment", id));
        }
        Ok(())
    }
}
