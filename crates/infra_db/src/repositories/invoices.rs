//! Invoice and invoice expense persistence
//!
//! Writes that must happen under a row lock take a `&mut PgConnection` so
//! callers can run them inside their own transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub cycle_month: NaiveDate,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub balance_due: Decimal,
    pub status: String,
    pub notes: String,
    pub metadata: serde_json::Value,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceExpenseRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub label: String,
    pub amount: Decimal,
    pub taxable: bool,
    pub tax_rate: Option<Decimal>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    /// Currency of the parent invoice; read through a join, never written
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Option<InvoiceRow>, DatabaseError> {
        let row = sqlx::query_as::<_, InvoiceRow>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Reads and locks an invoice for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<InvoiceRow>, DatabaseError> {
        let row = sqlx::query_as::<_, InvoiceRow>("SELECT * FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    pub async fn list_for_booking(&self, booking_id: Uuid) -> Result<Vec<InvoiceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM invoices WHERE booking_id = $1 ORDER BY cycle_month, id",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn exists(&self, booking_id: Uuid, cycle_month: NaiveDate) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM invoices WHERE booking_id = $1 AND cycle_month = $2)",
        )
        .bind(booking_id)
        .bind(cycle_month)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Inserts an invoice and its expense lines in one transaction
    ///
    /// A second invoice for the same booking and cycle month fails with
    /// [`DatabaseError::DuplicateEntry`].
    #[instrument(skip(self, invoice, expenses), fields(booking_id = %invoice.booking_id, cycle_month = %invoice.cycle_month))]
    pub async fn insert_with_expenses(
        &self,
        invoice: &InvoiceRow,
        expenses: &[InvoiceExpenseRow],
    ) -> Result<InvoiceRow, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let saved = sqlx::query_as::<_, InvoiceRow>(
            r#"
            INSERT INTO invoices (
                id, booking_id, cycle_month, issue_date, due_date, currency,
                amount, tax_amount, discount_amount, total_amount, balance_due,
                status, notes, metadata, created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.booking_id)
        .bind(invoice.cycle_month)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(&invoice.currency)
        .bind(invoice.amount)
        .bind(invoice.tax_amount)
        .bind(invoice.discount_amount)
        .bind(invoice.total_amount)
        .bind(invoice.balance_due)
        .bind(&invoice.status)
        .bind(&invoice.notes)
        .bind(&invoice.metadata)
        .bind(invoice.created_by)
        .bind(invoice.updated_by)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        for expense in expenses {
            sqlx::query(
                r#"
                INSERT INTO invoice_expenses (id, invoice_id, label, amount, taxable, tax_rate, notes, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(expense.id)
            .bind(expense.invoice_id)
            .bind(&expense.label)
            .bind(expense.amount)
            .bind(expense.taxable)
            .bind(expense.tax_rate)
            .bind(&expense.notes)
            .bind(expense.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(expenses = expenses.len(), "Invoice inserted");
        Ok(saved)
    }

    /// Writes every mutable column of an existing invoice
    pub async fn update(conn: &mut PgConnection, invoice: &InvoiceRow) -> Result<Option<InvoiceRow>, DatabaseError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            UPDATE invoices SET
                issue_date = $2,
                due_date = $3,
                amount = $4,
                tax_amount = $5,
                discount_amount = $6,
                total_amount = $7,
                balance_due = $8,
                status = $9,
                notes = $10,
                metadata = $11,
                updated_by = $12,
                updated_at = $13
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.amount)
        .bind(invoice.tax_amount)
        .bind(invoice.discount_amount)
        .bind(invoice.total_amount)
        .bind(invoice.balance_due)
        .bind(&invoice.status)
        .bind(&invoice.notes)
        .bind(&invoice.metadata)
        .bind(invoice.updated_by)
        .bind(invoice.updated_at)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    pub async fn list_expenses(&self, invoice_id: Uuid) -> Result<Vec<InvoiceExpenseRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, InvoiceExpenseRow>(
            r#"
            SELECT e.id, e.invoice_id, e.label, e.amount, e.taxable, e.tax_rate, e.notes, e.created_at,
                   i.currency
            FROM invoice_expenses e
            JOIN invoices i ON i.id = e.invoice_id
            WHERE e.invoice_id = $1
            ORDER BY e.created_at, e.id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Voids the booking's draft and open invoices from `from_month` on
    ///
    /// `note` is appended to the existing notes. Returns the voided ids in
    /// ascending order.
    #[instrument(skip(self, note))]
    pub async fn void_from_month(
        &self,
        booking_id: Uuid,
        from_month: NaiveDate,
        note: &str,
        updated_by: Option<Uuid>,
    ) -> Result<Vec<Uuid>, DatabaseError> {
        let mut ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE invoices SET
                status = 'void',
                notes = notes || $3,
                updated_by = $4,
                updated_at = now()
            WHERE booking_id = $1
              AND status IN ('draft', 'open')
              AND cycle_month >= $2
            RETURNING id
            "#,
        )
        .bind(booking_id)
        .bind(from_month)
        .bind(note)
        .bind(updated_by)
        .fetch_all(&self.pool)
        .await?;
        ids.sort();
        Ok(ids)
    }

    /// Moves open and partial invoices due before `today` to overdue
    #[instrument(skip(self))]
    pub async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET status = 'overdue', updated_at = now()
            WHERE status IN ('open', 'partial') AND due_date < $1
            "#,
        )
        .bind(today)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
