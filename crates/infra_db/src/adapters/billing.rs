//! PostgreSQL adapter for the billing ports
//!
//! `PostgresBillingStore` implements [`BookingSource`], [`SettingsStore`],
//! [`InvoiceStore`] and [`PaymentStore`] on one pool. Payment writes run in
//! a single transaction that locks the stored payment and every affected
//! invoice before any balance changes.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingStore;
//! use domain_billing::BillingService;
//! use std::sync::Arc;
//!
//! let store = Arc::new(PostgresBillingStore::new(pool));
//! let service = BillingService::with_store(store);
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use core_kernel::{
    Actor, BookingId, BuildingId, Currency, DomainPort, HealthCheckResult, HealthCheckable,
    InvoiceExpenseId, InvoiceId, InvoiceSettingsId, Money, OwnerId, PaymentId, PortError, UserId,
};
use domain_billing::payment::{apply_adjustments, lock_order};
use domain_billing::{
    BookingSnapshot, BookingSource, Invoice, InvoiceExpense, InvoiceSettings, InvoiceStore, Payment,
    PaymentOutcome, PaymentStore, PaymentWrite, SettingsStore,
};

use super::{parse_column, ping};
use crate::error::DatabaseError;
use crate::repositories::{
    BookingRepository, BookingRow, InvoiceExpenseRow, InvoiceRepository, InvoiceRow,
    InvoiceSettingsRow, PaymentRepository, PaymentRow, SettingsRepository,
};

// ============================================================================
// Row mapping
// ============================================================================

impl TryFrom<BookingRow> for BookingSnapshot {
    type Error = DatabaseError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let currency: Currency = parse_column("currency", &row.currency)?;
        Ok(BookingSnapshot {
            id: BookingId::from_uuid(row.id),
            status: parse_column("status", &row.status)?,
            start_date: row.start_date,
            end_date: row.end_date,
            booked_at: row.booked_at,
            monthly_rent: Money::new(row.monthly_rent, currency),
            security_deposit: Money::new(row.security_deposit, currency),
            discount_amount: Money::new(row.discount_amount, currency),
            maintenance_amount: Money::new(row.maintenance_amount, currency),
            building_id: row.building_id.map(BuildingId::from_uuid),
            owner_id: row.owner_id.map(OwnerId::from_uuid),
        })
    }
}

fn small_to_u32(column: &str, value: Option<i16>) -> Result<Option<u32>, DatabaseError> {
    value
        .map(|v| u32::try_from(v).map_err(|_| DatabaseError::invalid_column(column, v)))
        .transpose()
}

impl TryFrom<InvoiceSettingsRow> for InvoiceSettings {
    type Error = DatabaseError;

    fn try_from(row: InvoiceSettingsRow) -> Result<Self, Self::Error> {
        Ok(InvoiceSettings {
            id: InvoiceSettingsId::from_uuid(row.id),
            owner_id: OwnerId::from_uuid(row.owner_id),
            building_id: row.building_id.map(BuildingId::from_uuid),
            generate_type: parse_column("generate_type", &row.generate_type)?,
            period: parse_column("period", &row.period)?,
            generate_on: parse_column("generate_on", &row.generate_on)?,
            monthly_cycle: parse_column("monthly_cycle", &row.monthly_cycle)?,
            monthly_custom_day: small_to_u32("monthly_custom_day", row.monthly_custom_day)?,
            weekly_cycle: parse_column("weekly_cycle", &row.weekly_cycle)?,
            weekly_custom_weekday: small_to_u32("weekly_custom_weekday", row.weekly_custom_weekday)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&InvoiceSettings> for InvoiceSettingsRow {
    fn from(settings: &InvoiceSettings) -> Self {
        // Validated settings keep both values far inside i16
        let small = |v: u32| i16::try_from(v).unwrap_or(i16::MAX);
        InvoiceSettingsRow {
            id: settings.id.into(),
            owner_id: settings.owner_id.into(),
            building_id: settings.building_id.map(Into::into),
            generate_type: settings.generate_type.as_str().to_string(),
            period: settings.period.as_str().to_string(),
            generate_on: settings.generate_on.as_str().to_string(),
            monthly_cycle: settings.monthly_cycle.as_str().to_string(),
            monthly_custom_day: settings.monthly_custom_day.map(small),
            weekly_cycle: settings.weekly_cycle.as_str().to_string(),
            weekly_custom_weekday: settings.weekly_custom_weekday.map(small),
            created_at: settings.created_at,
            updated_at: settings.updated_at,
        }
    }
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DatabaseError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let currency: Currency = parse_column("currency", &row.currency)?;
        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            booking_id: BookingId::from_uuid(row.booking_id),
            cycle_month: row.cycle_month,
            issue_date: row.issue_date,
            due_date: row.due_date,
            currency,
            amount: Money::new(row.amount, currency),
            tax_amount: Money::new(row.tax_amount, currency),
            discount_amount: Money::new(row.discount_amount, currency),
            total_amount: Money::new(row.total_amount, currency),
            balance_due: Money::new(row.balance_due, currency),
            status: parse_column("status", &row.status)?,
            notes: row.notes,
            metadata: row.metadata,
            created_by: row.created_by.map(UserId::from_uuid),
            updated_by: row.updated_by.map(UserId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Invoice> for InvoiceRow {
    fn from(invoice: &Invoice) -> Self {
        InvoiceRow {
            id: invoice.id.into(),
            booking_id: invoice.booking_id.into(),
            cycle_month: invoice.cycle_month,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            currency: invoice.currency.code().to_string(),
            amount: invoice.amount.amount(),
            tax_amount: invoice.tax_amount.amount(),
            discount_amount: invoice.discount_amount.amount(),
            total_amount: invoice.total_amount.amount(),
            balance_due: invoice.balance_due.amount(),
            status: invoice.status.as_str().to_string(),
            notes: invoice.notes.clone(),
            metadata: invoice.metadata.clone(),
            created_by: invoice.created_by.map(Into::into),
            updated_by: invoice.updated_by.map(Into::into),
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}

impl TryFrom<InvoiceExpenseRow> for InvoiceExpense {
    type Error = DatabaseError;

    fn try_from(row: InvoiceExpenseRow) -> Result<Self, Self::Error> {
        let currency: Currency = parse_column("currency", &row.currency)?;
        Ok(InvoiceExpense {
            id: InvoiceExpenseId::from_uuid(row.id),
            invoice_id: InvoiceId::from_uuid(row.invoice_id),
            label: row.label,
            amount: Money::new(row.amount, currency),
            taxable: row.taxable,
            tax_rate: row.tax_rate,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

impl From<&InvoiceExpense> for InvoiceExpenseRow {
    fn from(expense: &InvoiceExpense) -> Self {
        InvoiceExpenseRow {
            id: expense.id.into(),
            invoice_id: expense.invoice_id.into(),
            label: expense.label.clone(),
            amount: expense.amount.amount(),
            taxable: expense.taxable,
            tax_rate: expense.tax_rate,
            notes: expense.notes.clone(),
            created_at: expense.created_at,
            currency: expense.amount.currency().code().to_string(),
        }
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let currency: Currency = parse_column("currency", &row.currency)?;
        let method = row
            .method
            .as_deref()
            .map(|m| parse_column("method", m))
            .transpose()?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            invoice_id: row.invoice_id.map(InvoiceId::from_uuid),
            amount: Money::new(row.amount, currency),
            method,
            reference: row.reference,
            received_at: row.received_at,
            notes: row.notes,
            created_by: row.created_by.map(UserId::from_uuid),
            updated_by: row.updated_by.map(UserId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Payment> for PaymentRow {
    fn from(payment: &Payment) -> Self {
        PaymentRow {
            id: payment.id.into(),
            invoice_id: payment.invoice_id.map(Into::into),
            currency: payment.amount.currency().code().to_string(),
            amount: payment.amount.amount(),
            method: payment.method.map(|m| m.as_str().to_string()),
            reference: payment.reference.clone(),
            received_at: payment.received_at,
            notes: payment.notes.clone(),
            created_by: payment.created_by.map(Into::into),
            updated_by: payment.updated_by.map(Into::into),
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

fn map_rows<R, T>(rows: Vec<R>) -> Result<Vec<T>, PortError>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(PortError::from))
        .collect()
}

// ============================================================================
// Adapter
// ============================================================================

/// PostgreSQL implementation of every billing port
#[derive(Debug, Clone)]
pub struct PostgresBillingStore {
    pool: PgPool,
    bookings: BookingRepository,
    settings: SettingsRepository,
    invoices: InvoiceRepository,
    payments: PaymentRepository,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            bookings: BookingRepository::new(pool.clone()),
            settings: SettingsRepository::new(pool.clone()),
            invoices: InvoiceRepository::new(pool.clone()),
            payments: PaymentRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn invoices(&self) -> &InvoiceRepository {
        &self.invoices
    }
}

impl DomainPort for PostgresBillingStore {}

#[async_trait]
impl HealthCheckable for PostgresBillingStore {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-billing-store").await
    }
}

#[async_trait]
impl BookingSource for PostgresBillingStore {
    #[instrument(skip(self), fields(booking_id = %id))]
    async fn get_booking(&self, id: BookingId) -> Result<BookingSnapshot, PortError> {
        let row = self
            .bookings
            .get(id.into())
            .await?
            .ok_or_else(|| PortError::not_found("Booking", id))?;
        Ok(row.try_into()?)
    }

    async fn list_billable_bookings(&self, today: NaiveDate) -> Result<Vec<BookingSnapshot>, PortError> {
        map_rows(self.bookings.list_billable(today).await?)
    }
}

#[async_trait]
impl SettingsStore for PostgresBillingStore {
    async fn find_settings(
        &self,
        owner: OwnerId,
        building: Option<BuildingId>,
    ) -> Result<Option<InvoiceSettings>, PortError> {
        let row = self.settings.find(owner.into(), building.map(Into::into)).await?;
        Ok(row.map(InvoiceSettings::try_from).transpose()?)
    }

    async fn upsert_settings(&self, settings: InvoiceSettings) -> Result<InvoiceSettings, PortError> {
        let saved = self.settings.upsert(&InvoiceSettingsRow::from(&settings)).await?;
        Ok(saved.try_into()?)
    }
}

#[async_trait]
impl InvoiceStore for PostgresBillingStore {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        let row = self
            .invoices
            .get(id.into())
            .await?
            .ok_or_else(|| PortError::not_found("Invoice", id))?;
        Ok(row.try_into()?)
    }

    async fn list_invoices_for_booking(&self, booking: BookingId) -> Result<Vec<Invoice>, PortError> {
        map_rows(self.invoices.list_for_booking(booking.into()).await?)
    }

    async fn invoice_exists(&self, booking: BookingId, cycle_month: NaiveDate) -> Result<bool, PortError> {
        Ok(self.invoices.exists(booking.into(), cycle_month).await?)
    }

    async fn insert_invoice(
        &self,
        invoice: Invoice,
        expenses: Vec<InvoiceExpense>,
    ) -> Result<Invoice, PortError> {
        let rows: Vec<InvoiceExpenseRow> = expenses.iter().map(InvoiceExpenseRow::from).collect();
        match self.invoices.insert_with_expenses(&InvoiceRow::from(&invoice), &rows).await {
            Ok(saved) => Ok(saved.try_into()?),
            Err(e) if e.is_duplicate() => Err(PortError::conflict(format!(
                "invoice for booking {} and month {} already exists",
                invoice.booking_id, invoice.cycle_month
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_invoice(&self, invoice: Invoice) -> Result<Invoice, PortError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        let saved = InvoiceRepository::update(&mut conn, &InvoiceRow::from(&invoice))
            .await?
            .ok_or_else(|| PortError::not_found("Invoice", invoice.id))?;
        Ok(saved.try_into()?)
    }

    async fn list_expenses(&self, invoice: InvoiceId) -> Result<Vec<InvoiceExpense>, PortError> {
        map_rows(self.invoices.list_expenses(invoice.into()).await?)
    }

    #[instrument(skip(self, note, actor), fields(booking_id = %booking))]
    async fn void_invoices(
        &self,
        booking: BookingId,
        from_month: NaiveDate,
        note: &str,
        actor: &Actor,
    ) -> Result<Vec<InvoiceId>, PortError> {
        let ids = self
            .invoices
            .void_from_month(booking.into(), from_month, note, actor.user_id.map(Into::into))
            .await?;
        debug!(voided = ids.len(), "Voided invoices");
        Ok(ids.into_iter().map(InvoiceId::from_uuid).collect())
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, PortError> {
        Ok(self.invoices.mark_overdue(today).await?)
    }
}

#[async_trait]
impl PaymentStore for PostgresBillingStore {
    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError> {
        let row = self
            .payments
            .get(id.into())
            .await?
            .ok_or_else(|| PortError::not_found("Payment", id))?;
        Ok(row.try_into()?)
    }

    async fn list_payments_for_invoice(&self, invoice: InvoiceId) -> Result<Vec<Payment>, PortError> {
        map_rows(self.payments.list_for_invoice(invoice.into()).await?)
    }

    #[instrument(skip(self, write, actor), fields(payment_id = ?write.target()))]
    async fn write_payment(&self, write: PaymentWrite, actor: &Actor) -> Result<PaymentOutcome, PortError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        let previous = match write.target() {
            Some(id) => {
                let row = PaymentRepository::lock(&mut tx, id.into())
                    .await?
                    .ok_or_else(|| PortError::not_found("Payment", id))?;
                Some(Payment::try_from(row)?)
            }
            None => None,
        };
        let (next, adjustments) = write.resolve(previous.as_ref(), actor)?;

        // Lock in id order so concurrent writes touching the same pair of
        // invoices cannot deadlock
        let mut invoices = Vec::new();
        for id in lock_order(&adjustments) {
            let row = InvoiceRepository::lock(&mut tx, id.into())
                .await?
                .ok_or_else(|| PortError::not_found("Invoice", id))?;
            invoices.push(Invoice::try_from(row)?);
        }
        apply_adjustments(&adjustments, &mut invoices, actor)?;

        for invoice in &invoices {
            InvoiceRepository::update(&mut tx, &InvoiceRow::from(invoice)).await?;
        }

        let payment = match (next, &previous) {
            (Some(payment), None) => {
                let row = PaymentRepository::insert(&mut tx, &PaymentRow::from(&payment)).await?;
                Some(Payment::try_from(row)?)
            }
            (Some(payment), Some(_)) => {
                let row = PaymentRepository::update(&mut tx, &PaymentRow::from(&payment)).await?;
                Some(Payment::try_from(row)?)
            }
            (None, Some(prev)) => {
                PaymentRepository::delete(&mut tx, prev.id.into()).await?;
                None
            }
            (None, None) => None,
        };

        tx.commit().await.map_err(DatabaseError::from)?;
        info!(
            invoices = invoices.len(),
            adjustments = adjustments.len(),
            "Payment write committed"
        );

        Ok(PaymentOutcome { payment, invoices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain_billing::{BookingStatus, InvoiceStatus, PaymentMethod};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn booking_row() -> BookingRow {
        BookingRow {
            id: Uuid::now_v7(),
            status: "confirmed".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 31),
            end_date: None,
            booked_at: None,
            currency: "INR".into(),
            monthly_rent: dec!(10000),
            security_deposit: dec!(5000),
            discount_amount: dec!(0),
            maintenance_amount: dec!(500),
            building_id: Some(Uuid::now_v7()),
            owner_id: Some(Uuid::now_v7()),
        }
    }

    #[test]
    fn test_booking_row_maps_amounts_in_booking_currency() {
        let booking = BookingSnapshot::try_from(booking_row()).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.monthly_rent, Money::inr(dec!(10000)));
        assert_eq!(booking.maintenance_amount.currency(), Currency::INR);
        assert!(booking.owner_id.is_some());
    }

    #[test]
    fn test_unknown_booking_status_is_a_mapping_error() {
        let mut row = booking_row();
        row.status = "archived".into();
        assert!(matches!(
            BookingSnapshot::try_from(row),
            Err(DatabaseError::SerializationError(_))
        ));
    }

    #[test]
    fn test_invoice_row_round_trip_keeps_status_and_stamps() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap();
        let user = UserId::new_v7();
        let row = InvoiceRow {
            id: Uuid::now_v7(),
            booking_id: Uuid::now_v7(),
            cycle_month: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            issue_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            currency: "INR".into(),
            amount: dec!(15500),
            tax_amount: dec!(0),
            discount_amount: dec!(0),
            total_amount: dec!(15500),
            balance_due: dec!(15500),
            status: "open".into(),
            notes: String::new(),
            metadata: serde_json::json!({"trigger": "booking_confirmed"}),
            created_by: Some(user.into()),
            updated_by: None,
            created_at: now,
            updated_at: now,
        };

        let invoice = Invoice::try_from(row.clone()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Open);
        assert_eq!(invoice.created_by, Some(user));

        let back = InvoiceRow::from(&invoice);
        assert_eq!(back.id, row.id);
        assert_eq!(back.status, "open");
        assert_eq!(back.balance_due, dec!(15500));
        assert_eq!(back.metadata, row.metadata);
    }

    #[test]
    fn test_payment_method_is_optional() {
        let now = Utc::now();
        let mut row = PaymentRow {
            id: Uuid::now_v7(),
            invoice_id: None,
            currency: "INR".into(),
            amount: dec!(500),
            method: None,
            reference: String::new(),
            received_at: now,
            notes: String::new(),
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(Payment::try_from(row.clone()).unwrap().method, None);

        row.method = Some("upi".into());
        let payment = Payment::try_from(row).unwrap();
        assert_eq!(payment.method, Some(PaymentMethod::Upi));
        assert_eq!(PaymentRow::from(&payment).method.as_deref(), Some("upi"));
    }

    #[test]
    fn test_negative_custom_day_is_rejected() {
        assert!(small_to_u32("monthly_custom_day", Some(-1)).is_err());
        assert_eq!(small_to_u32("monthly_custom_day", Some(31)).unwrap(), Some(31));
        assert_eq!(small_to_u32("monthly_custom_day", None).unwrap(), None);
    }
}
