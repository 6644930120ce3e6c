//! Storage ports for the billing engine
//!
//! The engine reads bookings through [`BookingSource`] and persists settings,
//! invoices and payments through the store traits. `infra_db` provides the
//! PostgreSQL adapters; [`mock`] provides in-memory ones for tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{
    Actor, BookingId, BuildingId, DomainPort, InvoiceId, OwnerId, PaymentId, PortError,
};

use crate::booking::BookingSnapshot;
use crate::invoice::{Invoice, InvoiceExpense};
use crate::payment::{Payment, PaymentOutcome, PaymentWrite};
use crate::settings::InvoiceSettings;

/// Read access to bookings owned by the tenant/stay module
#[async_trait]
pub trait BookingSource: DomainPort {
    async fn get_booking(&self, id: BookingId) -> Result<BookingSnapshot, PortError>;

    /// Confirmed bookings whose stay covers `today`
    async fn list_billable_bookings(&self, today: NaiveDate) -> Result<Vec<BookingSnapshot>, PortError>;
}

/// Invoice settings persistence
#[async_trait]
pub trait SettingsStore: DomainPort {
    /// Exact lookup; `building = None` finds the owner's global row
    async fn find_settings(
        &self,
        owner: OwnerId,
        building: Option<BuildingId>,
    ) -> Result<Option<InvoiceSettings>, PortError>;

    /// Inserts or replaces the row for the settings' (owner, building)
    async fn upsert_settings(&self, settings: InvoiceSettings) -> Result<InvoiceSettings, PortError>;
}

/// Invoice persistence
#[async_trait]
pub trait InvoiceStore: DomainPort {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    /// Invoices for a booking, oldest cycle month first
    async fn list_invoices_for_booking(&self, booking: BookingId) -> Result<Vec<Invoice>, PortError>;

    async fn invoice_exists(&self, booking: BookingId, cycle_month: NaiveDate) -> Result<bool, PortError>;

    /// Inserts an invoice with its expense lines
    ///
    /// Fails with [`PortError::Conflict`] when the booking already has an
    /// invoice for the cycle month.
    async fn insert_invoice(
        &self,
        invoice: Invoice,
        expenses: Vec<InvoiceExpense>,
    ) -> Result<Invoice, PortError>;

    async fn update_invoice(&self, invoice: Invoice) -> Result<Invoice, PortError>;

    async fn list_expenses(&self, invoice: InvoiceId) -> Result<Vec<InvoiceExpense>, PortError>;

    /// Voids the booking's draft and open invoices with a cycle month on or
    /// after `from_month`, appending `note` to each
    async fn void_invoices(
        &self,
        booking: BookingId,
        from_month: NaiveDate,
        note: &str,
        actor: &Actor,
    ) -> Result<Vec<InvoiceId>, PortError>;

    /// Moves open and partial invoices due before `today` to overdue
    async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, PortError>;
}

/// Payment persistence with balance reconciliation
#[async_trait]
pub trait PaymentStore: DomainPort {
    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError>;

    async fn list_payments_for_invoice(&self, invoice: InvoiceId) -> Result<Vec<Payment>, PortError>;

    /// Executes a payment write atomically
    ///
    /// Implementations lock the stored payment (for updates and deletes) and
    /// every affected invoice in id order, resolve the write with
    /// [`PaymentWrite::resolve`], apply the adjustments and persist
    /// everything before releasing the locks.
    async fn write_payment(&self, write: PaymentWrite, actor: &Actor) -> Result<PaymentOutcome, PortError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use chrono::Utc;

    use core_kernel::{AdapterHealth, HealthCheckResult, HealthCheckable};

    use crate::payment::{apply_adjustments, lock_order};

    #[derive(Debug, Default)]
    struct State {
        bookings: HashMap<BookingId, BookingSnapshot>,
        settings: Vec<InvoiceSettings>,
        invoices: HashMap<InvoiceId, Invoice>,
        expenses: Vec<InvoiceExpense>,
        payments: HashMap<PaymentId, Payment>,
    }

    /// In-memory implementation of every billing port
    ///
    /// Each operation runs under a single write guard, which gives the same
    /// atomicity the database adapters get from transactions.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryBillingStore {
        state: Arc<RwLock<State>>,
    }

    impl InMemoryBillingStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Inserts or replaces a booking snapshot
        pub async fn put_booking(&self, booking: BookingSnapshot) {
            self.state.write().await.bookings.insert(booking.id, booking);
        }

        /// Number of stored invoices
        pub async fn invoice_count(&self) -> usize {
            self.state.read().await.invoices.len()
        }

        /// Number of stored payments
        pub async fn payment_count(&self) -> usize {
            self.state.read().await.payments.len()
        }
    }

    impl DomainPort for InMemoryBillingStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryBillingStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult {
                adapter_id: "in-memory-billing-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms: 0,
                message: Some("In-memory adapter always healthy".to_string()),
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl BookingSource for InMemoryBillingStore {
        async fn get_booking(&self, id: BookingId) -> Result<BookingSnapshot, PortError> {
            self.state
                .read()
                .await
                .bookings
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Booking", id))
        }

        async fn list_billable_bookings(&self, today: NaiveDate) -> Result<Vec<BookingSnapshot>, PortError> {
            let state = self.state.read().await;
            let mut bookings: Vec<_> = state
                .bookings
                .values()
                .filter(|b| b.is_confirmed() && b.is_active_on(today))
                .cloned()
                .collect();
            bookings.sort_by_key(|b| b.id);
            Ok(bookings)
        }
    }

    #[async_trait]
    impl SettingsStore for InMemoryBillingStore {
        async fn find_settings(
            &self,
            owner: OwnerId,
            building: Option<BuildingId>,
        ) -> Result<Option<InvoiceSettings>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .settings
                .iter()
                .find(|s| s.owner_id == owner && s.building_id == building)
                .cloned())
        }

        async fn upsert_settings(&self, settings: InvoiceSettings) -> Result<InvoiceSettings, PortError> {
            let mut state = self.state.write().await;
            let existing = state
                .settings
                .iter_mut()
                .find(|s| s.owner_id == settings.owner_id && s.building_id == settings.building_id);
            match existing {
                Some(row) => {
                    let id = row.id;
                    let created_at = row.created_at;
                    *row = InvoiceSettings {
                        id,
                        created_at,
                        updated_at: Utc::now(),
                        ..settings
                    };
                    Ok(row.clone())
                }
                None => {
                    state.settings.push(settings.clone());
                    Ok(settings)
                }
            }
        }
    }

    #[async_trait]
    impl InvoiceStore for InMemoryBillingStore {
        async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
            self.state
                .read()
                .await
                .invoices
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Invoice", id))
        }

        async fn list_invoices_for_booking(&self, booking: BookingId) -> Result<Vec<Invoice>, PortError> {
            let state = self.state.read().await;
            let mut invoices: Vec<_> = state
                .invoices
                .values()
                .filter(|inv| inv.booking_id == booking)
                .cloned()
                .collect();
            invoices.sort_by_key(|inv| inv.cycle_month);
            Ok(invoices)
        }

        async fn invoice_exists(&self, booking: BookingId, cycle_month: NaiveDate) -> Result<bool, PortError> {
            Ok(self
                .state
                .read()
                .await
                .invoices
                .values()
                .any(|inv| inv.booking_id == booking && inv.cycle_month == cycle_month))
        }

        async fn insert_invoice(
            &self,
            invoice: Invoice,
            expenses: Vec<InvoiceExpense>,
        ) -> Result<Invoice, PortError> {
            let mut state = self.state.write().await;
            let duplicate = state
                .invoices
                .values()
                .any(|inv| inv.booking_id == invoice.booking_id && inv.cycle_month == invoice.cycle_month);
            if duplicate {
                return Err(PortError::conflict(format!(
                    "invoice for booking {} and month {} already exists",
                    invoice.booking_id, invoice.cycle_month
                )));
            }
            state.expenses.extend(expenses);
            state.invoices.insert(invoice.id, invoice.clone());
            Ok(invoice)
        }

        async fn update_invoice(&self, invoice: Invoice) -> Result<Invoice, PortError> {
            let mut state = self.state.write().await;
            match state.invoices.get_mut(&invoice.id) {
                Some(row) => {
                    *row = invoice.clone();
                    Ok(invoice)
                }
                None => Err(PortError::not_found("Invoice", invoice.id)),
            }
        }

        async fn list_expenses(&self, invoice: InvoiceId) -> Result<Vec<InvoiceExpense>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .expenses
                .iter()
                .filter(|e| e.invoice_id == invoice)
                .cloned()
                .collect())
        }

        async fn void_invoices(
            &self,
            booking: BookingId,
            from_month: NaiveDate,
            note: &str,
            actor: &Actor,
        ) -> Result<Vec<InvoiceId>, PortError> {
            let mut state = self.state.write().await;
            let mut voided = Vec::new();
            for invoice in state.invoices.values_mut() {
                if invoice.booking_id == booking && invoice.is_voidable_on_cancel(from_month) {
                    invoice.status = crate::invoice::InvoiceStatus::Void;
                    invoice.notes.push_str(note);
                    invoice.touch(actor);
                    voided.push(invoice.id);
                }
            }
            voided.sort();
            Ok(voided)
        }

        async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, PortError> {
            let mut state = self.state.write().await;
            let count = state
                .invoices
                .values_mut()
                .map(|inv| inv.mark_overdue(today))
                .filter(|changed| *changed)
                .count();
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl PaymentStore for InMemoryBillingStore {
        async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError> {
            self.state
                .read()
                .await
                .payments
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Payment", id))
        }

        async fn list_payments_for_invoice(&self, invoice: InvoiceId) -> Result<Vec<Payment>, PortError> {
            let state = self.state.read().await;
            let mut payments: Vec<_> = state
                .payments
                .values()
                .filter(|p| p.invoice_id == Some(invoice))
                .cloned()
                .collect();
            payments.sort_by_key(|p| p.received_at);
            Ok(payments)
        }

        async fn write_payment(&self, write: PaymentWrite, actor: &Actor) -> Result<PaymentOutcome, PortError> {
            let mut state = self.state.write().await;

            let previous = match write.target() {
                Some(id) => Some(
                    state
                        .payments
                        .get(&id)
                        .cloned()
                        .ok_or_else(|| PortError::not_found("Payment", id))?,
                ),
                None => None,
            };
            let (next, adjustments) = write.resolve(previous.as_ref(), actor)?;

            let mut invoices = Vec::new();
            for id in lock_order(&adjustments) {
                let invoice = state
                    .invoices
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| PortError::not_found("Invoice", id))?;
                invoices.push(invoice);
            }
            apply_adjustments(&adjustments, &mut invoices, actor)?;

            for invoice in &invoices {
                state.invoices.insert(invoice.id, invoice.clone());
            }
            match (&next, &previous) {
                (Some(payment), _) => {
                    state.payments.insert(payment.id, payment.clone());
                }
                (None, Some(prev)) => {
                    state.payments.remove(&prev.id);
                }
                (None, None) => {}
            }

            Ok(PaymentOutcome {
                payment: next,
                invoices,
            })
        }
    }
}
