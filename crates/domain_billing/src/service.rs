//! Billing service
//!
//! Orchestrates invoice creation, payments and settings over the storage
//! ports. Every mutating call takes the acting user explicitly, and calls
//! that depend on the calendar take `today` (the business-local date) so
//! scheduled jobs and tests control the clock.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument};

use core_kernel::temporal::{first_of_month, month_starts};
use core_kernel::{Actor, BookingId, BuildingId, InvoiceId, OwnerId, PaymentId, PortError, Timezone};

use crate::booking::BookingSnapshot;
use crate::error::BillingError;
use crate::events::{BillingEvent, EventDispatcher, InvoiceTrigger};
use crate::invoice::{allowed_cycle_range, Invoice, InvoiceExpense, InvoiceWithExpenses, NewInvoice};
use crate::payment::{PaymentDraft, PaymentOutcome, PaymentWrite};
use crate::ports::{BookingSource, InvoiceStore, PaymentStore, SettingsStore};
use crate::settings::{InvoiceSettings, ResolvedSettings, SettingsSource, SettingsUpdate};

/// Entry point for billing operations
#[derive(Clone)]
pub struct BillingService {
    pub(crate) bookings: Arc<dyn BookingSource>,
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) invoices: Arc<dyn InvoiceStore>,
    pub(crate) payments: Arc<dyn PaymentStore>,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) tz: Timezone,
}

impl std::fmt::Debug for BillingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingService")
            .field("tz", &self.tz.name())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl BillingService {
    /// Creates a service over separate port implementations
    pub fn new(
        bookings: Arc<dyn BookingSource>,
        settings: Arc<dyn SettingsStore>,
        invoices: Arc<dyn InvoiceStore>,
        payments: Arc<dyn PaymentStore>,
    ) -> Self {
        Self {
            bookings,
            settings,
            invoices,
            payments,
            dispatcher: EventDispatcher::new(),
            tz: Timezone::default(),
        }
    }

    /// Creates a service over one adapter implementing every port
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: BookingSource + SettingsStore + InvoiceStore + PaymentStore,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    /// Sets the business timezone used for local dates
    pub fn with_timezone(mut self, tz: Timezone) -> Self {
        self.tz = tz;
        self
    }

    /// Sets the event dispatcher
    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn timezone(&self) -> &Timezone {
        &self.tz
    }

    /// Today's business-local date
    pub fn today(&self) -> NaiveDate {
        self.tz.today()
    }

    pub(crate) async fn emit(&self, events: Vec<BillingEvent>) {
        if events.is_empty() {
            return;
        }
        let report = self.dispatcher.dispatch(&events).await;
        debug!(delivered = report.delivered, failed = report.failed, "Dispatched billing events");
    }

    /// The billing view of a booking
    pub async fn load_booking(&self, id: BookingId) -> Result<BookingSnapshot, BillingError> {
        self.bookings.get_booking(id).await.map_err(|err| {
            if err.is_not_found() {
                BillingError::BookingNotFound(id.to_string())
            } else {
                BillingError::from(err)
            }
        })
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    /// Resolves settings for a booking's building: building row, then the
    /// owner's global row, then the unsaved default
    #[instrument(skip(self))]
    pub async fn resolve_settings(
        &self,
        owner: OwnerId,
        building: Option<BuildingId>,
    ) -> Result<ResolvedSettings, BillingError> {
        if building.is_some() {
            if let Some(settings) = self.settings.find_settings(owner, building).await? {
                return Ok(ResolvedSettings {
                    settings,
                    source: SettingsSource::Building,
                });
            }
        }
        if let Some(settings) = self.settings.find_settings(owner, None).await? {
            return Ok(ResolvedSettings {
                settings,
                source: SettingsSource::Global,
            });
        }
        Ok(ResolvedSettings {
            settings: InvoiceSettings::default_for(owner, building),
            source: SettingsSource::Default,
        })
    }

    /// Settings as shown to the acting user
    ///
    /// Admins get the default row provisioned for `(owner, building)` when
    /// nothing is stored yet; other users see the unsaved default.
    #[instrument(skip(self, actor), fields(role = %actor.role))]
    pub async fn current_settings(
        &self,
        actor: &Actor,
        building: Option<BuildingId>,
    ) -> Result<ResolvedSettings, BillingError> {
        let owner = actor.require_owner()?;
        let resolved = self.resolve_settings(owner, building).await?;
        if resolved.is_persisted() || !actor.is_admin() {
            return Ok(resolved);
        }

        let settings = self
            .settings
            .upsert_settings(InvoiceSettings::default_for(owner, building))
            .await?;
        info!(owner = %owner, building = ?building, "Provisioned default invoice settings");
        let source = if building.is_some() {
            SettingsSource::Building
        } else {
            SettingsSource::Global
        };
        Ok(ResolvedSettings { settings, source })
    }

    /// Validates and stores settings for the acting user's account
    #[instrument(skip(self, actor, update))]
    pub async fn upsert_settings(
        &self,
        actor: &Actor,
        update: SettingsUpdate,
    ) -> Result<InvoiceSettings, BillingError> {
        let owner = actor.require_owner()?;
        let settings = update.into_settings(owner)?;
        let stored = self.settings.upsert_settings(settings).await?;
        info!(owner = %owner, settings_id = %stored.id, "Invoice settings saved");
        Ok(stored)
    }

    // ---------------------------------------------------------------------
    // Invoices
    // ---------------------------------------------------------------------

    /// Creates an invoice by hand
    #[instrument(skip(self, new, actor), fields(booking_id = %new.booking_id))]
    pub async fn create_invoice(
        &self,
        new: NewInvoice,
        actor: &Actor,
        today: NaiveDate,
    ) -> Result<Invoice, BillingError> {
        let booking = self.load_booking(new.booking_id).await?;
        let invoice = Invoice::create(new, &booking, today, &self.tz, actor)?;
        let invoice = self
            .insert_unique(invoice, Vec::new(), InvoiceTrigger::Manual)
            .await?;
        Ok(invoice)
    }

    /// Inserts an invoice unless its (booking, cycle month) is taken
    pub(crate) async fn insert_unique(
        &self,
        invoice: Invoice,
        expenses: Vec<InvoiceExpense>,
        trigger: InvoiceTrigger,
    ) -> Result<Invoice, BillingError> {
        if self
            .invoices
            .invoice_exists(invoice.booking_id, invoice.cycle_month)
            .await?
        {
            return Err(BillingError::duplicate_invoice());
        }
        let stored = self
            .invoices
            .insert_invoice(invoice, expenses)
            .await
            .map_err(BillingError::from_invoice_write)?;

        info!(
            invoice_id = %stored.id,
            booking_id = %stored.booking_id,
            cycle_month = %stored.cycle_month,
            total = %stored.total_amount,
            trigger = %trigger,
            "Invoice created"
        );
        self.emit(vec![BillingEvent::InvoiceCreated {
            invoice_id: stored.id,
            booking_id: stored.booking_id,
            cycle_month: stored.cycle_month,
            total_amount: stored.total_amount.amount(),
            trigger,
            timestamp: Utc::now(),
        }])
        .await;
        Ok(stored)
    }

    /// Moves a draft invoice to open
    #[instrument(skip(self, actor))]
    pub async fn open_invoice(&self, id: InvoiceId, actor: &Actor) -> Result<Invoice, BillingError> {
        let mut invoice = self.fetch_invoice(id).await?;
        invoice.open(actor)?;
        let invoice = self.invoices.update_invoice(invoice).await?;
        self.emit(vec![BillingEvent::InvoiceOpened {
            invoice_id: invoice.id,
            timestamp: Utc::now(),
        }])
        .await;
        Ok(invoice)
    }

    /// Fetches an invoice with its expense lines
    #[instrument(skip(self))]
    pub async fn get_invoice(&self, id: InvoiceId) -> Result<InvoiceWithExpenses, BillingError> {
        let invoice = self.fetch_invoice(id).await?;
        let expenses = self.invoices.list_expenses(id).await?;
        Ok(InvoiceWithExpenses { invoice, expenses })
    }

    /// Lists a booking's invoices, oldest month first
    #[instrument(skip(self))]
    pub async fn list_invoices(&self, booking: BookingId) -> Result<Vec<Invoice>, BillingError> {
        Ok(self.invoices.list_invoices_for_booking(booking).await?)
    }

    async fn fetch_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        self.invoices.get_invoice(id).await.map_err(|err| {
            if err.is_not_found() {
                BillingError::InvoiceNotFound(id.to_string())
            } else {
                BillingError::from(err)
            }
        })
    }

    /// Months a booking can still be invoiced for
    ///
    /// Runs from the check-in month (or confirmation month) through the
    /// earliest of the booking's end, `until` and `today`. Months that
    /// already have an invoice are left out unless `include_existing`.
    #[instrument(skip(self))]
    pub async fn cycle_month_options(
        &self,
        booking_id: BookingId,
        include_existing: bool,
        until: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, BillingError> {
        let booking = self.load_booking(booking_id).await?;
        if !booking.is_confirmed() {
            return Err(BillingError::validation(
                "booking",
                "Invoice requires a confirmed booking with confirmation date.",
            ));
        }

        let (lower, upper) = allowed_cycle_range(&booking, today, &self.tz)?;
        let upper = match until {
            Some(until) => upper.min(first_of_month(until)),
            None => upper,
        };
        let mut months = month_starts(lower, upper)?;

        if !include_existing {
            let existing: Vec<NaiveDate> = self
                .invoices
                .list_invoices_for_booking(booking_id)
                .await?
                .into_iter()
                .map(|inv| inv.cycle_month)
                .collect();
            months.retain(|m| !existing.contains(m));
        }
        Ok(months)
    }

    // ---------------------------------------------------------------------
    // Payments
    // ---------------------------------------------------------------------

    /// Records a payment, applying it to its invoice if one is given
    #[instrument(skip(self, draft, actor), fields(amount = %draft.amount))]
    pub async fn record_payment(&self, draft: PaymentDraft, actor: &Actor) -> Result<PaymentOutcome, BillingError> {
        draft.validate()?;
        self.write_payment(PaymentWrite::Create(draft), actor).await
    }

    /// Replaces a payment's fields and reconciles affected balances
    #[instrument(skip(self, draft, actor))]
    pub async fn update_payment(
        &self,
        id: PaymentId,
        draft: PaymentDraft,
        actor: &Actor,
    ) -> Result<PaymentOutcome, BillingError> {
        draft.validate()?;
        self.write_payment(PaymentWrite::Update { id, draft }, actor).await
    }

    /// Deletes a payment and restores its invoice balance
    #[instrument(skip(self, actor))]
    pub async fn delete_payment(&self, id: PaymentId, actor: &Actor) -> Result<PaymentOutcome, BillingError> {
        self.write_payment(PaymentWrite::Delete(id), actor).await
    }

    async fn write_payment(&self, write: PaymentWrite, actor: &Actor) -> Result<PaymentOutcome, BillingError> {
        let target = write.target();
        let outcome = self
            .payments
            .write_payment(write, actor)
            .await
            .map_err(|err| {
                let missing_payment = matches!(
                    &err,
                    PortError::NotFound { entity_type, .. } if entity_type == "Payment"
                );
                match target {
                    Some(id) if missing_payment => BillingError::PaymentNotFound(id.to_string()),
                    _ => BillingError::from(err),
                }
            })?;

        if let Some(payment_id) = outcome.payment.as_ref().map(|p| p.id).or(target) {
            let events = outcome
                .invoices
                .iter()
                .map(|inv| BillingEvent::InvoiceBalanceChanged {
                    invoice_id: inv.id,
                    payment_id,
                    balance_due: inv.balance_due.amount(),
                    status: inv.status,
                    timestamp: Utc::now(),
                })
                .collect();
            self.emit(events).await;
        }

        for invoice in &outcome.invoices {
            info!(
                invoice_id = %invoice.id,
                balance_due = %invoice.balance_due,
                status = %invoice.status,
                "Invoice balance reconciled"
            );
        }
        Ok(outcome)
    }
}
