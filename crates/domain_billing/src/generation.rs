//! Invoice generation triggers
//!
//! Invoices are created automatically in two places: when a booking becomes
//! confirmed (the first invoice, which also bills the security deposit) and
//! by the recurring job that bills each active booking on its window's
//! generation date. Both are idempotent on (booking, cycle month).
//!
//! Cancelling a booking voids its unpaid invoices from the current month on,
//! and the overdue sweep flags invoices past their due date.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use core_kernel::temporal::{add_months, first_of_month};
use core_kernel::{Actor, Money, OwnerId};

use crate::booking::{BookingSnapshot, BookingTransition};
use crate::error::BillingError;
use crate::events::{BillingEvent, InvoiceTrigger};
use crate::invoice::{Invoice, InvoiceExpense, InvoiceStatus, NewInvoice};
use crate::period::{monthly_period_window, PeriodWindow};
use crate::service::BillingService;
use crate::settings::{GenerateOn, InvoiceSettings};

/// Amount of the first invoice: rent, maintenance and deposit less discount
pub fn first_invoice_amount(booking: &BookingSnapshot) -> Result<Money, BillingError> {
    let gross = Money::sum(
        booking.currency(),
        [
            &booking.monthly_rent,
            &booking.maintenance_amount,
            &booking.security_deposit,
        ],
    )?;
    Ok(gross.checked_sub(&booking.discount_amount)?.floor_zero())
}

/// Amount of each later invoice: rent and maintenance less discount
pub fn recurring_invoice_amount(booking: &BookingSnapshot) -> Result<Money, BillingError> {
    let gross = Money::sum(
        booking.currency(),
        [&booking.monthly_rent, &booking.maintenance_amount],
    )?;
    Ok(gross.checked_sub(&booking.discount_amount)?.floor_zero())
}

/// Descriptive expense lines for the first invoice
///
/// Only positive components are listed. The lines explain the amount and do
/// not change it.
pub fn first_invoice_expenses(invoice: &Invoice, booking: &BookingSnapshot) -> Vec<InvoiceExpense> {
    let code = booking.currency().code();
    let mut expenses = Vec::new();
    if booking.security_deposit.is_positive() {
        expenses.push(
            InvoiceExpense::new(invoice.id, "Security Deposit", booking.security_deposit)
                .with_notes("Refundable after check-out"),
        );
    }
    if booking.maintenance_amount.is_positive() {
        expenses.push(InvoiceExpense::new(
            invoice.id,
            format!("Maintenance ({})", code),
            booking.maintenance_amount,
        ));
    }
    if booking.discount_amount.is_positive() {
        expenses.push(
            InvoiceExpense::new(invoice.id, format!("Discount ({})", code), booking.discount_amount)
                .with_notes("Applied as discount in totals"),
        );
    }
    expenses
}

/// Note appended to invoices voided by a cancellation
pub fn void_note(today: NaiveDate) -> String {
    format!("\nAuto-voided due to booking cancellation on {}.", today)
}

/// Why a trigger did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The change is not a confirmation (or cancellation)
    NotATransition,
    MissingStartDate,
    MissingOwner,
    MissingConfirmationDate,
    /// Settings are manual or not monthly
    NotAutomaticMonthly,
    /// Today is not the window's generation date
    NotGenerationDate,
    /// The window's month precedes the booking's first billable month
    BeforeFirstCycle,
}

/// Result of the first-invoice trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FirstInvoiceOutcome {
    Created { invoice: Box<Invoice> },
    AlreadyExists { cycle_month: NaiveDate },
    /// Generation waits for the window's end date
    Deferred { generate_on: NaiveDate },
    Skipped { reason: SkipReason },
}

/// Result of handling one booking transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerOutcome {
    FirstInvoice(FirstInvoiceOutcome),
    Voided { count: usize },
    /// Neither a confirmation nor a cancellation
    Ignored,
    /// The trigger failed; the error was logged
    Failed { message: String },
}

impl BillingService {
    /// Reacts to a booking lifecycle change
    ///
    /// Never fails: errors are logged and reported as
    /// [`TriggerOutcome::Failed`] so the booking write that caused the
    /// transition is never blocked by billing.
    #[instrument(skip(self, transition, actor), fields(booking_id = %transition.booking.id, status = %transition.booking.status))]
    pub async fn handle_booking_transition(
        &self,
        transition: &BookingTransition,
        actor: &Actor,
        today: NaiveDate,
    ) -> TriggerOutcome {
        let result = if transition.is_confirmation() {
            self.on_booking_confirmed(transition, actor, today)
                .await
                .map(TriggerOutcome::FirstInvoice)
        } else if transition.is_cancellation() {
            self.on_booking_canceled(transition, actor, today)
                .await
                .map(|count| TriggerOutcome::Voided { count })
        } else {
            Ok(TriggerOutcome::Ignored)
        };

        result.unwrap_or_else(|err| {
            error!(booking_id = %transition.booking.id, error = %err, "Booking transition trigger failed");
            TriggerOutcome::Failed {
                message: err.to_string(),
            }
        })
    }

    /// Creates the first invoice for a newly confirmed booking
    #[instrument(skip(self, transition, actor), fields(booking_id = %transition.booking.id))]
    pub async fn on_booking_confirmed(
        &self,
        transition: &BookingTransition,
        actor: &Actor,
        today: NaiveDate,
    ) -> Result<FirstInvoiceOutcome, BillingError> {
        let booking = &transition.booking;
        if !transition.is_confirmation() {
            debug!(previous = ?transition.previous_status, "Not a confirmation, skipping first invoice");
            return Ok(FirstInvoiceOutcome::Skipped {
                reason: SkipReason::NotATransition,
            });
        }

        let Some(start_date) = booking.start_date else {
            warn!(booking_id = %booking.id, "Confirmed booking has no check-in date, skipping first invoice");
            return Ok(FirstInvoiceOutcome::Skipped {
                reason: SkipReason::MissingStartDate,
            });
        };
        let Some(owner) = booking.owner_id else {
            warn!(booking_id = %booking.id, "Confirmed booking has no building owner, skipping first invoice");
            return Ok(FirstInvoiceOutcome::Skipped {
                reason: SkipReason::MissingOwner,
            });
        };

        let settings = self.automatic_monthly_settings(owner, booking).await?;
        let Some(settings) = settings else {
            return Ok(FirstInvoiceOutcome::Skipped {
                reason: SkipReason::NotAutomaticMonthly,
            });
        };

        let window = monthly_period_window(&settings, start_date, Some(booking))?;
        if settings.generate_on == GenerateOn::End && today != window.generate_on {
            info!(booking_id = %booking.id, generate_on = %window.generate_on, "First invoice deferred to window end");
            self.emit(vec![BillingEvent::FirstInvoiceDeferred {
                booking_id: booking.id,
                generate_on: window.generate_on,
                timestamp: Utc::now(),
            }])
            .await;
            return Ok(FirstInvoiceOutcome::Deferred {
                generate_on: window.generate_on,
            });
        }

        let cycle_month = first_of_month(start_date);
        if self.invoices.invoice_exists(booking.id, cycle_month).await? {
            info!(booking_id = %booking.id, %cycle_month, "First invoice already exists");
            return Ok(FirstInvoiceOutcome::AlreadyExists { cycle_month });
        }

        let amount = first_invoice_amount(booking)?;
        let new = NewInvoice::new(booking.id, today, window.end, amount)
            .with_cycle_month(cycle_month)
            .with_status(InvoiceStatus::Open)
            .with_notes(format!("Auto-generated at confirmation for period {}", window.label()));
        let invoice = Invoice::create(new, booking, today, &self.tz, actor)?;
        let expenses = first_invoice_expenses(&invoice, booking);

        match self
            .insert_unique(invoice, expenses, InvoiceTrigger::BookingConfirmed)
            .await
        {
            Ok(invoice) => Ok(FirstInvoiceOutcome::Created {
                invoice: Box::new(invoice),
            }),
            Err(err) if err.field() == Some("cycle_month") => {
                info!(booking_id = %booking.id, %cycle_month, "First invoice created concurrently");
                Ok(FirstInvoiceOutcome::AlreadyExists { cycle_month })
            }
            Err(err) => Err(err),
        }
    }

    /// Voids a canceled booking's unpaid invoices from the current month on
    #[instrument(skip(self, transition, actor), fields(booking_id = %transition.booking.id))]
    pub async fn on_booking_canceled(
        &self,
        transition: &BookingTransition,
        actor: &Actor,
        today: NaiveDate,
    ) -> Result<usize, BillingError> {
        if !transition.is_cancellation() {
            return Ok(0);
        }
        let booking_id = transition.booking.id;
        let voided = self
            .invoices
            .void_invoices(booking_id, first_of_month(today), &void_note(today), actor)
            .await?;

        info!(booking_id = %booking_id, count = voided.len(), "Voided invoices for canceled booking");
        if !voided.is_empty() {
            self.emit(vec![BillingEvent::InvoicesVoided {
                booking_id,
                count: voided.len(),
                timestamp: Utc::now(),
            }])
            .await;
        }
        Ok(voided.len())
    }

    /// Bills every active booking whose window starts (or ends) today
    ///
    /// Returns the number of invoices created. A failure on one booking is
    /// logged and the sweep moves on.
    #[instrument(skip(self, actor))]
    pub async fn generate_monthly_invoices(&self, actor: &Actor, today: NaiveDate) -> Result<usize, BillingError> {
        let bookings = self.bookings.list_billable_bookings(today).await?;
        let mut created = 0;
        let mut failed = 0;

        for booking in &bookings {
            match self.generate_for_booking(booking, actor, today).await {
                Ok(Some(_)) => created += 1,
                Ok(None) => {}
                Err(err) => {
                    failed += 1;
                    error!(booking_id = %booking.id, error = %err, "Recurring invoice generation failed");
                }
            }
        }

        info!(scanned = bookings.len(), created, failed, %today, "Monthly invoice generation finished");
        self.emit(vec![BillingEvent::MonthlyGenerationCompleted {
            created,
            failed,
            as_of: today,
            timestamp: Utc::now(),
        }])
        .await;
        Ok(created)
    }

    async fn generate_for_booking(
        &self,
        booking: &BookingSnapshot,
        actor: &Actor,
        today: NaiveDate,
    ) -> Result<Option<Invoice>, BillingError> {
        let Some(owner) = booking.owner_id else {
            debug!(booking_id = %booking.id, reason = ?SkipReason::MissingOwner, "Skipping booking");
            return Ok(None);
        };
        if booking.booked_at.is_none() {
            debug!(booking_id = %booking.id, reason = ?SkipReason::MissingConfirmationDate, "Skipping booking");
            return Ok(None);
        }
        let Some(settings) = self.automatic_monthly_settings(owner, booking).await? else {
            return Ok(None);
        };

        let Some(window) = due_window(&settings, booking, today)? else {
            return Ok(None);
        };

        let cycle_month = window.cycle_month();
        let first_cycle = booking
            .checkin_anchor()?
            .or_else(|| booking.booked_on(&self.tz))
            .map(first_of_month);
        if first_cycle.is_some_and(|first| cycle_month < first) {
            debug!(booking_id = %booking.id, reason = ?SkipReason::BeforeFirstCycle, "Skipping booking");
            return Ok(None);
        }
        if self.invoices.invoice_exists(booking.id, cycle_month).await? {
            return Ok(None);
        }

        let amount = recurring_invoice_amount(booking)?;
        let new = NewInvoice::new(booking.id, today, window.end, amount)
            .with_cycle_month(cycle_month)
            .with_status(InvoiceStatus::Open)
            .with_notes(format!("Auto-generated for period {}", window.label()));
        let invoice = Invoice::create(new, booking, today, &self.tz, actor)?;

        match self.insert_unique(invoice, Vec::new(), InvoiceTrigger::Recurring).await {
            Ok(invoice) => Ok(Some(invoice)),
            Err(err) if err.field() == Some("cycle_month") => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolves settings and keeps them only when they are automatic monthly
    async fn automatic_monthly_settings(
        &self,
        owner: OwnerId,
        booking: &BookingSnapshot,
    ) -> Result<Option<InvoiceSettings>, BillingError> {
        let resolved = self.resolve_settings(owner, booking.building_id).await?;
        if resolved.settings.is_automatic_monthly() {
            Ok(Some(resolved.settings))
        } else {
            debug!(
                booking_id = %booking.id,
                generate_type = %resolved.settings.generate_type,
                period = %resolved.settings.period,
                "Settings are not automatic monthly"
            );
            Ok(None)
        }
    }

    /// Moves past-due open and partial invoices to overdue
    #[instrument(skip(self))]
    pub async fn mark_overdue_invoices(&self, today: NaiveDate) -> Result<u64, BillingError> {
        let count = self.invoices.mark_overdue(today).await?;
        info!(count, %today, "Marked invoices overdue");
        if count > 0 {
            self.emit(vec![BillingEvent::InvoicesMarkedOverdue {
                count: count as usize,
                as_of: today,
                timestamp: Utc::now(),
            }])
            .await;
        }
        Ok(count)
    }
}

/// The window whose generation date is `today`, if any
///
/// With generation at the window end, the window ending today started in
/// the previous month, so that window is checked as well.
fn due_window(
    settings: &InvoiceSettings,
    booking: &BookingSnapshot,
    today: NaiveDate,
) -> Result<Option<PeriodWindow>, BillingError> {
    let current = monthly_period_window(settings, today, Some(booking))?;
    if current.generate_on == today {
        return Ok(Some(current));
    }
    if settings.generate_on == GenerateOn::End {
        let previous = monthly_period_window(settings, add_months(today, -1)?, Some(booking))?;
        if previous.generate_on == today {
            return Ok(Some(previous));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::BookingId;
    use rust_decimal_macros::dec;

    use crate::booking::BookingStatus;
    use crate::settings::MonthlyCycle;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn booking() -> BookingSnapshot {
        BookingSnapshot {
            id: BookingId::new(),
            status: BookingStatus::Confirmed,
            start_date: Some(date(2025, 1, 31)),
            end_date: None,
            booked_at: None,
            monthly_rent: Money::inr(dec!(10000)),
            security_deposit: Money::inr(dec!(5000)),
            discount_amount: Money::inr(dec!(0)),
            maintenance_amount: Money::inr(dec!(500)),
            building_id: None,
            owner_id: None,
        }
    }

    #[test]
    fn test_first_amount_includes_deposit() {
        assert_eq!(first_invoice_amount(&booking()).unwrap(), Money::inr(dec!(15500)));
        assert_eq!(recurring_invoice_amount(&booking()).unwrap(), Money::inr(dec!(10500)));
    }

    #[test]
    fn test_amounts_floor_at_zero() {
        let mut b = booking();
        b.discount_amount = Money::inr(dec!(20000));
        assert!(recurring_invoice_amount(&b).unwrap().is_zero());
        assert!(first_invoice_amount(&b).unwrap().is_zero());
    }

    #[test]
    fn test_discount_beyond_rent_reduces_deposit() {
        let mut b = booking();
        b.discount_amount = Money::inr(dec!(11000));
        assert!(recurring_invoice_amount(&b).unwrap().is_zero());
        // 10000 + 500 + 5000 - 11000
        assert_eq!(first_invoice_amount(&b).unwrap(), Money::inr(dec!(4500)));
    }

    #[test]
    fn test_due_window_at_end_uses_previous_window() {
        let mut settings = InvoiceSettings::default_for(OwnerId::new(), None);
        settings.generate_on = GenerateOn::End;
        settings.monthly_cycle = MonthlyCycle::CalendarMonth;

        let window = due_window(&settings, &booking(), date(2025, 3, 1)).unwrap().unwrap();
        assert_eq!(window.start, date(2025, 2, 1));
        assert_eq!(window.cycle_month(), date(2025, 2, 1));
        assert!(due_window(&settings, &booking(), date(2025, 3, 2)).unwrap().is_none());
    }

    #[test]
    fn test_void_note_format() {
        assert_eq!(
            void_note(date(2025, 2, 14)),
            "\nAuto-voided due to booking cancellation on 2025-02-14."
        );
    }
}
