//! Invoice lifecycle
//!
//! An invoice bills one booking for one cycle month. Its status moves
//! `draft → open → partial/paid → overdue` as payments arrive and due dates
//! pass, and unpaid invoices can be voided when the booking is canceled.
//!
//! `total_amount` is fixed at creation from amount, tax and discount.
//! `balance_due` starts at the total and only moves through payments; it
//! never goes below zero.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::temporal::{first_of_month, is_first_of_month};
use core_kernel::{Actor, BookingId, Currency, InvoiceExpenseId, InvoiceId, Money, Timezone, UserId};

use crate::booking::BookingSnapshot;
use crate::error::BillingError;

core_kernel::string_enum! {
    /// Invoice status
    pub enum InvoiceStatus {
        /// Being prepared, not yet sent to the tenant
        Draft => "draft",
        /// Issued and awaiting payment
        Open => "open",
        /// Some payment received
        Partial => "partial",
        /// Fully settled
        Paid => "paid",
        /// Past due date with a balance remaining
        Overdue => "overdue",
        /// Canceled
        Void => "void",
    }
}

impl InvoiceStatus {
    /// Statuses the cancellation trigger may void
    pub fn is_voidable(&self) -> bool {
        matches!(self, InvoiceStatus::Draft | InvoiceStatus::Open)
    }

    /// Statuses the overdue sweep considers
    pub fn is_collectible(&self) -> bool {
        matches!(self, InvoiceStatus::Open | InvoiceStatus::Partial)
    }
}

/// Input for creating an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub booking_id: BookingId,
    /// Billing month; any day within it is accepted. Defaults to the
    /// booking's check-in month.
    pub cycle_month: Option<NaiveDate>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub tax_amount: Money,
    pub discount_amount: Money,
    /// Only `draft` or `open` are accepted
    pub status: InvoiceStatus,
    pub notes: String,
    pub metadata: serde_json::Value,
}

impl NewInvoice {
    /// Starts a draft invoice for `amount` with no tax or discount
    pub fn new(booking_id: BookingId, issue_date: NaiveDate, due_date: NaiveDate, amount: Money) -> Self {
        let currency = amount.currency();
        Self {
            booking_id,
            cycle_month: None,
            issue_date,
            due_date,
            amount,
            tax_amount: Money::zero(currency),
            discount_amount: Money::zero(currency),
            status: InvoiceStatus::Draft,
            notes: String::new(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_cycle_month(mut self, month: NaiveDate) -> Self {
        self.cycle_month = Some(month);
        self
    }

    pub fn with_tax(mut self, tax: Money) -> Self {
        self.tax_amount = tax;
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount_amount = discount;
        self
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// An invoice for one booking and cycle month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub booking_id: BookingId,
    /// Always the first day of the billed month
    pub cycle_month: NaiveDate,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: Currency,
    pub amount: Money,
    pub tax_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub balance_due: Money,
    pub status: InvoiceStatus,
    pub notes: String,
    pub metadata: serde_json::Value,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inclusive range of cycle months a booking may be invoiced for
pub fn allowed_cycle_range(
    booking: &BookingSnapshot,
    today: NaiveDate,
    tz: &Timezone,
) -> Result<(NaiveDate, NaiveDate), BillingError> {
    let lower_source = match booking.checkin_anchor()? {
        Some(anchor) => Some(anchor),
        None => booking.booked_on(tz),
    };
    let lower = lower_source.map(first_of_month).ok_or_else(|| {
        BillingError::validation(
            "booking",
            "Invoice requires a confirmed booking with confirmation date.",
        )
    })?;
    let upper = first_of_month(booking.end_date.unwrap_or(today));
    Ok((lower, upper))
}

impl Invoice {
    /// Validates `new` against its booking and builds the invoice
    ///
    /// The cycle month is normalized to the first of its month and must fall
    /// between the booking's check-in month and its end month (or the
    /// current month for open-ended stays). Checking for an existing invoice
    /// on the same month is the caller's job, since it needs the store.
    pub fn create(
        new: NewInvoice,
        booking: &BookingSnapshot,
        today: NaiveDate,
        tz: &Timezone,
        actor: &Actor,
    ) -> Result<Self, BillingError> {
        if !booking.is_confirmed() || booking.booked_at.is_none() {
            return Err(BillingError::validation(
                "booking",
                "Invoice requires a confirmed booking with confirmation date.",
            ));
        }
        if new.booking_id != booking.id {
            return Err(BillingError::validation(
                "booking",
                "Invoice booking does not match the booking snapshot.",
            ));
        }

        let (lower, upper) = allowed_cycle_range(booking, today, tz)?;
        let cycle_month = first_of_month(new.cycle_month.unwrap_or(lower));
        if cycle_month < lower {
            return Err(BillingError::validation(
                "cycle_month",
                "Cannot be before booking confirmation month.",
            ));
        }
        if cycle_month > upper {
            return Err(BillingError::validation(
                "cycle_month",
                "Cannot be after the allowed upper bound (booking end or current month).",
            ));
        }

        if new.due_date < new.issue_date {
            return Err(BillingError::validation(
                "due_date",
                "Due date cannot be before the issue date.",
            ));
        }

        if !new.status.is_voidable() {
            return Err(BillingError::validation(
                "status",
                "New invoices must start as draft or open.",
            ));
        }

        let currency = booking.currency();
        for (field, value) in [
            ("amount", &new.amount),
            ("tax_amount", &new.tax_amount),
            ("discount_amount", &new.discount_amount),
        ] {
            if value.currency() != currency {
                return Err(BillingError::validation(
                    field,
                    format!("Must be in {}.", currency),
                ));
            }
            if value.is_negative() {
                return Err(BillingError::validation(field, "Must not be negative."));
            }
            if !value.fits_currency_scale() {
                return Err(BillingError::validation(
                    field,
                    format!(
                        "Cannot have more than {} decimal places.",
                        currency.decimal_places()
                    ),
                ));
            }
        }

        let gross = new.amount.checked_add(&new.tax_amount)?;
        if new.discount_amount.amount() > gross.amount() {
            return Err(BillingError::validation(
                "discount_amount",
                "Discount cannot exceed subtotal plus tax.",
            ));
        }

        let now = Utc::now();
        let mut invoice = Self {
            id: InvoiceId::new_v7(),
            booking_id: booking.id,
            cycle_month,
            issue_date: new.issue_date,
            due_date: new.due_date,
            currency,
            amount: new.amount,
            tax_amount: new.tax_amount,
            discount_amount: new.discount_amount,
            total_amount: Money::zero(currency),
            balance_due: Money::zero(currency),
            status: new.status,
            notes: new.notes,
            metadata: new.metadata,
            created_by: actor.user_id,
            updated_by: actor.user_id,
            created_at: now,
            updated_at: now,
        };
        invoice.recalc_totals()?;
        invoice.balance_due = invoice.total_amount;
        Ok(invoice)
    }

    /// Recomputes `total_amount = amount + tax - discount`
    ///
    /// `balance_due` is left alone.
    pub fn recalc_totals(&mut self) -> Result<(), BillingError> {
        self.total_amount = Money::sum(self.currency, [&self.amount, &self.tax_amount])?
            .checked_sub(&self.discount_amount)?
            .round_to_currency();
        Ok(())
    }

    /// Moves a draft invoice to open
    pub fn open(&mut self, actor: &Actor) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::InvalidTransition {
                from: self.status,
                action: "open",
            });
        }
        self.status = InvoiceStatus::Open;
        self.touch(actor);
        Ok(())
    }

    /// Applies a new payment to the balance
    ///
    /// Non-positive amounts are ignored. A zero balance marks the invoice
    /// paid; otherwise a draft or open invoice becomes partial. Void invoices
    /// take no payments.
    pub fn apply_payment_amount(&mut self, amount: &Money) -> Result<(), BillingError> {
        self.ensure_not_void()?;
        if !amount.is_positive() {
            return Ok(());
        }
        self.balance_due = self.balance_due.checked_sub(amount)?.floor_zero();
        if self.balance_due.is_zero() {
            self.status = InvoiceStatus::Paid;
        } else if matches!(self.status, InvoiceStatus::Draft | InvoiceStatus::Open) {
            self.status = InvoiceStatus::Partial;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Adjusts the balance by a signed change in payments
    ///
    /// A positive delta means more was paid, a negative delta refunds. A
    /// paid invoice that gets a balance back becomes partial. Void invoices
    /// are rejected.
    pub fn adjust_payment_delta(&mut self, delta: &Money) -> Result<(), BillingError> {
        self.ensure_not_void()?;
        if delta.is_zero() {
            return Ok(());
        }
        self.balance_due = self.balance_due.checked_sub(delta)?.floor_zero();
        if self.balance_due.is_zero() {
            self.status = InvoiceStatus::Paid;
        } else if matches!(
            self.status,
            InvoiceStatus::Draft | InvoiceStatus::Open | InvoiceStatus::Paid
        ) {
            self.status = InvoiceStatus::Partial;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_not_void(&self) -> Result<(), BillingError> {
        if self.status == InvoiceStatus::Void {
            return Err(BillingError::InvalidTransition {
                from: InvoiceStatus::Void,
                action: "apply a payment to",
            });
        }
        Ok(())
    }

    /// Returns true when a booking cancellation on a day in `current_month`
    /// should void this invoice
    pub fn is_voidable_on_cancel(&self, current_month: NaiveDate) -> bool {
        self.status.is_voidable() && self.cycle_month >= first_of_month(current_month)
    }

    /// Voids the invoice and records the cancellation in its notes
    pub fn void_for_cancellation(&mut self, today: NaiveDate, actor: &Actor) {
        self.status = InvoiceStatus::Void;
        self.notes
            .push_str(&format!("\nAuto-voided due to booking cancellation on {}.", today));
        self.touch(actor);
    }

    /// Returns true when an open or partial invoice is past its due date
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.status.is_collectible() && self.due_date < today
    }

    /// Marks the invoice overdue if it is past due; returns whether it changed
    pub fn mark_overdue(&mut self, today: NaiveDate) -> bool {
        if !self.is_overdue_on(today) {
            return false;
        }
        self.status = InvoiceStatus::Overdue;
        self.updated_at = Utc::now();
        true
    }

    /// Stamps the acting user and modification time
    pub fn touch(&mut self, actor: &Actor) {
        if actor.user_id.is_some() {
            self.updated_by = actor.user_id;
        }
        self.updated_at = Utc::now();
    }

    /// Structural invariants every stored invoice satisfies
    pub fn check_invariants(&self) -> bool {
        is_first_of_month(self.cycle_month)
            && !self.balance_due.is_negative()
            && !self.total_amount.is_negative()
            && self.due_date >= self.issue_date
    }
}

/// An informational line attached to an invoice
///
/// Expenses describe what the amount is made of. They never feed the
/// invoice totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceExpense {
    pub id: InvoiceExpenseId,
    pub invoice_id: InvoiceId,
    pub label: String,
    pub amount: Money,
    pub taxable: bool,
    /// Percentage, when taxable
    pub tax_rate: Option<Decimal>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl InvoiceExpense {
    /// Creates a non-taxable expense line
    pub fn new(invoice_id: InvoiceId, label: impl Into<String>, amount: Money) -> Self {
        Self {
            id: InvoiceExpenseId::new_v7(),
            invoice_id,
            label: label.into(),
            amount,
            taxable: false,
            tax_rate: None,
            notes: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn taxable_at(mut self, rate: Decimal) -> Self {
        self.taxable = true;
        self.tax_rate = Some(rate);
        self
    }
}

/// An invoice together with its expense lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceWithExpenses {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub expenses: Vec<InvoiceExpense>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use crate::booking::BookingStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn booking() -> BookingSnapshot {
        BookingSnapshot {
            id: BookingId::new(),
            status: BookingStatus::Confirmed,
            start_date: Some(date(2025, 1, 15)),
            end_date: None,
            booked_at: Some(Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap()),
            monthly_rent: Money::inr(dec!(10000)),
            security_deposit: Money::inr(dec!(0)),
            discount_amount: Money::inr(dec!(0)),
            maintenance_amount: Money::inr(dec!(0)),
            building_id: None,
            owner_id: None,
        }
    }

    fn new_invoice(b: &BookingSnapshot, amount: Decimal) -> NewInvoice {
        NewInvoice::new(b.id, date(2025, 3, 1), date(2025, 3, 10), Money::inr(amount))
    }

    fn create(b: &BookingSnapshot, new: NewInvoice) -> Result<Invoice, BillingError> {
        Invoice::create(new, b, date(2025, 3, 5), &Timezone::default(), &Actor::system())
    }

    #[test]
    fn test_create_defaults_cycle_month_to_checkin_month() {
        let b = booking();
        let invoice = create(&b, new_invoice(&b, dec!(10000))).unwrap();
        assert_eq!(invoice.cycle_month, date(2025, 1, 1));
        assert_eq!(invoice.total_amount, Money::inr(dec!(10000)));
        assert_eq!(invoice.balance_due, invoice.total_amount);
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert!(invoice.check_invariants());
    }

    #[test]
    fn test_create_normalizes_cycle_month() {
        let b = booking();
        let invoice = create(&b, new_invoice(&b, dec!(100)).with_cycle_month(date(2025, 2, 17))).unwrap();
        assert_eq!(invoice.cycle_month, date(2025, 2, 1));
    }

    #[test]
    fn test_cycle_month_bounds() {
        let b = booking();
        let early = create(&b, new_invoice(&b, dec!(100)).with_cycle_month(date(2024, 12, 1))).unwrap_err();
        assert_eq!(early.to_string(), "Cannot be before booking confirmation month.");

        let late = create(&b, new_invoice(&b, dec!(100)).with_cycle_month(date(2025, 4, 1))).unwrap_err();
        assert_eq!(late.field(), Some("cycle_month"));

        let mut ended = booking();
        ended.end_date = Some(date(2025, 2, 20));
        let past_end = create(&ended, new_invoice(&ended, dec!(100)).with_cycle_month(date(2025, 3, 1)));
        assert!(past_end.is_err());
    }

    #[test]
    fn test_requires_confirmed_booking() {
        let mut b = booking();
        b.status = BookingStatus::Pending;
        let err = create(&b, new_invoice(&b, dec!(100))).unwrap_err();
        assert_eq!(err.field(), Some("booking"));

        let mut unbooked = booking();
        unbooked.booked_at = None;
        assert!(create(&unbooked, new_invoice(&unbooked, dec!(100))).is_err());
    }

    #[test]
    fn test_due_date_and_discount_rules() {
        let b = booking();
        let mut bad_due = new_invoice(&b, dec!(100));
        bad_due.due_date = date(2025, 2, 1);
        assert_eq!(create(&b, bad_due).unwrap_err().field(), Some("due_date"));

        let too_much = new_invoice(&b, dec!(100))
            .with_tax(Money::inr(dec!(18)))
            .with_discount(Money::inr(dec!(118.01)));
        assert_eq!(create(&b, too_much).unwrap_err().field(), Some("discount_amount"));

        let exact = new_invoice(&b, dec!(100))
            .with_tax(Money::inr(dec!(18)))
            .with_discount(Money::inr(dec!(118)));
        let invoice = create(&b, exact).unwrap();
        assert!(invoice.total_amount.is_zero());

        let fractional = new_invoice(&b, dec!(100)).with_tax(Money::inr(dec!(0.005)));
        assert_eq!(create(&b, fractional).unwrap_err().field(), Some("tax_amount"));
    }

    #[test]
    fn test_open_only_from_draft() {
        let b = booking();
        let mut invoice = create(&b, new_invoice(&b, dec!(100))).unwrap();
        invoice.open(&Actor::system()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Open);
        assert!(matches!(
            invoice.open(&Actor::system()),
            Err(BillingError::InvalidTransition { from: InvoiceStatus::Open, .. })
        ));
    }

    #[test]
    fn test_apply_payment_transitions() {
        let b = booking();
        let mut invoice = create(&b, new_invoice(&b, dec!(1000)).with_status(InvoiceStatus::Open)).unwrap();

        invoice.apply_payment_amount(&Money::inr(dec!(0))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Open);

        invoice.apply_payment_amount(&Money::inr(dec!(400))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Partial);
        assert_eq!(invoice.balance_due, Money::inr(dec!(600)));

        invoice.apply_payment_amount(&Money::inr(dec!(900))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.balance_due.is_zero());
    }

    #[test]
    fn test_delta_reopens_paid_invoice() {
        let b = booking();
        let mut invoice = create(&b, new_invoice(&b, dec!(1000)).with_status(InvoiceStatus::Open)).unwrap();
        invoice.apply_payment_amount(&Money::inr(dec!(1000))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);

        invoice.adjust_payment_delta(&Money::inr(dec!(-250))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Partial);
        assert_eq!(invoice.balance_due, Money::inr(dec!(250)));
    }

    #[test]
    fn test_overdue_status_is_sticky_on_partial_payment() {
        let b = booking();
        let mut invoice = create(&b, new_invoice(&b, dec!(1000)).with_status(InvoiceStatus::Open)).unwrap();
        assert!(invoice.mark_overdue(date(2025, 3, 11)));
        invoice.apply_payment_amount(&Money::inr(dec!(100))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Overdue);
    }

    #[test]
    fn test_void_appends_note() {
        let b = booking();
        let mut invoice = create(&b, new_invoice(&b, dec!(1000)).with_notes("March rent")).unwrap();
        invoice.void_for_cancellation(date(2025, 3, 15), &Actor::system());
        assert_eq!(invoice.status, InvoiceStatus::Void);
        assert_eq!(
            invoice.notes,
            "March rent\nAuto-voided due to booking cancellation on 2025-03-15."
        );
    }

    #[test]
    fn test_void_invoice_takes_no_payments() {
        let b = booking();
        let mut invoice = create(&b, new_invoice(&b, dec!(1000))).unwrap();
        invoice.void_for_cancellation(date(2025, 3, 15), &Actor::system());

        assert!(matches!(
            invoice.apply_payment_amount(&Money::inr(dec!(1000))),
            Err(BillingError::InvalidTransition { from: InvoiceStatus::Void, .. })
        ));
        assert!(invoice.adjust_payment_delta(&Money::inr(dec!(-100))).is_err());
        assert_eq!(invoice.status, InvoiceStatus::Void);
        assert_eq!(invoice.balance_due, Money::inr(dec!(1000)));
    }

    #[test]
    fn test_expense_defaults() {
        let expense = InvoiceExpense::new(InvoiceId::new(), "Security Deposit", Money::inr(dec!(5000)));
        assert!(!expense.taxable);
        assert!(expense.tax_rate.is_none());
    }
}
