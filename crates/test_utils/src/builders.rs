//! Test Data Builders
//!
//! Builders for the domain values tests construct most often. Defaults
//! follow the fixture scenario so a test only sets the fields it is about.

use chrono::{DateTime, NaiveDate, Utc};
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use rust_decimal::Decimal;
use serde_json::json;

use core_kernel::{BookingId, BuildingId, Currency, InvoiceId, Money, OwnerId};
use domain_billing::settings::{BillingPeriod, GenerateType, MonthlyCycle, WeeklyCycle};
use domain_billing::{
    BookingSnapshot, BookingStatus, BookingTransition, GenerateOn, Invoice, InvoiceStatus,
    PaymentDraft, PaymentMethod, SettingsUpdate,
};

use crate::fixtures::{DateFixtures, IdFixtures, MoneyFixtures};

/// Builder for [`BookingSnapshot`]
#[derive(Debug, Clone)]
pub struct BookingBuilder {
    booking: BookingSnapshot,
}

impl Default for BookingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingBuilder {
    /// A confirmed booking checking in on 2025-01-31
    pub fn new() -> Self {
        Self {
            booking: BookingSnapshot {
                id: BookingId::new_v7(),
                status: BookingStatus::Confirmed,
                start_date: Some(DateFixtures::checkin()),
                end_date: None,
                booked_at: Some(DateFixtures::confirmed_at()),
                monthly_rent: MoneyFixtures::rent(),
                security_deposit: MoneyFixtures::deposit(),
                discount_amount: MoneyFixtures::zero(),
                maintenance_amount: MoneyFixtures::maintenance(),
                building_id: Some(IdFixtures::building()),
                owner_id: Some(IdFixtures::owner()),
            },
        }
    }

    pub fn with_id(mut self, id: BookingId) -> Self {
        self.booking.id = id;
        self
    }

    pub fn with_status(mut self, status: BookingStatus) -> Self {
        self.booking.status = status;
        self
    }

    pub fn checking_in(mut self, date: NaiveDate) -> Self {
        self.booking.start_date = Some(date);
        self
    }

    pub fn without_start_date(mut self) -> Self {
        self.booking.start_date = None;
        self
    }

    pub fn ending(mut self, date: NaiveDate) -> Self {
        self.booking.end_date = Some(date);
        self
    }

    pub fn confirmed_at(mut self, at: DateTime<Utc>) -> Self {
        self.booking.booked_at = Some(at);
        self
    }

    pub fn with_rent(mut self, rent: Decimal) -> Self {
        self.booking.monthly_rent = Money::inr(rent);
        self
    }

    pub fn with_maintenance(mut self, amount: Decimal) -> Self {
        self.booking.maintenance_amount = Money::inr(amount);
        self
    }

    pub fn with_deposit(mut self, amount: Decimal) -> Self {
        self.booking.security_deposit = Money::inr(amount);
        self
    }

    pub fn in_building(mut self, building: BuildingId, owner: OwnerId) -> Self {
        self.booking.building_id = Some(building);
        self.booking.owner_id = Some(owner);
        self
    }

    pub fn without_owner(mut self) -> Self {
        self.booking.owner_id = None;
        self
    }

    pub fn build(self) -> BookingSnapshot {
        self.booking
    }

    /// Transition from `previous` to the builder's status
    pub fn transition_from(self, previous: BookingStatus) -> BookingTransition {
        BookingTransition::changed(self.booking, previous)
    }
}

/// Builder for [`SettingsUpdate`]
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    update: SettingsUpdate,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsBuilder {
    /// Automatic monthly billing on the calendar month, generated at the start
    pub fn new() -> Self {
        Self {
            update: SettingsUpdate {
                building_id: None,
                generate_type: GenerateType::Automatic,
                period: BillingPeriod::Monthly,
                generate_on: GenerateOn::Start,
                monthly_cycle: MonthlyCycle::CalendarMonth,
                monthly_custom_day: None,
                weekly_cycle: WeeklyCycle::CalendarWeek,
                weekly_custom_weekday: None,
            },
        }
    }

    pub fn for_building(mut self, building: BuildingId) -> Self {
        self.update.building_id = Some(building);
        self
    }

    pub fn manual(mut self) -> Self {
        self.update.generate_type = GenerateType::Manual;
        self
    }

    pub fn on_checkin_date(mut self) -> Self {
        self.update.monthly_cycle = MonthlyCycle::CheckinDate;
        self.update.monthly_custom_day = None;
        self
    }

    pub fn on_custom_day(mut self, day: u32) -> Self {
        self.update.monthly_cycle = MonthlyCycle::CustomDay;
        self.update.monthly_custom_day = Some(day);
        self
    }

    pub fn generate_at_end(mut self) -> Self {
        self.update.generate_on = GenerateOn::End;
        self
    }

    pub fn build(self) -> SettingsUpdate {
        self.update
    }
}

/// Builder for stored invoices used by reconciliation tests
///
/// Produces an invoice value directly, bypassing booking validation.
#[derive(Debug, Clone)]
pub struct InvoiceBuilder {
    booking_id: BookingId,
    cycle_month: NaiveDate,
    total: Money,
    balance: Option<Money>,
    status: InvoiceStatus,
    due_date: NaiveDate,
}

impl Default for InvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceBuilder {
    pub fn new() -> Self {
        Self {
            booking_id: IdFixtures::booking(),
            cycle_month: DateFixtures::date(2025, 1, 1),
            total: MoneyFixtures::first_invoice_total(),
            balance: None,
            status: InvoiceStatus::Open,
            due_date: DateFixtures::first_window_end(),
        }
    }

    pub fn for_booking(mut self, booking: BookingId) -> Self {
        self.booking_id = booking;
        self
    }

    pub fn for_month(mut self, month: NaiveDate) -> Self {
        self.cycle_month = month;
        self
    }

    pub fn with_total(mut self, total: Decimal) -> Self {
        self.total = Money::inr(total);
        self
    }

    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = Some(Money::inr(balance));
        self
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = date;
        self
    }

    pub fn build(self) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: InvoiceId::new_v7(),
            booking_id: self.booking_id,
            cycle_month: self.cycle_month,
            issue_date: self.cycle_month,
            due_date: self.due_date,
            currency: Currency::INR,
            amount: self.total,
            tax_amount: MoneyFixtures::zero(),
            discount_amount: MoneyFixtures::zero(),
            total_amount: self.total,
            balance_due: self.balance.unwrap_or(self.total),
            status: self.status,
            notes: String::new(),
            metadata: json!({}),
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Builder for [`PaymentDraft`]
#[derive(Debug, Clone)]
pub struct PaymentBuilder {
    draft: PaymentDraft,
}

impl PaymentBuilder {
    pub fn new(amount: Decimal) -> Self {
        let mut draft = PaymentDraft::new(Money::inr(amount)).with_method(PaymentMethod::Upi);
        draft.notes = Sentence(2..5).fake();
        Self { draft }
    }

    pub fn for_invoice(mut self, invoice: InvoiceId) -> Self {
        self.draft = self.draft.for_invoice(invoice);
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.draft = self.draft.with_method(method);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.draft = self.draft.with_reference(reference);
        self
    }

    pub fn build(self) -> PaymentDraft {
        self.draft
    }
}
