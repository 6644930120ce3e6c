//! Billing Domain - Invoice cycles for PG bookings
//!
//! This crate turns confirmed bookings into monthly invoices and keeps
//! invoice balances in step with the payments recorded against them.
//!
//! # Components
//!
//! - **Period windows** ([`period`]): the monthly span an invoice covers,
//!   aligned to the calendar month, a custom day, or the tenant's check-in
//!   day, with end-of-month clamping
//! - **Settings** ([`settings`]): per-owner and per-building generation
//!   rules with a built-in default
//! - **Invoices** ([`invoice`]): validation against the booking, the
//!   status machine, and balance arithmetic that never goes negative
//! - **Triggers** ([`generation`]): first invoice on confirmation,
//!   recurring generation, cancellation voiding and the overdue sweep
//! - **Payments** ([`payment`]): reconciliation of payment writes into
//!   invoice balance adjustments
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BillingService, BookingTransition};
//!
//! let service = BillingService::with_store(store).with_timezone(tz);
//!
//! // Booking moved from pending to confirmed
//! let outcome = service
//!     .handle_booking_transition(&transition, &actor, service.today())
//!     .await;
//! ```

pub mod booking;
pub mod settings;
pub mod period;
pub mod invoice;
pub mod payment;
pub mod generation;
pub mod events;
pub mod ports;
pub mod service;
pub mod error;

pub use booking::{BookingSnapshot, BookingStatus, BookingTransition};
pub use settings::{
    BillingPeriod, GenerateOn, GenerateType, InvoiceSettings, MonthlyCycle, ResolvedSettings,
    SettingsSource, SettingsUpdate, WeeklyCycle,
};
pub use period::{monthly_period_window, PeriodWindow};
pub use invoice::{Invoice, InvoiceExpense, InvoiceStatus, InvoiceWithExpenses, NewInvoice};
pub use payment::{reconcile, BalanceAdjustment, Payment, PaymentDraft, PaymentMethod, PaymentOutcome, PaymentWrite};
pub use generation::{FirstInvoiceOutcome, SkipReason, TriggerOutcome};
pub use events::{BillingEvent, EventDispatcher, EventSubscriber, InvoiceTrigger, LoggingSubscriber};
pub use ports::{BookingSource, InvoiceStore, PaymentStore, SettingsStore};
pub use service::BillingService;
pub use error::BillingError;
