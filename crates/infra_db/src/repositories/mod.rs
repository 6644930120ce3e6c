//! Repository implementations
//!
//! Repositories own the SQL and speak in row types. Adapters in
//! [`crate::adapters`] map rows onto domain types and implement the ports.

pub mod bookings;
pub mod settings;
pub mod invoices;
pub mod payments;
pub mod subscriptions;

pub use bookings::{BookingRepository, BookingRow};
pub use settings::{InvoiceSettingsRow, SettingsRepository};
pub use invoices::{InvoiceExpenseRow, InvoiceRepository, InvoiceRow};
pub use payments::{PaymentRepository, PaymentRow};
pub use subscriptions::{PlanRow, SubscriptionRepository, SubscriptionRow};
