//! Core Kernel - Foundational types for the PG billing system
//!
//! This crate provides the building blocks shared by the billing and
//! subscription domains:
//! - Money types with precise decimal arithmetic
//! - Calendar arithmetic (month clamping, month addition, local days)
//! - Subscription interval arithmetic on fixed 28-day months
//! - Strongly-typed identifiers
//! - The acting-user context passed into every mutating operation
//! - Port error types shared by all adapters
//! - The `string_enum!` macro for text-labelled status enums

pub mod money;
pub mod temporal;
pub mod interval;
pub mod identifiers;
pub mod actor;
pub mod error;
pub mod ports;
pub mod labels;

pub use money::{Money, Currency, MoneyError, Rate};
pub use temporal::{Timezone, TemporalError};
pub use identifiers::{
    UserId, OwnerId, BuildingId, BookingId, InvoiceId, InvoiceExpenseId,
    InvoiceSettingsId, PaymentId, PlanId, SubscriptionId,
};
pub use actor::{Actor, ActorRole};
pub use error::CoreError;
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
