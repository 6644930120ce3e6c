//! Billing domain errors

use thiserror::Error;

use core_kernel::{CoreError, MoneyError, PortError, TemporalError};

use crate::invoice::InvoiceStatus;

/// Message returned when an invoice already exists for a booking and month
pub const DUPLICATE_INVOICE_MESSAGE: &str = "An invoice for this booking and month already exists.";

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Input failed validation; `field` names the offending attribute
    #[error("{message}")]
    Validation {
        field: String,
        message: String,
    },

    /// The invoice cannot move from its current status
    #[error("Invalid transition: cannot {action} an invoice in status '{from}'")]
    InvalidTransition {
        from: InvoiceStatus,
        action: &'static str,
    },

    /// Invoice not found
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    /// Payment not found
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Booking not found
    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Calendar error: {0}")]
    Temporal(#[from] TemporalError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage adapter failure
    #[error("Storage error: {0}")]
    Port(PortError),
}

impl From<PortError> for BillingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Validation {
                message,
                field: Some(field),
            } => BillingError::Validation { field, message },
            other => BillingError::Port(other),
        }
    }
}

impl From<BillingError> for PortError {
    /// Lets adapters surface domain failures raised inside a transaction
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation { field, message } => PortError::validation_field(message, field),
            BillingError::Port(inner) => inner,
            BillingError::InvoiceNotFound(id) => PortError::not_found("Invoice", id),
            BillingError::PaymentNotFound(id) => PortError::not_found("Payment", id),
            BillingError::BookingNotFound(id) => PortError::not_found("Booking", id),
            BillingError::Money(err @ (MoneyError::CurrencyMismatch(..) | MoneyError::UnknownCurrency(_))) => {
                PortError::validation_field(err.to_string(), "currency")
            }
            BillingError::Money(err) => PortError::validation_field(err.to_string(), "amount"),
            err @ BillingError::InvalidTransition { .. } => PortError::conflict(err.to_string()),
            other => PortError::internal(other.to_string()),
        }
    }
}

impl BillingError {
    /// Creates a field-specific validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The error raised for a second invoice on the same (booking, cycle month)
    pub fn duplicate_invoice() -> Self {
        Self::validation("cycle_month", DUPLICATE_INVOICE_MESSAGE)
    }

    /// Maps storage errors, turning uniqueness conflicts on invoices into the
    /// duplicate-invoice validation error
    pub fn from_invoice_write(err: PortError) -> Self {
        if err.is_conflict() {
            Self::duplicate_invoice()
        } else {
            BillingError::from(err)
        }
    }

    /// Returns the offending field for validation errors
    pub fn field(&self) -> Option<&str> {
        match self {
            BillingError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns true for missing invoices, payments or bookings
    pub fn is_not_found(&self) -> bool {
        match self {
            BillingError::InvoiceNotFound(_)
            | BillingError::PaymentNotFound(_)
            | BillingError::BookingNotFound(_) => true,
            BillingError::Port(err) => err.is_not_found(),
            _ => false,
        }
    }
}
