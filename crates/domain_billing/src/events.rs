//! Domain events for billing
//!
//! Services return the events their operations produced and hand them to
//! an [`EventDispatcher`]. Subscribers receive events in registration order;
//! a failing subscriber is logged and skipped without affecting the others
//! or the operation that raised the event.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{BookingId, InvoiceId, PaymentId};

use crate::invoice::InvoiceStatus;

core_kernel::string_enum! {
    /// What caused an invoice to be created
    pub enum InvoiceTrigger {
        Manual => "manual",
        BookingConfirmed => "booking_confirmed",
        Recurring => "recurring",
    }
}

/// Events emitted by the billing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BillingEvent {
    InvoiceCreated {
        invoice_id: InvoiceId,
        booking_id: BookingId,
        cycle_month: NaiveDate,
        total_amount: Decimal,
        trigger: InvoiceTrigger,
        timestamp: DateTime<Utc>,
    },

    InvoiceOpened {
        invoice_id: InvoiceId,
        timestamp: DateTime<Utc>,
    },

    /// First invoice postponed until the window's generation date
    FirstInvoiceDeferred {
        booking_id: BookingId,
        generate_on: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    /// A payment write changed an invoice balance
    InvoiceBalanceChanged {
        invoice_id: InvoiceId,
        payment_id: PaymentId,
        balance_due: Decimal,
        status: InvoiceStatus,
        timestamp: DateTime<Utc>,
    },

    InvoicesVoided {
        booking_id: BookingId,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    InvoicesMarkedOverdue {
        count: usize,
        as_of: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    MonthlyGenerationCompleted {
        created: usize,
        failed: usize,
        as_of: NaiveDate,
        timestamp: DateTime<Utc>,
    },
}

impl BillingEvent {
    /// Returns the event timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            BillingEvent::InvoiceCreated { timestamp, .. }
            | BillingEvent::InvoiceOpened { timestamp, .. }
            | BillingEvent::FirstInvoiceDeferred { timestamp, .. }
            | BillingEvent::InvoiceBalanceChanged { timestamp, .. }
            | BillingEvent::InvoicesVoided { timestamp, .. }
            | BillingEvent::InvoicesMarkedOverdue { timestamp, .. }
            | BillingEvent::MonthlyGenerationCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a dotted event name for logs and integrations
    pub fn event_type(&self) -> &'static str {
        match self {
            BillingEvent::InvoiceCreated { .. } => "invoice.created",
            BillingEvent::InvoiceOpened { .. } => "invoice.opened",
            BillingEvent::FirstInvoiceDeferred { .. } => "invoice.first_deferred",
            BillingEvent::InvoiceBalanceChanged { .. } => "invoice.balance_changed",
            BillingEvent::InvoicesVoided { .. } => "invoices.voided",
            BillingEvent::InvoicesMarkedOverdue { .. } => "invoices.marked_overdue",
            BillingEvent::MonthlyGenerationCompleted { .. } => "invoices.monthly_generation_completed",
        }
    }
}

/// Error type returned by subscribers
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Receives billing events
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Handles one event
    async fn handle(&self, event: &BillingEvent) -> Result<(), SubscriberError>;
}

/// Delivery summary for one dispatch call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers events to subscribers in registration order
#[derive(Clone, Default)]
pub struct EventDispatcher {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscribers.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber after the existing ones
    pub fn subscribe(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Delivers each event to every subscriber
    pub async fn dispatch(&self, events: &[BillingEvent]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in events {
            for subscriber in &self.subscribers {
                match subscriber.handle(event).await {
                    Ok(()) => report.delivered += 1,
                    Err(err) => {
                        report.failed += 1;
                        warn!(
                            subscriber = subscriber.name(),
                            event_type = event.event_type(),
                            error = %err,
                            "Billing event subscriber failed"
                        );
                    }
                }
            }
        }
        report
    }
}

/// Writes every event to the log
#[derive(Debug, Default)]
pub struct LoggingSubscriber;

#[async_trait]
impl EventSubscriber for LoggingSubscriber {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, event: &BillingEvent) -> Result<(), SubscriberError> {
        info!(event_type = event.event_type(), at = %event.timestamp(), ?event, "Billing event");
        Ok(())
    }
}
