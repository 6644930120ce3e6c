//! Payment DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{Currency, InvoiceId, Money};
use domain_billing::{Payment, PaymentDraft, PaymentMethod, PaymentOutcome};

use super::invoices::InvoiceResponse;

/// Body for recording or replacing a payment
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequest {
    pub invoice_id: Option<Uuid>,
    #[validate(custom(function = "super::positive"))]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Currency,
    pub method: Option<PaymentMethod>,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub reference: String,
    pub received_at: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub notes: String,
}

impl From<PaymentRequest> for PaymentDraft {
    fn from(req: PaymentRequest) -> Self {
        let mut draft = PaymentDraft::new(Money::new(req.amount, req.currency)).with_reference(req.reference);
        draft.invoice_id = req.invoice_id.map(InvoiceId::from_uuid);
        draft.method = req.method;
        draft.notes = req.notes;
        if let Some(received_at) = req.received_at {
            draft.received_at = received_at;
        }
        draft
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub method: Option<PaymentMethod>,
    pub reference: String,
    pub received_at: DateTime<Utc>,
    pub notes: String,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id.into(),
            invoice_id: payment.invoice_id.map(Into::into),
            amount: payment.amount.amount(),
            currency: payment.amount.currency().code().to_string(),
            method: payment.method,
            reference: payment.reference,
            received_at: payment.received_at,
            notes: payment.notes,
        }
    }
}

/// The written payment (absent after a delete) and every invoice whose
/// balance changed
#[derive(Debug, Serialize)]
pub struct PaymentOutcomeResponse {
    pub payment: Option<PaymentResponse>,
    pub invoices: Vec<InvoiceResponse>,
}

impl From<PaymentOutcome> for PaymentOutcomeResponse {
    fn from(outcome: PaymentOutcome) -> Self {
        Self {
            payment: outcome.payment.map(Into::into),
            invoices: outcome.invoices.into_iter().map(Into::into).collect(),
        }
    }
}
