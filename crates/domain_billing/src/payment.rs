//! Payments and invoice balance reconciliation
//!
//! A payment may be attached to an invoice. Creating, changing or deleting a
//! payment produces [`BalanceAdjustment`]s that the store applies to the
//! affected invoices inside the same transaction as the payment write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Actor, InvoiceId, Money, PaymentId, UserId};

use crate::error::BillingError;
use crate::invoice::Invoice;

core_kernel::string_enum! {
    /// How a payment was received
    pub enum PaymentMethod {
        Cash => "cash",
        Upi => "upi",
        Card => "card",
        Bank => "bank",
        Other => "other",
    }
}

/// Caller-supplied payment fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub invoice_id: Option<InvoiceId>,
    pub amount: Money,
    pub method: Option<PaymentMethod>,
    pub reference: String,
    pub received_at: DateTime<Utc>,
    pub notes: String,
}

impl PaymentDraft {
    pub fn new(amount: Money) -> Self {
        Self {
            invoice_id: None,
            amount,
            method: None,
            reference: String::new(),
            received_at: Utc::now(),
            notes: String::new(),
        }
    }

    pub fn for_invoice(mut self, invoice_id: InvoiceId) -> Self {
        self.invoice_id = Some(invoice_id);
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    /// Payments must carry a positive amount in whole minor units
    pub fn validate(&self) -> Result<(), BillingError> {
        if !self.amount.is_positive() {
            return Err(BillingError::validation(
                "amount",
                "Payment amount must be greater than zero.",
            ));
        }
        if !self.amount.fits_currency_scale() {
            return Err(BillingError::validation(
                "amount",
                format!(
                    "Amount cannot have more than {} decimal places.",
                    self.amount.currency().decimal_places()
                ),
            ));
        }
        Ok(())
    }
}

/// A recorded payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: Option<InvoiceId>,
    pub amount: Money,
    pub method: Option<PaymentMethod>,
    pub reference: String,
    pub received_at: DateTime<Utc>,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Builds a new payment from a validated draft
    pub fn create(draft: PaymentDraft, actor: &Actor) -> Result<Self, BillingError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: PaymentId::new_v7(),
            invoice_id: draft.invoice_id,
            amount: draft.amount,
            method: draft.method,
            reference: draft.reference,
            received_at: draft.received_at,
            notes: draft.notes,
            created_by: actor.user_id,
            updated_by: actor.user_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns a copy carrying the draft's fields, as an update would store it
    pub fn revised(&self, draft: PaymentDraft, actor: &Actor) -> Result<Self, BillingError> {
        draft.validate()?;
        Ok(Self {
            invoice_id: draft.invoice_id,
            amount: draft.amount,
            method: draft.method,
            reference: draft.reference,
            received_at: draft.received_at,
            notes: draft.notes,
            updated_by: actor.user_id.or(self.updated_by),
            updated_at: Utc::now(),
            ..self.clone()
        })
    }
}

/// A change to one invoice's balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceAdjustment {
    /// A new payment, applied through [`Invoice::apply_payment_amount`]
    Apply { invoice_id: InvoiceId, amount: Money },
    /// A signed change, applied through [`Invoice::adjust_payment_delta`]
    Delta { invoice_id: InvoiceId, delta: Money },
}

impl BalanceAdjustment {
    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            BalanceAdjustment::Apply { invoice_id, .. } | BalanceAdjustment::Delta { invoice_id, .. } => {
                *invoice_id
            }
        }
    }

    fn money(&self) -> &Money {
        match self {
            BalanceAdjustment::Apply { amount, .. } => amount,
            BalanceAdjustment::Delta { delta, .. } => delta,
        }
    }

    /// Applies the adjustment to `invoice`
    ///
    /// The payment must be in the invoice's currency.
    pub fn apply_to(&self, invoice: &mut Invoice, actor: &Actor) -> Result<(), BillingError> {
        if self.money().currency() != invoice.currency {
            return Err(BillingError::validation(
                "currency",
                format!(
                    "Payment currency must match the invoice currency ({}).",
                    invoice.currency
                ),
            ));
        }
        match self {
            BalanceAdjustment::Apply { amount, .. } => invoice.apply_payment_amount(amount)?,
            BalanceAdjustment::Delta { delta, .. } => invoice.adjust_payment_delta(delta)?,
        }
        invoice.touch(actor);
        Ok(())
    }
}

/// Works out the balance changes implied by a payment write
///
/// `previous` is the stored payment before the write (`None` on create) and
/// `next` the payment after it (`None` on delete).
pub fn reconcile(
    previous: Option<&Payment>,
    next: Option<&Payment>,
) -> Result<Vec<BalanceAdjustment>, BillingError> {
    let old = previous.and_then(|p| p.invoice_id.map(|id| (id, p.amount)));
    let new = next.and_then(|p| p.invoice_id.map(|id| (id, p.amount)));

    let adjustments = match (previous.is_some(), old, new) {
        (false, _, Some((invoice_id, amount))) => vec![BalanceAdjustment::Apply { invoice_id, amount }],
        (true, None, Some((invoice_id, amount))) => vec![BalanceAdjustment::Apply { invoice_id, amount }],
        (true, Some((old_id, old_amount)), Some((new_id, new_amount))) if old_id == new_id => {
            let delta = new_amount.checked_sub(&old_amount)?;
            if delta.is_zero() {
                Vec::new()
            } else {
                vec![BalanceAdjustment::Delta { invoice_id: new_id, delta }]
            }
        }
        (true, Some((old_id, old_amount)), Some((new_id, new_amount))) => vec![
            BalanceAdjustment::Delta {
                invoice_id: old_id,
                delta: -old_amount,
            },
            BalanceAdjustment::Delta {
                invoice_id: new_id,
                delta: new_amount,
            },
        ],
        (true, Some((invoice_id, amount)), None) => vec![BalanceAdjustment::Delta {
            invoice_id,
            delta: -amount,
        }],
        _ => Vec::new(),
    };
    Ok(adjustments)
}

/// Applies adjustments to a set of locked invoices
///
/// Every adjustment's invoice must be present in `invoices`.
pub fn apply_adjustments(
    adjustments: &[BalanceAdjustment],
    invoices: &mut [Invoice],
    actor: &Actor,
) -> Result<(), BillingError> {
    for adjustment in adjustments {
        let invoice = invoices
            .iter_mut()
            .find(|inv| inv.id == adjustment.invoice_id())
            .ok_or_else(|| BillingError::InvoiceNotFound(adjustment.invoice_id().to_string()))?;
        adjustment.apply_to(invoice, actor)?;
    }
    Ok(())
}

/// Invoice ids touched by `adjustments`, sorted and deduplicated so rows are
/// always locked in the same order
pub fn lock_order(adjustments: &[BalanceAdjustment]) -> Vec<InvoiceId> {
    let mut ids: Vec<InvoiceId> = adjustments.iter().map(BalanceAdjustment::invoice_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// A payment write as executed by the store
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentWrite {
    Create(PaymentDraft),
    Update { id: PaymentId, draft: PaymentDraft },
    Delete(PaymentId),
}

impl PaymentWrite {
    /// Id of the stored payment this write reads first, if any
    pub fn target(&self) -> Option<PaymentId> {
        match self {
            PaymentWrite::Create(_) => None,
            PaymentWrite::Update { id, .. } | PaymentWrite::Delete(id) => Some(*id),
        }
    }

    /// Produces the payment to store and the balance changes it implies
    ///
    /// `previous` is the locked current row for updates and deletes.
    pub fn resolve(
        self,
        previous: Option<&Payment>,
        actor: &Actor,
    ) -> Result<(Option<Payment>, Vec<BalanceAdjustment>), BillingError> {
        let next = match (self, previous) {
            (PaymentWrite::Create(draft), _) => Some(Payment::create(draft, actor)?),
            (PaymentWrite::Update { draft, .. }, Some(prev)) => Some(prev.revised(draft, actor)?),
            (PaymentWrite::Delete(_), Some(_)) => None,
            (PaymentWrite::Update { id, .. }, None) | (PaymentWrite::Delete(id), None) => {
                return Err(BillingError::PaymentNotFound(id.to_string()))
            }
        };
        let adjustments = reconcile(previous, next.as_ref())?;
        Ok((next, adjustments))
    }
}

/// Result of a payment write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    /// The stored payment; `None` after a delete
    pub payment: Option<Payment>,
    /// Invoices whose balance changed, after the change
    pub invoices: Vec<Invoice>,
}
