//! Invoice DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{BookingId, Currency, Money};
use domain_billing::{Invoice, InvoiceExpense, InvoiceStatus, InvoiceWithExpenses, NewInvoice};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub booking_id: Uuid,
    /// Any day in the billing month
    pub cycle_month: Option<NaiveDate>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub currency: Currency,
    #[validate(custom(function = "super::non_negative"))]
    pub amount: Decimal,
    #[validate(custom(function = "super::non_negative"))]
    pub tax_amount: Option<Decimal>,
    #[validate(custom(function = "super::non_negative"))]
    pub discount_amount: Option<Decimal>,
    pub status: Option<InvoiceStatus>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl From<CreateInvoiceRequest> for NewInvoice {
    fn from(req: CreateInvoiceRequest) -> Self {
        let currency = req.currency;
        let mut new = NewInvoice::new(
            BookingId::from_uuid(req.booking_id),
            req.issue_date,
            req.due_date,
            Money::new(req.amount, currency),
        );
        new.cycle_month = req.cycle_month;
        if let Some(tax) = req.tax_amount {
            new = new.with_tax(Money::new(tax, currency));
        }
        if let Some(discount) = req.discount_amount {
            new = new.with_discount(Money::new(discount, currency));
        }
        if let Some(status) = req.status {
            new = new.with_status(status);
        }
        if let Some(notes) = req.notes {
            new = new.with_notes(notes);
        }
        if let Some(metadata) = req.metadata {
            new.metadata = metadata;
        }
        new
    }
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub cycle_month: NaiveDate,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub balance_due: Decimal,
    pub status: InvoiceStatus,
    pub notes: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id.into(),
            booking_id: invoice.booking_id.into(),
            cycle_month: invoice.cycle_month,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            currency: invoice.currency.code().to_string(),
            amount: invoice.amount.amount(),
            tax_amount: invoice.tax_amount.amount(),
            discount_amount: invoice.discount_amount.amount(),
            total_amount: invoice.total_amount.amount(),
            balance_due: invoice.balance_due.amount(),
            status: invoice.status,
            notes: invoice.notes,
            metadata: invoice.metadata,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    pub id: Uuid,
    pub label: String,
    pub amount: Decimal,
    pub taxable: bool,
    pub tax_rate: Option<Decimal>,
    pub notes: String,
}

impl From<InvoiceExpense> for ExpenseResponse {
    fn from(expense: InvoiceExpense) -> Self {
        Self {
            id: expense.id.into(),
            label: expense.label,
            amount: expense.amount.amount(),
            taxable: expense.taxable,
            tax_rate: expense.tax_rate,
            notes: expense.notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetailResponse {
    #[serde(flatten)]
    pub invoice: InvoiceResponse,
    pub expenses: Vec<ExpenseResponse>,
}

impl From<InvoiceWithExpenses> for InvoiceDetailResponse {
    fn from(detail: InvoiceWithExpenses) -> Self {
        Self {
            invoice: detail.invoice.into(),
            expenses: detail.expenses.into_iter().map(Into::into).collect(),
        }
    }
}
