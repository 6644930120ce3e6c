//! Custom Test Assertions
//!
//! Assertion helpers for money and invoices that print the values involved
//! instead of a bare `assertion failed`.

use rust_decimal::Decimal;

use core_kernel::Money;
use domain_billing::{BillingError, Invoice, InvoiceStatus};

/// Asserts currency and amount match
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "Amount mismatch: actual={}, expected={}",
        actual,
        expected
    );
}

pub fn assert_money_zero(money: &Money) {
    assert!(
        money.is_zero(),
        "Expected zero money, got {} {}",
        money.currency().symbol(),
        money.amount()
    );
}

/// Asserts `total = amount + tax - discount` and `0 <= balance <= total`
pub fn assert_invoice_consistent(invoice: &Invoice) {
    let expected_total =
        invoice.amount.amount() + invoice.tax_amount.amount() - invoice.discount_amount.amount();
    assert_eq!(
        invoice.total_amount.amount(),
        expected_total,
        "Invoice {} total {} != amount {} + tax {} - discount {}",
        invoice.id,
        invoice.total_amount,
        invoice.amount,
        invoice.tax_amount,
        invoice.discount_amount
    );
    assert!(
        invoice.balance_due.amount() >= Decimal::ZERO,
        "Invoice {} has negative balance {}",
        invoice.id,
        invoice.balance_due
    );
    assert!(
        invoice.balance_due.amount() <= invoice.total_amount.amount(),
        "Invoice {} balance {} exceeds total {}",
        invoice.id,
        invoice.balance_due,
        invoice.total_amount
    );
}

/// Asserts status and remaining balance together
pub fn assert_invoice_state(invoice: &Invoice, status: InvoiceStatus, balance: Decimal) {
    assert_eq!(
        invoice.status, status,
        "Invoice {} status: actual={}, expected={}",
        invoice.id, invoice.status, status
    );
    assert_eq!(
        invoice.balance_due.amount(),
        balance,
        "Invoice {} balance: actual={}, expected={}",
        invoice.id,
        invoice.balance_due.amount(),
        balance
    );
}

/// Asserts a paid invoice has nothing left to collect, and vice versa
pub fn assert_paid_iff_settled(invoice: &Invoice) {
    if invoice.status == InvoiceStatus::Paid {
        assert!(invoice.balance_due.is_zero(), "Paid invoice {} has balance {}", invoice.id, invoice.balance_due);
    }
    if invoice.balance_due.is_zero() && invoice.status != InvoiceStatus::Void {
        assert_eq!(invoice.status, InvoiceStatus::Paid, "Settled invoice {} is {}", invoice.id, invoice.status);
    }
}

/// Asserts the error is a validation failure on `field`
pub fn assert_validation_on<T: std::fmt::Debug>(result: Result<T, BillingError>, field: &str) {
    match result {
        Err(BillingError::Validation { field: actual, message }) => assert_eq!(
            actual, field,
            "Validation failed on '{}' ({}), expected '{}'",
            actual, message, field
        ),
        other => panic!("Expected validation error on '{}', got {:?}", field, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::InvoiceBuilder;
    use rust_decimal_macros::dec;

    #[test]
    fn test_consistent_invoice_passes() {
        let invoice = InvoiceBuilder::new().with_total(dec!(1000)).with_balance(dec!(250)).build();
        assert_invoice_consistent(&invoice);
        assert_invoice_state(&invoice, InvoiceStatus::Open, dec!(250));
    }

    #[test]
    #[should_panic(expected = "exceeds total")]
    fn test_overfull_balance_fails() {
        let invoice = InvoiceBuilder::new().with_total(dec!(1000)).with_balance(dec!(1500)).build();
        assert_invoice_consistent(&invoice);
    }

    #[test]
    #[should_panic(expected = "Settled invoice")]
    fn test_zero_balance_open_invoice_fails() {
        let invoice = InvoiceBuilder::new().with_total(dec!(1000)).with_balance(dec!(0)).build();
        assert_paid_iff_settled(&invoice);
    }

    #[test]
    fn test_validation_field_match() {
        let result: Result<(), BillingError> = Err(BillingError::validation("due_date", "bad"));
        assert_validation_on(result, "due_date");
    }
}
