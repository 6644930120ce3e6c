//! Request and response bodies

pub mod invoices;
pub mod payments;
pub mod settings;
pub mod bookings;
pub mod subscription;

use rust_decimal::Decimal;
use validator::ValidationError;

pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Must not be negative.".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("positive");
        err.message = Some("Must be greater than zero.".into());
        return Err(err);
    }
    Ok(())
}
