//! Monthly billing windows
//!
//! A window is the half-open span `[start, end)` an invoice covers, plus the
//! date on which the engine should generate it.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use core_kernel::OwnerId;
//! use domain_billing::period::monthly_period_window;
//! use domain_billing::settings::{InvoiceSettings, MonthlyCycle};
//!
//! let mut settings = InvoiceSettings::default_for(OwnerId::new(), None);
//! settings.monthly_cycle = MonthlyCycle::CalendarMonth;
//!
//! let reference = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();
//! let window = monthly_period_window(&settings, reference, None).unwrap();
//! assert_eq!(window.start, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
//! assert_eq!(window.end, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use core_kernel::temporal::{add_months, clamp_day, first_of_month};
use core_kernel::TemporalError;

use crate::booking::{checkin_anchor, BookingSnapshot};
use crate::settings::{GenerateOn, InvoiceSettings, MonthlyCycle};

/// A billing window and its generation date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Date on which the invoice for this window is generated
    pub generate_on: NaiveDate,
}

impl PeriodWindow {
    /// Cycle month (first of the start month) an invoice for this window uses
    pub fn cycle_month(&self) -> NaiveDate {
        first_of_month(self.start)
    }

    /// Human-readable span, e.g. `31 Jan 2025 – 28 Feb 2025`
    pub fn label(&self) -> String {
        format!("{} – {}", self.start.format("%d %b %Y"), self.end.format("%d %b %Y"))
    }
}

/// Computes the monthly window containing `reference`
///
/// * custom day: the configured day clamped into the reference month, to the
///   same day one month later
/// * check-in date (needs `booking.start_date`): the booking's anchor day
///   clamped into the reference month, to one month later
/// * otherwise the calendar month
pub fn monthly_period_window(
    settings: &InvoiceSettings,
    reference: NaiveDate,
    booking: Option<&BookingSnapshot>,
) -> Result<PeriodWindow, TemporalError> {
    let start_date = booking.and_then(|b| b.start_date);

    let (start, end) = match (settings.monthly_cycle, settings.monthly_custom_day, start_date) {
        (MonthlyCycle::CustomDay, Some(day), _) => {
            let start = clamp_day(reference.year(), reference.month(), day)?;
            (start, add_months(start, 1)?)
        }
        (MonthlyCycle::CheckinDate, _, Some(checkin)) => {
            let anchor = checkin_anchor(checkin)?;
            let start = clamp_day(reference.year(), reference.month(), anchor.day())?;
            (start, add_months(start, 1)?)
        }
        _ => {
            let start = first_of_month(reference);
            (start, add_months(start, 1)?)
        }
    };

    let generate_on = match settings.generate_on {
        GenerateOn::Start => start,
        GenerateOn::End => end,
    };

    Ok(PeriodWindow {
        start,
        end,
        generate_on,
    })
}
