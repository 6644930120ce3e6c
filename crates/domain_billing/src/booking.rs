//! Read-only view of bookings
//!
//! Bookings are owned by the tenant/stay module. Billing only reads a
//! snapshot of the fields it needs and reacts to status transitions.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::temporal::last_day_of_month;
use core_kernel::{BookingId, BuildingId, Currency, Money, OwnerId, TemporalError, Timezone};

core_kernel::string_enum! {
    /// Booking lifecycle status
    pub enum BookingStatus {
        Reserved => "reserved",
        Pending => "pending",
        Confirmed => "confirmed",
        Canceled => "canceled",
        Converted => "converted",
        CheckedOut => "checked_out",
    }
}

/// Snapshot of a booking as seen by the billing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSnapshot {
    pub id: BookingId,
    pub status: BookingStatus,
    /// Check-in date
    pub start_date: Option<NaiveDate>,
    /// Check-out date
    pub end_date: Option<NaiveDate>,
    /// Confirmation timestamp
    pub booked_at: Option<DateTime<Utc>>,
    pub monthly_rent: Money,
    pub security_deposit: Money,
    pub discount_amount: Money,
    pub maintenance_amount: Money,
    pub building_id: Option<BuildingId>,
    /// Owner of the building the booking belongs to
    pub owner_id: Option<OwnerId>,
}

impl BookingSnapshot {
    /// Currency the booking is priced in
    pub fn currency(&self) -> Currency {
        self.monthly_rent.currency()
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }

    /// Returns true when the stay covers `date`
    ///
    /// Open-ended bounds count as covering.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| start <= date)
            && self.end_date.map_or(true, |end| end >= date)
    }

    /// Check-in anchor date, see [`checkin_anchor`]
    pub fn checkin_anchor(&self) -> Result<Option<NaiveDate>, TemporalError> {
        self.start_date.map(checkin_anchor).transpose()
    }

    /// Local date the booking was confirmed on
    pub fn booked_on(&self, tz: &Timezone) -> Option<NaiveDate> {
        self.booked_at.map(|at| tz.local_date(at))
    }
}

/// Derives the anchor date for check-in aligned billing
///
/// A check-in on the 1st, or on/after the last day of its month, anchors to
/// the month's last day. Any other check-in anchors to itself.
pub fn checkin_anchor(start_date: NaiveDate) -> Result<NaiveDate, TemporalError> {
    let last = last_day_of_month(start_date.year(), start_date.month())?;
    if start_date.day() == 1 || start_date.day() >= last {
        start_date.with_day(last).ok_or(TemporalError::InvalidDate {
            year: start_date.year(),
            month: start_date.month(),
            day: last,
        })
    } else {
        Ok(start_date)
    }
}

/// A booking lifecycle change delivered to the billing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingTransition {
    /// The booking after the change
    pub booking: BookingSnapshot,
    /// Status before the change; `None` when unknown or newly created
    pub previous_status: Option<BookingStatus>,
    /// True when the booking was created by this change
    pub created: bool,
}

impl BookingTransition {
    /// A booking created directly in its current status
    pub fn created(booking: BookingSnapshot) -> Self {
        Self {
            booking,
            previous_status: None,
            created: true,
        }
    }

    /// An existing booking moving from `previous` to its current status
    pub fn changed(booking: BookingSnapshot, previous: BookingStatus) -> Self {
        Self {
            booking,
            previous_status: Some(previous),
            created: false,
        }
    }

    /// The booking became confirmed with this change
    pub fn is_confirmation(&self) -> bool {
        self.booking.status == BookingStatus::Confirmed
            && (self.created
                || self
                    .previous_status
                    .is_some_and(|prev| prev != BookingStatus::Confirmed))
    }

    /// An existing booking moved into canceled
    pub fn is_cancellation(&self) -> bool {
        self.booking.status == BookingStatus::Canceled
            && !self.created
            && self
                .previous_status
                .is_some_and(|prev| prev != BookingStatus::Canceled)
    }
}
