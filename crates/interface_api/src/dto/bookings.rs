//! Booking lifecycle and cycle-month DTOs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_billing::BookingStatus;

#[derive(Debug, Deserialize)]
pub struct CycleMonthsQuery {
    #[serde(default)]
    pub include_existing: bool,
    pub until: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CycleMonthsResponse {
    pub booking_id: Uuid,
    pub months: Vec<NaiveDate>,
}

/// A booking write reported by the booking service
///
/// `previous_status` is absent for a newly created booking.
#[derive(Debug, Deserialize)]
pub struct BookingEventRequest {
    pub booking_id: Uuid,
    pub previous_status: Option<BookingStatus>,
}

#[derive(Debug, Serialize)]
pub struct JobRunResponse {
    pub job: &'static str,
    pub run_date: NaiveDate,
    pub affected: u64,
}
