//! Booking-facing handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use core_kernel::{Actor, BookingId};
use domain_billing::{BookingTransition, TriggerOutcome};

use crate::dto::bookings::*;
use crate::{error::ApiError, AppState};

/// Months the booking can still be invoiced for
pub async fn cycle_months(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CycleMonthsQuery>,
) -> Result<Json<CycleMonthsResponse>, ApiError> {
    let months = state
        .billing
        .cycle_month_options(
            BookingId::from_uuid(id),
            query.include_existing,
            query.until,
            state.billing.today(),
        )
        .await?;
    Ok(Json(CycleMonthsResponse { booking_id: id, months }))
}

/// Runs the billing triggers for a booking write
///
/// The booking is read back from storage so the triggers see its saved
/// state. Trigger failures are reported in the outcome, not as an error.
pub async fn booking_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<BookingEventRequest>,
) -> Result<Json<TriggerOutcome>, ApiError> {
    let booking = state
        .billing
        .load_booking(BookingId::from_uuid(request.booking_id))
        .await?;
    let transition = match request.previous_status {
        Some(previous) => BookingTransition::changed(booking, previous),
        None => BookingTransition::created(booking),
    };

    let outcome = state
        .billing
        .handle_booking_transition(&transition, &actor, state.billing.today())
        .await;
    Ok(Json(outcome))
}
