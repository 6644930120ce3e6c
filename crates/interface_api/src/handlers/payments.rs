//! Payment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{Actor, PaymentId};

use crate::dto::payments::*;
use crate::{error::ApiError, AppState};

/// Records a payment and applies it to its invoice
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentOutcomeResponse>), ApiError> {
    request.validate()?;
    let outcome = state.billing.record_payment(request.into(), &actor).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Replaces a payment, moving its amount between invoices as needed
pub async fn update_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentOutcomeResponse>, ApiError> {
    request.validate()?;
    let outcome = state
        .billing
        .update_payment(PaymentId::from_uuid(id), request.into(), &actor)
        .await?;
    Ok(Json(outcome.into()))
}

/// Deletes a payment and restores its invoice balance
pub async fn delete_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentOutcomeResponse>, ApiError> {
    let outcome = state.billing.delete_payment(PaymentId::from_uuid(id), &actor).await?;
    Ok(Json(outcome.into()))
}
