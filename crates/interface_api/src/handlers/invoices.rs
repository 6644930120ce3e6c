//! Invoice handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{Actor, BookingId, InvoiceId};

use crate::dto::invoices::*;
use crate::{error::ApiError, AppState};

/// Creates an invoice for a confirmed booking
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), ApiError> {
    request.validate()?;
    let invoice = state
        .billing
        .create_invoice(request.into(), &actor, state.billing.today())
        .await?;
    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// Lists a booking's invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<InvoiceResponse>>, ApiError> {
    let invoices = state
        .billing
        .list_invoices(BookingId::from_uuid(query.booking_id))
        .await?;
    Ok(Json(invoices.into_iter().map(Into::into).collect()))
}

/// Gets an invoice with its expense lines
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceDetailResponse>, ApiError> {
    let detail = state.billing.get_invoice(InvoiceId::from_uuid(id)).await?;
    Ok(Json(detail.into()))
}

/// Opens a draft invoice
pub async fn open_invoice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice = state.billing.open_invoice(InvoiceId::from_uuid(id), &actor).await?;
    Ok(Json(invoice.into()))
}
