//! Invoice settings handlers

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use validator::Validate;

use core_kernel::{Actor, BuildingId};

use crate::dto::settings::*;
use crate::{error::ApiError, AppState};

/// Settings in force for the caller's account, optionally for one building
pub async fn current_settings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<CurrentSettingsQuery>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let resolved = state
        .billing
        .current_settings(&actor, query.building_id.map(BuildingId::from_uuid))
        .await?;
    Ok(Json(resolved.into()))
}

/// Creates or replaces the caller's settings row
pub async fn upsert_settings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<UpsertSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    request.validate()?;
    let settings = state.billing.upsert_settings(&actor, request.into()).await?;
    Ok(Json(settings.into()))
}
