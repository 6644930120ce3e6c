//! Subscription handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use validator::Validate;

use core_kernel::Actor;
use domain_subscription::{
    CurrentSubscription, FeatureKey, Limit, LimitKey, PlanSelector, Quote, Subscription,
    SubscriptionPlan,
};

use crate::dto::subscription::*;
use crate::{error::ApiError, AppState};

/// The caller's current subscription with its plan
pub async fn current_subscription(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<CurrentSubscription>, ApiError> {
    let current = state.subscriptions.current_subscription(&actor, Utc::now()).await?;
    Ok(Json(current))
}

/// Active plans, cheapest first
pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<SubscriptionPlan>>, ApiError> {
    Ok(Json(state.subscriptions.list_plans().await?))
}

pub async fn check_feature(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(key): Path<String>,
) -> Result<Json<FeatureCheckResponse>, ApiError> {
    let key: FeatureKey = key.parse()?;
    let enabled = state.subscriptions.has_feature(&actor, key, Utc::now()).await?;
    Ok(Json(FeatureCheckResponse { key, enabled }))
}

/// The limit for `key` and whether one more item fits after `used`
pub async fn check_limit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(key): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<LimitCheckResponse>, ApiError> {
    let key: LimitKey = key.parse()?;
    let limit = state
        .subscriptions
        .get_limit(&actor, key, Limit::Unlimited, Utc::now())
        .await?;
    Ok(Json(LimitCheckResponse {
        key,
        limit,
        used: query.used,
        allowed: !limit.is_reached_by(query.used),
    }))
}

pub async fn change_plan(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<ChangePlanBody>,
) -> Result<Json<Subscription>, ApiError> {
    body.validate()?;
    let request = body
        .into_request()
        .ok_or_else(|| ApiError::validation("plan", "Either plan or plan_id is required."))?;
    let subscription = state.subscriptions.change_plan(&actor, request, Utc::now()).await?;
    Ok(Json(subscription))
}

pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<Quote>, ApiError> {
    let quote = state
        .subscriptions
        .quote(&PlanSelector::Slug(query.plan), &query.interval, Utc::now())
        .await?;
    Ok(Json(quote))
}
