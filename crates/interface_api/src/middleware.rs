//! API middleware

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{info, warn};

use core_kernel::Actor;

use crate::AppState;

/// Authentication middleware
///
/// Validates the bearer token and stores the resulting [`Actor`] in the
/// request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|header| header.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            warn!("Missing or invalid Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let claims = crate::auth::validate_token(token, &state.config.jwt_secret).map_err(|e| {
        warn!(error = %e, "Token validation failed");
        StatusCode::UNAUTHORIZED
    })?;
    let actor = claims.actor().map_err(|e| {
        warn!(error = %e, "Token claims rejected");
        StatusCode::UNAUTHORIZED
    })?;

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

/// Audit logging middleware
///
/// Logs every API request with the acting user and role
pub async fn audit_middleware(
    State(_state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let (user_id, role) = request
        .extensions()
        .get::<Actor>()
        .map(|actor| {
            (
                actor.user_id.map_or_else(|| "system".to_string(), |id| id.to_string()),
                actor.role.as_str(),
            )
        })
        .unwrap_or_else(|| ("anonymous".to_string(), "none"));

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        user = %user_id,
        role,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}
