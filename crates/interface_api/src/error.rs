//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use core_kernel::{CoreError, PortError};
use domain_billing::BillingError;
use domain_subscription::SubscriptionError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, field) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized".to_string(), None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None),
            ApiError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error", msg, None),
            ApiError::Validation { message, field } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message, field)
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            field,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            PortError::Validation { message, field } => ApiError::Validation { message, field },
            PortError::Conflict { message } => ApiError::Conflict(message),
            PortError::Connection { .. } | PortError::Timeout { .. } => ApiError::Database(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthorized(msg) => ApiError::Forbidden(msg),
            CoreError::Validation(msg) => ApiError::Validation { message: msg, field: None },
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation { field, message } => ApiError::Validation {
                message,
                field: Some(field),
            },
            BillingError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            BillingError::InvoiceNotFound(_)
            | BillingError::PaymentNotFound(_)
            | BillingError::BookingNotFound(_) => ApiError::NotFound(err.to_string()),
            BillingError::Money(_) | BillingError::Temporal(_) => ApiError::BadRequest(err.to_string()),
            BillingError::Core(core) => core.into(),
            BillingError::Port(port) => port.into(),
        }
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Validation { field, message } => ApiError::Validation {
                message,
                field: Some(field),
            },
            SubscriptionError::IntervalUnavailable { .. } => ApiError::validation("interval", err.to_string()),
            SubscriptionError::FeatureNotIncluded { .. }
            | SubscriptionError::LimitReached { .. }
            | SubscriptionError::PlanLimitExceeded { .. }
            | SubscriptionError::Inactive
            | SubscriptionError::Expired => ApiError::Forbidden(err.to_string()),
            SubscriptionError::NotPermitted(msg) => ApiError::Forbidden(msg.to_string()),
            SubscriptionError::NoSubscription
            | SubscriptionError::NoActivePlans
            | SubscriptionError::PlanNotFound(_) => ApiError::NotFound(err.to_string()),
            SubscriptionError::Money(_) | SubscriptionError::Temporal(_) => ApiError::BadRequest(err.to_string()),
            SubscriptionError::Core(core) => core.into(),
            SubscriptionError::Port(port) => port.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let first = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                (field.to_string(), message)
            });

        match first {
            Some((field, message)) => ApiError::Validation {
                message,
                field: Some(field),
            },
            None => ApiError::Validation {
                message: errors.to_string(),
                field: None,
            },
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_billing::InvoiceStatus;
    use domain_subscription::LimitKey;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_billing_validation_keeps_field() {
        let err: ApiError = BillingError::duplicate_invoice().into();
        match err {
            ApiError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("cycle_month")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(BillingError::InvoiceNotFound("x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                BillingError::InvalidTransition {
                    from: InvoiceStatus::Paid,
                    action: "open",
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                SubscriptionError::LimitReached {
                    key: LimitKey::MaxBuildings,
                    used: 1,
                    limit: 1,
                }
                .into()
            ),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(PortError::conflict("duplicate").into()),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
    }
}
