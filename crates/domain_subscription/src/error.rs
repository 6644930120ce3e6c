//! Subscription domain errors

use thiserror::Error;

use core_kernel::{CoreError, MoneyError, PortError, TemporalError};

use crate::plan::{FeatureKey, LimitKey};

/// Errors that can occur in the subscription domain
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Input failed validation; `field` names the offending attribute
    #[error("{message}")]
    Validation {
        field: String,
        message: String,
    },

    /// The owner's plan does not enable the feature
    #[error("Your subscription does not include '{key}'.")]
    FeatureNotIncluded { key: FeatureKey },

    /// A create operation would exceed a plan quantity
    #[error("Subscription limit reached for '{key}' (used {used} of {limit}).")]
    LimitReached {
        key: LimitKey,
        used: u64,
        limit: u64,
    },

    /// The owner already has more active buildings than the target plan allows
    #[error(
        "Your active buildings ({used}) exceed the selected plan's limit ({limit}). \
         Deactivate buildings or choose a higher plan."
    )]
    PlanLimitExceeded { used: u64, limit: u64 },

    #[error("Billing interval not available for this plan")]
    IntervalUnavailable { interval: String },

    #[error("No current subscription")]
    NoSubscription,

    #[error("Subscription inactive")]
    Inactive,

    #[error("Subscription expired")]
    Expired,

    #[error("No active plans available")]
    NoActivePlans,

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    /// The actor's role may not perform the operation
    #[error("{0}")]
    NotPermitted(&'static str),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Calendar error: {0}")]
    Temporal(#[from] TemporalError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage adapter failure
    #[error("Storage error: {0}")]
    Port(PortError),
}

impl From<PortError> for SubscriptionError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Validation {
                message,
                field: Some(field),
            } => SubscriptionError::Validation { field, message },
            other => SubscriptionError::Port(other),
        }
    }
}

impl SubscriptionError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that mean "the owner has no usable subscription"
    pub fn is_missing_subscription(&self) -> bool {
        matches!(
            self,
            SubscriptionError::NoSubscription | SubscriptionError::Inactive | SubscriptionError::Expired
        )
    }

    /// Returns true when an enforcement check refused the operation
    pub fn is_enforcement(&self) -> bool {
        matches!(
            self,
            SubscriptionError::FeatureNotIncluded { .. }
                | SubscriptionError::LimitReached { .. }
                | SubscriptionError::PlanLimitExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enforcement_messages() {
        let err = SubscriptionError::FeatureNotIncluded { key: FeatureKey::Reports };
        assert_eq!(err.to_string(), "Your subscription does not include 'reports'.");

        let err = SubscriptionError::LimitReached {
            key: LimitKey::MaxBuildings,
            used: 1,
            limit: 1,
        };
        assert_eq!(
            err.to_string(),
            "Subscription limit reached for 'max_buildings' (used 1 of 1)."
        );
        assert!(err.is_enforcement());
    }

    #[test]
    fn test_plan_limit_message() {
        let err = SubscriptionError::PlanLimitExceeded { used: 3, limit: 1 };
        assert_eq!(
            err.to_string(),
            "Your active buildings (3) exceed the selected plan's limit (1). \
             Deactivate buildings or choose a higher plan."
        );
    }

    #[test]
    fn test_port_validation_keeps_field() {
        let err = SubscriptionError::from(PortError::validation_field("bad slug", "slug"));
        assert!(matches!(err, SubscriptionError::Validation { ref field, .. } if field == "slug"));

        let err = SubscriptionError::from(PortError::connection("refused"));
        assert!(matches!(err, SubscriptionError::Port(_)));
    }
}
