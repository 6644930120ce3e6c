//! Port adapters backed by PostgreSQL
//!
//! Each adapter wraps the repositories it needs, maps rows onto domain
//! types and translates [`DatabaseError`] into `PortError`.

pub mod billing;
pub mod subscription;

pub use billing::PostgresBillingStore;
pub use subscription::PostgresSubscriptionStore;

use std::str::FromStr;
use std::time::Instant;

use chrono::Utc;
use sqlx::PgPool;

use core_kernel::{AdapterHealth, HealthCheckResult};

use crate::error::DatabaseError;

/// Parses a text column into a domain enum
pub(crate) fn parse_column<T: FromStr>(column: &str, value: &str) -> Result<T, DatabaseError> {
    value
        .parse()
        .map_err(|_| DatabaseError::invalid_column(column, value))
}

/// Runs `SELECT 1` and reports the round trip
pub(crate) async fn ping(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = Instant::now();
    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let (status, message) = match result {
        Ok(_) => (AdapterHealth::Healthy, None),
        Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
    };
    HealthCheckResult {
        adapter_id: adapter_id.to_string(),
        status,
        latency_ms,
        message,
        checked_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use domain_billing::InvoiceStatus;

    #[test]
    fn test_parse_column() {
        let status: InvoiceStatus = parse_column("status", "partial").unwrap();
        assert_eq!(status, InvoiceStatus::Partial);
        let currency: Currency = parse_column("currency", "INR").unwrap();
        assert_eq!(currency, Currency::INR);

        let err = parse_column::<InvoiceStatus>("status", "archived").unwrap_err();
        assert!(matches!(err, DatabaseError::SerializationError(_)));
    }
}
