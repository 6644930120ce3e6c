//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the billing core using SQLx: the connection
//! pool, embedded migrations, repositories over the billing and
//! subscription tables, and the adapters that implement the domain ports.
//!
//! # Architecture
//!
//! Repositories own the SQL and return row types. Adapters map rows onto
//! domain types and implement `BookingSource`, `SettingsStore`,
//! `InvoiceStore`, `PaymentStore` and `SubscriptionStore`. Balance and
//! `is_current` changes run in a transaction holding `FOR UPDATE` locks.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresBillingStore};
//!
//! let pool = create_pool(DatabaseConfig::new(url).with_migrations(true)).await?;
//! let store = PostgresBillingStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use adapters::{PostgresBillingStore, PostgresSubscriptionStore};
