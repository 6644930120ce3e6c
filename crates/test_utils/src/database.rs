//! Database Test Utilities
//!
//! Starts PostgreSQL in a container, applies the `infra_db` migrations and
//! seeds the external tables (buildings, bookings) the billing core reads.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use core_kernel::{BuildingId, OwnerId};
use domain_billing::BookingSnapshot;

const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "pg_billing_test";

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Configuration for test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A migrated PostgreSQL instance running in a container
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and applies every migration
    pub async fn new() -> TestResult<Self> {
        let container = Postgres::default()
            .with_user(POSTGRES_USER)
            .with_password(POSTGRES_PASSWORD)
            .with_db_name(POSTGRES_DB)
            .start()
            .await?;

        let config = TestDatabaseConfig {
            host: container.get_host().await?.to_string(),
            port: container.get_host_port_ipv4(5432).await?,
            ..TestDatabaseConfig::default()
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.connection_url())
            .await?;
        infra_db::run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Removes all rows except the seeded plans
    pub async fn clear_data(&self) -> TestResult<()> {
        let tables = [
            "payments",
            "invoice_expenses",
            "invoices",
            "invoice_settings",
            "subscriptions",
            "bookings",
            "buildings",
        ];
        for table in tables {
            sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", table))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn insert_building(&self, id: BuildingId, owner: OwnerId, active: bool) -> TestResult<()> {
        sqlx::query("INSERT INTO buildings (id, owner_id, name, is_active) VALUES ($1, $2, $3, $4)")
            .bind(uuid::Uuid::from(id))
            .bind(uuid::Uuid::from(owner))
            .bind(format!("Building {}", id))
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts the booking row; its building must already exist
    pub async fn insert_booking(&self, booking: &BookingSnapshot) -> TestResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, building_id, status, start_date, end_date, booked_at, currency,
                monthly_rent, security_deposit, discount_amount, maintenance_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(uuid::Uuid::from(booking.id))
        .bind(booking.building_id.map(uuid::Uuid::from))
        .bind(booking.status.as_str())
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.booked_at)
        .bind(booking.currency().code())
        .bind(booking.monthly_rent.amount())
        .bind(booking.security_deposit.amount())
        .bind(booking.discount_amount.amount())
        .bind(booking.maintenance_amount.amount())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts the booking and, when needed, its building
    pub async fn seed_booking(&self, booking: &BookingSnapshot) -> TestResult<()> {
        if let (Some(building), Some(owner)) = (booking.building_id, booking.owner_id) {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM buildings WHERE id = $1)")
                .bind(uuid::Uuid::from(building))
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                self.insert_building(building, owner, true).await?;
            }
        }
        self.insert_booking(booking).await
    }
}

static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// A database shared by every test in the binary
///
/// # Panics
///
/// Panics if the container cannot be started.
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// A fresh database for tests that need isolation
pub async fn create_isolated_test_database() -> TestResult<TestDatabase> {
    TestDatabase::new().await
}

/// Declares a `#[tokio::test]` that receives an isolated database
///
/// The test is ignored by default since it needs a container runtime; run
/// it with `cargo test -- --ignored`.
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires a container runtime"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_connection_url() {
        let url = TestDatabaseConfig::default().connection_url();
        assert!(url.starts_with("postgres://"));
        assert!(url.contains(POSTGRES_USER));
        assert!(url.ends_with(POSTGRES_DB));
    }
}
