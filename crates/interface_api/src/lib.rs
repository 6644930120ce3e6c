//! HTTP API Layer
//!
//! This crate provides the REST API for the billing core using Axum, plus
//! the scheduler that runs recurring generation and the overdue sweep.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for invoices, payments, settings,
//!   booking triggers, jobs and subscriptions
//! - **Middleware**: Authentication, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent `{error, message, field}` responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::postgres(pool, config)?;
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;
pub mod scheduler;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use core_kernel::HealthCheckable;
use domain_billing::BillingService;
use domain_subscription::SubscriptionGate;
use infra_db::{PostgresBillingStore, PostgresSubscriptionStore};

use crate::config::ApiConfig;
use crate::handlers::{bookings, health, invoices, jobs, payments, settings, subscription};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub billing: BillingService,
    pub subscriptions: SubscriptionGate,
    /// Adapters probed by the readiness check
    pub health: Vec<Arc<dyn HealthCheckable>>,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(
        billing: BillingService,
        subscriptions: SubscriptionGate,
        health: Vec<Arc<dyn HealthCheckable>>,
        config: ApiConfig,
    ) -> Self {
        Self {
            billing,
            subscriptions,
            health,
            config,
        }
    }

    /// Wires both domains to PostgreSQL in the configured timezone
    pub fn postgres(pool: PgPool, config: ApiConfig) -> Result<Self, core_kernel::TemporalError> {
        let tz = config.business_timezone()?;
        let billing_store = Arc::new(PostgresBillingStore::new(pool.clone()));
        let subscription_store = Arc::new(PostgresSubscriptionStore::new(pool));

        let billing = BillingService::with_store(billing_store.clone()).with_timezone(tz);
        let subscriptions = SubscriptionGate::new(subscription_store.clone()).with_timezone(tz);
        let health: Vec<Arc<dyn HealthCheckable>> = vec![
            billing_store as Arc<dyn HealthCheckable>,
            subscription_store as Arc<dyn HealthCheckable>,
        ];

        Ok(Self::new(billing, subscriptions, health, config))
    }
}

/// Creates the main API router
///
/// # Arguments
///
/// * `state` - Services and configuration shared by the handlers
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let invoice_routes = Router::new()
        .route("/", post(invoices::create_invoice).get(invoices::list_invoices))
        .route("/:id", get(invoices::get_invoice))
        .route("/:id/open", post(invoices::open_invoice));

    let payment_routes = Router::new()
        .route("/", post(payments::record_payment))
        .route("/:id", put(payments::update_payment).delete(payments::delete_payment));

    let settings_routes = Router::new()
        .route("/", put(settings::upsert_settings))
        .route("/current", get(settings::current_settings));

    let booking_routes = Router::new()
        .route("/events", post(bookings::booking_event))
        .route("/:id/cycle-months", get(bookings::cycle_months));

    let job_routes = Router::new()
        .route("/generate-monthly", post(jobs::generate_monthly))
        .route("/mark-overdue", post(jobs::mark_overdue));

    let subscription_routes = Router::new()
        .route("/current", get(subscription::current_subscription))
        .route("/plans", get(subscription::list_plans))
        .route("/features/:key", get(subscription::check_feature))
        .route("/limits/:key", get(subscription::check_limit))
        .route("/change-plan", post(subscription::change_plan))
        .route("/quote", get(subscription::quote));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/invoices", invoice_routes)
        .nest("/payments", payment_routes)
        .nest("/invoice-settings", settings_routes)
        .nest("/bookings", booking_routes)
        .nest("/jobs", job_routes)
        .nest("/subscription", subscription_routes)
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
