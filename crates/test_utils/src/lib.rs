//! Test Utilities Crate
//!
//! Shared fixtures, builders and helpers for the billing core test suites.
//!
//! # Modules
//!
//! - `fixtures`: the check-in scenario, deterministic ids, actors and plans
//! - `builders`: bookings, settings, invoices and payment drafts
//! - `database`: PostgreSQL container with migrations applied
//! - `assertions`: money and invoice assertions
//! - `generators`: proptest strategies

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
