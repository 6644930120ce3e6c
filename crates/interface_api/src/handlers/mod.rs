//! Request handlers

pub mod invoices;
pub mod payments;
pub mod settings;
pub mod bookings;
pub mod jobs;
pub mod subscription;
pub mod health;
