//! Data models for rentledger records.
//!
//! This module contains the structures mirrored from the backend tables:
//!
//! - `Profile`: application-owned row describing an account holder
//! - `Tenant`, `TenantDraft`: tenant records and their insert/update payload
//! - `RentPayment`, `PaymentDraft`: rent payment log entries
//! - `DashboardStats`: per-owner summary figures

pub mod dashboard;
pub mod payment;
pub mod profile;
pub mod tenant;

use thiserror::Error;

pub use dashboard::DashboardStats;
pub use payment::{PaymentDraft, PaymentMethod, PaymentStatus, RentPayment};
pub use profile::Profile;
pub use tenant::{Tenant, TenantDraft};

/// Rejected form input, reported before anything is sent to the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{0} must not be negative")]
    Negative(&'static str),

    #[error("Invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },

    #[error("Passwords do not match")]
    PasswordMismatch,
}
