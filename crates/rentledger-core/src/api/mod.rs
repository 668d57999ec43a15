//! REST data API client module.
//!
//! This module provides the `RestClient` for reading and writing the
//! profiles, tenants and rent payments tables. Requests carry the signed-in
//! user's access token; the backend's row-level security scopes the rows.

pub mod client;
pub mod error;

pub use client::RestClient;
pub use error::ApiError;
