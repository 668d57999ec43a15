//! RentLedger core library.
//!
//! Shared by every front end: the authentication session manager, the HTTP
//! clients for the backend's auth and data APIs, record models and
//! configuration.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiError, RestClient};
pub use auth::{
    AuthClient, AuthError, AuthEvent, AuthService, AuthState, ProfileLookup, Session,
    SessionManager, SessionOptions, User,
};
pub use config::{BackendSettings, Config, ProfileGuard};
