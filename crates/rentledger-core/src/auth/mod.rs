//! Authentication: sessions, the auth service client and the session manager.
//!
//! This module provides:
//! - `Session`/`User`: token bundle and identity issued by the auth service
//! - `AuthClient`: HTTP client for the backend auth API, persisting the
//!   session to disk and emitting auth events
//! - `SessionManager`: single source of truth for "who is signed in",
//!   reconciling the initial session fetch with the event stream
//!
//! The manager only depends on the `AuthService` and `ProfileLookup` traits,
//! so it can be driven by fakes in tests.

pub mod callback;
pub mod client;
pub mod error;
pub mod events;
pub mod manager;
mod reconcile;
pub mod service;
pub mod session;

pub use callback::CallbackLink;
pub use client::{AuthClient, OtpType};
pub use error::AuthError;
pub use events::{AuthChange, AuthEvent, AuthEventBus, AuthSubscription};
pub use manager::{SessionManager, SessionOptions, DEFAULT_SESSION_TIMEOUT};
pub use reconcile::AuthState;
pub use service::{AuthService, ProfileLookup, SignUpOptions};
pub use session::{Session, SessionStore, User};
