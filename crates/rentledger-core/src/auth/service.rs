use std::collections::HashMap;

use async_trait::async_trait;

use super::{AuthError, AuthSubscription, Session};
use crate::api::ApiError;
use crate::models::Profile;

/// Options attached to an account creation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignUpOptions {
    /// Where the verification link lands after the email is confirmed
    pub redirect_to: Option<String>,
    /// Attributes stored on the new identity
    pub data: HashMap<String, serde_json::Value>,
}

impl SignUpOptions {
    pub fn new(redirect_to: Option<String>) -> Self {
        Self {
            redirect_to,
            data: HashMap::new(),
        }
    }

    pub fn with_full_name(mut self, full_name: Option<&str>) -> Self {
        if let Some(name) = full_name.map(str::trim).filter(|n| !n.is_empty()) {
            self.data
                .insert("full_name".to_string(), serde_json::Value::from(name));
        }
        self
    }
}

/// Capability the session manager consumes from the auth service.
#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    /// Current session, if a persisted one is still usable. Side-effect free
    /// apart from token refresh.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Register for auth state-change notifications.
    fn on_auth_state_change(&self) -> AuthSubscription;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        options: SignUpOptions,
    ) -> Result<(), AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Profile-row lookup used to detect orphaned sessions.
#[async_trait]
pub trait ProfileLookup: Send + Sync + 'static {
    async fn find_profile_by_id(
        &self,
        user_id: &str,
        session: &Session,
    ) -> Result<Option<Profile>, ApiError>;
}
