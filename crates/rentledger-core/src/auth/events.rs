use std::fmt;

use tokio::sync::broadcast;
use tracing::debug;

use super::Session;

/// Buffer size for the auth event broadcast channel.
/// Events are rare (sign-in, refresh, sign-out); 16 leaves room for bursts
/// while a subscriber is busy.
const EVENT_BUFFER_SIZE: usize = 16;

/// Kind of auth state change emitted by the auth service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated => "USER_UPDATED",
            AuthEvent::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification from the auth event stream.
#[derive(Debug, Clone)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// Handle returned by `on_auth_state_change`.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthChange>,
}

impl AuthSubscription {
    pub fn new(rx: broadcast::Receiver<AuthChange>) -> Self {
        Self { rx }
    }

    /// Wait for the next change. `Lagged` means notifications were dropped
    /// and the subscriber should resynchronise; `Closed` means the service
    /// is gone.
    pub async fn recv(&mut self) -> Result<AuthChange, broadcast::error::RecvError> {
        self.rx.recv().await
    }

    /// Take a change that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Result<AuthChange, broadcast::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        drop(self.rx);
    }
}

/// Fan-out point for auth events, owned by an auth service implementation.
#[derive(Clone)]
pub struct AuthEventBus {
    tx: broadcast::Sender<AuthChange>,
}

impl AuthEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.tx.subscribe())
    }

    pub fn emit(&self, event: AuthEvent, session: Option<Session>) {
        debug!(%event, user_id = ?session.as_ref().map(|s| s.user.id.as_str()), "Auth state changed");
        // No subscribers is fine; nobody is listening yet.
        let _ = self.tx.send(AuthChange { event, session });
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new()
    }
}
