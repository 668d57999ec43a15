//! Session manager: the single owner of the published auth state.
//!
//! On start the manager subscribes to auth events, fetches the current
//! session and arms a resolution timeout. A background driver task feeds all
//! of those results through the [`Reconciler`] and publishes each new
//! [`AuthState`] on a watch channel. Mutations (`sign_up`, `sign_in`,
//! `sign_out`) are forwarded to the auth service; the resulting auth events
//! are what actually change the user.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reconcile::{AuthState, Effect, Input, ProfileOutcome, Reconciler};
use super::{AuthChange, AuthError, AuthService, AuthSubscription, ProfileLookup, SignUpOptions};
use crate::config::{Config, ProfileGuard};

/// Default upper bound on initial session resolution
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long to wait for the initial session before reporting signed out
    pub timeout: Duration,
    pub profile_guard: ProfileGuard,
    /// Post-verification landing page passed along with sign-ups
    pub email_redirect_to: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SESSION_TIMEOUT,
            profile_guard: ProfileGuard::default(),
            email_redirect_to: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.session_timeout(),
            profile_guard: config.profile_guard,
            email_redirect_to: Some(config.redirect_target("/")),
        }
    }
}

enum Message {
    /// Input for the reconciler, acknowledged once the resulting state has
    /// been published
    Apply(Input, Option<oneshot::Sender<()>>),
    Unmount,
}

pub struct SessionManager {
    auth: Arc<dyn AuthService>,
    inbox: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<AuthState>,
    email_redirect_to: Option<String>,
    driver: Option<JoinHandle<()>>,
}

impl SessionManager {
    /// Start managing the session. Must be called from within a tokio
    /// runtime.
    pub fn start(
        auth: Arc<dyn AuthService>,
        profiles: Arc<dyn ProfileLookup>,
        options: SessionOptions,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(AuthState::initial());

        // Subscribe before fetching so a change landing in between is seen
        let subscription = auth.on_auth_state_change();

        let driver = Driver {
            auth: Arc::clone(&auth),
            profiles,
            inbox: inbox_tx.clone(),
            state: state_tx,
            reconciler: Reconciler::new(options.profile_guard),
        };
        driver.spawn_fetch();

        info!(
            timeout_secs = options.timeout.as_secs_f64(),
            profile_guard = ?options.profile_guard,
            "Session manager started"
        );
        let handle = tokio::spawn(driver.run(inbox_rx, subscription, options.timeout));

        Self {
            auth,
            inbox: inbox_tx,
            state: state_rx,
            email_redirect_to: options.email_redirect_to,
            driver: Some(handle),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    /// Wait until `loading` is false and return that state.
    pub async fn wait_until_resolved(&self) -> AuthState {
        let mut rx = self.state.clone();
        let resolved = rx.wait_for(|s| !s.loading()).await.map(|s| (*s).clone());
        resolved.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Create an account. The display name is stored as `full_name`.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(), AuthError> {
        let options = SignUpOptions::new(self.email_redirect_to.clone()).with_full_name(display_name);
        self.mutate("sign_up", self.auth.sign_up(email, password, options))
            .await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.mutate("sign_in", self.auth.sign_in_with_password(email, password))
            .await
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.mutate("sign_out", self.auth.sign_out()).await
    }

    /// Stop the driver. Results that arrive afterwards are dropped and the
    /// last published state stays as it was.
    pub async fn shutdown(mut self) {
        let _ = self.inbox.send(Message::Unmount);
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!(error = %e, "Session manager task failed");
            }
        }
    }

    /// Run an auth-service call with `loading` held for its duration.
    async fn mutate<F>(&self, operation: &'static str, call: F) -> Result<(), AuthError>
    where
        F: Future<Output = Result<(), AuthError>>,
    {
        let in_flight = InFlight::begin(&self.inbox)?;
        debug!(operation, "Auth mutation started");

        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(AuthError::Fault(panic_message(panic))),
        };
        match &result {
            Ok(()) => info!(operation, "Auth mutation succeeded"),
            Err(e) => warn!(operation, error = %e, "Auth mutation failed"),
        }

        in_flight.finish().await;
        result
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let _ = self.inbox.send(Message::Unmount);
    }
}

/// Marks a mutation in flight. Dropping it without `finish` (cancellation)
/// still releases the loading flag.
struct InFlight<'a> {
    inbox: &'a mpsc::UnboundedSender<Message>,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn begin(inbox: &'a mpsc::UnboundedSender<Message>) -> Result<Self, AuthError> {
        inbox
            .send(Message::Apply(Input::MutationStarted, None))
            .map_err(|_| AuthError::ShutDown)?;
        Ok(Self {
            inbox,
            finished: false,
        })
    }

    /// Release the loading flag and wait until the state reflecting it is
    /// published.
    async fn finish(mut self) {
        self.finished = true;
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .inbox
            .send(Message::Apply(Input::MutationFinished, Some(ack_tx)))
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.inbox.send(Message::Apply(Input::MutationFinished, None));
        }
    }
}

struct Driver {
    auth: Arc<dyn AuthService>,
    profiles: Arc<dyn ProfileLookup>,
    inbox: mpsc::UnboundedSender<Message>,
    state: watch::Sender<AuthState>,
    reconciler: Reconciler,
}

impl Driver {
    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<Message>,
        subscription: AuthSubscription,
        timeout: Duration,
    ) {
        let mut subscription = Some(subscription);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                change = next_change(&mut subscription) => {
                    self.on_change(change, &mut subscription);
                }
                message = inbox.recv() => match message {
                    Some(Message::Apply(input, ack)) => {
                        // Events emitted before this message was sent go first
                        self.drain_changes(&mut subscription);
                        self.handle(input);
                        if let Some(ack) = ack {
                            let _ = ack.send(());
                        }
                    }
                    Some(Message::Unmount) | None => break,
                },
                () = &mut deadline, if self.reconciler.timeout_armed() => {
                    self.handle(Input::TimedOut);
                }
            }
        }

        self.reconciler.unmount();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        info!("Session manager stopped");
    }

    fn on_change(&mut self, change: Result<AuthChange, RecvError>, subscription: &mut Option<AuthSubscription>) {
        match change {
            Ok(change) => self.handle(Input::AuthEvent(change)),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth events dropped, refetching session");
                self.spawn_fetch();
            }
            Err(RecvError::Closed) => {
                debug!("Auth event stream closed");
                *subscription = None;
            }
        }
    }

    fn drain_changes(&mut self, subscription: &mut Option<AuthSubscription>) {
        while let Some(sub) = subscription.as_mut() {
            let change = match sub.try_recv() {
                Ok(change) => Ok(change),
                Err(TryRecvError::Lagged(skipped)) => Err(RecvError::Lagged(skipped)),
                Err(TryRecvError::Closed) => Err(RecvError::Closed),
                Err(TryRecvError::Empty) => break,
            };
            self.on_change(change, subscription);
        }
    }

    fn handle(&mut self, input: Input) {
        for effect in self.reconciler.apply(input) {
            self.run_effect(effect);
        }

        let next = self.reconciler.snapshot();
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(
                user_id = ?next.user().map(|u| u.id.as_str()),
                loading = next.loading(),
                "Auth state published"
            );
            *current = next;
            true
        });
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::VerifyProfile { generation, session } => {
                let profiles = Arc::clone(&self.profiles);
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    let lookup = profiles.find_profile_by_id(&session.user.id, &session);
                    let outcome = match AssertUnwindSafe(lookup).catch_unwind().await {
                        Ok(Ok(Some(_))) => ProfileOutcome::Found,
                        Ok(Ok(None)) => ProfileOutcome::Missing,
                        Ok(Err(e)) => ProfileOutcome::Failed(e.to_string()),
                        Err(panic) => ProfileOutcome::Failed(panic_message(panic)),
                    };
                    let input = Input::ProfileChecked {
                        generation,
                        session,
                        outcome,
                    };
                    if inbox.send(Message::Apply(input, None)).is_err() {
                        debug!("Profile check finished after shutdown");
                    }
                });
            }
            Effect::ForceSignOut => {
                let auth = Arc::clone(&self.auth);
                tokio::spawn(async move {
                    if let Err(e) = auth.sign_out().await {
                        warn!(error = %e, "Forced sign-out failed");
                    }
                });
            }
        }
    }

    /// Fetch the current session in the background.
    fn spawn_fetch(&self) {
        let auth = Arc::clone(&self.auth);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(auth.get_session()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(AuthError::Fault(panic_message(panic))),
            };
            if inbox
                .send(Message::Apply(Input::FetchResolved(result), None))
                .is_err()
            {
                debug!("Session fetch finished after shutdown");
            }
        });
    }
}

async fn next_change(subscription: &mut Option<AuthSubscription>) -> Result<AuthChange, RecvError> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
