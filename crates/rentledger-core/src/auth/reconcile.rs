//! Pure state machine behind the session manager.
//!
//! Every input (initial fetch result, auth event, profile check, mutation
//! bookkeeping, timeout) goes through [`Reconciler::apply`]. The reconciler
//! owns the published [`AuthState`] and tells the driver which side effects
//! to run; it never performs I/O itself, which keeps every interleaving of
//! inputs testable without a runtime.

use tracing::{debug, warn};

use super::{AuthChange, AuthError, AuthEvent, Session, User};
use crate::config::ProfileGuard;

/// Snapshot of the authentication state published to consumers.
///
/// The user is read from the session, so a user is present exactly when a
/// session is.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    session: Option<Session>,
    loading: bool,
}

impl AuthState {
    /// State before anything is known: no session, still loading.
    pub fn initial() -> Self {
        Self {
            session: None,
            loading: true,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// True until the initial session state is known, and while a mutation
    /// is in flight.
    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// Outcome of looking up the profile row for a session's user.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProfileOutcome {
    Found,
    Missing,
    Failed(String),
}

#[derive(Debug)]
pub(crate) enum Input {
    /// The initial (or resync) session fetch completed
    FetchResolved(Result<Option<Session>, AuthError>),
    AuthEvent(AuthChange),
    ProfileChecked {
        generation: u64,
        session: Session,
        outcome: ProfileOutcome,
    },
    MutationStarted,
    MutationFinished,
    TimedOut,
}

impl Input {
    fn label(&self) -> &'static str {
        match self {
            Input::FetchResolved(_) => "fetch",
            Input::AuthEvent(_) => "event",
            Input::ProfileChecked { .. } => "profile_check",
            Input::MutationStarted => "mutation_started",
            Input::MutationFinished => "mutation_finished",
            Input::TimedOut => "timeout",
        }
    }
}

/// Side effect requested by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    /// Look up the profile for `session.user`, answering with
    /// `Input::ProfileChecked { generation, .. }`
    VerifyProfile { generation: u64, session: Session },
    /// Session without a profile row: sign it out at the auth service
    ForceSignOut,
}

pub(crate) struct Reconciler {
    guard: ProfileGuard,
    session: Option<Session>,
    /// Initial session state is known
    resolved: bool,
    timeout_armed: bool,
    in_flight: usize,
    /// Bumped whenever the session data is replaced or a check is requested,
    /// so answers to superseded checks can be recognised
    generation: u64,
    /// Generation of the outstanding profile check, if any
    verifying: Option<u64>,
    mounted: bool,
}

impl Reconciler {
    pub(crate) fn new(guard: ProfileGuard) -> Self {
        Self {
            guard,
            session: None,
            resolved: false,
            timeout_armed: true,
            in_flight: 0,
            generation: 0,
            verifying: None,
            mounted: true,
        }
    }

    pub(crate) fn snapshot(&self) -> AuthState {
        AuthState {
            session: self.session.clone(),
            loading: self.loading(),
        }
    }

    pub(crate) fn timeout_armed(&self) -> bool {
        self.mounted && self.timeout_armed
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Stop accepting inputs. Anything applied afterwards is ignored.
    pub(crate) fn unmount(&mut self) {
        self.mounted = false;
        self.timeout_armed = false;
        self.verifying = None;
    }

    fn loading(&self) -> bool {
        !self.resolved || self.in_flight > 0 || self.verifying.is_some()
    }

    pub(crate) fn apply(&mut self, input: Input) -> Vec<Effect> {
        if !self.mounted {
            debug!(input = input.label(), "Ignoring input after unmount");
            return Vec::new();
        }

        match input {
            Input::FetchResolved(Ok(Some(session))) => self.accept(session),
            Input::FetchResolved(Ok(None)) => {
                self.clear();
                self.resolve();
                Vec::new()
            }
            Input::FetchResolved(Err(e)) => {
                warn!(error = %e, "Session fetch failed, treating as signed out");
                self.clear();
                self.resolve();
                Vec::new()
            }
            Input::AuthEvent(AuthChange { event, session }) => {
                debug!(%event, has_session = session.is_some(), "Applying auth event");
                match session {
                    Some(session) => self.accept(session),
                    None => {
                        self.clear();
                        // A sign-in notification without a session is a
                        // handshake in progress: wait for the follow-up.
                        if event != AuthEvent::SignedIn {
                            self.resolve();
                        }
                        Vec::new()
                    }
                }
            }
            Input::ProfileChecked {
                generation,
                session,
                outcome,
            } => self.finish_check(generation, session, outcome),
            Input::MutationStarted => {
                self.in_flight += 1;
                Vec::new()
            }
            Input::MutationFinished => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Vec::new()
            }
            Input::TimedOut => {
                if self.timeout_armed && !self.resolved {
                    warn!("Session resolution timed out, continuing signed out");
                    self.clear();
                    self.resolve();
                }
                self.timeout_armed = false;
                Vec::new()
            }
        }
    }

    /// Take a session reported by the fetch or an event.
    fn accept(&mut self, session: Session) -> Vec<Effect> {
        self.generation += 1;
        match self.guard {
            ProfileGuard::Lenient => {
                self.verifying = None;
                self.session = Some(session);
                self.resolve();
                Vec::new()
            }
            ProfileGuard::Strict => {
                // Fresh tokens for the published user replace the old ones at
                // once; another user's identity is withheld until checked.
                let same_user = self
                    .session
                    .as_ref()
                    .is_some_and(|current| current.user.id == session.user.id);
                self.session = if same_user { Some(session.clone()) } else { None };
                self.verifying = Some(self.generation);
                vec![Effect::VerifyProfile {
                    generation: self.generation,
                    session,
                }]
            }
        }
    }

    fn finish_check(&mut self, generation: u64, session: Session, outcome: ProfileOutcome) -> Vec<Effect> {
        if self.verifying != Some(generation) {
            debug!(generation, current = self.generation, "Discarding superseded profile check");
            return Vec::new();
        }
        self.verifying = None;

        match outcome {
            ProfileOutcome::Found => {
                self.session = Some(session);
                self.resolve();
                Vec::new()
            }
            ProfileOutcome::Missing => {
                warn!(user_id = %session.user.id, "No profile for session, signing out");
                self.session = None;
                self.resolve();
                vec![Effect::ForceSignOut]
            }
            ProfileOutcome::Failed(reason) => {
                warn!(user_id = %session.user.id, error = %reason, "Profile check failed, signing out");
                self.session = None;
                self.resolve();
                vec![Effect::ForceSignOut]
            }
        }
    }

    fn clear(&mut self) {
        self.generation += 1;
        self.verifying = None;
        self.session = None;
    }

    fn resolve(&mut self) {
        self.resolved = true;
        self.timeout_armed = false;
    }
}
