//! HTTP client for the backend's auth API (`/auth/v1`).
//!
//! `AuthClient` keeps the current session in memory, persists it through a
//! [`SessionStore`], and emits an [`AuthEvent`] for every change before the
//! call that caused it returns.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{AuthError, AuthEvent, AuthEventBus, AuthService, AuthSubscription, Session, SessionStore, SignUpOptions, User};
use crate::api::error::ErrorBody;
use crate::api::ApiError;
use crate::config::BackendSettings;

/// Path of the auth API below the backend URL
const AUTH_PATH: &str = "auth/v1";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Lifetime assumed when a token response carries neither `expires_at` nor
/// `expires_in`
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let now = Utc::now();
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| self.expires_in.map(|secs| now + chrono::Duration::seconds(secs)))
            .unwrap_or_else(|| now + chrono::Duration::seconds(DEFAULT_TOKEN_TTL_SECS));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: self.user,
        }
    }
}

/// Kind of one-time token carried by an email link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpType {
    Signup,
    Recovery,
    EmailChange,
    Invite,
    Magiclink,
    Email,
}

impl OtpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpType::Signup => "signup",
            OtpType::Recovery => "recovery",
            OtpType::EmailChange => "email_change",
            OtpType::Invite => "invite",
            OtpType::Magiclink => "magiclink",
            OtpType::Email => "email",
        }
    }

    /// Confirmation shown once the link has been verified
    pub fn success_message(&self) -> &'static str {
        match self {
            OtpType::Signup => "Account confirmed successfully! Welcome to RentLedger.",
            OtpType::Recovery => "Password reset confirmed. You can now set a new password.",
            OtpType::EmailChange => "Email change confirmed successfully.",
            OtpType::Invite => "Invitation accepted! Welcome to RentLedger.",
            OtpType::Magiclink | OtpType::Email => "Authentication successful!",
        }
    }
}

impl fmt::Display for OtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "signup" => Ok(OtpType::Signup),
            "recovery" => Ok(OtpType::Recovery),
            "email_change" => Ok(OtpType::EmailChange),
            "invite" => Ok(OtpType::Invite),
            "magiclink" => Ok(OtpType::Magiclink),
            "email" => Ok(OtpType::Email),
            other => Err(format!("Unknown link type: {}", other)),
        }
    }
}

/// Auth API client. Share it behind an `Arc`; all methods take `&self`.
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
    store: Option<SessionStore>,
    current: Mutex<Option<Session>>,
    /// Held by every operation that refreshes, replaces or discards the
    /// session, so a late refresh cannot undo a sign-out or sign-in
    session_lock: tokio::sync::Mutex<()>,
    events: AuthEventBus,
}

impl AuthClient {
    /// Create a client. With a store, sessions survive restarts.
    pub fn new(backend: &BackendSettings, store: Option<SessionStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/{}", backend.url.trim_end_matches('/'), AUTH_PATH),
            anon_key: backend.anon_key.clone(),
            store,
            current: Mutex::new(None),
            session_lock: tokio::sync::Mutex::new(()),
            events: AuthEventBus::new(),
        })
    }

    /// Session held in memory, without touching disk or network.
    pub fn current_session(&self) -> Option<Session> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    fn request(&self, method: Method, path: &str, access_token: Option<&str>) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
    }

    /// Map a non-success response. Client errors are the service refusing
    /// the request and are relayed verbatim.
    async fn check_response(response: Response) -> Result<Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::error_from(status, &body))
    }

    fn error_from(status: reqwest::StatusCode, body: &str) -> AuthError {
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            let parsed = ErrorBody::parse(body);
            let code = parsed.as_ref().and_then(|b| b.code());
            let message = parsed
                .and_then(|b| b.message())
                .unwrap_or_else(|| ApiError::from_status(status, body).to_string());
            AuthError::rejected(status.as_u16(), code, message)
        } else {
            AuthError::Api(ApiError::from_status(status, body))
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, AuthError> {
        let response = request.send().await.map_err(ApiError::from)?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {} response: {}", what, e)).into())
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), AuthError> {
        let response = request.send().await.map_err(ApiError::from)?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Make `session` current, persist it and announce it.
    fn install(&self, session: Session, event: AuthEvent) {
        if let Some(ref store) = self.store {
            if let Err(e) = store.save(&session) {
                warn!(error = %e, "Failed to persist session");
            }
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(session.clone());
        }
        self.events.emit(event, Some(session));
    }

    /// Forget the session locally.
    fn discard(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        if let Some(ref store) = self.store {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to remove persisted session");
            }
        }
    }

    fn load_persisted(&self) -> Option<Session> {
        let store = self.store.as_ref()?;
        match store.load() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session file");
                let _ = store.clear();
                None
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let request = self
            .request(Method::POST, "token", None)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));
        let tokens: TokenResponse = self.send_json(request, "token refresh").await?;
        Ok(tokens.into_session())
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, AuthError> {
        let request = self.request(Method::GET, "user", Some(access_token));
        self.send_json(request, "user").await
    }

    /// Current session, refreshed when close to expiry. Caller holds
    /// `session_lock`.
    async fn load_session(&self) -> Result<Option<Session>, AuthError> {
        let session = match self.current_session() {
            Some(session) => session,
            None => match self.load_persisted() {
                Some(session) => {
                    if let Ok(mut current) = self.current.lock() {
                        *current = Some(session.clone());
                    }
                    session
                }
                None => return Ok(None),
            },
        };

        if !session.needs_refresh() {
            return Ok(Some(session));
        }

        debug!(user_id = %session.user.id, expired = session.is_expired(), "Refreshing session");
        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => {
                info!(user_id = %fresh.user.id, "Session refreshed");
                self.install(fresh.clone(), AuthEvent::TokenRefreshed);
                Ok(Some(fresh))
            }
            Err(e) if e.is_rejection() => {
                warn!(error = %e, "Refresh token rejected, discarding session");
                self.discard();
                self.events.emit(AuthEvent::SignedOut, None);
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                Err(e)
            }
        }
    }

    /// Send a password reset link.
    pub async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        let request = self
            .request(Method::POST, "recover", None)
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }));
        self.send_empty(request).await?;
        info!("Password reset email requested");
        Ok(())
    }

    /// Send a magic sign-in link.
    pub async fn sign_in_with_otp(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        let request = self
            .request(Method::POST, "otp", None)
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email, "create_user": true }));
        self.send_empty(request).await?;
        info!("Magic link requested");
        Ok(())
    }

    /// Confirm an emailed link. Recovery links emit `PasswordRecovery`, all
    /// others `SignedIn`.
    pub async fn verify_otp(&self, token_hash: &str, otp_type: OtpType) -> Result<Session, AuthError> {
        let _guard = self.session_lock.lock().await;
        let request = self
            .request(Method::POST, "verify", None)
            .json(&json!({ "token_hash": token_hash, "type": otp_type.as_str() }));
        let tokens: TokenResponse = self.send_json(request, "verification").await?;
        let session = tokens.into_session();

        let event = match otp_type {
            OtpType::Recovery => AuthEvent::PasswordRecovery,
            _ => AuthEvent::SignedIn,
        };
        info!(user_id = %session.user.id, otp_type = %otp_type, "Email link verified");
        self.install(session.clone(), event);
        Ok(session)
    }

    /// Adopt tokens delivered by a callback link. The access token is
    /// checked against the service; the pair is refreshed on next use.
    pub async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, AuthError> {
        let _guard = self.session_lock.lock().await;
        let user = self.fetch_user(access_token).await?;
        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            token_type: "bearer".to_string(),
            // Expiry is not known from the link
            expires_at: Utc::now(),
            user,
        };
        info!(user_id = %session.user.id, "Session set from callback tokens");
        self.install(session.clone(), AuthEvent::SignedIn);
        Ok(session)
    }

    pub async fn update_password(&self, new_password: &str) -> Result<User, AuthError> {
        self.update_user(json!({ "password": new_password })).await
    }

    /// Request an email change; both addresses receive confirmation links.
    pub async fn update_email(&self, new_email: &str, redirect_to: &str) -> Result<User, AuthError> {
        self.update_user_with(json!({ "email": new_email }), Some(redirect_to)).await
    }

    async fn update_user(&self, attributes: serde_json::Value) -> Result<User, AuthError> {
        self.update_user_with(attributes, None).await
    }

    async fn update_user_with(
        &self,
        attributes: serde_json::Value,
        redirect_to: Option<&str>,
    ) -> Result<User, AuthError> {
        let _guard = self.session_lock.lock().await;
        let session = self.load_session().await?.ok_or(AuthError::NotSignedIn)?;
        let mut request = self
            .request(Method::PUT, "user", Some(&session.access_token))
            .json(&attributes);
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        let user: User = self.send_json(request, "user update").await?;

        info!(user_id = %user.id, "User updated");
        self.install(
            Session {
                user: user.clone(),
                ..session
            },
            AuthEvent::UserUpdated,
        );
        Ok(user)
    }
}

#[async_trait]
impl AuthService for AuthClient {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let _guard = self.session_lock.lock().await;
        self.load_session().await
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> Result<(), AuthError> {
        let _guard = self.session_lock.lock().await;
        let mut request = self
            .request(Method::POST, "signup", None)
            .json(&json!({ "email": email, "password": password, "data": options.data }));
        if let Some(ref redirect_to) = options.redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }

        let body: serde_json::Value = self.send_json(request, "sign-up").await?;
        // With email confirmation disabled the service signs the user in
        // straight away; otherwise only the pending user comes back.
        if body.get("access_token").is_some() {
            let tokens: TokenResponse = serde_json::from_value(body)
                .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse sign-up response: {}", e)))?;
            let session = tokens.into_session();
            info!(user_id = %session.user.id, "Signed up and signed in");
            self.install(session, AuthEvent::SignedIn);
        } else {
            info!("Sign-up accepted, confirmation email sent");
        }
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let _guard = self.session_lock.lock().await;
        let request = self
            .request(Method::POST, "token", None)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let tokens: TokenResponse = self.send_json(request, "sign-in").await?;

        let session = tokens.into_session();
        info!(user_id = %session.user.id, "Signed in");
        self.install(session, AuthEvent::SignedIn);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // Waits for an in-flight refresh, whose tokens are then revoked
        let _guard = self.session_lock.lock().await;
        let session = self.current_session().or_else(|| self.load_persisted());

        let remote = match session {
            Some(ref session) => {
                let request = self.request(Method::POST, "logout", Some(&session.access_token));
                match self.send_empty(request).await {
                    // An already invalid token means there is nothing left to revoke
                    Err(AuthError::Rejected { status: 401 | 403 | 404, .. }) => Ok(()),
                    other => other,
                }
            }
            None => Ok(()),
        };

        self.discard();
        self.events.emit(AuthEvent::SignedOut, None);
        match &remote {
            Ok(()) => info!("Signed out"),
            Err(e) => warn!(error = %e, "Remote sign-out failed, local session discarded"),
        }
        remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::tests::sample_session;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn backend() -> BackendSettings {
        BackendSettings {
            // Nothing listens here; tests below must not reach the network
            url: "http://127.0.0.1:9/".to_string(),
            anon_key: "anon".to_string(),
        }
    }

    /// Minimal auth endpoint on a loopback port. `/token` answers after
    /// `token_delay` with a fresh session for `u1`; other paths get 204.
    async fn serve_auth(token_delay: Duration) -> (BackendSettings, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let token_requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&token_requests);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let request = read_request(&mut stream).await;
                    let response = if request.starts_with("POST /auth/v1/token") {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(token_delay).await;
                        let body = r#"{"access_token":"fresh","refresh_token":"r2","expires_in":3600,"token_type":"bearer","user":{"id":"u1","created_at":"2024-01-01T00:00:00Z"}}"#;
                        format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n".to_string()
                    };
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        let backend = BackendSettings {
            url: format!("http://{}", addr),
            anon_key: "anon".to_string(),
        };
        (backend, token_requests)
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn temp_store(name: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(format!("rentledger-auth-{}-{}", name, std::process::id()));
        SessionStore::new(dir)
    }

    // ===== Wire formats =====

    #[test]
    fn test_parse_token_response_with_expires_at() {
        let json = r#"{
            "access_token": "eyJ.access",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1893456000,
            "refresh_token": "r1",
            "user": {
                "id": "8d0f2a4e-0000-4000-8000-000000000001",
                "email": "owner@example.com",
                "created_at": "2024-01-01T00:00:00Z",
                "user_metadata": {"full_name": "Olive Owner"}
            }
        }"#;
        let tokens: TokenResponse = serde_json::from_str(json).expect("Failed to parse token JSON");
        let session = tokens.into_session();
        assert_eq!(session.expires_at.timestamp(), 1_893_456_000);
        assert_eq!(session.user.display_name(), "Olive Owner");
        assert_eq!(session.refresh_token, "r1");
    }

    #[test]
    fn test_parse_token_response_with_expires_in_only() {
        let json = r#"{
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 600,
            "user": {"id": "u", "created_at": "2024-01-01T00:00:00Z"}
        }"#;
        let tokens: TokenResponse = serde_json::from_str(json).expect("Failed to parse token JSON");
        let session = tokens.into_session();
        assert_eq!(session.token_type, "bearer");
        let minutes = session.minutes_until_expiry();
        assert!((9..=10).contains(&minutes), "unexpected expiry {minutes}");
    }

    #[test]
    fn test_otp_type_parsing() {
        assert_eq!("recovery".parse::<OtpType>(), Ok(OtpType::Recovery));
        assert_eq!("EMAIL_CHANGE".parse::<OtpType>(), Ok(OtpType::EmailChange));
        assert!("sms".parse::<OtpType>().is_err());
        assert_eq!(OtpType::Magiclink.to_string(), "magiclink");
    }

    #[test]
    fn test_client_errors_are_rejections() {
        let err = AuthClient::error_from(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert_eq!(err.code(), Some("invalid_credentials"));

        let err = AuthClient::error_from(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token"}"#,
        );
        assert_eq!(err.to_string(), "Invalid Refresh Token");
        assert!(err.is_rejection());
    }

    #[test]
    fn test_server_errors_are_not_rejections() {
        let err = AuthClient::error_from(StatusCode::SERVICE_UNAVAILABLE, "maintenance");
        assert!(!err.is_rejection());
        let err = AuthClient::error_from(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, AuthError::Api(ApiError::RateLimited)));
    }

    // ===== Local session handling =====

    #[tokio::test]
    async fn test_get_session_without_store_is_none() {
        let client = AuthClient::new(&backend(), None).expect("client");
        assert!(client.get_session().await.expect("no error").is_none());
    }

    #[tokio::test]
    async fn test_get_session_loads_fresh_persisted_session() {
        let store = temp_store("load");
        store.save(&sample_session("u1", "stored")).expect("save");

        let client = AuthClient::new(&backend(), Some(store)).expect("client");
        let session = client.get_session().await.expect("no error").expect("session");
        assert_eq!(session.access_token, "stored");
        assert_eq!(client.current_session().map(|s| s.user.id), Some("u1".to_string()));

        client.discard();
    }

    #[tokio::test]
    async fn test_sign_out_without_session_emits_event() {
        let store = temp_store("signout");
        let client = AuthClient::new(&backend(), Some(store)).expect("client");
        let mut sub = client.on_auth_state_change();

        client.sign_out().await.expect("local sign-out");
        let change = sub.try_recv().expect("event emitted before return");
        assert_eq!(change.event, AuthEvent::SignedOut);
        assert!(change.session.is_none());
        assert!(client.current_session().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_during_refresh_stays_signed_out() {
        let (backend, token_requests) = serve_auth(Duration::from_millis(200)).await;
        let store = temp_store("refresh-race");
        let mut stale = sample_session("u1", "stale");
        stale.expires_at = Utc::now();
        store.save(&stale).expect("save");

        let client = Arc::new(AuthClient::new(&backend, Some(store.clone())).expect("client"));
        let mut sub = client.on_auth_state_change();

        let refreshing = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_session().await })
        };
        tokio::time::timeout(Duration::from_secs(2), async {
            while token_requests.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("refresh never started");

        client.sign_out().await.expect("sign out");
        let refreshed = refreshing.await.expect("join").expect("refresh");
        assert_eq!(refreshed.map(|s| s.access_token), Some("fresh".to_string()));

        // The refresh finished first; the sign-out is what sticks
        assert!(client.current_session().is_none());
        assert!(store.load().expect("read store").is_none());
        let mut last = None;
        while let Ok(change) = sub.try_recv() {
            last = Some(change.event);
        }
        assert_eq!(last, Some(AuthEvent::SignedOut));
    }

    #[test]
    fn test_install_persists_and_emits() {
        let store = temp_store("install");
        let client = AuthClient::new(&backend(), Some(store)).expect("client");
        let mut sub = client.on_auth_state_change();

        client.install(sample_session("u2", "tok"), AuthEvent::SignedIn);
        let change = sub.try_recv().expect("event");
        assert_eq!(change.event, AuthEvent::SignedIn);
        assert_eq!(client.load_persisted().map(|s| s.access_token), Some("tok".to_string()));

        client.discard();
        assert!(client.load_persisted().is_none());
    }
}
