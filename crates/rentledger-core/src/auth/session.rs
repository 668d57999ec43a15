use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Identity record issued by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Attributes attached at sign-up (`full_name`, ...)
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

impl User {
    /// Display name given at sign-up, if any
    pub fn full_name(&self) -> Option<&str> {
        self.user_metadata
            .get("full_name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Name for greetings and headers: full name, else email, else id
    pub fn display_name(&self) -> &str {
        self.full_name()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Token bundle proving an authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        let refresh_at = self.expires_at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
        Utc::now() > refresh_at
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// On-disk persistence of the current session, so a restart can resume
/// without signing in again.
#[derive(Debug, Clone)]
pub struct SessionStore {
    cache_dir: PathBuf,
}

impl SessionStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Load the persisted session, expired or not. Callers decide whether to
    /// refresh it.
    pub fn load(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let session: Session =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        debug!(user_id = %session.user.id, expired = session.is_expired(), "Session loaded from disk");
        Ok(Some(session))
    }

    /// Save session to disk
    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }

    /// Remove the persisted session
    pub fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: Some(format!("{id}@example.com")),
            created_at: Utc::now(),
            user_metadata: HashMap::new(),
        }
    }

    pub(crate) fn sample_session(user_id: &str, access_token: &str) -> Session {
        Session {
            access_token: access_token.to_string(),
            refresh_token: format!("refresh-{access_token}"),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: sample_user(user_id),
        }
    }

    fn temp_cache_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rentledger-test-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_session_expiry_checks() {
        let mut session = sample_session("u1", "a");
        assert!(!session.is_expired());
        assert!(!session.needs_refresh());
        assert!(session.minutes_until_expiry() >= 59);

        session.expires_at = Utc::now() + Duration::minutes(2);
        assert!(!session.is_expired());
        assert!(session.needs_refresh());

        session.expires_at = Utc::now() - Duration::minutes(1);
        assert!(session.is_expired());
        assert_eq!(session.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_user_display_name() {
        let mut user = sample_user("u1");
        assert_eq!(user.display_name(), "u1@example.com");

        user.user_metadata
            .insert("full_name".to_string(), serde_json::json!("Ada Landlord"));
        assert_eq!(user.full_name(), Some("Ada Landlord"));
        assert_eq!(user.display_name(), "Ada Landlord");

        user.user_metadata
            .insert("full_name".to_string(), serde_json::json!("  "));
        user.email = None;
        assert_eq!(user.display_name(), "u1");
    }

    #[test]
    fn test_parse_user_from_auth_payload() {
        let json = r#"{
            "id": "6f1c2a54-1a43-4a7e-9a36-1c1c8f0c9b11",
            "aud": "authenticated",
            "role": "authenticated",
            "email": "owner@example.com",
            "created_at": "2024-03-01T10:15:00.123456Z",
            "user_metadata": {"full_name": "Owner Name"},
            "app_metadata": {"provider": "email"}
        }"#;
        let user: User = serde_json::from_str(json).expect("Failed to parse user JSON");
        assert_eq!(user.email.as_deref(), Some("owner@example.com"));
        assert_eq!(user.full_name(), Some("Owner Name"));
    }

    #[test]
    fn test_session_store_round_trip() {
        let dir = temp_cache_dir("store");
        let store = SessionStore::new(dir.clone());
        assert!(store.load().expect("load on empty dir").is_none());

        let session = sample_session("u1", "token");
        store.save(&session).expect("save session");
        let loaded = store.load().expect("load session").expect("session present");
        assert_eq!(loaded, session);

        store.clear().expect("clear session");
        assert!(store.load().expect("load after clear").is_none());
        let _ = std::fs::remove_dir_all(dir);
    }
}
