//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend endpoint, its public (anon) key, the site URL
//! used for email redirect links, and session manager tuning.
//!
//! Configuration is stored at `~/.config/rentledger/config.json`. The
//! `RENTLEDGER_*` environment variables override values from the file for
//! the current run only; saving writes back just the state the app itself
//! keeps (the last email used to sign in).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "rentledger";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Upper bound on the initial session resolution before the manager gives up
/// and reports a signed-out state.
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;

/// Origin used for verification and reset links when none is configured
const DEFAULT_SITE_URL: &str = "http://localhost:3000";

const ENV_BACKEND_URL: &str = "RENTLEDGER_URL";
const ENV_ANON_KEY: &str = "RENTLEDGER_ANON_KEY";
const ENV_SITE_URL: &str = "RENTLEDGER_SITE_URL";
const ENV_PROFILE_GUARD: &str = "RENTLEDGER_PROFILE_GUARD";
const ENV_SESSION_TIMEOUT: &str = "RENTLEDGER_SESSION_TIMEOUT_SECS";

/// Whether a resolved session must be backed by a profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileGuard {
    /// Look up the profile for every session and sign out orphans
    #[default]
    Strict,
    /// Trust the auth service's session as-is
    Lenient,
}

impl ProfileGuard {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileGuard::Strict => "strict",
            ProfileGuard::Lenient => "lenient",
        }
    }
}

impl fmt::Display for ProfileGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileGuard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ProfileGuard::Strict),
            "lenient" => Ok(ProfileGuard::Lenient),
            other => Err(format!("expected strict or lenient, got {}", other)),
        }
    }
}

/// Resolved backend endpoint and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub anon_key: Option<String>,
    pub site_url: Option<String>,
    pub session_timeout_secs: u64,
    pub profile_guard: ProfileGuard,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            anon_key: None,
            site_url: None,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            profile_guard: ProfileGuard::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::read_file(&Self::config_path()?)?;
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Persist `last_email`. Everything else in the file is left as the user
    /// wrote it, so per-run overrides never become permanent.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let mut on_disk = Self::read_file(path)?;
        on_disk.last_email = self.last_email.clone();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&on_disk)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    /// Apply `RENTLEDGER_*` overrides from a variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_BACKEND_URL) {
            self.backend_url = Some(url);
        }
        if let Some(key) = non_empty(ENV_ANON_KEY) {
            self.anon_key = Some(key);
        }
        if let Some(site) = non_empty(ENV_SITE_URL) {
            self.site_url = Some(site);
        }
        if let Some(guard) = non_empty(ENV_PROFILE_GUARD).and_then(|v| v.parse::<ProfileGuard>().ok()) {
            self.profile_guard = guard;
        }
        if let Some(secs) = non_empty(ENV_SESSION_TIMEOUT).and_then(|v| v.trim().parse().ok()) {
            self.session_timeout_secs = secs;
        }
    }

    /// Backend endpoint and key, required for any network operation.
    pub fn backend(&self) -> Result<BackendSettings> {
        let url = self
            .backend_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Backend URL not configured (set {})", ENV_BACKEND_URL))?;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            anyhow::bail!("Backend URL must start with http:// or https://: {}", url);
        }
        let anon_key = self
            .anon_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Backend anon key not configured (set {})", ENV_ANON_KEY))?;

        Ok(BackendSettings {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    /// Absolute link target on the site for email redirects
    pub fn redirect_target(&self, path: &str) -> String {
        let site = self
            .site_url
            .as_deref()
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SITE_URL);
        format!("{}/{}", site, path.trim_start_matches('/'))
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs.max(1))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
