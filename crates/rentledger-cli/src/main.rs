//! RentLedger CLI - manage tenants and rent payments from the terminal.
//!
//! Every invocation mounts the session manager, waits for the initial
//! session state, runs one command and shuts the manager down again.

mod commands;
mod prompt;

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rentledger_core::auth::SessionStore;
use rentledger_core::{AuthClient, Config, ProfileGuard, ProfileLookup, RestClient, SessionManager, SessionOptions};

use commands::{Command, Context as AppContext};

#[derive(Parser, Debug)]
#[command(name = "rentledger", version, about = "Tenants, rent payments and account access")]
struct Cli {
    /// Backend URL (overrides config and RENTLEDGER_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Backend public (anon) key
    #[arg(long, global = true)]
    anon_key: Option<String>,

    /// Profile check for restored sessions: strict or lenient
    #[arg(long, global = true)]
    profile_guard: Option<ProfileGuard>,

    /// Also write logs to this file
    #[arg(long, global = true, env = "RENTLEDGER_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_else(|| OsStr::new("rentledger.log"));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref());
    info!("rentledger starting");

    // Flag overrides apply to this run; `Config::save` only writes back
    // `last_email`
    let mut config = Config::load()?;
    if let Some(url) = cli.url {
        config.backend_url = Some(url);
    }
    if let Some(key) = cli.anon_key {
        config.anon_key = Some(key);
    }
    if let Some(guard) = cli.profile_guard {
        config.profile_guard = guard;
    }

    let backend = config.backend()?;
    let store = SessionStore::new(config.cache_dir()?);
    let auth = Arc::new(AuthClient::new(&backend, Some(store)).context("Failed to create auth client")?);
    let rest = RestClient::new(&backend).context("Failed to create data client")?;

    let profiles: Arc<dyn ProfileLookup> = Arc::new(rest.clone());
    let manager = SessionManager::start(auth.clone(), profiles, SessionOptions::from_config(&config));
    let state = manager.wait_until_resolved().await;
    debug!(signed_in = state.is_authenticated(), "Initial session resolved");

    let mut ctx = AppContext {
        config,
        auth,
        rest,
        manager,
    };
    let result = commands::run(&mut ctx, cli.command).await;

    let AppContext { config, manager, .. } = ctx;
    manager.shutdown().await;
    if let Err(e) = config.save() {
        debug!(error = %e, "Failed to save config");
    }

    info!("rentledger finished");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_profile_guard_flag() {
        let cli = Cli::try_parse_from(["rentledger", "--profile-guard", "Strict", "whoami"])
            .expect("valid arguments");
        assert_eq!(cli.profile_guard, Some(ProfileGuard::Strict));
        assert!(Cli::try_parse_from(["rentledger", "--profile-guard", "loose", "whoami"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rentledger", "whoami", "--profile-guard", "lenient"])
            .expect("valid arguments");
        assert_eq!(cli.profile_guard, Some(ProfileGuard::Lenient));
        assert!(matches!(cli.command, Command::Whoami));
    }
}
