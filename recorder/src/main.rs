//! twrec – watches one Twitch channel and records every broadcast with
//! streamlink.
//!
//! This binary:
//! 1. Reads configuration from `twrec.conf` (plus environment overrides)
//! 2. Checks that streamlink is installed, obtains an OAuth token and
//!    verifies that the channel exists
//! 3. Polls the channel forever, recording each live session to
//!    `<root>/<login>/`

mod api;
mod auth;
mod capture;
mod session;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use twrec_common::config::{self, MIN_REFRESH_SECS};

use crate::api::HelixClient;
use crate::auth::CredentialManager;
use crate::capture::Streamlink;
use crate::session::{SessionController, Settings};

#[derive(Parser)]
#[command(name = "twrec")]
#[command(about = "Record a Twitch channel whenever it goes live")]
#[command(version)]
struct Cli {
    /// Channel login to watch
    #[arg(short, long)]
    username: String,

    /// Stream quality passed to streamlink
    #[arg(short, long, default_value = "best")]
    quality: String,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,

    /// Config file (defaults to ./twrec.conf when present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // ── load config ──────────────────────────────────────────────────
    let config_result = config::load_or_default(cli.config.as_deref());
    let log_level = match (&config_result, cli.debug) {
        (_, true) => "debug".to_string(),
        (Ok(c), false) => c.log_level.clone(),
        (Err(_), false) => "info".to_string(),
    };
    init_logging(&log_level);
    let mut config = config_result.context("Config load failed")?;

    info!("Twitch recorder starting (channel={}, quality={})", cli.username, cli.quality);

    if config.clamp_refresh() {
        warn!(
            "Check interval should not be lower than {MIN_REFRESH_SECS} seconds, using {MIN_REFRESH_SECS}"
        );
    }
    if config.client_id.is_empty() {
        anyhow::bail!("TWITCH_CLIENT_ID is not set (config file or environment)");
    }

    // ── startup checks ───────────────────────────────────────────────
    capture::check_streamlink(&config.streamlink_path)?;

    let client = HelixClient::new(&config)?;
    let credentials =
        CredentialManager::acquire_initial(client.clone()).context("Cannot get OAuth token")?;

    info!("Checking user exists...");
    let user = client
        .find_user(&cli.username, credentials.credential())
        .context("Channel check failed")?;
    info!("Found channel {} (id={})", user.display_name, user.id);

    let output_dir = config.channel_dir(&cli.username);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Cannot create {}", output_dir.display()))?;

    // ── ctrl-c ───────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
        info!("Shutdown signal received");
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── poll forever ─────────────────────────────────────────────────
    let settings = Settings {
        login: cli.username,
        quality: cli.quality,
        output_dir,
        refresh: Duration::from_secs(config.refresh_secs),
        max_file_suffix: config.max_file_suffix,
    };
    let capturer = Streamlink::new(&config.streamlink_path, shutdown.clone());
    let mut controller = SessionController::new(settings, credentials, client, capturer, shutdown);
    controller.run();

    info!("Twitch recorder stopped");
    Ok(())
}

fn init_logging(default_level: &str) {
    let (filter, invalid) = log_filter(default_level);
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if invalid {
        warn!("Invalid LOG_LEVEL {default_level:?}, using info");
    }
}

/// `RUST_LOG` if set, else `level`, else `info`.  The flag reports an
/// unusable `level`.
fn log_filter(level: &str) -> (EnvFilter, bool) {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return (filter, false);
    }
    match EnvFilter::try_new(level) {
        Ok(filter) if is_level(level) => (filter, false),
        _ => (EnvFilter::new("info"), true),
    }
}

/// Whether `level` is a plain level name (`debug`, `INFO`, `off`, ...).
fn is_level(level: &str) -> bool {
    level.parse::<LevelFilter>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["twrec", "-u", "foo"]).unwrap();
        assert_eq!(cli.username, "foo");
        assert_eq!(cli.quality, "best");
        assert!(!cli.debug);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_long_flags() {
        let cli = Cli::try_parse_from([
            "twrec",
            "--username",
            "bar",
            "--quality",
            "720p60",
            "--debug",
            "--config",
            "/etc/twrec.conf",
        ])
        .unwrap();
        assert_eq!(cli.quality, "720p60");
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/twrec.conf")));
    }

    #[test]
    fn test_level_names_are_accepted() {
        assert!(is_level("debug"));
        assert!(is_level("WARN"));
        assert!(is_level("off"));
    }

    #[test]
    fn test_typo_level_falls_back_to_info() {
        // `verbose` parses as a target directive and would silence everything
        assert!(!is_level("verbose"));
        if std::env::var("RUST_LOG").is_err() {
            let (_, invalid) = log_filter("verbose");
            assert!(invalid);
            let (_, invalid) = log_filter("debug");
            assert!(!invalid);
        }
    }

    #[test]
    fn test_cli_requires_username() {
        assert!(Cli::try_parse_from(["twrec"]).is_err());
    }
}
