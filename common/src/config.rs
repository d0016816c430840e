//! Configuration parsing – reads a KEY=VALUE file (`twrec.conf`) and lets
//! environment variables of the same name override individual keys.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

/// Poll intervals below this are raised to it at startup.
pub const MIN_REFRESH_SECS: u64 = 5;

/// Keys that may be overridden from the environment.
const ENV_KEYS: &[&str] = &[
    "TWITCH_CLIENT_ID",
    "TWITCH_CLIENT_SECRET",
    "TOKEN_URL",
    "API_BASE_URL",
    "ROOT_DIR",
    "STREAMLINK_PATH",
    "REFRESH_SECS",
    "MAX_FILE_SUFFIX",
    "LOG_LEVEL",
];

/// Recorder configuration, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ── platform API ─────────────────────────────────────────────────
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub api_base_url: String,

    // ── recording ────────────────────────────────────────────────────
    /// Recordings land in `<root_dir>/<login>/`.
    pub root_dir: PathBuf,
    pub streamlink_path: String,
    /// Poll interval in seconds.
    pub refresh_secs: u64,
    /// Highest ` (n)` suffix tried before giving up on a file name.
    pub max_file_suffix: u32,

    // ── logging ──────────────────────────────────────────────────────
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

impl Config {
    /// Config file looked up in the working directory when `--config`
    /// is not given.
    pub fn default_path() -> &'static str {
        "twrec.conf"
    }

    /// Directory holding all recordings of `login`.
    pub fn channel_dir(&self, login: &str) -> PathBuf {
        self.root_dir.join(login)
    }

    /// Raise `refresh_secs` to [`MIN_REFRESH_SECS`].  Returns `true` when
    /// the configured value had to be changed.
    pub fn clamp_refresh(&mut self) -> bool {
        if self.refresh_secs < MIN_REFRESH_SECS {
            self.refresh_secs = MIN_REFRESH_SECS;
            true
        } else {
            false
        }
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| -> Option<String> { map.get(key).cloned() };

        Config {
            client_id: get("TWITCH_CLIENT_ID").unwrap_or_default(),
            client_secret: get("TWITCH_CLIENT_SECRET").unwrap_or_default(),
            token_url: get("TOKEN_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://id.twitch.tv/oauth2/token".into()),
            api_base_url: get("API_BASE_URL")
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.twitch.tv/helix".into()),

            root_dir: PathBuf::from(get("ROOT_DIR").unwrap_or_else(|| "./".into())),
            streamlink_path: get("STREAMLINK_PATH")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "streamlink".into()),
            refresh_secs: get("REFRESH_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(MIN_REFRESH_SECS),
            max_file_suffix: get("MAX_FILE_SUFFIX")
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::output::MAX_SUFFIX),

            log_level: get("LOG_LEVEL")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "info".into()),
        }
    }
}

/// Parse a `KEY=VALUE` configuration file, then apply environment
/// overrides.
///
/// Lines starting with `#` are comments.  Values may be optionally
/// double-quoted.  Unknown keys are silently ignored.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let mut map = parse_conf(&text);
    info!("Loaded config from {}", path.display());

    apply_overrides(&mut map, |key| std::env::var(key).ok());
    Ok(Config::from_map(&map))
}

/// Load `path` when given, otherwise the default file if it exists,
/// otherwise built-in defaults.  Environment overrides apply in every case.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return load(path);
    }

    let default = Path::new(Config::default_path());
    if default.is_file() {
        return load(default);
    }

    info!("No config file found, using defaults");
    let mut map = HashMap::new();
    apply_overrides(&mut map, |key| std::env::var(key).ok());
    Ok(Config::from_map(&map))
}

fn apply_overrides(map: &mut HashMap<String, String>, lookup: impl Fn(&str) -> Option<String>) {
    for key in ENV_KEYS {
        if let Some(val) = lookup(key) {
            map.insert((*key).to_string(), val);
        }
    }
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────
