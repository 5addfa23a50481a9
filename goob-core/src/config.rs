// ABOUTME: Configuration parsing from TOML file with environment variable overrides.
// ABOUTME: Validates timezone, birthday dates, and credentials; secrets are redacted from Debug output.

use crate::paths;
use crate::store::RetryPolicy;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// IANA timezone used for calendar decisions such as "today"
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub dupe: DupeConfig,
    /// username -> YYYY-MM-DD
    #[serde(default)]
    pub birthdays: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            store: StoreConfig::default(),
            timezone: default_timezone(),
            dupe: DupeConfig::default(),
            birthdays: BTreeMap::new(),
            reply: None,
            live: None,
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Username allowed to run admin commands in a private chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_username: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            poll_timeout_secs: default_poll_timeout_secs(),
            owner_username: None,
        }
    }
}

impl TelegramConfig {
    /// Owner username without a leading '@'
    pub fn owner(&self) -> Option<&str> {
        self.owner_username
            .as_deref()
            .map(|name| name.trim().trim_start_matches('@'))
            .filter(|name| !name.is_empty())
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("owner_username", &self.owner_username)
            .finish()
    }
}

fn default_poll_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; defaults to the data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Setting this enables the legacy dual-write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_path: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_secs: default_busy_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            legacy_path: None,
        }
    }
}

impl StoreConfig {
    pub fn db_path(&self) -> PathBuf {
        self.path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::db_file)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }
}

fn default_busy_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DupeConfig {
    #[serde(default)]
    pub ignored_domains: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Template for the user turn; `{message}` is replaced by the message text
    #[serde(default = "default_user_prompt")]
    pub user_prompt: String,
    #[serde(default = "default_true")]
    pub use_history: bool,
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    #[serde(default = "default_history_preamble")]
    pub history_preamble: String,
    /// Regex matching messages addressed to the bot by name
    #[serde(default = "default_address_pattern")]
    pub address_pattern: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            system_prompt: String::new(),
            user_prompt: default_user_prompt(),
            use_history: true,
            history_depth: default_history_depth(),
            history_preamble: default_history_preamble(),
            address_pattern: default_address_pattern(),
        }
    }
}

impl std::fmt::Debug for ReplyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("user_prompt", &self.user_prompt)
            .field("use_history", &self.use_history)
            .field("history_depth", &self.history_depth)
            .field("history_preamble", &self.history_preamble)
            .field("address_pattern", &self.address_pattern)
            .finish()
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_user_prompt() -> String {
    "{message}".to_string()
}

fn default_true() -> bool {
    true
}

fn default_history_depth() -> usize {
    20
}

fn default_history_preamble() -> String {
    "Recent messages in this chat, oldest first:".to_string()
}

fn default_address_pattern() -> String {
    r"(?i)^(gooby|губи|губ(я)+н),.*$".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub streams: Vec<String>,
    #[serde(default = "default_live_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            streams: Vec::new(),
            poll_interval_secs: default_live_poll_interval_secs(),
        }
    }
}

impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("streams", &self.streams)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .finish()
    }
}

impl LiveConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

fn default_live_poll_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus listen address, e.g. "127.0.0.1:9464"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
}

fn default_timezone() -> String {
    // Try to detect system timezone, fall back to UTC
    if let Ok(tz) = std::env::var("TZ") {
        if tz.parse::<chrono_tz::Tz>().is_ok() {
            return tz;
        }
    }
    #[cfg(unix)]
    {
        if let Ok(link) = std::fs::read_link("/etc/localtime") {
            if let Some(tz) = link.to_str() {
                // e.g. /usr/share/zoneinfo/Europe/Moscow
                if let Some(pos) = tz.find("zoneinfo/") {
                    let detected = tz[pos + 9..].to_string();
                    if detected.parse::<chrono_tz::Tz>().is_ok() {
                        return detected;
                    }
                }
            }
        }
    }
    "UTC".to_string()
}

/// Expand a leading `~/` to the home directory
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(path = %path, "Could not expand tilde: no home directory");
    }
    path.to_string()
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Find the config file, checking in order:
    /// 1. GOOB_CONFIG_PATH env var (if set)
    /// 2. ./config.toml
    /// 3. ~/.config/goob/config.toml
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("GOOB_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load from the first config file found, or defaults, then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_file() {
            Some(path) => Self::read_file(&path)?,
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };
        config.finalize()
    }

    /// Load a specific file, skipping the search order
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::read_file(path)?.finalize()
    }

    /// Parse TOML text, apply environment overrides, and validate
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content)
            .context("Failed to parse config")?
            .finalize()
    }

    fn read_file(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn finalize(mut self) -> Result<Self> {
        self.apply_env();
        self.store.path = self.store.path.as_deref().map(expand_tilde);
        self.store.legacy_path = self.store.legacy_path.as_deref().map(expand_tilde);
        self.validate()?;
        Ok(self)
    }

    fn apply_env(&mut self) {
        if let Some(val) = non_empty_env("GOOB_TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(val);
        }
        if let Some(val) = non_empty_env("GOOB_OWNER_USERNAME") {
            self.telegram.owner_username = Some(val);
        }
        if let Some(val) = non_empty_env("GOOB_DB_PATH") {
            self.store.path = Some(val);
        }
        if let Some(val) = non_empty_env("GOOB_LEGACY_DB_PATH") {
            self.store.legacy_path = Some(val);
        }
        if let Some(val) = non_empty_env("GOOB_TIMEZONE") {
            self.timezone = val;
        }
        if let Some(val) = non_empty_env("OPENAI_API_KEY") {
            self.reply.get_or_insert_with(ReplyConfig::default).api_key = Some(val);
        }
        // Credentials alone don't enable polling without a watch-list
        if let Some(live) = self.live.as_mut() {
            if let Some(val) = non_empty_env("TWITCH_CLIENT_ID") {
                live.client_id = Some(val);
            }
            if let Some(val) = non_empty_env("TWITCH_CLIENT_SECRET") {
                live.client_secret = Some(val);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            anyhow::bail!(
                "Invalid timezone '{}'. Use IANA timezone names like 'Europe/Moscow', 'UTC'",
                self.timezone
            );
        }

        self.birthday_dates()?;

        if let Some(live) = &self.live {
            if !live.streams.is_empty() && (live.client_id.is_none() || live.client_secret.is_none()) {
                anyhow::bail!(
                    "live.client_id and live.client_secret are required when live.streams is set (or TWITCH_CLIENT_ID / TWITCH_CLIENT_SECRET)"
                );
            }
        }

        if let Some(listen) = &self.metrics.listen {
            listen
                .parse::<std::net::SocketAddr>()
                .with_context(|| format!("Invalid metrics.listen address '{}'", listen))?;
        }

        Ok(())
    }

    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Parsed birthdays, sorted by username
    pub fn birthday_dates(&self) -> Result<Vec<(String, NaiveDate)>> {
        self.birthdays
            .iter()
            .map(|(user, date)| -> Result<(String, NaiveDate)> {
                let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").with_context(|| {
                    format!("Invalid birthday for '{}': '{}' (expected YYYY-MM-DD)", user, date)
                })?;
                Ok((user.trim_start_matches('@').to_string(), parsed))
            })
            .collect()
    }

    /// Reply settings when an API key is available
    pub fn reply_settings(&self) -> Option<&ReplyConfig> {
        self.reply
            .as_ref()
            .filter(|r| r.api_key.as_deref().is_some_and(|k| !k.is_empty()))
    }

    /// Live settings when there is something to watch
    pub fn live_settings(&self) -> Option<&LiveConfig> {
        self.live.as_ref().filter(|l| !l.streams.is_empty())
    }
}
