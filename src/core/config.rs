use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "farmhand.toml";
pub const DEFAULT_BASE_URL: &str = "https://fintopio-tg.fintopio.com/api";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FarmConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// One authentication payload per line; line order is processing order.
    #[serde(default = "default_accounts_file")]
    pub accounts: PathBuf,

    /// Optional `user:pass:host:port` list.
    #[serde(default = "default_proxies_file")]
    pub proxies: PathBuf,
}

/// Which observed diamond timestamps seed the next cycle's wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WakePolicy {
    /// Only the account at index 0 counts.
    #[default]
    FirstAccount,
    /// The earliest timestamp seen across every account.
    Earliest,
}

/// Inclusive `[min, max]` range, written as a two element array in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DelayRange(pub u64, pub u64);

impl DelayRange {
    pub fn min(self) -> u64 {
        self.0.min(self.1)
    }

    pub fn max(self) -> u64 {
        self.0.max(self.1)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub wake_policy: WakePolicy,

    /// Signed jitter added to every countdown, in seconds.
    #[serde(default = "default_countdown_jitter_secs")]
    pub countdown_jitter_secs: u64,

    #[serde(default = "default_farming_delay_secs")]
    pub farming_delay_secs: DelayRange,

    #[serde(default = "default_task_delay_secs")]
    pub task_delay_secs: DelayRange,

    #[serde(default = "default_diamond_delay_secs")]
    pub diamond_delay_secs: DelayRange,

    #[serde(default = "default_account_delay_secs")]
    pub account_delay_secs: DelayRange,

    /// Used when no diamond timestamp is available for the next cycle.
    #[serde(default = "default_idle_delay_secs")]
    pub idle_delay_secs: DelayRange,

    /// Half-width of the window added around the diamond timestamp.
    #[serde(default = "default_wake_jitter_ms")]
    pub wake_jitter_ms: u64,

    /// Pause between the simulated click and the diamond claim request.
    #[serde(default = "default_claim_pause_ms")]
    pub claim_pause_ms: DelayRange,

    #[serde(default = "default_misclick_chance")]
    pub misclick_chance: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_accounts_file() -> PathBuf {
    PathBuf::from("data.txt")
}
fn default_proxies_file() -> PathBuf {
    PathBuf::from("proxy.txt")
}
fn default_countdown_jitter_secs() -> u64 {
    3
}
fn default_farming_delay_secs() -> DelayRange {
    DelayRange(5, 15)
}
fn default_task_delay_secs() -> DelayRange {
    DelayRange(3, 8)
}
fn default_diamond_delay_secs() -> DelayRange {
    DelayRange(10, 20)
}
fn default_account_delay_secs() -> DelayRange {
    DelayRange(10, 20)
}
fn default_idle_delay_secs() -> DelayRange {
    DelayRange(30, 60)
}
fn default_wake_jitter_ms() -> u64 {
    150_000
}
fn default_claim_pause_ms() -> DelayRange {
    DelayRange(1_000, 5_999)
}
fn default_misclick_chance() -> f64 {
    0.1
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_file() -> PathBuf {
    PathBuf::from("logfile.log")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            accounts: default_accounts_file(),
            proxies: default_proxies_file(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            wake_policy: WakePolicy::default(),
            countdown_jitter_secs: default_countdown_jitter_secs(),
            farming_delay_secs: default_farming_delay_secs(),
            task_delay_secs: default_task_delay_secs(),
            diamond_delay_secs: default_diamond_delay_secs(),
            account_delay_secs: default_account_delay_secs(),
            idle_delay_secs: default_idle_delay_secs(),
            wake_jitter_ms: default_wake_jitter_ms(),
            claim_pause_ms: default_claim_pause_ms(),
            misclick_chance: default_misclick_chance(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

impl TelegramConfig {
    /// Token and chat id, when both are set and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let chat = self.chat_id.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        Some((token, chat))
    }
}

impl FarmConfig {
    /// Loads `path`, or `farmhand.toml` in the working directory when no path is given.
    /// A missing default file yields the built-in defaults; a missing explicit file is an error.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !config_path.exists() {
            if explicit {
                return Err(anyhow!(
                    "Config file {} does not exist",
                    config_path.display()
                ));
            }
            info!("No {} found, using defaults.", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config in {}", config_path.display()))?;
        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: FarmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.schedule.misclick_chance) {
            return Err(anyhow!(
                "schedule.misclick_chance must be within [0, 1], got {}",
                self.schedule.misclick_chance
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(anyhow!("api.base_url must not be empty"));
        }
        Ok(())
    }

    /// Environment values win over the file for Telegram credentials.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat) = lookup("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(chat);
        }
        if let Some(base_url) = lookup("FARMHAND_BASE_URL") {
            self.api.base_url = base_url;
        }
    }
}
