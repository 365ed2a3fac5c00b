//! slackdesk configuration loader.
//!
//! Order: optional TOML file, then environment overrides, then validation.

use sd_ticket::TicketDefaults;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackdeskConfig {
    #[serde(default)]
    pub otrs: OtrsConfig,
    #[serde(default)]
    pub ticket: TicketConfig,
    #[serde(default)]
    pub slack: SlackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtrsConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default = "default_webservice")]
    pub webservice: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    /// Default: `~/.slackdesk/token`.
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default = "default_token_max_age_secs")]
    pub token_max_age_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_webservice() -> String {
    sd_otrs::DEFAULT_WEBSERVICE.to_string()
}

fn default_token_max_age_secs() -> u64 {
    sd_otrs::DEFAULT_TOKEN_MAX_AGE.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    sd_otrs::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_max_retries() -> u32 {
    sd_otrs::DEFAULT_MAX_RETRIES
}

fn default_retry_backoff_ms() -> u64 {
    3000
}

impl Default for OtrsConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            webservice: default_webservice(),
            login: String::new(),
            password: String::new(),
            token_file: None,
            token_max_age_secs: default_token_max_age_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl OtrsConfig {
    pub fn token_path(&self) -> PathBuf {
        self.token_file
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("token"))
    }

    pub fn token_max_age(&self) -> Duration {
        Duration::from_secs(self.token_max_age_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketConfig {
    #[serde(default)]
    pub customer: String,
    /// Dynamic field holding the Slack `ts`; enables duplicate suppression when set.
    #[serde(default)]
    pub dedup_dynamic_field: Option<String>,
    #[serde(flatten)]
    pub defaults: TicketDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Socket-mode app token. Accepted for compatibility; polling does not need it.
    #[serde(default)]
    pub app_token: String,
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default = "default_slack_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_slack_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_slack_start_from_latest")]
    pub start_from_latest: bool,
    /// Bot ids whose messages become tickets. Empty admits nothing.
    #[serde(default)]
    pub allowed_bot_ids: Vec<String>,
}

fn default_slack_poll_interval_ms() -> u64 {
    3000
}

fn default_slack_history_limit() -> usize {
    100
}

fn default_slack_start_from_latest() -> bool {
    true
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            app_token: String::new(),
            channel_ids: Vec::new(),
            poll_interval_ms: default_slack_poll_interval_ms(),
            history_limit: default_slack_history_limit(),
            start_from_latest: default_slack_start_from_latest(),
            allowed_bot_ids: Vec::new(),
        }
    }
}

/// What the loaded config will be used for; each mode needs a different subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Serve,
    CreateTicket,
    History,
}

impl SlackdeskConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut cfg = match resolve_config_path(path) {
            Some(path) => {
                let contents = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
                Self::from_toml(&contents)
                    .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.normalize();
        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let mut cfg: SlackdeskConfig = toml::from_str(contents)?;
        cfg.normalize();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("OTRS_SERVER") {
            self.otrs.server = v;
        }
        if let Some(v) = var("OTRS_WEBSERVICE") {
            self.otrs.webservice = v;
        }
        if let Some(v) = var("OTRS_LOGIN") {
            self.otrs.login = v;
        }
        if let Some(v) = var("OTRS_PASSWORD") {
            self.otrs.password = v;
        }
        if let Some(v) = var("OTRS_TOKEN_FILE") {
            self.otrs.token_file = Some(v);
        }
        if let Some(v) = var("OTRS_QUEUE") {
            self.ticket.defaults.queue = v;
        }
        if let Some(v) = var("OTRS_SERVICE") {
            self.ticket.defaults.service_id = v;
        }
        if let Some(v) = var("OTRS_CUSTOMER") {
            self.ticket.customer = v;
        }
        if let Some(v) = var("OTRS_DEDUP_FIELD") {
            self.ticket.dedup_dynamic_field = Some(v);
        }
        if let Some(v) = var("SLACK_BOT_TOKEN") {
            self.slack.bot_token = v;
        }
        if let Some(v) = var("SLACK_APP_TOKEN") {
            self.slack.app_token = v;
        }
        if let Some(v) = var("SLACK_CHANNEL_IDS") {
            self.slack.channel_ids = parse_list(&v);
        }
        if let Some(v) = var("ALLOWED_BOT_IDS") {
            self.slack.allowed_bot_ids = parse_list(&v);
        }
    }

    fn normalize(&mut self) {
        self.otrs.server = self.otrs.server.trim().to_string();
        self.otrs.login = self.otrs.login.trim().to_string();
        self.ticket.customer = self.ticket.customer.trim().to_string();
        self.slack.bot_token = self.slack.bot_token.trim().to_string();
        self.slack.channel_ids = clean_list(&self.slack.channel_ids);
        self.slack.allowed_bot_ids = clean_list(&self.slack.allowed_bot_ids);
    }

    /// Every problem that would stop `mode` from running, in a stable order.
    pub fn problems(&self, mode: Mode) -> Vec<String> {
        let mut problems = Vec::new();
        let needs_otrs = matches!(mode, Mode::Serve | Mode::CreateTicket);
        let needs_slack = matches!(mode, Mode::Serve | Mode::History);

        if needs_otrs {
            if self.otrs.server.is_empty() {
                problems.push("otrs.server (OTRS_SERVER) is required".to_string());
            }
            if self.otrs.login.is_empty() {
                problems.push("otrs.login (OTRS_LOGIN) is required".to_string());
            }
            if self.otrs.webservice.trim().is_empty() {
                problems.push("otrs.webservice must not be empty".to_string());
            }
            if self.otrs.request_timeout_secs == 0 {
                problems.push("otrs.request_timeout_secs must be > 0".to_string());
            }
            if self.otrs.token_max_age_secs == 0 {
                problems.push("otrs.token_max_age_secs must be > 0".to_string());
            }
            if self.ticket.defaults.queue.trim().is_empty() {
                problems.push("ticket.queue (OTRS_QUEUE) is required".to_string());
            }
            if self.ticket.customer.is_empty() {
                problems.push("ticket.customer (OTRS_CUSTOMER) is required".to_string());
            }
        }
        if needs_slack && self.slack.bot_token.is_empty() {
            problems.push("slack.bot_token (SLACK_BOT_TOKEN) is required".to_string());
        }
        if mode == Mode::Serve {
            if self.slack.channel_ids.is_empty() {
                problems.push("slack.channel_ids (SLACK_CHANNEL_IDS) needs at least one channel".to_string());
            }
            if self.slack.poll_interval_ms == 0 {
                problems.push("slack.poll_interval_ms must be > 0".to_string());
            }
        }
        problems
    }

    pub fn validate(&self, mode: Mode) -> anyhow::Result<()> {
        let problems = self.problems(mode);
        if problems.is_empty() {
            return Ok(());
        }
        Err(anyhow::anyhow!("invalid config: {}", problems.join("; ")))
    }
}

/// Comma-separated list; items trimmed, blanks dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }
    if let Ok(v) = std::env::var("SLACKDESK_CONFIG") {
        if !v.trim().is_empty() {
            return Some(PathBuf::from(v));
        }
    }
    let default = default_config_path();
    default.exists().then_some(default)
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".slackdesk").join("config.toml")
}

pub fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".slackdesk")
}
