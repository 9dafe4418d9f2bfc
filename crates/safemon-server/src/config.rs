use safemon_lookup::safe_browsing::DEFAULT_ENDPOINT;
use safemon_lookup::SafeBrowsingConfig;
use safemon_notify::channels::DEFAULT_API_BASE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Snowflake machine id, `0..32`. Give each host sharing a database its
    /// own value; the server and CLI already differ by node id.
    #[serde(default = "default_machine_id")]
    pub machine_id: i32,
    /// Link appended to flagged-domain alerts.
    #[serde(default)]
    pub dashboard_url: Option<String>,

    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub safe_browsing: SafeBrowsingSection,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            machine_id: default_machine_id(),
            dashboard_url: None,
            scan: ScanConfig::default(),
            safe_browsing: SafeBrowsingSection::default(),
            telegram: TelegramSection::default(),
            trigger: TriggerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_scan_enabled")]
    pub enabled: bool,
    #[serde(default = "default_scan_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
    /// Send a summary message after every cycle, not only on new flags.
    #[serde(default)]
    pub notify_summary: bool,
    /// Lifetime of the cross-process scan lease. Must outlast a full cycle.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: default_scan_enabled(),
            interval_secs: default_scan_interval_secs(),
            run_on_startup: default_run_on_startup(),
            notify_summary: false,
            lease_secs: default_lease_secs(),
        }
    }
}

fn default_scan_enabled() -> bool {
    true
}

fn default_scan_interval_secs() -> u64 {
    1800
}

fn default_run_on_startup() -> bool {
    true
}

fn default_lease_secs() -> u64 {
    900
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeBrowsingSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_safe_browsing_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_lookup_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SafeBrowsingSection {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_safe_browsing_endpoint(),
            client_id: default_client_id(),
            client_version: default_client_version(),
            timeout_secs: default_lookup_timeout_secs(),
        }
    }
}

fn default_safe_browsing_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_client_id() -> String {
    "domain-safety-monitor".to_string()
}

fn default_client_version() -> String {
    "1.0.0".to_string()
}

fn default_lookup_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSection {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default = "default_telegram_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_api_base(),
            timeout_secs: default_telegram_timeout_secs(),
        }
    }
}

impl TelegramSection {
    /// Both credentials, or `None` when notifications are disabled.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => Some((token, chat)),
            _ => None,
        }
    }
}

fn default_telegram_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_telegram_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Bearer secret required by every trigger endpoint except health.
    #[serde(default)]
    pub secret: Option<String>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_machine_id() -> i32 {
    1
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{path}': {e}"))?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overrides secrets from the environment. Empty values count as absent,
    /// both here and in the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = env("GOOGLE_API_KEY") {
            self.safe_browsing.api_key = Some(v);
        }
        if let Some(v) = env("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = env("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
        if let Some(v) = env("CRON_SECRET") {
            self.trigger.secret = Some(v);
        }
        if let Some(v) = env("DASHBOARD_URL") {
            self.dashboard_url = Some(v);
        }

        for slot in [
            &mut self.safe_browsing.api_key,
            &mut self.telegram.bot_token,
            &mut self.telegram.chat_id,
            &mut self.trigger.secret,
            &mut self.dashboard_url,
        ] {
            if slot.as_deref().is_some_and(str::is_empty) {
                *slot = None;
            }
        }
    }

    /// Whether a non-empty Safe Browsing key is present.
    pub fn has_lookup_key(&self) -> bool {
        self.safe_browsing
            .api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty())
    }

    pub fn safe_browsing_config(&self) -> SafeBrowsingConfig {
        SafeBrowsingConfig {
            api_key: self.safe_browsing.api_key.clone(),
            endpoint: self.safe_browsing.endpoint.clone(),
            client_id: self.safe_browsing.client_id.clone(),
            client_version: self.safe_browsing.client_version.clone(),
            timeout_secs: self.safe_browsing.timeout_secs,
        }
    }
}
