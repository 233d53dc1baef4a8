use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory with the stylesheet and the loan-request autosave script
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Key rate limits on X-Forwarded-For / X-Real-IP instead of the peer
    /// address. Only enable behind a reverse proxy that sets them.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
            trust_proxy_headers: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a session before it must be refreshed
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Accounts created with this email start with the admin role
    #[serde(default)]
    pub admin_email: Option<String>,
    /// Mark session cookies `Secure` (enable behind TLS)
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            admin_email: None,
            secure_cookies: false,
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,
    /// Sign-in attempts per client IP per window
    #[serde(default = "default_sign_in_attempts")]
    pub sign_in_attempts: u32,
    /// Sign-up attempts per client IP per window
    #[serde(default = "default_sign_up_attempts")]
    pub sign_up_attempts: u32,
    /// Deals a single user may create per window
    #[serde(default = "default_deal_creations")]
    pub deal_creations: u32,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_minutes: default_window_minutes(),
            sign_in_attempts: default_sign_in_attempts(),
            sign_up_attempts: default_sign_up_attempts(),
            deal_creations: default_deal_creations(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_window_minutes() -> u64 {
    15
}

fn default_sign_in_attempts() -> u32 {
    10
}

fn default_sign_up_attempts() -> u32 {
    5
}

fn default_deal_creations() -> u32 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        Ok(config)
    }

    /// The admin email, normalised for comparison
    pub fn admin_email(&self) -> Option<String> {
        self.auth
            .admin_email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
    }
}
