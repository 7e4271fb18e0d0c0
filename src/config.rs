//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (SKG_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [storage]
//! data_dir = "/var/lib/skgstat/data"
//! base_data_file = "/var/lib/skgstat/BASE_DATA.json"
//!
//! [session]
//! secret = "change-me"
//! retention_days = 14
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! SKG_STORAGE__DATA_DIR=/custom/path
//! SKG_SESSION__REQUIRE_LOGIN=true
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Data directory and base dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding seed datasets and all private stores
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// JSON catalog mapping base dataset keys to display labels
    #[serde(default = "default_base_data_file")]
    pub base_data_file: PathBuf,

    /// Store used by sessions that declined a private copy
    #[serde(default = "default_shared_db_name")]
    pub shared_db_name: String,
}

/// Session token and retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie key holding the signed session token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Token signing secret (MUST be set in production, otherwise tokens
    /// do not survive a restart)
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Token lifetime after accepting the consent dialog
    #[serde(default = "default_consent_ttl_days")]
    pub consent_ttl_days: i64,

    /// Token lifetime after declining the consent dialog
    #[serde(default = "default_decline_ttl_days")]
    pub decline_ttl_days: i64,

    /// Token lifetime after a successful login
    #[serde(default = "default_login_ttl_days")]
    pub login_ttl_days: i64,

    /// Require an authenticated identity before any page is served
    #[serde(default)]
    pub require_login: bool,

    /// Age after which anonymous private stores are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Length of generated anonymous identifiers
    #[serde(default = "default_user_id_length")]
    pub user_id_length: usize,

    /// Mark the session cookie `Secure` (HTTPS deployments)
    #[serde(default)]
    pub secure_cookie: bool,
}

/// External identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Enable the login flow
    #[serde(default)]
    pub enabled: bool,

    /// Web API key appended as `?key=` to provider calls
    #[serde(default)]
    pub api_key: String,

    /// Email/password sign-in endpoint
    #[serde(default = "default_sign_in_url")]
    pub sign_in_url: String,

    /// Profile lookup endpoint (exchanges an id token for the account record)
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_identity_timeout_ms")]
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional log file; stderr when unset
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Page layout hint forwarded to chapter handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Wide,
    Centered,
}

impl std::str::FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wide" => Ok(Layout::Wide),
            "centered" => Ok(Layout::Centered),
            _ => Err(format!("Unknown layout '{s}'. Valid layouts: wide, centered")),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// HTTP server bind address
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Browser page title
    #[serde(default = "default_page_title")]
    pub page_title: String,

    /// Base page layout
    #[serde(default)]
    pub layout: Layout,

    /// Allowed CORS origins (empty = same-origin only, unless cors_allow_all is true)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Explicitly allow all CORS origins (dev mode opt-in)
    #[serde(default)]
    pub cors_allow_all: bool,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_base_data_file() -> PathBuf {
    PathBuf::from("./BASE_DATA.json")
}
fn default_shared_db_name() -> String {
    "shared.db".to_string()
}
fn default_cookie_name() -> String {
    "skg_opts".to_string()
}
fn default_secret() -> String {
    uuid::Uuid::new_v4().to_string()
}
fn default_consent_ttl_days() -> i64 {
    14
}
fn default_decline_ttl_days() -> i64 {
    1
}
fn default_login_ttl_days() -> i64 {
    30
}
fn default_retention_days() -> i64 {
    14
}
fn default_user_id_length() -> usize {
    24
}
fn default_sign_in_url() -> String {
    "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword".to_string()
}
fn default_lookup_url() -> String {
    "https://identitytoolkit.googleapis.com/v1/accounts:lookup".to_string()
}
fn default_identity_timeout_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    crate::protocol::DEFAULT_PORT
}
fn default_page_title() -> String {
    "Uncertainty by hydrocode".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (SKG_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("SKG_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SKG_").split("__"))
            .extract()
    }

    /// Create default configuration
    pub fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            session: SessionConfig::default(),
            identity: IdentityConfig::default(),
            logging: LoggingConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: default_data_dir(),
            base_data_file: default_base_data_file(),
            shared_db_name: default_shared_db_name(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            cookie_name: default_cookie_name(),
            secret: default_secret(),
            consent_ttl_days: default_consent_ttl_days(),
            decline_ttl_days: default_decline_ttl_days(),
            login_ttl_days: default_login_ttl_days(),
            require_login: false,
            retention_days: default_retention_days(),
            user_id_length: default_user_id_length(),
            secure_cookie: false,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            enabled: false,
            api_key: String::new(),
            sign_in_url: default_sign_in_url(),
            lookup_url: default_lookup_url(),
            timeout_ms: default_identity_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
            page_title: default_page_title(),
            layout: Layout::default(),
            cors_origins: Vec::new(),
            cors_allow_all: false,
        }
    }
}
