//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with TREEHOLE_, sections split by `__`)
//! 2. Config file (treehole.toml, or the path in TREEHOLE_CONFIG)
//! 3. Default values
//!
//! Secrets like the admin token, the cookie signing key and the moderation
//! API key should be kept in environment variables, not in the config file.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "treehole.toml";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Cookie signing key, at least 64 bytes (should be in env var TREEHOLE_SERVER__SECRET_KEY)
    pub secret_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            secret_key: String::new(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sea-orm connection URL; sqlite:// or postgres://
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://treehole.db?mode=rwc".to_string(),
        }
    }
}

/// Account and session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// The single account with moderation authority. Can never be banned.
    pub super_admin_username: String,
    /// Usernames granted `is_admin` when they register
    pub admin_usernames: Vec<String>,
    /// Static credential accepted in the X-Admin-Token header. Empty disables it.
    pub admin_token: String,
    /// Session lifetime in days
    pub session_days: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            super_admin_username: "signupbook".to_string(),
            admin_usernames: Vec::new(),
            admin_token: String::new(),
            session_days: 7,
        }
    }
}

impl AuthConfig {
    /// Lower-cased admin allow-list
    pub fn admin_set(&self) -> HashSet<String> {
        self.admin_usernames
            .iter()
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty())
            .collect()
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.session_days))
    }
}

/// Post and comment submission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingConfig {
    /// Reject anonymous post submissions
    pub require_login: bool,
    /// Minimum seconds between two posts from the same IP
    pub cooldown_seconds: u64,
    pub max_content_length: usize,
    pub max_comment_length: usize,
    /// Feed and moderation queue length
    pub page_size: u64,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            require_login: true,
            cooldown_seconds: 15,
            max_content_length: 500,
            max_comment_length: 200,
            page_size: 20,
        }
    }
}

impl PostingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

/// Report threshold and sensitive word configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Live report count at which an approved post is hidden
    pub report_hide_threshold: u64,
    /// Ban authenticated submitters whose content hits the word list
    pub auto_ban_on_sensitive: bool,
    /// Ban the author of a post every time a report on it is accepted
    pub ban_author_on_report: bool,
    /// Word list file, or a directory of word list files
    pub sensitive_words_file: String,
    /// Used only when the file yields no words
    pub sensitive_words: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            report_hide_threshold: 5,
            auto_ban_on_sensitive: true,
            ban_author_on_report: true,
            sensitive_words_file: "sensitive_words.txt".to_string(),
            sensitive_words: vec!["spamword1".to_string(), "spamword2".to_string()],
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Cooldown map size that triggers eviction of stale entries
    pub max_tracked_ips: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tracked_ips: 10_000,
        }
    }
}

/// External content classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiModerationConfig {
    pub enabled: bool,
    /// OpenAI-compatible API root, e.g. https://api.example.com/v1
    pub base_url: String,
    /// Bearer token (should be in env var TREEHOLE_AI_MODERATION__API_KEY)
    pub api_key: String,
    pub model: String,
    pub max_retries: u32,
    pub request_timeout_seconds: u64,
    /// Upper bound a caller waits for a verdict, queue time included
    pub max_wait_seconds: u64,
    pub queue_capacity: usize,
}

impl Default for AiModerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            max_retries: 3,
            request_timeout_seconds: 60,
            max_wait_seconds: 90,
            queue_capacity: 64,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub posting: PostingConfig,
    pub moderation: ModerationConfig,
    pub rate_limit: RateLimitConfig,
    pub ai_moderation: AiModerationConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("TREEHOLE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&AppConfig::default())?)
            // Add config file (optional)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // Override with environment variables
            // e.g., TREEHOLE_AUTH__ADMIN_TOKEN, TREEHOLE_POSTING__COOLDOWN_SECONDS
            .add_source(
                Environment::with_prefix("TREEHOLE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_usernames")
                    .with_list_parse_key("moderation.sensitive_words")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
