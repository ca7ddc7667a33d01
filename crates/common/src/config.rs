//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Document store configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Object storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Credentials used to sign tokens.
    pub credentials: CredentialsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Domain limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Document store connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URI.
    pub uri: String,
    /// Database name.
    #[serde(default = "default_database_name")]
    pub name: String,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Application name used as the first key segment.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
    /// Key scheme version used as the second key segment.
    #[serde(default = "default_key_version")]
    pub key_version: u32,
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding emote files.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// ACL applied to visible objects.
    #[serde(default = "default_public_acl")]
    pub public_acl: String,
    /// ACL applied to hidden objects.
    #[serde(default = "default_private_acl")]
    pub private_acl: String,
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// HMAC-SHA256 shared secret.
    pub jwt_secret: String,
    /// Issuer written into registered claims.
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `emotes=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

/// Domain limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Minimum emote-set name length.
    #[serde(default = "default_set_name_min")]
    pub emote_set_name_min: usize,
    /// Maximum emote-set name length.
    #[serde(default = "default_set_name_max")]
    pub emote_set_name_max: usize,
    /// Slots given to new emote sets.
    #[serde(default = "default_emote_slots")]
    pub default_emote_slots: i32,
    /// Upper bound for search page sizes.
    #[serde(default = "default_search_limit")]
    pub max_search_limit: i64,
}

fn default_database_name() -> String {
    "emotes".to_string()
}

fn default_redis_prefix() -> String {
    "emotes".to_string()
}

const fn default_key_version() -> u32 {
    1
}

fn default_bucket() -> String {
    "emotes".to_string()
}

fn default_public_acl() -> String {
    "public-read".to_string()
}

fn default_private_acl() -> String {
    "private".to_string()
}

fn default_issuer() -> String {
    "emotes".to_string()
}

fn default_log_level() -> String {
    "emotes=info".to_string()
}

const fn default_set_name_min() -> usize {
    3
}

const fn default_set_name_max() -> usize {
    48
}

const fn default_emote_slots() -> i32 {
    300
}

const fn default_search_limit() -> i64 {
    300
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            public_acl: default_public_acl(),
            private_acl: default_private_acl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            emote_set_name_min: default_set_name_min(),
            emote_set_name_max: default_set_name_max(),
            default_emote_slots: default_emote_slots(),
            max_search_limit: default_search_limit(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `EMOTES_ENV`)
    /// 4. Environment variables with `EMOTES__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("EMOTES_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("EMOTES")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("EMOTES")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
