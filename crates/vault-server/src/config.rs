//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub subscriptions: SubscriptionsConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// How long a writer waits for the SQLite write lock, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vault_sync=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Event subscription configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionsConfig {
    /// Events buffered per subscriber before it is considered too slow and
    /// dropped.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8085
}

fn default_db_path() -> String {
    "vault.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    vault_db::DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    vault_db::DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_buffer_size() -> usize {
    vault_sync::DEFAULT_BUFFER_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
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

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> vault_db::DbRuntimeSettings {
        vault_db::DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Path used when neither the command line nor `VAULT_CONFIG_PATH` names one.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Picks the config file: the first CLI argument, else `VAULT_CONFIG_PATH`,
/// else [`DEFAULT_CONFIG_PATH`]. Blank values are skipped. Returns the path
/// and where it came from, for the startup log.
pub fn resolve_config_path(
    cli_arg: Option<String>,
    env_path: Option<String>,
) -> (String, &'static str) {
    let present = |value: &String| !value.trim().is_empty();
    if let Some(path) = cli_arg.filter(present) {
        (path, "cli-arg")
    } else if let Some(path) = env_path.filter(present) {
        (path, "env-var")
    } else {
        (DEFAULT_CONFIG_PATH.to_string(), "default")
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VAULT_HOST` overrides `server.host`
/// - `VAULT_PORT` overrides `server.port`
/// - `VAULT_DB_PATH` overrides `database.path`
/// - `VAULT_LOG_LEVEL` overrides `logging.level`
/// - `VAULT_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VAULT_SUBSCRIPTION_BUFFER` overrides `subscriptions.buffer_size`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

/// Applies `VAULT_*` overrides read through `var`. Unparseable values are
/// ignored.
fn apply_env_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(parsed) = var("VAULT_HOST").and_then(|v| v.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = var("VAULT_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(db_path) = var("VAULT_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("VAULT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("VAULT_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(parsed) = var("VAULT_SUBSCRIPTION_BUFFER").and_then(|v| v.parse().ok()) {
        config.subscriptions.buffer_size = parsed;
    }
    config
}
