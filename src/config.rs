//! Configuration loading and types for homestore.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct, then environment overrides are applied.  Every
//! field has a default, so an absent file yields a runnable configuration.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming the Redis `host:port`.
pub const ENV_REDIS_ADDR: &str = "REDIS_ADDR";

/// Environment variable naming the HTTP listen address (`host:port` or `:port`).
pub const ENV_SERVER_ADDR: &str = "SERVER_ADDR";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Key-value backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum object size in bytes.
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            max_object_size: default_max_object_size(),
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which key-value backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendEngine {
    /// A Redis server.
    Redis,
    /// In-process map; contents vanish on exit.
    Memory,
}

/// Key-value backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Backend type: `redis` or `memory`.
    #[serde(default = "default_backend_engine")]
    pub engine: BackendEngine,

    /// Redis-specific configuration.
    #[serde(default)]
    pub redis: RedisConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            engine: default_backend_engine(),
            redis: RedisConfig::default(),
        }
    }
}

/// Redis connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379/0`.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_object_size() -> u64 {
    64 * 1024 * 1024
}

fn default_backend_engine() -> BackendEngine {
    BackendEngine::Redis
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Where the loaded configuration came from.  Loading runs before logging
/// is set up, so the caller reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the YAML file.
    File,
    /// The file was absent; built-in defaults were used.
    Defaults,
}

/// Load configuration from the YAML file at `path` (defaults if the file
/// does not exist), then apply environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<(Config, ConfigSource)> {
    let (mut config, source) = read_config_file(path.as_ref())?;
    config.apply_overrides(|name| std::env::var(name).ok())?;
    Ok((config, source))
}

fn read_config_file(path: &Path) -> anyhow::Result<(Config, ConfigSource)> {
    if !path.exists() {
        return Ok((Config::default(), ConfigSource::Defaults));
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok((config, ConfigSource::File))
}

impl Config {
    /// Apply `REDIS_ADDR` / `SERVER_ADDR` overrides.  `lookup` is injected
    /// so tests need not touch the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_REDIS_ADDR).filter(|a| !a.is_empty()) {
            self.backend.redis.url = format!("redis://{addr}/0");
        }

        if let Some(addr) = lookup(ENV_SERVER_ADDR).filter(|a| !a.is_empty()) {
            let (host, port) = addr
                .rsplit_once(':')
                .with_context(|| format!("{ENV_SERVER_ADDR}={addr:?} is not host:port"))?;
            self.server.port = port
                .parse()
                .with_context(|| format!("{ENV_SERVER_ADDR}={addr:?} has an invalid port"))?;
            if !host.is_empty() {
                self.server.host = host.to_string();
            }
        }
        Ok(())
    }
}
