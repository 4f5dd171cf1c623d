//! Configuration Module
//!
//! Provides TOML-based configuration for ReactorMQ with support for:
//! - Log level
//! - Server bind address
//! - Packet size limit
//! - Environment variable overrides (REACTORMQ__* prefix)

use std::net::SocketAddr;
use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::broker::BrokerConfig;
use crate::codec::MAX_REMAINING_LENGTH;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}


#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Config(config::ConfigError),
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub server: ServerConfig,
    pub limits: LimitsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// Parsed level, if `level` names one
    pub fn tracing_level(&self) -> Option<tracing::Level> {
        self.level.parse().ok()
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address for MQTT
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 1883))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Connection limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum remaining length accepted per packet, in bytes
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

fn default_max_packet_size() -> usize {
    MAX_REMAINING_LENGTH
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_packet_size: default_max_packet_size(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable support.
    ///
    /// Supports:
    /// - `${VAR}` and `${VAR:-default}` substitution in the config file
    /// - Environment overrides with REACTORMQ__ prefix (e.g., REACTORMQ__SERVER__BIND)
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("log.level", default_log_level())?
            .set_default("server.bind", default_bind().to_string())?
            .set_default("limits.max_packet_size", default_max_packet_size() as u64)?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("REACTORMQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus REACTORMQ__ environment overrides, without a file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a TOML string (no environment support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_packet_size == 0 {
            return Err(ConfigError::Validation(
                "max_packet_size must be greater than 0".to_string(),
            ));
        }
        if self.limits.max_packet_size > MAX_REMAINING_LENGTH {
            return Err(ConfigError::Validation(format!(
                "max_packet_size must not exceed {}",
                MAX_REMAINING_LENGTH
            )));
        }
        if self.log.tracing_level().is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown log level '{}'",
                self.log.level
            )));
        }
        Ok(())
    }

    /// Broker settings derived from this configuration
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            bind_addr: self.server.bind,
            max_packet_size: self.limits.max_packet_size,
        }
    }
}
