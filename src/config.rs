use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use crate::models::MatchPolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub signaling: SignalingSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// HTTP API (health, stats)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            workers: None,
        }
    }
}

/// WebSocket signaling endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SignalingSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_signaling_port")]
    pub port: u16,
    /// Capacity of the broker command channel
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// Relayed frames a connection may have pending before its partner's frames are dropped
    #[serde(default = "default_relay_buffer")]
    pub relay_buffer: usize,
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_signaling_port(),
            command_buffer: default_command_buffer(),
            relay_buffer: default_relay_buffer(),
        }
    }
}

impl SignalingSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Message(format!("invalid signaling address: {}", e)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchingSettings {
    #[serde(default)]
    pub policy: MatchPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_http_port() -> u16 { 8080 }
fn default_signaling_port() -> u16 { 3000 }
fn default_command_buffer() -> usize { 1024 }
fn default_relay_buffer() -> usize { 256 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with VYNTRA__)
    /// 5. `PORT`, which sets the signaling port
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(env_source())
            .build()?;

        let settings = apply_port_override(settings, std::env::var("PORT").ok())?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;

        settings.try_deserialize()
    }
}

/// `VYNTRA__SIGNALING__PORT` maps to `signaling.port`
fn env_source() -> Environment {
    Environment::with_prefix("VYNTRA")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Honor the plain `PORT` variable most hosting platforms set
fn apply_port_override(settings: Config, port: Option<String>) -> Result<Config, ConfigError> {
    let Some(port) = port else {
        return Ok(settings);
    };

    let port: u16 = port
        .trim()
        .parse()
        .map_err(|e| ConfigError::Message(format!("invalid PORT value {:?}: {}", port, e)))?;

    Config::builder()
        .add_source(settings)
        .set_override("signaling.port", i64::from(port))?
        .build()
}
