//! CLI configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via NESIGNER_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags

use nesigner_client::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the device is reached.
    pub device: DeviceConfig,
    /// Session tuning.
    pub session: SessionConfig,
}

impl Config {
    /// Loads configuration from `path` if given, then applies environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.device.apply_overrides(&var);
        self.session.apply_overrides(&var);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_payload_size == 0 {
            return Err(ConfigError::Validation(
                "session.max_payload_size must be greater than zero".to_string(),
            ));
        }
        if self.device.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "device.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the session's connection settings.
    pub fn connection_config(&self) -> ConnectionConfig {
        let config = ConnectionConfig::new()
            .with_read_buffer_size(self.session.read_buffer_size)
            .with_max_payload_size(self.session.max_payload_size);
        match self.session.request_timeout() {
            Some(timeout) => config.with_request_timeout(timeout),
            None => config,
        }
    }
}

/// Device address configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Address of the serial-over-TCP bridge.
    #[serde(with = "socket_addr_serde")]
    pub addr: SocketAddr,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 7420)),
            connect_timeout_secs: 5,
        }
    }
}

impl DeviceConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("NESIGNER_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.addr = parsed;
            }
        }

        if let Some(timeout) = var("NESIGNER_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }
    }

    /// Returns connect timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Request timeout in seconds; 0 waits forever.
    pub request_timeout_secs: u64,
    /// Read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Largest response payload accepted, in bytes.
    pub max_payload_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            read_buffer_size: nesigner_client::connection::DEFAULT_READ_BUFFER_SIZE,
            max_payload_size: nesigner_protocol::MAX_PAYLOAD_SIZE,
        }
    }
}

impl SessionConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(timeout) = var("NESIGNER_REQUEST_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.request_timeout_secs = secs;
            }
        }

        if let Some(size) = var("NESIGNER_READ_BUFFER_SIZE") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }

        if let Some(max) = var("NESIGNER_MAX_PAYLOAD") {
            if let Ok(n) = max.parse() {
                self.max_payload_size = n;
            }
        }
    }

    /// Returns request timeout as Duration, if one is set.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
