//! Configuration for the door-controller monitor
//!
//! Loaded from a TOML file, with credentials resolved from the environment
//! and a handful of CLI overrides applied on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Top-level monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub monitor: MonitorSection,
}

/// Broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port (mqtt:// or mqtts://)
    pub broker_url: String,
    /// Identity used as MQTT username, client ID and heartbeat payload
    pub identity: String,
    /// Environment variable containing the broker password
    pub secret_env: Option<String>,
    /// Resolved password; filled from `secret_env` or a CLI flag, never the file
    #[serde(skip)]
    pub secret: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_session_expiry")]
    pub session_expiry_secs: u32,
    #[serde(default = "default_clean_start")]
    pub clean_start: bool,
    /// Delay between transport reconnection attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Deadline for the broker to confirm a session before giving up
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Health bookkeeping intervals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorSection {
    /// How long a device may stay silent before it is considered unhealthy
    #[serde(default = "default_unhealthy_duration")]
    pub unhealthy_duration_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_keep_alive() -> u64 {
    20
}

fn default_session_expiry() -> u32 {
    60
}

fn default_clean_start() -> bool {
    true
}

fn default_retry_delay() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_unhealthy_duration() -> u64 {
    300 // 5 minutes
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_heartbeat_interval() -> u64 {
    120 // 2 minutes
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            unhealthy_duration_secs: default_unhealthy_duration(),
            sweep_interval_secs: default_sweep_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MonitorConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: MonitorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values that serde cannot check
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.mqtt.broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.mqtt.broker_url.clone()))?;
        if url.scheme() != "mqtt" && url.scheme() != "mqtts" {
            return Err(ConfigError::InvalidBrokerUrl(self.mqtt.broker_url.clone()));
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidBrokerUrl(self.mqtt.broker_url.clone()));
        }

        if self.mqtt.identity.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.identity must not be empty".to_string(),
            ));
        }
        if self.monitor.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "monitor.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.monitor.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "monitor.heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.monitor.unhealthy_duration_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "monitor.unhealthy_duration_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply CLI overrides, then resolve the secret from `secret_env` if no
    /// override supplied one.
    pub fn apply_overrides(
        &mut self,
        broker_url: Option<String>,
        identity: Option<String>,
        secret: Option<String>,
    ) {
        if let Some(url) = broker_url {
            self.mqtt.broker_url = url;
        }
        if let Some(identity) = identity {
            self.mqtt.identity = identity;
        }
        self.mqtt.secret = secret.or_else(|| {
            self.mqtt
                .secret_env
                .as_ref()
                .and_then(|name| std::env::var(name).ok())
        });
    }
}

impl MqttSection {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl MonitorSection {
    pub fn unhealthy_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.unhealthy_duration_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
