//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `meross-bridge.toml` in the working directory, or the path in
//! `MEROSS_BRIDGE_CONFIG`. Every field has a default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;

use meross_bridge_adapter_http::HttpConfig;
use meross_bridge_adapter_mqtt::MqttConfig;
use meross_bridge_app::command_queue::QueueConfig;
use meross_bridge_app::config::DeviceSettings;
use meross_bridge_domain::device::{ConnectionMode, DeviceInfo};
use meross_bridge_domain::error::ValidationError;

const DEFAULT_CONFIG_PATH: &str = "meross-bridge.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub state: StateConfig,
    pub http: HttpConfig,
    /// Broker settings; required when any device uses `cloud`.
    pub mqtt: Option<MqttConfig>,
    pub controller: ControllerConfig,
    pub devices: Vec<DeviceConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Where accessory contexts are persisted.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub dir: PathBuf,
}

/// Controller defaults shared by every device.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub poll_interval_secs: u64,
    pub command_interval_ms: u64,
    pub command_timeout_ms: u64,
    pub offline_after_failures: u32,
}

/// How the bridge reaches a configured device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    #[default]
    Local,
    Cloud,
    /// In-memory appliance, no hardware needed.
    Simulated,
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub connection: Connection,
    /// LAN address, required for `local` devices.
    #[serde(default)]
    pub address: Option<String>,
    /// Overrides `[controller].poll_interval_secs`.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub log_updates: bool,
    #[serde(default)]
    pub debug: bool,
    /// Expose an adaptive-lighting controller for this light.
    #[serde(default)]
    pub adaptive_lighting: bool,
}

impl Config {
    /// Load configuration from the config file (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("MEROSS_BRIDGE_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// `MEROSS_BRIDGE_LOG` takes precedence over `RUST_LOG`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("MEROSS_BRIDGE_LOG").or_else(|| var("RUST_LOG")) {
            self.logging.filter = val;
        }
        if let Some(val) = var("MEROSS_BRIDGE_STATE_DIR") {
            self.state.dir = PathBuf::from(val);
        }
        if let Some(val) = var("MEROSS_BRIDGE_MQTT_HOST") {
            self.mqtt.get_or_insert_with(MqttConfig::default).broker_host = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "device {:?} has an empty id",
                    device.name
                )));
            }
            if !seen.insert(device.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate device id {}",
                    device.id
                )));
            }
            match device.connection {
                Connection::Cloud if self.mqtt.is_none() => {
                    return Err(ConfigError::Validation(format!(
                        "device {} uses cloud but no [mqtt] section is configured",
                        device.id
                    )));
                }
                Connection::Local if device.address.as_deref().is_none_or(str::is_empty) => {
                    return Err(ConfigError::Validation(format!(
                        "local device {} needs an address",
                        device.id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl ControllerConfig {
    /// Effective settings for `device`.
    #[must_use]
    pub fn settings_for(&self, device: &DeviceConfig) -> DeviceSettings {
        DeviceSettings {
            log_updates: device.log_updates,
            debug: device.debug,
            poll_interval_secs: device.poll_interval_secs.unwrap_or(self.poll_interval_secs),
            offline_after_failures: self.offline_after_failures,
            queue: QueueConfig {
                interval_ms: self.command_interval_ms,
                timeout_ms: self.command_timeout_ms,
            },
        }
    }
}

impl DeviceConfig {
    /// Build the initial [`DeviceInfo`].
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a blank id or name.
    pub fn device_info(&self) -> Result<DeviceInfo, ValidationError> {
        let connection = match self.connection {
            Connection::Cloud => ConnectionMode::Cloud,
            Connection::Local | Connection::Simulated => ConnectionMode::Local,
        };
        let builder = DeviceInfo::builder()
            .id(self.id.as_str())
            .name(self.name.as_str())
            .model(self.model.as_str())
            .channel(self.channel)
            .connection(connection);
        match &self.address {
            Some(address) => builder.ip_address(address.as_str()).build(),
            None => builder.build(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "meross_bridged=info,meross_bridge=info".to_string(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("state"),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let settings = DeviceSettings::default();
        Self {
            poll_interval_secs: settings.poll_interval_secs,
            command_interval_ms: settings.queue.interval_ms,
            command_timeout_ms: settings.queue.timeout_ms,
            offline_after_failures: settings.offline_after_failures,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
