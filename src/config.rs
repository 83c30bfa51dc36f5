//! Station configuration, loaded from TOML.
//!
//! Every field has a default; a missing file yields the default
//! configuration.

use crate::bus::{KnownDevice, VerificationConfig};
use crate::discovery::{DeviceInfo, TopicConfig};
use crate::fault_injection::{AIR_QUALITY_FAILURE_PROBABILITY, CLIMATE_FAILURE_PROBABILITY};
use crate::store::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub number: u8,
    pub known_devices: alloc::vec::Vec<KnownDevice>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            number: 1,
            known_devices: KnownDevice::default_table(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub climate_failure_probability: f64,
    pub air_quality_failure_probability: f64,
    /// Fixed seed for reproducible mock data; random when unset.
    pub seed: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            climate_failure_probability: CLIMATE_FAILURE_PROBABILITY,
            air_quality_failure_probability: AIR_QUALITY_FAILURE_PROBABILITY,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub eager_discovery: bool,
    #[serde(flatten)]
    pub topics: TopicConfig,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "mqtt".to_string(),
            port: 1883,
            client_id: "breatheasy-api".to_string(),
            keep_alive_secs: 60,
            eager_discovery: false,
            topics: TopicConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Append readings to this JSON lines file as well as the in-memory history.
    pub path: Option<PathBuf>,
    pub history_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub deadline_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { deadline_secs: 5 }
    }
}

impl ShutdownConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub bus: BusConfig,
    pub verification: VerificationConfig,
    pub polling: PollingConfig,
    pub mock: MockConfig,
    pub mqtt: MqttConfig,
    pub device: DeviceInfo,
    pub storage: StorageConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bus: BusConfig::default(),
            verification: VerificationConfig::default(),
            polling: PollingConfig::default(),
            mock: MockConfig::default(),
            mqtt: MqttConfig::default(),
            device: DeviceInfo::default(),
            storage: StorageConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate `path`. A file that does not exist means defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Config {} not found, using defaults", path.display());
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Invalid("polling.interval_secs must be at least 1".into()));
        }

        for (name, p) in [
            ("mock.climate_failure_probability", self.mock.climate_failure_probability),
            ("mock.air_quality_failure_probability", self.mock.air_quality_failure_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {p}")));
            }
        }

        let mut seen = alloc::vec::Vec::with_capacity(self.bus.known_devices.len());
        for device in &self.bus.known_devices {
            if seen.contains(&device.address) {
                return Err(ConfigError::Invalid(format!(
                    "bus.known_devices lists {} twice",
                    device.address
                )));
            }
            seen.push(device.address);
        }

        if self.mqtt.host.is_empty() || self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Invalid("mqtt.host and mqtt.client_id must be set".into()));
        }
        self.mqtt.topics.validate().map_err(ConfigError::Invalid)?;

        if self.storage.history_capacity == 0 {
            return Err(ConfigError::Invalid("storage.history_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
