//! Home Assistant MQTT discovery: topics, device identity and registration
//! payloads.

use crate::reading::SensorType;
use arrayvec::ArrayString;
use core::fmt::Write;
use serde::{Deserialize, Serialize};

pub const TOPIC_CAPACITY: usize = 128;
pub type Topic = ArrayString<TOPIC_CAPACITY>;

pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";
pub const DEFAULT_BASE_TOPIC: &str = "breatheasy";

const STATE_CLASS_MEASUREMENT: &str = "measurement";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }
}

/// Device block shared by every registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub identifiers: alloc::vec::Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub sw_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            identifiers: vec!["breatheasy_001".to_string()],
            name: "BreatheEasy Monitor".to_string(),
            model: "BME680 + LCD20x4".to_string(),
            manufacturer: "Custom".to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Static Home Assistant metadata for one sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorMetadata {
    pub name: &'static str,
    pub device_class: &'static str,
    pub icon: &'static str,
}

pub fn metadata(sensor_type: SensorType) -> SensorMetadata {
    let (name, device_class, icon) = match sensor_type {
        SensorType::Temperature => ("BreatheEasy Temperature", "temperature", "mdi:thermometer"),
        SensorType::Humidity => ("BreatheEasy Humidity", "humidity", "mdi:water-percent"),
        SensorType::Pm25 => ("BreatheEasy PM2.5", "pm25", "mdi:air-filter"),
        SensorType::Pm10 => ("BreatheEasy PM10", "pm10", "mdi:air-filter"),
        SensorType::Co2 => ("BreatheEasy CO2", "carbon_dioxide", "mdi:molecule-co2"),
        SensorType::Voc => ("BreatheEasy VOC", "volatile_organic_compounds", "mdi:chemical-weapon"),
    };
    SensorMetadata { name, device_class, icon }
}

/// Topic layout. Prefixes must be short enough for every derived topic to fit
/// in [`TOPIC_CAPACITY`]; [`TopicConfig::validate`] checks this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub discovery_prefix: String,
    pub base_topic: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
            base_topic: DEFAULT_BASE_TOPIC.to_string(),
        }
    }
}

impl TopicConfig {
    /// `<prefix>/sensor/<base>_<type>/config`
    pub fn registration_topic(&self, sensor_type: SensorType) -> Option<Topic> {
        let mut topic = Topic::new();
        write!(
            topic,
            "{}/sensor/{}_{}/config",
            self.discovery_prefix,
            self.base_topic,
            sensor_type.as_str()
        )
        .ok()?;
        Some(topic)
    }

    /// `<base>/sensor/<type>`
    pub fn state_topic(&self, sensor_type: SensorType) -> Option<Topic> {
        let mut topic = Topic::new();
        write!(topic, "{}/sensor/{}", self.base_topic, sensor_type.as_str()).ok()?;
        Some(topic)
    }

    /// `<base>/status`
    pub fn availability_topic(&self) -> Option<Topic> {
        let mut topic = Topic::new();
        write!(topic, "{}/status", self.base_topic).ok()?;
        Some(topic)
    }

    pub fn unique_id(&self, sensor_type: SensorType) -> String {
        format!("{}_{}", self.base_topic, sensor_type.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.discovery_prefix.is_empty() || self.base_topic.is_empty() {
            return Err("discovery prefix and base topic must not be empty".to_string());
        }
        let fits = SensorType::ALL
            .into_iter()
            .all(|t| self.registration_topic(t).is_some() && self.state_topic(t).is_some());
        if !fits || self.availability_topic().is_none() {
            return Err(format!("topics longer than {TOPIC_CAPACITY} bytes"));
        }
        Ok(())
    }
}

/// Retained registration message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationPayload<'a> {
    pub name: &'static str,
    pub unique_id: String,
    pub state_topic: &'a str,
    pub availability_topic: &'a str,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
    pub unit_of_measurement: &'static str,
    pub device_class: &'static str,
    pub state_class: &'static str,
    pub icon: &'static str,
    pub device: &'a DeviceInfo,
}

impl<'a> RegistrationPayload<'a> {
    pub fn new(
        sensor_type: SensorType,
        topics: &TopicConfig,
        state_topic: &'a str,
        availability_topic: &'a str,
        device: &'a DeviceInfo,
    ) -> Self {
        let meta = metadata(sensor_type);
        Self {
            name: meta.name,
            unique_id: topics.unique_id(sensor_type),
            state_topic,
            availability_topic,
            payload_available: Availability::Online.as_str(),
            payload_not_available: Availability::Offline.as_str(),
            unit_of_measurement: sensor_type.unit(),
            device_class: meta.device_class,
            state_class: STATE_CLASS_MEASUREMENT,
            icon: meta.icon,
            device,
        }
    }
}

/// Value payload: rounded to two decimals, always with a fractional part.
pub fn format_value(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded:?}")
}
