use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

pub const SENSOR_TYPE_COUNT: usize = 6;
/// Upper bound on readings produced by one acquisition cycle.
pub const MAX_READINGS_PER_CYCLE: usize = SENSOR_TYPE_COUNT;

const_assert_eq!(SensorType::ALL.len(), SENSOR_TYPE_COUNT);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Humidity,
    Pm25,
    Pm10,
    Co2,
    Voc,
}

impl SensorType {
    pub const ALL: [SensorType; 6] = [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Pm25,
        SensorType::Pm10,
        SensorType::Co2,
        SensorType::Voc,
    ];

    /// Wire name, used in topics and unique ids.
    pub fn as_str(self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Pm25 => "pm25",
            SensorType::Pm10 => "pm10",
            SensorType::Co2 => "co2",
            SensorType::Voc => "voc",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SensorType::Temperature => "°C",
            SensorType::Humidity => "%",
            SensorType::Pm25 | SensorType::Pm10 => "µg/m³",
            SensorType::Co2 => "ppm",
            SensorType::Voc => "ppb",
        }
    }

    /// Stable logical identity of the sensor producing this metric.
    pub fn sensor_id(self) -> &'static str {
        match self {
            SensorType::Temperature => "temp_sensor",
            SensorType::Humidity => "humidity_sensor",
            SensorType::Pm25 | SensorType::Pm10 | SensorType::Co2 | SensorType::Voc => {
                "air_quality_sensor"
            }
        }
    }

    /// Inclusive range of physically plausible values.
    pub fn plausible_range(self) -> (f64, f64) {
        match self {
            SensorType::Temperature => (-40.0, 85.0),
            SensorType::Humidity => (0.0, 100.0),
            SensorType::Pm25 | SensorType::Pm10 => (0.0, 1000.0),
            SensorType::Co2 => (0.0, 40_000.0),
            SensorType::Voc => (0.0, 60_000.0),
        }
    }

    pub fn is_plausible(self, value: f64) -> bool {
        let (lo, hi) = self.plausible_range();
        value.is_finite() && value >= lo && value <= hi
    }
}

impl core::fmt::Display for SensorType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SensorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown sensor type: {s}"))
    }
}

/// One measured value. Only constructible for plausible values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(sensor_type: SensorType, value: f64, timestamp: DateTime<Utc>) -> Option<Self> {
        if !sensor_type.is_plausible(value) {
            return None;
        }

        Some(Self {
            sensor_id: sensor_type.sensor_id().to_string(),
            sensor_type,
            value,
            unit: sensor_type.unit().to_string(),
            timestamp,
        })
    }
}
