//! Sensor sources.
//!
//! A [`SensorSource`] yields one sample per read for a single [`SensorRole`].
//! Each role is served by a [`Source`], a variant fixed at construction:
//! `Real` when the detection subsystem resolved a device, `Mock` otherwise.
//! The variant never changes on its own; a failed real read produces an
//! empty sample for that cycle rather than synthetic data.

pub mod air_quality;
pub mod climate;
pub mod driver;

pub use air_quality::{estimate_air_quality, AirQualitySample, MockAirQuality, RealAirQuality};
pub use climate::{ClimateSample, MockClimate, RealClimate};
pub use driver::{Bme680Basic, EnvironmentDriver, RawSample};

use crate::bus::{BusAddress, DeviceFamily};
use serde::{Deserialize, Serialize};

/// What is measured, independent of the device measuring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorRole {
    TemperatureHumidity,
    AirQuality,
}

impl SensorRole {
    /// Device family able to serve this role. The BME680 covers both.
    pub fn family(self) -> DeviceFamily {
        match self {
            SensorRole::TemperatureHumidity | SensorRole::AirQuality => DeviceFamily::Bme680,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SensorRole::TemperatureHumidity => "temperature/humidity",
            SensorRole::AirQuality => "air quality",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backing {
    Real { address: BusAddress },
    Mock,
}

impl Backing {
    pub fn is_real(self) -> bool {
        matches!(self, Backing::Real { .. })
    }
}

impl core::fmt::Display for Backing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Backing::Real { address } => write!(f, "real@{address}"),
            Backing::Mock => write!(f, "mock"),
        }
    }
}

pub trait SensorSource {
    type Sample;

    fn role(&self) -> SensorRole;

    /// Read one sample. Failures surface as empty fields, never as errors.
    fn read(&mut self) -> Self::Sample;

    fn backing(&self) -> Backing;
}

/// Real-or-mock variant for one role.
#[derive(Debug)]
pub enum Source<R, M> {
    Real(R),
    Mock(M),
}

impl<R, M> SensorSource for Source<R, M>
where
    R: SensorSource,
    M: SensorSource<Sample = R::Sample>,
{
    type Sample = R::Sample;

    fn role(&self) -> SensorRole {
        match self {
            Source::Real(real) => real.role(),
            Source::Mock(mock) => mock.role(),
        }
    }

    fn read(&mut self) -> Self::Sample {
        match self {
            Source::Real(real) => real.read(),
            Source::Mock(mock) => mock.read(),
        }
    }

    fn backing(&self) -> Backing {
        match self {
            Source::Real(real) => real.backing(),
            Source::Mock(mock) => mock.backing(),
        }
    }
}

pub type ClimateSource = Source<RealClimate, MockClimate>;
pub type AirQualitySource = Source<RealAirQuality, MockAirQuality>;

pub type BoxedClimateSource = Box<dyn SensorSource<Sample = ClimateSample> + Send>;
pub type BoxedAirQualitySource = Box<dyn SensorSource<Sample = AirQualitySample> + Send>;
