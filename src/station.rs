//! Composition root for the acquisition side: owns the device registry and
//! turns detection results into sensor sources.

use crate::bus::{DetectedConfig, DeviceRegistry, ScanResults, SharedBus};
use crate::config::{Config, MockConfig};
use crate::sensors::{
    AirQualitySource, Backing, Bme680Basic, BoxedAirQualitySource, BoxedClimateSource,
    ClimateSource, MockAirQuality, MockClimate, RealAirQuality, RealClimate, SensorRole,
    SensorSource, Source,
};
use tracing::{info, warn};

/// The two sources the acquisition cycle reads from.
#[derive(Debug)]
pub struct SensorSuite {
    pub climate: ClimateSource,
    pub air_quality: AirQualitySource,
}

impl SensorSuite {
    pub fn into_boxed(self) -> (BoxedClimateSource, BoxedAirQualitySource) {
        (Box::new(self.climate), Box::new(self.air_quality))
    }

    pub fn backings(&self) -> (Backing, Backing) {
        (self.climate.backing(), self.air_quality.backing())
    }
}

pub struct Station {
    bus: SharedBus,
    registry: DeviceRegistry,
    mock: MockConfig,
}

impl Station {
    pub fn new(bus: SharedBus, config: &Config) -> Self {
        Self {
            registry: DeviceRegistry::new(
                bus.clone(),
                config.bus.known_devices.clone(),
                config.verification,
            ),
            bus,
            mock: config.mock,
        }
    }

    pub fn scan_results(&mut self) -> &ScanResults {
        self.registry.scan_results()
    }

    pub fn detected_config(&mut self) -> DetectedConfig {
        self.registry.detected_config()
    }

    /// Pick real or mock for each role. The choice holds until the next
    /// [`Station::reprobe`].
    pub fn select_sources(&mut self) -> SensorSuite {
        let seed = self.mock.seed.unwrap_or_else(rand::random);
        let verification = self.registry.verification();

        let role = SensorRole::TemperatureHumidity;
        let climate = match self.registry.resolve(role) {
            Some(address) => {
                info!("{} sensor: real device at {}", role.name(), address);
                Source::Real(RealClimate::new(
                    self.bus.clone(),
                    address,
                    Box::new(Bme680Basic::new(verification)),
                ))
            }
            None => {
                warn!("{} sensor not available, using mock data", role.name());
                Source::Mock(MockClimate::new(self.mock.climate_failure_probability, seed))
            }
        };

        let air_quality = match self.registry.resolve(SensorRole::AirQuality) {
            Some(address) => {
                info!("{} sensor: real device at {}", SensorRole::AirQuality.name(), address);
                Source::Real(RealAirQuality::new(
                    self.bus.clone(),
                    address,
                    Box::new(Bme680Basic::new(verification)),
                ))
            }
            None => {
                warn!("{} sensor not available, using mock data", SensorRole::AirQuality.name());
                Source::Mock(MockAirQuality::new(
                    self.mock.air_quality_failure_probability,
                    seed.wrapping_add(1),
                ))
            }
        };

        SensorSuite { climate, air_quality }
    }

    /// Forget the cached scan and select sources again.
    pub fn reprobe(&mut self) -> SensorSuite {
        info!("Re-probing bus");
        self.registry.rescan();
        self.select_sources()
    }
}
