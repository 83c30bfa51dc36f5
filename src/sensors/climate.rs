use super::driver::EnvironmentDriver;
use super::{Backing, SensorRole, SensorSource};
use crate::bus::{lock_bus, BusAddress, SharedBus};
use crate::fault_injection::{FailureInjectionConfig, FailureInjectionStats, FailureInjector};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tracing::{debug, warn};

pub const MOCK_TEMPERATURE_RANGE_C: (f64, f64) = (15.0, 30.0);
pub const MOCK_HUMIDITY_RANGE_PERCENT: (f64, f64) = (30.0, 80.0);

/// Temperature and relative humidity. Absent fields produce no reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClimateSample {
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
}

impl ClimateSample {
    pub fn new(temperature_c: f64, humidity_percent: f64) -> Self {
        Self {
            temperature_c: Some(temperature_c),
            humidity_percent: Some(humidity_percent),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.temperature_c.is_none() && self.humidity_percent.is_none()
    }
}

pub struct RealClimate {
    bus: SharedBus,
    address: BusAddress,
    driver: Box<dyn EnvironmentDriver + Send>,
}

impl RealClimate {
    pub fn new(
        bus: SharedBus,
        address: BusAddress,
        driver: Box<dyn EnvironmentDriver + Send>,
    ) -> Self {
        Self { bus, address, driver }
    }
}

impl core::fmt::Debug for RealClimate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RealClimate").field("address", &self.address).finish_non_exhaustive()
    }
}

impl SensorSource for RealClimate {
    type Sample = ClimateSample;

    fn role(&self) -> SensorRole {
        SensorRole::TemperatureHumidity
    }

    fn read(&mut self) -> ClimateSample {
        let result = {
            let mut bus = lock_bus(&self.bus);
            self.driver.sample(&mut *bus, self.address.raw())
        };

        match result {
            Ok(raw) => {
                let sample = ClimateSample {
                    temperature_c: raw.temperature_c.is_finite().then_some(raw.temperature_c),
                    humidity_percent: raw
                        .humidity_percent
                        .is_finite()
                        .then_some(raw.humidity_percent),
                };
                debug!("Climate at {}: {:?}", self.address, sample);
                sample
            }
            Err(e) => {
                warn!("Error reading temperature/humidity sensor at {}: {}", self.address, e);
                ClimateSample::empty()
            }
        }
    }

    fn backing(&self) -> Backing {
        Backing::Real { address: self.address }
    }
}

/// Synthetic temperature/humidity.
#[derive(Debug)]
pub struct MockClimate {
    rng: Pcg32,
    failures: FailureInjector,
}

impl MockClimate {
    pub fn new(failure_probability: f64, seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
            failures: FailureInjector::new(
                FailureInjectionConfig::with_probability(failure_probability),
                seed.rotate_left(17) ^ 0xC11A_7E00,
            ),
        }
    }

    pub fn failure_stats(&self) -> &FailureInjectionStats {
        self.failures.get_stats()
    }
}

impl SensorSource for MockClimate {
    type Sample = ClimateSample;

    fn role(&self) -> SensorRole {
        SensorRole::TemperatureHumidity
    }

    fn read(&mut self) -> ClimateSample {
        let (t_lo, t_hi) = MOCK_TEMPERATURE_RANGE_C;
        let (h_lo, h_hi) = MOCK_HUMIDITY_RANGE_PERCENT;
        let temperature = self.rng.gen_range(t_lo..=t_hi);
        let humidity = self.rng.gen_range(h_lo..=h_hi);

        // Simulated sensor dropout: both values go missing together
        if self.failures.should_fail() {
            return ClimateSample::empty();
        }

        ClimateSample::new(temperature, humidity)
    }

    fn backing(&self) -> Backing {
        Backing::Mock
    }
}
