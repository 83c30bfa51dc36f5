use super::driver::EnvironmentDriver;
use super::{Backing, SensorRole, SensorSource};
use crate::bus::{lock_bus, BusAddress, SharedBus};
use crate::fault_injection::{FailureInjectionConfig, FailureInjectionStats, FailureInjector};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tracing::{debug, warn};

pub const MOCK_PM25_RANGE: (f64, f64) = (5.0, 50.0);
pub const MOCK_PM10_RANGE: (f64, f64) = (10.0, 100.0);
pub const MOCK_CO2_RANGE_PPM: (f64, f64) = (400.0, 2000.0);
pub const MOCK_VOC_RANGE_PPB: (f64, f64) = (0.0, 500.0);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AirQualitySample {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co2_ppm: Option<f64>,
    pub voc_ppb: Option<f64>,
}

impl AirQualitySample {
    pub fn new(pm25: f64, pm10: f64, co2_ppm: f64, voc_ppb: f64) -> Self {
        Self {
            pm25: Some(pm25),
            pm10: Some(pm10),
            co2_ppm: Some(co2_ppm),
            voc_ppb: Some(voc_ppb),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pm25.is_none()
            && self.pm10.is_none()
            && self.co2_ppm.is_none()
            && self.voc_ppb.is_none()
    }
}

/// Air quality figures estimated from gas resistance alone.
///
/// These are rough approximations for a sensor without dedicated particulate
/// or CO2 cells, not calibrated measurements:
///
/// - pm2.5 = clamp(50 − R/10000, 0, 100)
/// - pm10  = pm2.5 × 1.5
/// - CO2   = clamp(800 − R/2000, 400, 2000)
/// - VOC   = max(0, 1000 − R/100)
pub fn estimate_air_quality(gas_resistance_ohms: f64) -> AirQualitySample {
    let pm25 = (50.0 - gas_resistance_ohms / 10_000.0).clamp(0.0, 100.0);
    let pm10 = pm25 * 1.5;
    let co2 = (800.0 - gas_resistance_ohms / 2_000.0).clamp(400.0, 2000.0);
    let voc = (1000.0 - gas_resistance_ohms / 100.0).max(0.0);

    AirQualitySample::new(pm25, pm10, co2, voc)
}

/// Air quality derived from a gas-resistance sensor. Estimates only, see
/// [`estimate_air_quality`].
pub struct RealAirQuality {
    bus: SharedBus,
    address: BusAddress,
    driver: Box<dyn EnvironmentDriver + Send>,
}

impl RealAirQuality {
    pub fn new(
        bus: SharedBus,
        address: BusAddress,
        driver: Box<dyn EnvironmentDriver + Send>,
    ) -> Self {
        Self { bus, address, driver }
    }
}

impl core::fmt::Debug for RealAirQuality {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RealAirQuality").field("address", &self.address).finish_non_exhaustive()
    }
}

impl SensorSource for RealAirQuality {
    type Sample = AirQualitySample;

    fn role(&self) -> SensorRole {
        SensorRole::AirQuality
    }

    fn read(&mut self) -> AirQualitySample {
        let result = {
            let mut bus = lock_bus(&self.bus);
            self.driver.sample(&mut *bus, self.address.raw())
        };

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error reading air quality sensor at {}: {}", self.address, e);
                return AirQualitySample::empty();
            }
        };

        let gas = raw.gas_resistance_ohms;
        if !gas.is_finite() || gas < 0.0 || !raw.humidity_percent.is_finite() {
            warn!("Air quality sensor at {} returned unusable values: {:?}", self.address, raw);
            return AirQualitySample::empty();
        }

        let sample = estimate_air_quality(gas);
        debug!(
            "Air quality at {} - gas: {:.1}Ω, humidity: {:.1}%, estimated {:?}",
            self.address, gas, raw.humidity_percent, sample
        );
        sample
    }

    fn backing(&self) -> Backing {
        Backing::Real { address: self.address }
    }
}

/// Synthetic particulate, CO2 and VOC readings.
#[derive(Debug)]
pub struct MockAirQuality {
    rng: Pcg32,
    failures: FailureInjector,
}

impl MockAirQuality {
    pub fn new(failure_probability: f64, seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
            failures: FailureInjector::new(
                FailureInjectionConfig::with_probability(failure_probability),
                seed.rotate_left(29) ^ 0xA1B0_0A11,
            ),
        }
    }

    pub fn failure_stats(&self) -> &FailureInjectionStats {
        self.failures.get_stats()
    }
}

impl SensorSource for MockAirQuality {
    type Sample = AirQualitySample;

    fn role(&self) -> SensorRole {
        SensorRole::AirQuality
    }

    fn read(&mut self) -> AirQualitySample {
        let pm25 = self.rng.gen_range(MOCK_PM25_RANGE.0..=MOCK_PM25_RANGE.1);
        let pm10 = self.rng.gen_range(MOCK_PM10_RANGE.0..=MOCK_PM10_RANGE.1);
        let co2 = self.rng.gen_range(MOCK_CO2_RANGE_PPM.0..=MOCK_CO2_RANGE_PPM.1);
        let voc = self.rng.gen_range(MOCK_VOC_RANGE_PPB.0..=MOCK_VOC_RANGE_PPB.1);

        if self.failures.should_fail() {
            return AirQualitySample::empty();
        }

        AirQualitySample::new(pm25, pm10, co2, voc)
    }

    fn backing(&self) -> Backing {
        Backing::Mock
    }
}
