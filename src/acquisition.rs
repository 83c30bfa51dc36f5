use crate::publisher::DiscoveryPublisher;
use crate::reading::{Reading, SensorType, MAX_READINGS_PER_CYCLE};
use crate::sensors::{Backing, BoxedAirQualitySource, BoxedClimateSource};
use crate::store::ReadingStore;
use chrono::Utc;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub type CycleReadings = Vec<Reading, MAX_READINGS_PER_CYCLE>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub readings: u64,
    pub discarded_values: u64,
    pub store_failures: u64,
    pub publish_failures: u64,
}

/// Backing of each source, for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub climate: Backing,
    pub air_quality: Backing,
}

/// One polling pass: read every source, turn present values into readings,
/// persist and publish each.
pub struct AcquisitionCycle {
    climate: BoxedClimateSource,
    air_quality: BoxedAirQualitySource,
    store: Box<dyn ReadingStore + Send>,
    publisher: DiscoveryPublisher,
    stats: CycleStats,
}

impl AcquisitionCycle {
    pub fn new(
        climate: BoxedClimateSource,
        air_quality: BoxedAirQualitySource,
        store: Box<dyn ReadingStore + Send>,
        publisher: DiscoveryPublisher,
    ) -> Self {
        Self {
            climate,
            air_quality,
            store,
            publisher,
            stats: CycleStats::default(),
        }
    }

    pub fn run_once(&mut self) -> CycleReadings {
        let timestamp = Utc::now();
        let climate = self.climate.read();
        let air = self.air_quality.read();

        let values = [
            (SensorType::Temperature, climate.temperature_c),
            (SensorType::Humidity, climate.humidity_percent),
            (SensorType::Pm25, air.pm25),
            (SensorType::Pm10, air.pm10),
            (SensorType::Co2, air.co2_ppm),
            (SensorType::Voc, air.voc_ppb),
        ];

        // Announce availability after a (re)connect before any value goes out
        self.publisher.sync_connection();

        let mut readings = CycleReadings::new();
        for (sensor_type, value) in values {
            let Some(value) = value else { continue };
            let Some(reading) = Reading::new(sensor_type, value, timestamp) else {
                self.stats.discarded_values += 1;
                warn!("Discarding implausible {} value {}", sensor_type, value);
                continue;
            };

            if let Err(e) = self.store.append(&reading) {
                self.stats.store_failures += 1;
                warn!("Failed to store {} reading: {}", sensor_type, e);
            }
            if !self.publisher.publish_reading(&reading) {
                self.stats.publish_failures += 1;
                debug!("Publish of {} reading did not go through", sensor_type);
            }

            debug_assert!(!readings.is_full(), "one reading per sensor type per cycle");
            let _ = readings.push(reading);
        }

        self.stats.cycles += 1;
        self.stats.readings += readings.len() as u64;
        info!("Acquisition cycle {}: {} readings", self.stats.cycles, readings.len());
        readings
    }

    /// Swap in freshly selected sources, e.g. after a re-probe.
    pub fn replace_sources(
        &mut self,
        climate: BoxedClimateSource,
        air_quality: BoxedAirQualitySource,
    ) {
        self.climate = climate;
        self.air_quality = air_quality;
        info!("Sources replaced: {:?}", self.source_status());
    }

    pub fn source_status(&self) -> SourceStatus {
        SourceStatus {
            climate: self.climate.backing(),
            air_quality: self.air_quality.backing(),
        }
    }

    pub fn publisher_mut(&mut self) -> &mut DiscoveryPublisher {
        &mut self.publisher
    }

    pub fn get_stats(&self) -> &CycleStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DeviceInfo, TopicConfig};
    use crate::publisher::{LinkStatus, LogTransport, PublisherOptions};
    use crate::sensors::{MockAirQuality, MockClimate};
    use crate::store::shared_store;
    use std::sync::Arc;

    #[test]
    fn test_cycle_with_failing_sources_produces_nothing() {
        let store = shared_store(16);
        let publisher = DiscoveryPublisher::new(
            Box::new(LogTransport::new()),
            Arc::new(LinkStatus::connected()),
            TopicConfig::default(),
            DeviceInfo::default(),
            PublisherOptions::default(),
        );
        let mut cycle = AcquisitionCycle::new(
            Box::new(MockClimate::new(1.0, 1)),
            Box::new(MockAirQuality::new(1.0, 2)),
            Box::new(store.clone()),
            publisher,
        );

        assert!(cycle.run_once().is_empty());
        assert!(store.lock().unwrap().is_empty());
        assert_eq!(cycle.get_stats().cycles, 1);
    }

    #[test]
    fn test_full_cycle_stores_six_readings() {
        let store = shared_store(16);
        let publisher = DiscoveryPublisher::new(
            Box::new(LogTransport::new()),
            Arc::new(LinkStatus::connected()),
            TopicConfig::default(),
            DeviceInfo::default(),
            PublisherOptions::default(),
        );
        let mut cycle = AcquisitionCycle::new(
            Box::new(MockClimate::new(0.0, 1)),
            Box::new(MockAirQuality::new(0.0, 2)),
            Box::new(store.clone()),
            publisher,
        );

        let readings = cycle.run_once();
        assert_eq!(readings.len(), 6);
        assert_eq!(store.lock().unwrap().len(), 6);
        assert_eq!(cycle.source_status().climate, Backing::Mock);
    }
}
