use super::identify::{DeviceIdentifier, VerificationConfig};
use super::scanner::{BusAddress, BusScanner, DeviceFamily, KnownDevice, ScanResults};
use super::SharedBus;
use crate::sensors::SensorRole;
use serde::Serialize;
use tracing::debug;

/// Resolved address per device family, as reported by `scan`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectedConfig {
    pub bme680: Option<BusAddress>,
    pub ssd1322: Option<BusAddress>,
}

/// Owner of the detection state: scanner, identifier and the cached scan.
///
/// The cache lives until [`DeviceRegistry::rescan`] is called.
pub struct DeviceRegistry {
    scanner: BusScanner,
    identifier: DeviceIdentifier,
    cached: Option<ScanResults>,
}

impl DeviceRegistry {
    pub fn new(
        bus: SharedBus,
        table: alloc::vec::Vec<KnownDevice>,
        verification: VerificationConfig,
    ) -> Self {
        Self {
            scanner: BusScanner::new(bus.clone(), table),
            identifier: DeviceIdentifier::new(bus, verification),
            cached: None,
        }
    }

    /// Cached scan results, scanning first if nothing is cached yet.
    pub fn scan_results(&mut self) -> &ScanResults {
        if self.cached.is_none() {
            debug!("No cached devices, scanning bus...");
        }
        self.cached.get_or_insert_with(|| self.scanner.scan())
    }

    /// Drop the cache and scan again.
    pub fn rescan(&mut self) -> &ScanResults {
        self.cached = None;
        self.scan_results()
    }

    pub fn resolve(&mut self, role: SensorRole) -> Option<BusAddress> {
        self.resolve_family(role.family())
    }

    pub fn resolve_family(&mut self, family: DeviceFamily) -> Option<BusAddress> {
        self.scan_results();
        let scan = self.cached.as_deref().unwrap_or(&[]);
        self.identifier.identify_family(family, scan)
    }

    pub fn detected_config(&mut self) -> DetectedConfig {
        DetectedConfig {
            bme680: self.resolve_family(DeviceFamily::Bme680),
            ssd1322: self.resolve_family(DeviceFamily::Ssd1322),
        }
    }

    pub fn verification(&self) -> VerificationConfig {
        self.identifier.verification()
    }
}
