use super::scanner::{BusAddress, DeviceClass, DeviceFamily};
use super::{lock_bus, BusError, SharedBus};
use crate::sensors::SensorRole;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const BME680_CHIP_ID_REGISTER: u8 = 0xD0;
pub const BME680_CHIP_ID: u8 = 0x61;

/// Per-family handshake constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub bme680_chip_id_register: u8,
    pub bme680_chip_id: u8,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            bme680_chip_id_register: BME680_CHIP_ID_REGISTER,
            bme680_chip_id: BME680_CHIP_ID,
        }
    }
}

pub struct DeviceIdentifier {
    bus: SharedBus,
    verification: VerificationConfig,
}

impl DeviceIdentifier {
    pub fn new(bus: SharedBus, verification: VerificationConfig) -> Self {
        Self { bus, verification }
    }

    pub fn verification(&self) -> VerificationConfig {
        self.verification
    }

    /// Resolve the device backing `role`, if one verifies.
    pub fn identify(&self, role: SensorRole, scan: &[DeviceClass]) -> Option<BusAddress> {
        self.identify_family(role.family(), scan)
    }

    /// First candidate of `family` that passes its handshake, lowest address
    /// first. `None` is the ordinary "hardware absent" answer.
    pub fn identify_family(
        &self,
        family: DeviceFamily,
        scan: &[DeviceClass],
    ) -> Option<BusAddress> {
        let mut candidates: alloc::vec::Vec<BusAddress> = scan
            .iter()
            .filter(|class| class.family == Some(family))
            .map(|class| class.address)
            .collect();
        candidates.sort_unstable();

        if candidates.is_empty() {
            warn!("No {} detected", family.name());
            return None;
        }

        let verified = candidates.into_iter().find(|&address| match self.verify(family, address) {
            Ok(()) => true,
            Err(e) => {
                debug!("{} verification failed at {}: {}", family.name(), address, e);
                false
            }
        });

        match verified {
            Some(address) => info!("{} verified at address {}", family.name(), address),
            None => warn!("{} detected but verification failed", family.name()),
        }
        verified
    }

    fn verify(&self, family: DeviceFamily, address: BusAddress) -> Result<(), BusError> {
        let mut bus = lock_bus(&self.bus);
        match family {
            DeviceFamily::Bme680 => {
                let register = self.verification.bme680_chip_id_register;
                let found = bus.read_register(address.raw(), register)?;
                if found == self.verification.bme680_chip_id {
                    Ok(())
                } else {
                    Err(BusError::UnexpectedId {
                        address: address.raw(),
                        expected: self.verification.bme680_chip_id,
                        found,
                    })
                }
            }
            DeviceFamily::Ssd1322 => bus.read_byte(address.raw()).map(|_| ()),
        }
    }
}
