use super::{lock_bus, SharedBus};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use tracing::{debug, info};

/// Lowest non-reserved 7-bit I2C address.
pub const FIRST_ADDRESS: u8 = 0x03;
/// Highest non-reserved 7-bit I2C address.
pub const LAST_ADDRESS: u8 = 0x77;
/// Number of addresses a full scan visits.
pub const SCAN_CAPACITY: usize = (LAST_ADDRESS - FIRST_ADDRESS + 1) as usize;

const_assert!(FIRST_ADDRESS < LAST_ADDRESS);
const_assert!(SCAN_CAPACITY == 117);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BusAddress(u8);

impl BusAddress {
    pub const fn new(raw: u8) -> Option<Self> {
        if raw >= FIRST_ADDRESS && raw <= LAST_ADDRESS {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Every valid address, ascending.
    pub fn all() -> impl Iterator<Item = BusAddress> {
        (FIRST_ADDRESS..=LAST_ADDRESS).map(BusAddress)
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| {
            format!("address 0x{raw:02X} outside 0x{FIRST_ADDRESS:02X}..=0x{LAST_ADDRESS:02X}")
        })
    }
}

impl From<BusAddress> for u8 {
    fn from(address: BusAddress) -> u8 {
        address.0
    }
}

impl core::fmt::Display for BusAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Physical device kinds the station knows how to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Bme680,
    Ssd1322,
}

impl DeviceFamily {
    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::Bme680 => "BME680",
            DeviceFamily::Ssd1322 => "SSD1322",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDevice {
    pub address: BusAddress,
    pub label: String,
    pub family: DeviceFamily,
}

impl KnownDevice {
    fn new(raw: u8, label: &str, family: DeviceFamily) -> Option<Self> {
        Some(Self {
            address: BusAddress::new(raw)?,
            label: label.to_string(),
            family,
        })
    }

    /// Address table shipped with the station.
    pub fn default_table() -> alloc::vec::Vec<KnownDevice> {
        [
            (0x27, "SSD1322_OLED", DeviceFamily::Ssd1322),
            (0x3C, "SSD1322_OLED_ALT", DeviceFamily::Ssd1322),
            (0x3D, "SSD1322_OLED_ALT2", DeviceFamily::Ssd1322),
            (0x76, "BME680_PRIMARY", DeviceFamily::Bme680),
            (0x77, "BME680_SECONDARY", DeviceFamily::Bme680),
        ]
        .into_iter()
        .filter_map(|(raw, label, family)| KnownDevice::new(raw, label, family))
        .collect()
    }
}

/// Classification of one responding address. Unknown devices keep a
/// synthesised label and no family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClass {
    pub address: BusAddress,
    pub label: String,
    pub family: Option<DeviceFamily>,
}

/// Responding addresses of one scan, ascending by address.
pub type ScanResults = Vec<DeviceClass, SCAN_CAPACITY>;

pub struct BusScanner {
    bus: SharedBus,
    table: alloc::vec::Vec<KnownDevice>,
}

impl BusScanner {
    pub fn new(bus: SharedBus, table: alloc::vec::Vec<KnownDevice>) -> Self {
        Self { bus, table }
    }

    pub fn classify(&self, address: BusAddress) -> DeviceClass {
        match self.table.iter().find(|known| known.address == address) {
            Some(known) => DeviceClass {
                address,
                label: known.label.clone(),
                family: Some(known.family),
            },
            None => DeviceClass {
                address,
                label: format!("UNKNOWN_DEVICE_{address}"),
                family: None,
            },
        }
    }

    /// Probe every valid address and classify the ones that answer.
    ///
    /// A failed probe only means "nothing there"; it never shortens the scan.
    /// The bus stays locked for the whole pass so scans cannot interleave.
    pub fn scan(&self) -> ScanResults {
        let mut found = ScanResults::new();
        let mut bus = lock_bus(&self.bus);

        info!("Scanning I2C bus for devices...");
        for address in BusAddress::all() {
            match bus.probe(address.raw()) {
                Ok(()) => {
                    let class = self.classify(address);
                    info!("Found device at {}: {}", address, class.label);
                    // Capacity covers the whole address space.
                    let _ = found.push(class);
                }
                Err(e) => debug!("No device at {}: {}", address, e),
            }
        }

        found
    }
}
