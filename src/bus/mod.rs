//! Shared I2C bus access.
//!
//! The physical bus is consumed through [`BusHandle`], a three-operation
//! contract (probe, byte read, register read). Everything that touches the bus
//! goes through a [`SharedBus`] handed down from the composition root, so scans,
//! identification probes and sensor reads are serialised on one mutex.

pub mod identify;
pub mod registry;
pub mod scanner;

pub use identify::{DeviceIdentifier, VerificationConfig};
pub use registry::{DetectedConfig, DeviceRegistry};
pub use scanner::{BusAddress, BusScanner, DeviceClass, DeviceFamily, KnownDevice, ScanResults};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no acknowledge from device at 0x{0:02X}")]
    Nack(u8),
    #[error("bus I/O failure: {0}")]
    Io(String),
    #[error("bus is not available")]
    Unavailable,
    #[error("device at 0x{address:02X} reported id 0x{found:02X}, expected 0x{expected:02X}")]
    UnexpectedId { address: u8, expected: u8, found: u8 },
}

/// Minimal handle onto a physical bus.
///
/// Implementations are expected to enforce their own transfer timeouts; callers
/// at this layer never wait on the bus beyond a single call.
pub trait BusHandle {
    fn read_byte(&mut self, address: u8) -> Result<u8, BusError>;

    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, BusError>;

    /// Read-probe used by bus scans. Defaults to a single byte read.
    fn probe(&mut self, address: u8) -> Result<(), BusError> {
        self.read_byte(address).map(|_| ())
    }
}

pub type SharedBus = Arc<Mutex<dyn BusHandle + Send>>;

pub fn shared_bus<B: BusHandle + Send + 'static>(bus: B) -> SharedBus {
    Arc::new(Mutex::new(bus))
}

/// Lock the bus, recovering the guard if a previous holder panicked.
/// A bus handle carries no invariants a panic could break.
pub(crate) fn lock_bus(bus: &SharedBus) -> MutexGuard<'_, dyn BusHandle + Send + 'static> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bus used when no hardware bus can be opened. Every transfer fails, so every
/// role resolves to "hardware absent".
#[derive(Debug, Default, Clone, Copy)]
pub struct AbsentBus;

impl BusHandle for AbsentBus {
    fn read_byte(&mut self, _address: u8) -> Result<u8, BusError> {
        Err(BusError::Unavailable)
    }

    fn read_register(&mut self, _address: u8, _register: u8) -> Result<u8, BusError> {
        Err(BusError::Unavailable)
    }
}

/// Adapter over any `embedded-hal` 1.0 I2C controller.
#[derive(Debug)]
pub struct HalBus<I> {
    i2c: I,
}

impl<I> HalBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    pub fn into_inner(self) -> I {
        self.i2c
    }
}

fn hal_error<E: embedded_hal::i2c::Error>(address: u8, err: &E) -> BusError {
    use embedded_hal::i2c::ErrorKind;

    match err.kind() {
        ErrorKind::NoAcknowledge(_) => BusError::Nack(address),
        kind => BusError::Io(format!("{kind:?}")),
    }
}

impl<I: embedded_hal::i2c::I2c> BusHandle for HalBus<I> {
    fn read_byte(&mut self, address: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.i2c
            .read(address, &mut buf)
            .map_err(|e| hal_error(address, &e))?;
        Ok(buf[0])
    }

    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(address, &[register], &mut buf)
            .map_err(|e| hal_error(address, &e))?;
        Ok(buf[0])
    }
}

/// Open `/dev/i2c-<number>` through `linux-embedded-hal`.
#[cfg(feature = "linux-i2c")]
pub fn open_linux_bus(number: u8) -> Result<SharedBus, BusError> {
    let path = format!("/dev/i2c-{number}");
    let dev = linux_embedded_hal::I2cdev::new(&path)
        .map_err(|e| BusError::Io(format!("{path}: {e}")))?;
    Ok(shared_bus(HalBus::new(dev)))
}
