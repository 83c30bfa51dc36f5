//! # BreatheEasy Sensor Station
//!
//! Acquisition and publishing pipeline for a small environmental sensor
//! station: I2C device detection, real-or-mock sensor sources, periodic
//! acquisition and Home Assistant MQTT discovery publishing.
//!
//! ## Features
//!
//! - **Bus detection**: full-range address scan, known-device classification
//!   and per-family verification handshakes
//! - **Sensor sources**: real adapters degrade to empty samples on I/O
//!   failure; mock generators stand in when hardware is absent
//! - **Acquisition**: one reading per present metric, stored and published in
//!   the same pass
//! - **Discovery publishing**: each sensor type registered exactly once per
//!   connection, before its first value
//! - **Scheduling**: fixed-interval loop that survives failing cycles
//!
//! ## Quick Start
//!
//! ```rust
//! use breatheasy::bus::{shared_bus, AbsentBus};
//! use breatheasy::publisher::{DiscoveryPublisher, LinkStatus, LogTransport, PublisherOptions};
//! use breatheasy::store::shared_store;
//! use breatheasy::{AcquisitionCycle, Config, Station};
//! use std::sync::Arc;
//!
//! let mut config = Config::default();
//! config.mock.seed = Some(7);
//!
//! // No hardware: both roles fall back to mock data
//! let mut station = Station::new(shared_bus(AbsentBus), &config);
//! let (climate, air_quality) = station.select_sources().into_boxed();
//!
//! let publisher = DiscoveryPublisher::new(
//!     Box::new(LogTransport::new()),
//!     Arc::new(LinkStatus::connected()),
//!     config.mqtt.topics.clone(),
//!     config.device.clone(),
//!     PublisherOptions::default(),
//! );
//! let store = shared_store(config.storage.history_capacity);
//! let mut cycle = AcquisitionCycle::new(climate, air_quality, Box::new(store.clone()), publisher);
//!
//! let readings = cycle.run_once();
//! assert!(readings.len() <= 6);
//! ```
//!
//! ## Architecture
//!
//! - [`bus`] - Bus handle, scanner, identifier and device registry
//! - [`sensors`] - Real and mock sensor sources
//! - [`acquisition`] - One polling pass
//! - [`publisher`] - Discovery-aware publisher and transports
//! - [`mqtt`] - MQTT transport
//! - [`scheduler`] - Fixed-interval cycle runner
//! - [`station`] - Source selection from detection results

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

extern crate alloc;

pub mod acquisition;
pub mod bus;
pub mod config;
pub mod discovery;
pub mod fault_injection;
pub mod mqtt;
pub mod publisher;
pub mod reading;
pub mod scheduler;
pub mod sensors;
pub mod station;
pub mod store;

// Re-export main public types for convenience
pub use acquisition::{AcquisitionCycle, CycleReadings};
pub use config::Config;
pub use publisher::DiscoveryPublisher;
pub use reading::{Reading, SensorType};
pub use scheduler::Scheduler;
pub use station::Station;
