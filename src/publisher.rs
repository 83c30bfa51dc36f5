//! Discovery-aware telemetry publisher.
//!
//! [`DiscoveryPublisher`] owns the set of sensor types advertised on the
//! current connection. A sensor type's retained registration always goes out
//! before its first value; when the transport reconnects (the shared
//! [`LinkStatus`] generation moves on) the set is cleared and availability is
//! announced again.

use crate::discovery::{format_value, Availability, DeviceInfo, RegistrationPayload, TopicConfig};
use crate::reading::{Reading, SensorType, SENSOR_TYPE_COUNT};
use heapless::Vec;
use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("publish rejected: {0}")]
    Rejected(String),
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("topic does not fit the topic buffer")]
    TopicTooLong,
}

/// Outbound message sink. Delivery acknowledgement, if any, is the
/// transport's business; `Ok` means the message was accepted for sending.
pub trait Transport {
    fn publish(
        &mut self,
        topic: &str,
        payload: alloc::vec::Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError>;

    fn disconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Snapshot of the link: whether it is up and how many times it came up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    pub connected: bool,
    pub generation: u64,
}

/// Connection state shared between the transport's network task and the
/// publisher. Every successful (re)connect bumps the generation; every change
/// wakes [`LinkStatus::subscribe`] receivers.
#[derive(Debug)]
pub struct LinkStatus {
    state: watch::Sender<LinkState>,
}

impl Default for LinkStatus {
    fn default() -> Self {
        let (state, _) = watch::channel(LinkState::default());
        Self { state }
    }
}

impl LinkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link that is up from the start, for transports without a session.
    pub fn connected() -> Self {
        let status = Self::new();
        status.mark_connected();
        status
    }

    pub fn mark_connected(&self) {
        self.state.send_modify(|state| {
            state.generation += 1;
            state.connected = true;
        });
    }

    pub fn mark_disconnected(&self) {
        self.state.send_if_modified(|state| {
            let was_connected = state.connected;
            state.connected = false;
            was_connected
        });
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Wait up to `grace` for the link to come up.
    pub async fn wait_connected(&self, grace: Duration) -> bool {
        let mut state = self.subscribe();
        let outcome = tokio::time::timeout(grace, state.wait_for(|s| s.connected)).await;
        matches!(outcome, Ok(Ok(_)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub connections: u32,
    pub registrations_sent: u32,
    pub registration_failures: u32,
    pub values_sent: u64,
    pub value_failures: u64,
    pub dropped_disconnected: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherOptions {
    /// Send every registration right after connecting, not only on first use.
    pub eager_discovery: bool,
}

pub struct DiscoveryPublisher {
    transport: Box<dyn Transport + Send>,
    link: Arc<LinkStatus>,
    topics: TopicConfig,
    device: DeviceInfo,
    options: PublisherOptions,
    advertised: Vec<SensorType, SENSOR_TYPE_COUNT>,
    seen_generation: Option<u64>,
    online_announced: bool,
    stats: PublisherStats,
}

impl DiscoveryPublisher {
    pub fn new(
        transport: Box<dyn Transport + Send>,
        link: Arc<LinkStatus>,
        topics: TopicConfig,
        device: DeviceInfo,
        options: PublisherOptions,
    ) -> Self {
        Self {
            transport,
            link,
            topics,
            device,
            options,
            advertised: Vec::new(),
            seen_generation: None,
            online_announced: false,
            stats: PublisherStats::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn is_advertised(&self, sensor_type: SensorType) -> bool {
        self.advertised.contains(&sensor_type)
    }

    /// Publish one value, registering the sensor type first if needed.
    ///
    /// Returns `false` when disconnected (nothing is sent), when registration
    /// failed (the value is still sent), or when the value itself failed.
    pub fn publish(&mut self, sensor_type: SensorType, value: f64) -> bool {
        if !self.sync_connection() {
            self.stats.dropped_disconnected += 1;
            debug!("Not connected, dropping {} value", sensor_type);
            return false;
        }

        let mut ok = true;
        if !self.is_advertised(sensor_type) {
            ok = self.register(sensor_type);
        }

        let Some(topic) = self.topics.state_topic(sensor_type) else {
            self.stats.value_failures += 1;
            warn!("State topic for {} does not fit", sensor_type);
            return false;
        };

        let payload = format_value(value).into_bytes();
        match self.transport.publish(&topic, payload, QoS::AtMostOnce, false) {
            Ok(()) => {
                self.stats.values_sent += 1;
                debug!("Published {} = {:.2} to {}", sensor_type, value, topic);
            }
            Err(e) => {
                self.stats.value_failures += 1;
                warn!("Failed to publish {} value: {}", sensor_type, e);
                ok = false;
            }
        }
        ok
    }

    pub fn publish_reading(&mut self, reading: &Reading) -> bool {
        self.publish(reading.sensor_type, reading.value)
    }

    /// Retained availability announcement.
    pub fn publish_availability(&mut self, availability: Availability) -> bool {
        if !self.link.is_connected() {
            debug!("Not connected, skipping availability {}", availability.as_str());
            return false;
        }
        self.send_availability(availability)
    }

    /// Register every sensor type not yet advertised on this connection.
    /// Returns how many registrations were sent.
    pub fn advertise_all(&mut self) -> usize {
        if !self.sync_connection() {
            return 0;
        }
        self.register_missing()
    }

    /// Clean shutdown: announce offline, then close the transport.
    pub fn shutdown(&mut self) -> bool {
        let announced = self.publish_availability(Availability::Offline);
        self.online_announced = false;
        match self.transport.disconnect() {
            Ok(()) => info!("Publisher disconnected"),
            Err(e) => warn!("Error disconnecting publisher: {}", e),
        }
        self.link.mark_disconnected();
        announced
    }

    pub fn get_stats(&self) -> &PublisherStats {
        &self.stats
    }

    /// Bring local state in line with the link. A new generation means a new
    /// session: forget what was advertised and announce availability. The
    /// `online` announcement is retried on every call until it goes through.
    pub fn sync_connection(&mut self) -> bool {
        if !self.link.is_connected() {
            return false;
        }

        let generation = self.link.generation();
        let new_session = self.seen_generation != Some(generation);
        if new_session {
            if self.seen_generation.is_some() {
                info!("Transport reconnected, discovery will be re-sent");
            }
            self.seen_generation = Some(generation);
            self.advertised.clear();
            self.online_announced = false;
            self.stats.connections += 1;
        }

        if !self.online_announced {
            self.online_announced = self.send_availability(Availability::Online);
        }
        if new_session && self.options.eager_discovery {
            self.register_missing();
        }
        true
    }

    pub fn is_online_announced(&self) -> bool {
        self.online_announced
    }

    fn register_missing(&mut self) -> usize {
        SensorType::ALL
            .into_iter()
            .filter(|&t| !self.is_advertised(t) && self.register(t))
            .count()
    }

    fn register(&mut self, sensor_type: SensorType) -> bool {
        match self.send_registration(sensor_type) {
            Ok(()) => {
                debug_assert!(
                    !self.advertised.is_full(),
                    "advertised set holds every sensor type"
                );
                let _ = self.advertised.push(sensor_type);
                self.stats.registrations_sent += 1;
                info!("Published discovery config for {}", sensor_type);
                true
            }
            Err(e) => {
                self.stats.registration_failures += 1;
                warn!("Failed to publish discovery config for {}: {}", sensor_type, e);
                false
            }
        }
    }

    fn send_registration(&mut self, sensor_type: SensorType) -> Result<(), TransportError> {
        let topic = self
            .topics
            .registration_topic(sensor_type)
            .ok_or(TransportError::TopicTooLong)?;
        let state = self
            .topics
            .state_topic(sensor_type)
            .ok_or(TransportError::TopicTooLong)?;
        let availability = self
            .topics
            .availability_topic()
            .ok_or(TransportError::TopicTooLong)?;

        let payload = RegistrationPayload::new(
            sensor_type,
            &self.topics,
            &state,
            &availability,
            &self.device,
        );
        let body = serde_json::to_vec(&payload)?;
        self.transport.publish(&topic, body, QoS::AtLeastOnce, true)
    }

    fn send_availability(&mut self, availability: Availability) -> bool {
        let payload = availability.as_str().as_bytes().to_vec();
        let result = self
            .topics
            .availability_topic()
            .ok_or(TransportError::TopicTooLong)
            .and_then(|topic| self.transport.publish(&topic, payload, QoS::AtLeastOnce, true));

        match result {
            Ok(()) => {
                info!("Availability: {}", availability.as_str());
                true
            }
            Err(e) => {
                warn!("Failed to publish availability {}: {}", availability.as_str(), e);
                false
            }
        }
    }
}

/// Transport that only logs. Used for dry runs.
#[derive(Debug, Default)]
pub struct LogTransport {
    published: u64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for LogTransport {
    fn publish(
        &mut self,
        topic: &str,
        payload: alloc::vec::Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.published += 1;
        info!(
            "[dry-run #{}] {} (qos {:?}, retain {}): {}",
            self.published,
            topic,
            qos,
            retain,
            String::from_utf8_lossy(&payload)
        );
        Ok(())
    }
}
