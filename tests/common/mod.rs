#![allow(dead_code)]

use breatheasy::bus::{BusError, BusHandle};
use breatheasy::discovery::{DeviceInfo, TopicConfig};
use breatheasy::publisher::{
    DiscoveryPublisher, LinkStatus, PublisherOptions, Transport, TransportError,
};
use rumqttc::QoS;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// In-memory bus: listed addresses answer byte reads, registers answer
/// register reads, failing addresses error on everything.
#[derive(Debug, Default, Clone)]
pub struct ScriptedBus {
    pub present: BTreeSet<u8>,
    pub registers: BTreeMap<(u8, u8), u8>,
    pub failing: BTreeSet<u8>,
    pub probes: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, address: u8) -> Self {
        self.present.insert(address);
        self
    }

    pub fn with_register(mut self, address: u8, register: u8, value: u8) -> Self {
        self.present.insert(address);
        self.registers.insert((address, register), value);
        self
    }

    pub fn with_bme680(self, address: u8) -> Self {
        self.with_register(address, 0xD0, 0x61)
    }

    pub fn with_failure(mut self, address: u8) -> Self {
        self.failing.insert(address);
        self
    }
}

impl BusHandle for ScriptedBus {
    fn read_byte(&mut self, address: u8) -> Result<u8, BusError> {
        self.probes.lock().unwrap().push(address);
        if self.failing.contains(&address) {
            return Err(BusError::Io(format!("glitch at 0x{address:02X}")));
        }
        if self.present.contains(&address) {
            Ok(0)
        } else {
            Err(BusError::Nack(address))
        }
    }

    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, BusError> {
        if self.failing.contains(&address) {
            return Err(BusError::Io(format!("glitch at 0x{address:02X}")));
        }
        self.registers
            .get(&(address, register))
            .copied()
            .ok_or(BusError::Nack(address))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

impl Message {
    pub fn is_registration(&self) -> bool {
        self.topic.ends_with("/config")
    }
}

/// Records every message; can be told to reject registrations, or the next
/// few availability announcements.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    pub messages: Arc<Mutex<Vec<Message>>>,
    pub reject_registrations: Arc<Mutex<bool>>,
    pub reject_status: Arc<Mutex<u32>>,
    pub disconnects: Arc<Mutex<u32>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<Message> {
        self.messages().into_iter().filter(Message::is_registration).collect()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<Message> {
        self.messages().into_iter().filter(|m| m.topic == topic).collect()
    }

    pub fn set_reject_registrations(&self, reject: bool) {
        *self.reject_registrations.lock().unwrap() = reject;
    }

    pub fn reject_next_status(&self, count: u32) {
        *self.reject_status.lock().unwrap() = count;
    }
}

impl Transport for RecordingTransport {
    fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        if topic.ends_with("/config") && *self.reject_registrations.lock().unwrap() {
            return Err(TransportError::Rejected("registration refused".to_string()));
        }
        if topic.ends_with("/status") {
            let mut remaining = self.reject_status.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Rejected("status refused".to_string()));
            }
        }
        self.messages.lock().unwrap().push(Message {
            topic: topic.to_string(),
            payload: String::from_utf8(payload).unwrap(),
            qos,
            retain,
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        *self.disconnects.lock().unwrap() += 1;
        Ok(())
    }
}

pub fn recording_publisher(link: Arc<LinkStatus>) -> (DiscoveryPublisher, RecordingTransport) {
    let transport = RecordingTransport::new();
    let publisher = DiscoveryPublisher::new(
        Box::new(transport.clone()),
        link,
        TopicConfig::default(),
        DeviceInfo::default(),
        PublisherOptions::default(),
    );
    (publisher, transport)
}
