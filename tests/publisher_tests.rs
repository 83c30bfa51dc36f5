mod common;

use breatheasy::discovery::Availability;
use breatheasy::publisher::LinkStatus;
use breatheasy::SensorType;
use common::recording_publisher;
use rumqttc::QoS;
use std::sync::Arc;

#[test]
fn test_one_registration_per_type_across_many_publishes() {
    let link = Arc::new(LinkStatus::connected());
    let (mut publisher, transport) = recording_publisher(link);

    for i in 0..25 {
        for sensor_type in SensorType::ALL {
            assert!(publisher.publish(sensor_type, 10.0 + f64::from(i)));
        }
    }

    let registrations = transport.registrations();
    assert_eq!(registrations.len(), 6);
    for sensor_type in SensorType::ALL {
        let topic = format!("homeassistant/sensor/breatheasy_{}/config", sensor_type.as_str());
        assert_eq!(registrations.iter().filter(|m| m.topic == topic).count(), 1);
    }
    assert_eq!(publisher.get_stats().values_sent, 150);
}

#[test]
fn test_reconnect_triggers_exactly_one_more_registration() {
    let link = Arc::new(LinkStatus::connected());
    let (mut publisher, transport) = recording_publisher(Arc::clone(&link));

    for _ in 0..3 {
        publisher.publish(SensorType::Humidity, 44.0);
    }
    link.mark_disconnected();
    assert!(!publisher.publish(SensorType::Humidity, 44.0));
    link.mark_connected();
    for _ in 0..3 {
        publisher.publish(SensorType::Humidity, 45.0);
    }

    let topic = "homeassistant/sensor/breatheasy_humidity/config";
    assert_eq!(transport.on_topic(topic).len(), 2);
    assert_eq!(transport.on_topic("breatheasy/status").len(), 2);
    assert_eq!(publisher.get_stats().connections, 2);
}

#[test]
fn test_registration_is_sent_before_first_value() {
    let (mut publisher, transport) = recording_publisher(Arc::new(LinkStatus::connected()));
    publisher.publish(SensorType::Pm10, 67.5);

    let messages = transport.messages();
    let registration = messages
        .iter()
        .position(|m| m.topic == "homeassistant/sensor/breatheasy_pm10/config")
        .unwrap();
    let value = messages.iter().position(|m| m.topic == "breatheasy/sensor/pm10").unwrap();
    assert!(registration < value);

    assert!(messages[registration].retain);
    assert_eq!(messages[registration].qos, QoS::AtLeastOnce);
    assert!(!messages[value].retain);
    assert_eq!(messages[value].qos, QoS::AtMostOnce);
    assert_eq!(messages[value].payload, "67.5");
}

#[test]
fn test_failed_registration_reports_failure_and_retries_later() {
    let (mut publisher, transport) = recording_publisher(Arc::new(LinkStatus::connected()));
    transport.set_reject_registrations(true);

    assert!(!publisher.publish(SensorType::Co2, 800.0));
    assert!(!publisher.is_advertised(SensorType::Co2));
    assert_eq!(transport.on_topic("breatheasy/sensor/co2").len(), 1);

    transport.set_reject_registrations(false);
    assert!(publisher.publish(SensorType::Co2, 805.0));
    assert!(publisher.is_advertised(SensorType::Co2));
    assert_eq!(transport.registrations().len(), 1);
    assert_eq!(publisher.get_stats().registration_failures, 1);
}

#[test]
fn test_registration_payload_contents() {
    let (mut publisher, transport) = recording_publisher(Arc::new(LinkStatus::connected()));
    publisher.publish(SensorType::Temperature, 22.456);

    let registration = &transport.registrations()[0];
    let payload: serde_json::Value = serde_json::from_str(&registration.payload).unwrap();
    assert_eq!(payload["unique_id"], "breatheasy_temperature");
    assert_eq!(payload["name"], "BreatheEasy Temperature");
    assert_eq!(payload["unit_of_measurement"], "°C");
    assert_eq!(payload["device_class"], "temperature");
    assert_eq!(payload["state_class"], "measurement");
    assert_eq!(payload["icon"], "mdi:thermometer");
    assert_eq!(payload["state_topic"], "breatheasy/sensor/temperature");
    assert_eq!(payload["availability_topic"], "breatheasy/status");
    assert_eq!(payload["payload_available"], "online");
    assert_eq!(payload["payload_not_available"], "offline");
    assert_eq!(payload["device"]["name"], "BreatheEasy Monitor");
    assert_eq!(payload["device"]["manufacturer"], "Custom");

    assert_eq!(transport.on_topic("breatheasy/sensor/temperature")[0].payload, "22.46");
}

#[test]
fn test_shutdown_announces_offline_and_disconnects() {
    let link = Arc::new(LinkStatus::connected());
    let (mut publisher, transport) = recording_publisher(Arc::clone(&link));
    publisher.publish(SensorType::Voc, 120.0);

    assert!(publisher.shutdown());
    let status = transport.on_topic("breatheasy/status");
    assert_eq!(status.last().map(|m| m.payload.as_str()), Some(Availability::Offline.as_str()));
    assert!(status.iter().all(|m| m.retain && m.qos == QoS::AtLeastOnce));
    assert_eq!(*transport.disconnects.lock().unwrap(), 1);
    assert!(!link.is_connected());
}

#[test]
fn test_advertise_all_is_idempotent() {
    let (mut publisher, transport) = recording_publisher(Arc::new(LinkStatus::connected()));
    assert_eq!(publisher.advertise_all(), 6);
    assert_eq!(publisher.advertise_all(), 0);
    publisher.publish(SensorType::Pm25, 12.0);
    assert_eq!(transport.registrations().len(), 6);
}

#[test]
fn test_rejected_online_announcement_is_retried() {
    let (mut publisher, transport) = recording_publisher(Arc::new(LinkStatus::connected()));
    transport.reject_next_status(1);

    assert!(publisher.publish(SensorType::Temperature, 21.0));
    assert!(!publisher.is_online_announced());
    assert!(transport.on_topic("breatheasy/status").is_empty());

    for _ in 0..10 {
        assert!(publisher.publish(SensorType::Temperature, 21.0));
    }

    let status = transport.on_topic("breatheasy/status");
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].payload, Availability::Online.as_str());
    assert!(status[0].retain);
    assert!(publisher.is_online_announced());
    assert_eq!(transport.registrations().len(), 1);
}

#[test]
fn test_reconnect_announces_online_again_after_shutdown() {
    let link = Arc::new(LinkStatus::connected());
    let (mut publisher, transport) = recording_publisher(Arc::clone(&link));
    assert!(publisher.sync_connection());
    assert!(publisher.shutdown());
    assert!(!publisher.is_online_announced());

    link.mark_connected();
    assert!(publisher.sync_connection());
    let payloads: Vec<String> = transport
        .on_topic("breatheasy/status")
        .into_iter()
        .map(|m| m.payload)
        .collect();
    assert_eq!(payloads, vec!["online", "offline", "online"]);
}
