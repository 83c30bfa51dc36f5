//! MQTT transport over `rumqttc`.
//!
//! The client half implements [`Transport`]; the event loop runs on its own
//! task, handling keep-alive and reconnects, and reports connection changes
//! through the shared [`LinkStatus`].

use crate::config::MqttConfig;
use crate::discovery::Availability;
use crate::publisher::{LinkStatus, Transport, TransportError};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REQUEST_CHANNEL_CAPACITY: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Cloning yields a second handle on the same session.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    link: Arc<LinkStatus>,
}

impl MqttTransport {
    /// Build the client and its event loop. Nothing touches the network until
    /// the event loop is polled, see [`spawn_event_loop`].
    pub fn connect(
        config: &MqttConfig,
        link: Arc<LinkStatus>,
    ) -> Result<(Self, EventLoop), TransportError> {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

        let availability = config
            .topics
            .availability_topic()
            .ok_or(TransportError::TopicTooLong)?;
        options.set_last_will(LastWill::new(
            availability.as_str(),
            Availability::Offline.as_str(),
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        info!("MQTT client {} targeting {}:{}", config.client_id, config.host, config.port);

        Ok((Self { client, link }, eventloop))
    }
}

impl Transport for MqttTransport {
    fn publish(
        &mut self,
        topic: &str,
        payload: alloc::vec::Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        if !self.link.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.client
            .try_publish(topic, qos, retain, payload)
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.client
            .try_disconnect()
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }
}

/// Drive the MQTT event loop until the client disconnects cleanly.
pub fn spawn_event_loop(mut eventloop: EventLoop, link: Arc<LinkStatus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to MQTT broker ({:?})", ack.code);
                    link.mark_connected();
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("MQTT disconnect sent, stopping event loop");
                    link.mark_disconnected();
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    if link.is_connected() {
                        warn!("MQTT connection lost: {}", e);
                    } else {
                        debug!("MQTT connection attempt failed: {}", e);
                    }
                    link.mark_disconnected();
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    })
}

/// Give the event loop until `deadline` to flush and close the session,
/// aborting it otherwise. Returns whether it finished in time.
pub async fn drain(mut event_loop: JoinHandle<()>, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, &mut event_loop).await {
        Ok(Ok(())) => {
            info!("MQTT session closed");
            true
        }
        Ok(Err(e)) => {
            warn!("MQTT event loop ended abnormally: {}", e);
            true
        }
        Err(_) => {
            warn!("MQTT flush exceeded {:?}, aborting", deadline);
            event_loop.abort();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_event_loop_after_deadline() {
        let (alive, dropped) = oneshot::channel::<()>();
        let stuck = tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        });

        let started = tokio::time::Instant::now();
        assert!(!drain(stuck, Duration::from_secs(3)).await);
        assert!(started.elapsed() >= Duration::from_secs(3));

        // Aborting drops the task, and the sender with it
        assert!(dropped.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_returns_once_event_loop_finishes() {
        let finishing = tokio::spawn(tokio::time::sleep(Duration::from_millis(200)));

        let started = tokio::time::Instant::now();
        assert!(drain(finishing, Duration::from_secs(3)).await);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_connect_does_not_touch_the_network() {
        let link = Arc::new(LinkStatus::new());
        let (mut transport, _eventloop) =
            MqttTransport::connect(&MqttConfig::default(), Arc::clone(&link)).unwrap();

        let payload = b"online".to_vec();
        let result = transport.publish("breatheasy/status", payload, QoS::AtLeastOnce, true);
        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert!(!link.is_connected());
    }
}
