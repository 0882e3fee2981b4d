//! MQTT bus client

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    config::{MqttConfig, MqttTransport},
    errors::RelayError,
    models::Position,
    publisher::PositionBus,
};

/// Capacity of the request queue between the client and the event loop
const REQUEST_CAPACITY: usize = 100;

/// Delay before polling again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// MQTT connection publishing positions on a fixed topic
pub struct MqttBus {
    client: AsyncClient,
    topic: String,
    shutdown_timeout: Duration,
    handle: JoinHandle<()>,
}

impl MqttBus {
    /// Create the client and start driving its event loop
    pub fn connect(config: &MqttConfig) -> Result<Self, RelayError> {
        let (client, event_loop) = AsyncClient::new(Self::options(config), REQUEST_CAPACITY);
        info!(
            host = %config.host,
            port = config.port,
            topic = %config.topic,
            "connecting to MQTT broker"
        );

        let handle = tokio::spawn(Self::process_events(event_loop));

        Ok(Self {
            client,
            topic: config.topic.clone(),
            shutdown_timeout: config.shutdown_timeout,
            handle,
        })
    }

    fn options(config: &MqttConfig) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);

        match config.transport {
            MqttTransport::Tcp => {}
            MqttTransport::Tls => {
                mqtt_options.set_transport(Transport::tls_with_default_config());
            }
            MqttTransport::Wss => {
                mqtt_options.set_transport(Transport::wss_with_default_config());
            }
        }
        mqtt_options.set_keep_alive(config.keep_alive);

        mqtt_options
    }

    /// Drive the MQTT event loop
    ///
    /// `rumqttc` reconnects on the next poll after a connection error, so
    /// errors are logged and polling continues. The loop ends once the
    /// disconnect request has gone out.
    async fn process_events(mut event_loop: EventLoop) {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("Disconnected from MQTT broker");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    error!("MQTT Error: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

impl PositionBus for MqttBus {
    /// Hand a position to the event loop without waiting
    ///
    /// Fails if the request queue is full, which happens while the broker is
    /// unreachable. Nothing is buffered beyond that queue.
    async fn publish(&mut self, position: &Position) -> Result<(), RelayError> {
        let payload = serde_json::to_vec(position)?;
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }

    /// Queue a disconnect behind pending publishes and wait for the event
    /// loop to send it
    ///
    /// Gives up after `shutdown_timeout`, or at once if the request queue is
    /// full, and stops the event loop.
    async fn close(self) -> Result<(), RelayError> {
        let mut handle = self.handle;

        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "could not queue MQTT disconnect, dropping connection");
            handle.abort();
            return Ok(());
        }

        match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!(
                    timeout = ?self.shutdown_timeout,
                    "timed out draining MQTT connection"
                );
                handle.abort();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mqtt_config(transport: MqttTransport) -> MqttConfig {
        MqttConfig {
            host: "broker.local".to_string(),
            port: 8883,
            client_id: "relay-test".to_string(),
            topic: "positions".to_string(),
            transport,
            keep_alive: Duration::from_secs(15),
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn options_from_config() {
        let options = MqttBus::options(&mqtt_config(MqttTransport::Tcp));
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 8883));
        assert_eq!(options.client_id(), "relay-test");
        assert_eq!(options.keep_alive(), Duration::from_secs(15));
        assert!(matches!(options.transport(), Transport::Tcp));

        let options = MqttBus::options(&mqtt_config(MqttTransport::Wss));
        assert!(matches!(options.transport(), Transport::Wss(_)));
    }

    fn position(id: i32) -> Position {
        Position {
            id,
            created_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            recorded_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            valid: true,
            device_id: 7,
            latitude: 6.45,
            longitude: 3.39,
            altitude: 0.0,
            speed: 0.0,
            course: 0.0,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn unreachable_broker_does_not_block() {
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..mqtt_config(MqttTransport::Tcp)
        };
        let mut bus = MqttBus::connect(&config).unwrap();

        let mut failed = 0;
        for id in 0..(REQUEST_CAPACITY as i32 * 2) {
            let published =
                tokio::time::timeout(Duration::from_millis(500), bus.publish(&position(id)))
                    .await
                    .expect("publish blocked with the broker down");
            if published.is_err() {
                failed += 1;
            }
        }
        assert!(failed > 0);

        tokio::time::timeout(Duration::from_secs(5), bus.close())
            .await
            .expect("close blocked with the broker down")
            .unwrap();
    }
}
