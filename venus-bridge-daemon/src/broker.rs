// Venus Bridge - D-Bus to MQTT telemetry bridge
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! MQTT broker adapter

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};
use venus_bridge::{Message, PublishError, Publisher, Readings};

use crate::error::DaemonError;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 64;

/// Split `host:port`
pub fn parse_server(server: &str) -> Result<(String, u16), DaemonError> {
    let invalid = || DaemonError::Server(server.to_string());
    let (host, port) = server.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

/// Connected broker client
pub struct Broker {
    client: AsyncClient,
    eventloop: JoinHandle<()>,
}

impl Broker {
    /// Connect and wait for the broker to accept the session
    pub async fn connect(host: &str, port: u16, client_id: &str) -> Result<Self, DaemonError> {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE).set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                DaemonError::Mqtt(format!(
                    "no CONNACK from {}:{} within {:?}",
                    host, port, CONNECT_TIMEOUT
                ))
            })??;
        info!("MQTT: connected to {}:{} as {}", host, port, client_id);

        let eventloop = tokio::spawn(drive(eventloop));
        Ok(Self { client, eventloop })
    }

    /// Publisher for the dispatch thread
    pub fn publisher(&self, topic: impl Into<String>) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
            topic: topic.into(),
        }
    }

    /// Publish prepared messages; failures are logged, not returned
    pub async fn publish_all(&self, messages: &[Message]) -> usize {
        let mut sent = 0;
        for message in messages {
            match self
                .client
                .publish(
                    message.topic.as_str(),
                    QoS::AtMostOnce,
                    message.retain,
                    message.payload.clone(),
                )
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => warn!("MQTT: publish to {} failed: {}", message.topic, e),
            }
        }
        sent
    }

    /// Send DISCONNECT and wait briefly for the event loop to flush it
    pub async fn disconnect(self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT: disconnect failed: {}", e);
        }
        if timeout(Duration::from_secs(2), self.eventloop).await.is_err() {
            debug!("MQTT: event loop did not stop in time");
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), DaemonError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(DaemonError::Mqtt(format!("connection refused: {:?}", code))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(DaemonError::Mqtt(e.to_string())),
        }
    }
}

async fn drive(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT: disconnected");
                break;
            }
            Ok(event) => trace!("MQTT: {:?}", event),
            Err(e) => {
                warn!("MQTT: connection error: {}", e);
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Publishes readings to the status topic without blocking
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, readings: &Readings) -> Result<(), PublishError> {
        let payload = readings.to_json()?;
        self.client
            .try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)
            .map_err(|e| PublishError::Rejected {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })
    }
}
