//! MQTT Channel (§6: MQTT UADP/JSON broker profiles).
//!
//! Confirmed against `tutorial_pubsub_mqtt.c` (SPEC_FULL.md §C.4): `register`
//! must be called with a `BrokerWriterGroupTransport` extension whose
//! `queueName` becomes the topic subscribed/published to, and whose QoS maps
//! BestEffort→0, AtLeastOnce→1, AtMostOnce→2.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions as RumqttcOptions, Packet, QoS};
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelState, ExtensionSettings, ReceiveOutcome};
use crate::error::{Result, TransportError};
use crate::MqttOptions;

#[derive(Debug, Clone)]
pub struct MqttChannelConfig {
    pub broker: String,
    pub port: u16,
    pub options: MqttOptions,
}

fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

pub struct MqttChannel {
    client: AsyncClient,
    eventloop: rumqttc::EventLoop,
    topic: Option<String>,
    state: ChannelState,
}

impl MqttChannel {
    pub async fn open(config: MqttChannelConfig) -> Result<Self> {
        let mut opts = RumqttcOptions::new(config.options.client_id.clone(), config.broker.clone(), config.port);
        opts.set_keep_alive(Duration::from_secs(30));

        let (client, eventloop) = AsyncClient::new(opts, config.options.recv_buffer_size as usize);

        debug!(broker = %config.broker, port = config.port, "opened MQTT channel");

        Ok(Self {
            client,
            eventloop,
            topic: None,
            state: ChannelState::Ready,
        })
    }
}

#[async_trait]
impl Channel for MqttChannel {
    fn state(&self) -> ChannelState {
        self.state
    }

    async fn register(&mut self, ext: &ExtensionSettings) -> Result<()> {
        let topic = ext.topic.clone().ok_or_else(|| {
            TransportError::configuration(
                "MQTT register requires a BrokerWriterGroupTransport queueName",
                Some("topic"),
            )
        })?;
        let qos = qos_from_u8(ext.qos.unwrap_or(0));
        self.client
            .subscribe(&topic, qos)
            .await
            .map_err(|e| TransportError::network(format!("MQTT subscribe failed: {e}")))?;
        self.topic = Some(topic);
        Ok(())
    }

    async fn unregister(&mut self, ext: &ExtensionSettings) -> Result<()> {
        if let Some(topic) = &ext.topic {
            self.client
                .unsubscribe(topic)
                .await
                .map_err(|e| TransportError::network(format!("MQTT unsubscribe failed: {e}")))?;
        }
        self.topic = None;
        Ok(())
    }

    async fn send(&mut self, ext: &ExtensionSettings, bytes: &[u8]) -> Result<()> {
        let topic = ext
            .topic
            .as_ref()
            .or(self.topic.as_ref())
            .ok_or_else(|| TransportError::configuration("MQTT send requires a topic", Some("topic")))?;
        let qos = qos_from_u8(ext.qos.unwrap_or(0));
        self.client
            .publish(topic, qos, false, bytes.to_vec())
            .await
            .map_err(|e| {
                self.state = ChannelState::Error;
                TransportError::network(format!("MQTT publish failed: {e}"))
            })
    }

    async fn receive(&mut self, timeout: Duration) -> Result<ReceiveOutcome> {
        match tokio::time::timeout(timeout, self.eventloop.poll()).await {
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                Ok(ReceiveOutcome::Data(publish.payload.to_vec()))
            }
            Ok(Ok(_other_event)) => {
                // Not a data publish (PingResp, SubAck, ...); caller retries.
                Ok(ReceiveOutcome::Timeout)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "MQTT event loop error");
                self.state = ChannelState::Error;
                Err(TransportError::network(format!("MQTT event loop error: {e}")))
            }
            Err(_) => Ok(ReceiveOutcome::Timeout),
        }
    }

    /// Broker-backed channels need a cooperative poll of the client's event
    /// loop to drive keepalive/ack traffic between publish ticks (§4.A).
    async fn yield_now(&mut self) -> Result<()> {
        match tokio::time::timeout(Duration::from_millis(0), self.eventloop.poll()).await {
            Ok(Ok(_)) | Err(_) => Ok(()),
            Ok(Err(e)) => Err(TransportError::network(format!("MQTT event loop error: {e}"))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| TransportError::network(format!("MQTT disconnect failed: {e}")))?;
        self.state = ChannelState::Error;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_mapping_matches_broker_profile_table() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
    }
}
