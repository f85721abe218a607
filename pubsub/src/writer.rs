//! DataSetWriter / WriterGroup and the publish-tick algorithm (spec.md §4.D).

use std::sync::Arc;
use std::time::Duration;

use pubsub_codec::security::{self, SecurityKeys};
use pubsub_codec::{
    DataSetMessage, GroupHeader, NetworkMessage, NetworkMessageBuilder, SecurityHeader,
    SecurityMode,
};
use pubsub_transport::{Channel, ExtensionSettings};
use pubsub_types::{DataValue, PublisherId};
use tracing::{debug, warn};

use crate::dataset::PublishedDataSet;
use crate::error::{CoreError, Result};
use crate::keys::SecurityContext;
use crate::nodestore::NodeStore;
use crate::state::ComponentState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Uadp,
    Json,
}

impl From<pubsub_config::Encoding> for Encoding {
    fn from(c: pubsub_config::Encoding) -> Self {
        match c {
            pubsub_config::Encoding::Uadp => Encoding::Uadp,
            pubsub_config::Encoding::Json => Encoding::Json,
        }
    }
}

/// Per-dataset binding inside a WriterGroup. Has no independent state
/// machine; transitions track the parent group (§3).
pub struct DataSetWriter {
    pub writer_id: u16,
    pub key_frame_count: u32,
    pub published_data_set: Arc<PublishedDataSet>,
    tick_count: u32,
    last_values: Vec<Option<DataValue>>,
}

impl DataSetWriter {
    pub fn new(writer_id: u16, key_frame_count: u32, published_data_set: Arc<PublishedDataSet>) -> Self {
        let field_count = published_data_set.field_count();
        Self {
            writer_id,
            key_frame_count,
            published_data_set,
            tick_count: 0,
            last_values: vec![None; field_count],
        }
    }

    /// Step 1-2 of the publish algorithm: sample every field, then decide
    /// KeyFrame vs DeltaFrame off a running per-writer counter. `key_frame_count`
    /// of 0 or 1 means every message is a KeyFrame.
    async fn sample(&mut self, node_store: &dyn NodeStore) -> DataSetMessage {
        let mut sampled = Vec::with_capacity(self.published_data_set.field_count());
        for field in &self.published_data_set.fields {
            let value = node_store
                .read(&field.source_node_id, field.attribute_id)
                .await
                .unwrap_or_else(|| DataValue::good(pubsub_types::Variant::Null));
            sampled.push(value);
        }

        let send_key_frame =
            self.key_frame_count <= 1 || self.tick_count % self.key_frame_count == 0;
        self.tick_count = self.tick_count.wrapping_add(1);

        let message = if send_key_frame {
            for (slot, value) in self.last_values.iter_mut().zip(sampled.iter()) {
                *slot = Some(value.clone());
            }
            DataSetMessage::key_frame(self.writer_id, sampled)
        } else {
            let mut changed = Vec::new();
            for (index, (value, last)) in sampled.iter().zip(self.last_values.iter()).enumerate() {
                if Some(value) != last.as_ref() {
                    changed.push((index as u16, value.clone()));
                }
            }
            for (index, value) in &changed {
                self.last_values[*index as usize] = Some(value.clone());
            }
            DataSetMessage::delta_frame(self.writer_id, changed)
        };
        message
    }
}

pub struct WriterGroup {
    pub writer_group_id: u16,
    pub publishing_interval: Duration,
    pub security_mode: SecurityMode,
    pub security_group_id: Option<String>,
    pub encoding: Encoding,
    pub writers: Vec<DataSetWriter>,
    pub state: ComponentState,
    sequence_number: u16,
    network_message_number: u16,
    group_version: u32,
    security_ctx: Option<SecurityContext>,
}

impl WriterGroup {
    pub fn new(
        writer_group_id: u16,
        publishing_interval: Duration,
        security_mode: SecurityMode,
        security_group_id: Option<String>,
        encoding: Encoding,
    ) -> Self {
        Self {
            writer_group_id,
            publishing_interval,
            security_mode,
            security_group_id,
            encoding,
            writers: Vec::new(),
            state: ComponentState::Disabled,
            sequence_number: 0,
            network_message_number: 0,
            group_version: 1,
            security_ctx: None,
        }
    }

    pub fn add_writer(&mut self, writer: DataSetWriter) {
        self.writers.push(writer);
    }

    pub fn bind_security_context(&mut self, ctx: SecurityContext) {
        self.security_ctx = Some(ctx);
    }

    pub fn security_token_id(&self) -> Option<u32> {
        self.security_ctx.as_ref().map(|c| c.security_token_id)
    }

    /// Runs one publish tick: steps 1-5 of §4.D's publishing algorithm.
    pub async fn publish_tick(
        &mut self,
        publisher_id: PublisherId,
        node_store: &dyn NodeStore,
        channel: &mut dyn Channel,
    ) -> Result<()> {
        if self.security_mode != SecurityMode::None && self.security_ctx.as_ref().map(|c| c.is_activated()) != Some(true) {
            self.state = ComponentState::Error;
            return Err(CoreError::NoKeyStorage(
                self.security_group_id.clone().unwrap_or_default(),
            ));
        }

        let mut payload = Vec::with_capacity(self.writers.len());
        for writer in &mut self.writers {
            payload.push(writer.sample(node_store).await);
        }

        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.network_message_number = self.network_message_number.wrapping_add(1);

        let mut message = NetworkMessage::new(publisher_id);
        message.group_header = Some(GroupHeader {
            writer_group_id: self.writer_group_id,
            group_version: self.group_version,
            network_message_number: self.network_message_number,
            sequence_number: self.sequence_number,
        });
        message.data_set_writer_ids = Some(self.writers.iter().map(|w| w.writer_id).collect());
        message.payload = payload;

        if self.security_mode != SecurityMode::None {
            let ctx = self.security_ctx.as_mut().expect("checked above");
            message.security_header = Some(SecurityHeader {
                token_id: ctx.security_token_id,
                message_nonce: [0u8; 8],
                signature_length: ctx.policy.signature_length() as u16,
            });
        }

        let (mut bytes, payload_offset) = NetworkMessageBuilder::new(&message).build_with_payload_offset();

        if self.security_mode != SecurityMode::None {
            let ctx = self.security_ctx.as_mut().expect("checked above");
            let counter = ctx.next_counter();
            let nonce_bytes = counter.to_le_bytes();
            bytes[payload_offset - 10..payload_offset - 2].copy_from_slice(&nonce_bytes);
            let activated = ctx.keys().expect("checked above");
            let keys = SecurityKeys {
                signing_key: &activated.signing_key,
                encrypting_key: &activated.encrypting_key,
                nonce: &activated.nonce,
            };
            security::seal(
                &mut bytes,
                payload_offset,
                self.security_mode.encrypts(),
                ctx.policy,
                &keys,
                counter,
            )?;
        }

        match channel.send(&ExtensionSettings::default(), &bytes).await {
            Ok(()) => {
                debug!(
                    writer_group_id = self.writer_group_id,
                    sequence_number = self.sequence_number,
                    "published network message"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    writer_group_id = self.writer_group_id,
                    error = %e,
                    "publish failed, transitioning group to Error"
                );
                self.state = ComponentState::Error;
                Err(CoreError::Transport(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataSetField;
    use crate::nodestore::InMemoryNodeStore;
    use pubsub_codec::decode_uadp;
    use pubsub_transport::error::Result as TransportResult;
    use pubsub_transport::ReceiveOutcome;
    use pubsub_types::{NodeId, Variant};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Vec<Vec<u8>>,
        fail_next: bool,
    }

    #[async_trait::async_trait]
    impl Channel for RecordingChannel {
        fn state(&self) -> pubsub_transport::ChannelState {
            pubsub_transport::ChannelState::PublisherOnly
        }

        async fn register(&mut self, _ext: &ExtensionSettings) -> TransportResult<()> {
            Ok(())
        }

        async fn unregister(&mut self, _ext: &ExtensionSettings) -> TransportResult<()> {
            Ok(())
        }

        async fn send(&mut self, _ext: &ExtensionSettings, bytes: &[u8]) -> TransportResult<()> {
            if self.fail_next {
                return Err(pubsub_transport::error::TransportError::network(
                    "injected failure",
                ));
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        async fn receive(&mut self, _timeout: Duration) -> TransportResult<ReceiveOutcome> {
            Ok(ReceiveOutcome::Timeout)
        }

        async fn close(&mut self) -> TransportResult<()> {
            Ok(())
        }
    }

    fn pds() -> Arc<PublishedDataSet> {
        Arc::new(PublishedDataSet::new(
            "test",
            vec![DataSetField {
                name: "value".into(),
                source_node_id: NodeId::numeric(1, 1000),
                attribute_id: 13,
            }],
        ))
    }

    #[tokio::test]
    async fn publish_tick_sends_a_key_frame_with_every_field() {
        let store = InMemoryNodeStore::new();
        store
            .set(NodeId::numeric(1, 1000), 13, DataValue::good(Variant::Int32(42)))
            .await;

        let mut group = WriterGroup::new(
            1,
            Duration::from_millis(500),
            SecurityMode::None,
            None,
            Encoding::Uadp,
        );
        group.add_writer(DataSetWriter::new(1, 1, pds()));

        let mut channel = RecordingChannel::default();
        group
            .publish_tick(PublisherId::U32(223344), &store, &mut channel)
            .await
            .unwrap();

        assert_eq!(channel.sent.len(), 1);
        let decoded = decode_uadp(&channel.sent[0]).unwrap().message;
        assert_eq!(decoded.publisher_id, PublisherId::U32(223344));
        assert_eq!(decoded.payload.len(), 1);
        assert!(decoded.payload[0].payload.is_key_frame());
    }

    #[tokio::test]
    async fn key_frame_count_zero_never_sends_delta_frames() {
        let store = InMemoryNodeStore::new();
        let node_id = NodeId::numeric(1, 1000);
        store.set(node_id.clone(), 13, DataValue::good(Variant::Int32(1))).await;

        let mut group = WriterGroup::new(
            1,
            Duration::from_millis(500),
            SecurityMode::None,
            None,
            Encoding::Uadp,
        );
        group.add_writer(DataSetWriter::new(1, 0, pds()));

        let mut channel = RecordingChannel::default();
        for value in [1, 2, 3] {
            store.set(node_id.clone(), 13, DataValue::good(Variant::Int32(value))).await;
            group
                .publish_tick(PublisherId::U32(1), &store, &mut channel)
                .await
                .unwrap();
        }

        for bytes in &channel.sent {
            let decoded = decode_uadp(bytes).unwrap().message;
            assert!(decoded.payload[0].payload.is_key_frame());
        }
    }

    #[tokio::test]
    async fn unchanged_field_is_omitted_from_a_delta_frame() {
        let store = InMemoryNodeStore::new();
        let node_id = NodeId::numeric(1, 1000);
        store.set(node_id.clone(), 13, DataValue::good(Variant::Int32(1))).await;

        let mut group = WriterGroup::new(
            1,
            Duration::from_millis(500),
            SecurityMode::None,
            None,
            Encoding::Uadp,
        );
        group.add_writer(DataSetWriter::new(1, 10, pds()));

        let mut channel = RecordingChannel::default();
        group
            .publish_tick(PublisherId::U32(1), &store, &mut channel)
            .await
            .unwrap();
        group
            .publish_tick(PublisherId::U32(1), &store, &mut channel)
            .await
            .unwrap();

        let decoded = decode_uadp(&channel.sent[1]).unwrap().message;
        match &decoded.payload[0].payload {
            pubsub_codec::DataSetPayload::DeltaFrame(changed) => assert!(changed.is_empty()),
            other => panic!("expected DeltaFrame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_transitions_group_to_error() {
        let store = InMemoryNodeStore::new();
        let mut group = WriterGroup::new(
            1,
            Duration::from_millis(500),
            SecurityMode::None,
            None,
            Encoding::Uadp,
        );
        group.add_writer(DataSetWriter::new(1, 1, pds()));

        let mut channel = RecordingChannel {
            fail_next: true,
            ..Default::default()
        };
        let result = group
            .publish_tick(PublisherId::U32(1), &store, &mut channel)
            .await;

        assert!(result.is_err());
        assert_eq!(group.state, ComponentState::Error);
    }

    #[tokio::test]
    async fn security_mode_without_activated_keys_errors_without_sending() {
        let store = InMemoryNodeStore::new();
        let mut group = WriterGroup::new(
            1,
            Duration::from_millis(500),
            SecurityMode::Sign,
            Some("TestSecurityGroup".into()),
            Encoding::Uadp,
        );
        group.add_writer(DataSetWriter::new(1, 1, pds()));

        let mut channel = RecordingChannel::default();
        let result = group
            .publish_tick(PublisherId::U32(1), &store, &mut channel)
            .await;

        assert!(result.is_err());
        assert!(channel.sent.is_empty());
        assert_eq!(group.state, ComponentState::Error);
    }
}
