//! DataSetReader / ReaderGroup and the subscribe algorithm (spec.md §4.D).

use std::time::Duration;

use pubsub_codec::security::{self, SecurityKeys};
use pubsub_codec::{decode_security_prefix, decode_uadp, SecurityMode};
use pubsub_transport::{Channel, ReceiveOutcome};
use pubsub_types::{PublisherId, StatusCode};
use tracing::{debug, warn};

use crate::dataset::TargetVariable;
use crate::error::Result;
use crate::keys::SecurityContext;
use crate::nodestore::NodeStore;
use crate::state::ComponentState;
use crate::writer::Encoding;

pub struct DataSetReader {
    pub data_set_writer_id: u16,
    pub expected_publisher_id: Option<PublisherId>,
    pub target_variables: Vec<TargetVariable>,
    /// §9 open question resolution: a DeltaFrame observed before this
    /// reader's first KeyFrame is delivered rather than dropped, but with
    /// `StatusCode::UncertainInitialValue` since there is no known baseline
    /// for the unchanged fields it omits.
    seen_key_frame: bool,
}

impl DataSetReader {
    pub fn new(data_set_writer_id: u16, target_variables: Vec<TargetVariable>) -> Self {
        Self {
            data_set_writer_id,
            expected_publisher_id: None,
            target_variables,
            seen_key_frame: false,
        }
    }

    pub fn with_expected_publisher_id(mut self, id: PublisherId) -> Self {
        self.expected_publisher_id = Some(id);
        self
    }
}

pub struct ReaderGroup {
    pub reader_group_id: u16,
    pub security_mode: SecurityMode,
    pub security_group_id: Option<String>,
    pub encoding: Encoding,
    pub readers: Vec<DataSetReader>,
    pub state: ComponentState,
    security_ctx: Option<SecurityContext>,
}

impl ReaderGroup {
    pub fn new(
        reader_group_id: u16,
        security_mode: SecurityMode,
        security_group_id: Option<String>,
        encoding: Encoding,
    ) -> Self {
        Self {
            reader_group_id,
            security_mode,
            security_group_id,
            encoding,
            readers: Vec::new(),
            state: ComponentState::Disabled,
            security_ctx: None,
        }
    }

    pub fn add_reader(&mut self, reader: DataSetReader) {
        self.readers.push(reader);
    }

    pub fn bind_security_context(&mut self, ctx: SecurityContext) {
        self.security_ctx = Some(ctx);
    }

    /// Steps 1-3 of §4.D's subscribing algorithm. Returns `Ok(true)` if a
    /// message was received and processed (whether matched or not),
    /// `Ok(false)` on timeout.
    pub async fn receive_once(
        &mut self,
        channel: &mut dyn Channel,
        node_store: &dyn NodeStore,
        timeout: Duration,
    ) -> Result<bool> {
        let outcome = channel.receive(timeout).await?;
        let mut bytes = match outcome {
            ReceiveOutcome::Data(bytes) => bytes,
            ReceiveOutcome::Timeout => return Ok(false),
            ReceiveOutcome::Closed => {
                self.state = ComponentState::Error;
                return Ok(false);
            }
        };

        if self.security_mode != SecurityMode::None {
            let (security_header, payload_offset) = match decode_security_prefix(&bytes) {
                Ok(parsed) => parsed,
                Err(_) => {
                    warn!(reader_group_id = self.reader_group_id, "could not locate payload offset in secured message, dropping");
                    return Ok(true);
                }
            };
            let Some(security_header) = security_header else {
                warn!(reader_group_id = self.reader_group_id, "expected a secured message but found none, dropping");
                return Ok(true);
            };
            // The sender carries its per-message counter in the security
            // header's nonce field rather than us keeping our own parallel
            // counter, since packets can be lost or duplicated in transit.
            let counter = u64::from_le_bytes(security_header.message_nonce);

            let Some(ctx) = self.security_ctx.as_ref() else {
                warn!(reader_group_id = self.reader_group_id, "received secured message with no activated key, dropping");
                return Ok(true);
            };
            let Some(activated) = ctx.keys() else {
                warn!(reader_group_id = self.reader_group_id, "received secured message with no activated key, dropping");
                return Ok(true);
            };
            let keys = SecurityKeys {
                signing_key: &activated.signing_key,
                encrypting_key: &activated.encrypting_key,
                nonce: &activated.nonce,
            };
            if let Err(e) = security::open(
                &mut bytes,
                payload_offset,
                self.security_mode.encrypts(),
                ctx.policy,
                &keys,
                counter,
            ) {
                warn!(reader_group_id = self.reader_group_id, error = %e, "signature check failed, dropping message");
                return Ok(true);
            }
        }

        let decoded = match decode_uadp(&bytes) {
            Ok(d) => d,
            Err(e) => {
                warn!(reader_group_id = self.reader_group_id, error = %e, "decode failed, dropping message");
                return Ok(true);
            }
        };
        let message = decoded.message;

        for reader in &mut self.readers {
            if let Some(expected) = &reader.expected_publisher_id {
                if expected != &message.publisher_id {
                    continue;
                }
            }
            let matched = message
                .payload
                .iter()
                .find(|dsm| dsm.data_set_writer_id == reader.data_set_writer_id);
            let Some(dsm) = matched else {
                continue;
            };

            match &dsm.payload {
                pubsub_codec::DataSetPayload::KeyFrame(values) => {
                    for (target, value) in reader.target_variables.iter().zip(values.iter()) {
                        node_store
                            .write(&target.target_node_id, target.attribute_id, value.clone())
                            .await;
                    }
                    reader.seen_key_frame = true;
                }
                pubsub_codec::DataSetPayload::DeltaFrame(changed) => {
                    if !reader.seen_key_frame {
                        warn!(
                            reader_group_id = self.reader_group_id,
                            data_set_writer_id = reader.data_set_writer_id,
                            "DeltaFrame received before any KeyFrame, delivering with uncertain status"
                        );
                    }
                    for (index, value) in changed {
                        if let Some(target) = reader.target_variables.get(*index as usize) {
                            let value = if reader.seen_key_frame {
                                value.clone()
                            } else {
                                value.clone().with_status(StatusCode::UncertainInitialValue)
                            };
                            node_store
                                .write(&target.target_node_id, target.attribute_id, value)
                                .await;
                        }
                    }
                }
                pubsub_codec::DataSetPayload::KeepAlive => {}
            }
            debug!(
                reader_group_id = self.reader_group_id,
                data_set_writer_id = reader.data_set_writer_id,
                "dispatched dataset message"
            );
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DataSetField, PublishedDataSet, TargetVariable};
    use crate::nodestore::InMemoryNodeStore;
    use crate::writer::{DataSetWriter, WriterGroup};
    use pubsub_transport::error::Result as TransportResult;
    use pubsub_transport::ExtensionSettings;
    use pubsub_types::{DataValue, NodeId, Variant};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// An in-process loopback channel: whatever one side `send`s is what the
    /// other side's `receive` pops, used here to exercise the publish and
    /// subscribe ticks back-to-back without a real socket.
    #[derive(Default)]
    struct LoopbackChannel {
        queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    }

    impl LoopbackChannel {
        fn new() -> Self {
            Self::default()
        }

        fn subscriber(&self) -> Self {
            Self {
                queue: self.queue.clone(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Channel for LoopbackChannel {
        fn state(&self) -> pubsub_transport::ChannelState {
            pubsub_transport::ChannelState::PubAndSub
        }

        async fn register(&mut self, _ext: &ExtensionSettings) -> TransportResult<()> {
            Ok(())
        }

        async fn unregister(&mut self, _ext: &ExtensionSettings) -> TransportResult<()> {
            Ok(())
        }

        async fn send(&mut self, _ext: &ExtensionSettings, bytes: &[u8]) -> TransportResult<()> {
            self.queue.lock().unwrap().push_back(bytes.to_vec());
            Ok(())
        }

        async fn receive(&mut self, _timeout: Duration) -> TransportResult<ReceiveOutcome> {
            match self.queue.lock().unwrap().pop_front() {
                Some(bytes) => Ok(ReceiveOutcome::Data(bytes)),
                None => Ok(ReceiveOutcome::Timeout),
            }
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
    async fn key_frame_is_dispatched_to_the_matching_target_variable() {
        let publisher_store = InMemoryNodeStore::new();
        let source = NodeId::numeric(1, 1000);
        publisher_store
            .set(source.clone(), 13, DataValue::good(Variant::Int32(42)))
            .await;

        let mut writer_group = WriterGroup::new(
            1,
            Duration::from_millis(500),
            SecurityMode::None,
            None,
            Encoding::Uadp,
        );
        writer_group.add_writer(DataSetWriter::new(7, 1, pds()));

        let loopback = LoopbackChannel::new();
        let mut tx = loopback.subscriber();
        writer_group
            .publish_tick(PublisherId::U32(223344), &publisher_store, &mut tx)
            .await
            .unwrap();

        let mut reader_group =
            ReaderGroup::new(1, SecurityMode::None, None, Encoding::Uadp);
        let target = NodeId::numeric(1, 1002);
        reader_group.add_reader(DataSetReader::new(
            7,
            vec![TargetVariable {
                field_name: "value".into(),
                target_node_id: target.clone(),
                attribute_id: 13,
            }],
        ));

        let subscriber_store = InMemoryNodeStore::new();
        let mut rx = loopback.subscriber();
        let received = reader_group
            .receive_once(&mut rx, &subscriber_store, Duration::from_millis(10))
            .await
            .unwrap();

        assert!(received);
        let value = subscriber_store.read(&target, 13).await.unwrap();
        assert_eq!(value.value, Variant::Int32(42));
        assert_eq!(value.status, pubsub_types::StatusCode::Good);
    }

    #[tokio::test]
    async fn mismatched_publisher_id_is_dropped_silently() {
        let publisher_store = InMemoryNodeStore::new();
        let mut writer_group = WriterGroup::new(
            1,
            Duration::from_millis(500),
            SecurityMode::None,
            None,
            Encoding::Uadp,
        );
        writer_group.add_writer(DataSetWriter::new(7, 1, pds()));

        let loopback = LoopbackChannel::new();
        let mut tx = loopback.subscriber();
        writer_group
            .publish_tick(PublisherId::U32(1), &publisher_store, &mut tx)
            .await
            .unwrap();

        let mut reader_group =
            ReaderGroup::new(1, SecurityMode::None, None, Encoding::Uadp);
        let target = NodeId::numeric(1, 1002);
        reader_group.add_reader(
            DataSetReader::new(
                7,
                vec![TargetVariable {
                    field_name: "value".into(),
                    target_node_id: target.clone(),
                    attribute_id: 13,
                }],
            )
            .with_expected_publisher_id(PublisherId::U32(999)),
        );

        let subscriber_store = InMemoryNodeStore::new();
        let mut rx = loopback.subscriber();
        let received = reader_group
            .receive_once(&mut rx, &subscriber_store, Duration::from_millis(10))
            .await
            .unwrap();

        assert!(received);
        assert!(subscriber_store.read(&target, 13).await.is_none());
    }

    #[tokio::test]
    async fn delta_frame_before_any_key_frame_is_delivered_uncertain() {
        // A DeltaFrame can reach a reader before its first KeyFrame if the
        // reader joins mid-stream; manufacture one directly rather than via
        // `publish_tick` since a fresh DataSetWriter's own first tick is
        // always a KeyFrame (§4.D step 2).
        let loopback = LoopbackChannel::new();
        let mut tx = loopback.subscriber();

        let message = pubsub_codec::NetworkMessage {
            publisher_id: PublisherId::U32(1),
            group_header: None,
            data_set_writer_ids: Some(vec![7]),
            timestamp: None,
            picoseconds: None,
            promoted_fields: None,
            security_header: None,
            payload: vec![pubsub_codec::DataSetMessage::delta_frame(
                7,
                vec![(0u16, DataValue::good(Variant::Int32(99)))],
            )],
        };
        let bytes = pubsub_codec::NetworkMessageBuilder::new(&message).build();
        tx.send(&ExtensionSettings::default(), &bytes).await.unwrap();

        let mut reader_group =
            ReaderGroup::new(1, SecurityMode::None, None, Encoding::Uadp);
        let target = NodeId::numeric(1, 1002);
        reader_group.add_reader(DataSetReader::new(
            7,
            vec![TargetVariable {
                field_name: "value".into(),
                target_node_id: target.clone(),
                attribute_id: 13,
            }],
        ));

        let subscriber_store = InMemoryNodeStore::new();
        let mut rx = loopback.subscriber();
        reader_group
            .receive_once(&mut rx, &subscriber_store, Duration::from_millis(10))
            .await
            .unwrap();

        let value = subscriber_store.read(&target, 13).await.unwrap();
        assert_eq!(value.value, Variant::Int32(99));
        assert!(value.status.is_uncertain());
    }
}
