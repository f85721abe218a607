//! Connection: owns a transport channel and the WriterGroups/ReaderGroups
//! that inherit it (spec.md §3, §4.D).

use std::time::Duration;

use pubsub_transport::{Channel, ChannelConfig};
use pubsub_types::PublisherId;
use tracing::{error, info, warn};

use crate::error::{CoreError, Result};
use crate::nodestore::NodeStore;
use crate::reader::ReaderGroup;
use crate::state::{ComponentState, RetryBackoff};
use crate::writer::WriterGroup;

pub struct Connection {
    pub id: u64,
    pub name: String,
    pub publisher_id: PublisherId,
    pub channel_config: ChannelConfig,
    pub writer_groups: Vec<WriterGroup>,
    pub reader_groups: Vec<ReaderGroup>,
    pub state: ComponentState,
    channel: Option<Box<dyn Channel>>,
    backoff: RetryBackoff,
}

impl Connection {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        publisher_id: PublisherId,
        channel_config: ChannelConfig,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            publisher_id,
            channel_config,
            writer_groups: Vec::new(),
            reader_groups: Vec::new(),
            state: ComponentState::Disabled,
            channel: None,
            backoff: RetryBackoff::new(Duration::from_secs(30)),
        }
    }

    pub fn add_writer_group(&mut self, group: WriterGroup) {
        self.writer_groups.push(group);
    }

    pub fn add_reader_group(&mut self, group: ReaderGroup) {
        self.reader_groups.push(group);
    }

    /// `Disabled → PreOperational → Operational` per §4.D. Security-group
    /// activation is the caller's responsibility (the manager drives it
    /// through `KeyStorage::activate_into_channel` before calling this),
    /// matching the spec's "PreOperational blocks on activateIntoChannel"
    /// wording.
    pub async fn enable(&mut self) -> Result<()> {
        self.state = ComponentState::PreOperational;
        match pubsub_transport::open_channel(self.channel_config.clone()).await {
            Ok(channel) => {
                self.channel = Some(channel);
                for wg in &mut self.writer_groups {
                    wg.state = ComponentState::Operational;
                }
                for rg in &mut self.reader_groups {
                    rg.state = ComponentState::Operational;
                }
                self.state = ComponentState::Operational;
                self.backoff.reset();
                info!(connection = %self.name, "connection operational");
                Ok(())
            }
            Err(e) => {
                self.state = ComponentState::Error;
                error!(connection = %self.name, error = %e, "failed to open channel");
                Err(CoreError::Transport(e))
            }
        }
    }

    pub async fn disable(&mut self) {
        for wg in &mut self.writer_groups {
            wg.state = ComponentState::Disabled;
        }
        for rg in &mut self.reader_groups {
            rg.state = ComponentState::Disabled;
        }
        if let Some(channel) = &mut self.channel {
            let _ = channel.close().await;
        }
        self.channel = None;
        self.state = ComponentState::Disabled;
        info!(connection = %self.name, "connection disabled");
    }

    pub fn pause(&mut self) {
        if self.state == ComponentState::Operational {
            self.state = ComponentState::Paused;
        }
    }

    /// Delay to wait before the next reconnect attempt while `state` is
    /// `Error`, doubling each call up to the 30s cap (§4.D).
    pub fn backoff_next_delay(&mut self) -> Duration {
        self.backoff.next_delay()
    }

    /// Runs one publish tick for every operational WriterGroup bound to
    /// this connection's channel (§4.D step 5: on error, transition that
    /// group to Error and drop the message, not the whole connection).
    pub async fn publish_tick(&mut self, node_store: &dyn NodeStore) {
        let Some(channel) = self.channel.as_deref_mut() else {
            warn!(connection = %self.name, "publish tick skipped: channel not open");
            return;
        };
        for group in &mut self.writer_groups {
            if !group.state.is_operational() {
                continue;
            }
            if let Err(e) = group
                .publish_tick(self.publisher_id.clone(), node_store, channel)
                .await
            {
                warn!(
                    connection = %self.name,
                    writer_group_id = group.writer_group_id,
                    error = %e,
                    "publish tick failed"
                );
            }
        }
    }

    /// Polls every operational ReaderGroup once (§4.D subscribing algorithm).
    pub async fn receive_tick(&mut self, node_store: &dyn NodeStore, timeout: Duration) {
        let Some(channel) = self.channel.as_deref_mut() else {
            return;
        };
        for group in &mut self.reader_groups {
            if !group.state.is_operational() {
                continue;
            }
            if let Err(e) = group.receive_once(channel, node_store, timeout).await {
                warn!(
                    connection = %self.name,
                    reader_group_id = group.reader_group_id,
                    error = %e,
                    "receive tick failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodestore::InMemoryNodeStore;
    use pubsub_transport::{Address, MqttOptions, TransportProfile, UdpOptions};

    fn udp_config() -> ChannelConfig {
        ChannelConfig {
            profile: TransportProfile::UdpUadp,
            address: Address::Udp {
                host: "224.0.0.22".into(),
                port: 4840,
                interface: None,
            },
            udp: UdpOptions::default(),
            mqtt: MqttOptions::default(),
        }
    }

    fn fresh_connection() -> Connection {
        Connection::new(1, "test", PublisherId::U32(223344), udp_config())
    }

    #[test]
    fn starts_disabled() {
        let conn = fresh_connection();
        assert_eq!(conn.state, ComponentState::Disabled);
    }

    #[test]
    fn pause_only_applies_from_operational() {
        let mut conn = fresh_connection();
        conn.pause();
        assert_eq!(conn.state, ComponentState::Disabled);

        conn.state = ComponentState::Operational;
        conn.pause();
        assert_eq!(conn.state, ComponentState::Paused);
    }

    #[test]
    fn backoff_delay_doubles_up_to_the_cap() {
        let mut conn = fresh_connection();
        let first = conn.backoff_next_delay();
        let second = conn.backoff_next_delay();
        assert!(second >= first);
        assert!(second <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn publish_tick_is_a_no_op_without_an_open_channel() {
        let mut conn = fresh_connection();
        conn.add_writer_group(WriterGroup::new(
            1,
            Duration::from_millis(500),
            pubsub_codec::SecurityMode::None,
            None,
            crate::writer::Encoding::Uadp,
        ));
        let store = InMemoryNodeStore::new();

        // No channel has been opened (state is still Disabled), so this must
        // return without panicking and without touching any writer group.
        conn.publish_tick(&store).await;
        assert_eq!(conn.writer_groups[0].state, ComponentState::Disabled);
    }

    #[tokio::test]
    async fn receive_tick_is_a_no_op_without_an_open_channel() {
        let mut conn = fresh_connection();
        let store = InMemoryNodeStore::new();
        conn.receive_tick(&store, Duration::from_millis(10)).await;
    }
}
