//! PubSubManager: the root object a `pubsubd` process drives. Owns every
//! Connection, PublishedDataSet, SecurityGroup/KeyStorage, and the reserved
//! id tree, and enforces the add/remove invariants spec.md §3 and §5 name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pubsub_codec::security::SecurityPolicy;
use pubsub_config::{
    AddressConfig, ConnectionConfig, DataSetReaderConfig, DataSetWriterConfig, PublishedDataSetConfig,
    ReaderGroupConfig, SecurityGroupConfig, SecurityPolicyId, WriterGroupConfig,
};
use pubsub_keystorage::KeyStorage;
use pubsub_transport::{Address, ChannelConfig, MqttOptions, TransportProfile, UdpOptions};
use pubsub_types::{NodeId, PubSubError, PublisherId};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::dataset::{DataSetField, PublishedDataSet, TargetVariable};
use crate::error::{CoreError, Result};
use crate::keys::SecurityContext;
use crate::nodestore::NodeStore;
use crate::reader::{DataSetReader, ReaderGroup};
use crate::reserve::ReserveIdTree;
use crate::writer::{DataSetWriter, Encoding, WriterGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    #[default]
    Stopped,
    Stopping,
    Started,
}

/// One registered SecurityGroup: its key storage plus the policy/id needed
/// to activate a [`SecurityContext`] for a bound WriterGroup/ReaderGroup.
pub struct SecurityGroupHandle {
    pub storage: Arc<Mutex<KeyStorage>>,
    pub policy: SecurityPolicy,
}

#[derive(Default)]
pub struct PubSubManager {
    pub connections: Vec<Connection>,
    published_data_sets: HashMap<String, Arc<PublishedDataSet>>,
    security_groups: HashMap<String, SecurityGroupHandle>,
    reserve_tree: ReserveIdTree,
    state: ManagerState,
    next_connection_id: u64,
}

impl PubSubManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = ManagerState::Started;
        info!("PubSub manager started");
    }

    pub async fn stop(&mut self) {
        self.state = ManagerState::Stopping;
        for conn in &mut self.connections {
            conn.disable().await;
        }
        self.state = ManagerState::Stopped;
        info!("PubSub manager stopped");
    }

    fn next_id(&mut self) -> u64 {
        self.next_connection_id += 1;
        self.next_connection_id
    }

    // -- PublishedDataSet ---------------------------------------------------

    /// Registers a new PublishedDataSet. Errors with `BadNodeIdExists`
    /// (spec.md §3) if the name is already taken.
    pub fn add_published_data_set(&mut self, data_set: PublishedDataSet) -> Result<()> {
        if self.published_data_sets.contains_key(&data_set.name) {
            return Err(CoreError::Types(PubSubError::NodeIdExists(data_set.name)));
        }
        self.published_data_sets
            .insert(data_set.name.clone(), Arc::new(data_set));
        Ok(())
    }

    fn add_published_data_set_from_config(&mut self, config: &PublishedDataSetConfig) -> Result<()> {
        let fields = config
            .fields
            .iter()
            .map(|f| {
                let source_node_id = NodeId::parse(&f.source_node_id).ok_or_else(|| {
                    CoreError::Types(PubSubError::InvalidArgument(format!(
                        "malformed node id: {}",
                        f.source_node_id
                    )))
                })?;
                Ok(DataSetField {
                    name: f.name.clone(),
                    source_node_id,
                    attribute_id: f.attribute_id,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.add_published_data_set(PublishedDataSet::new(config.name.clone(), fields))
    }

    /// Removes a PublishedDataSet, rejecting the call if any DataSetWriter
    /// across any Connection still references it (§3: "PublishedDataSet
    /// cannot be removed while referenced").
    pub fn remove_published_data_set(&mut self, name: &str) -> Result<()> {
        let in_use = self.connections.iter().any(|conn| {
            conn.writer_groups
                .iter()
                .any(|wg| wg.writers.iter().any(|w| w.published_data_set.name == name))
        });
        if in_use {
            return Err(CoreError::PublishedDataSetInUse(name.to_string()));
        }
        self.published_data_sets
            .remove(name)
            .ok_or_else(|| CoreError::Types(PubSubError::NotFound(name.to_string())))?;
        Ok(())
    }

    pub fn published_data_set(&self, name: &str) -> Option<&Arc<PublishedDataSet>> {
        self.published_data_sets.get(name)
    }

    // -- SecurityGroup / KeyStorage ------------------------------------------

    /// Registers a SecurityGroup's key storage. Errors with `BadNodeIdExists`
    /// on a duplicate id (spec.md §4.C Scenario 2).
    pub fn add_security_group(&mut self, config: &SecurityGroupConfig) -> Result<()> {
        if self.security_groups.contains_key(&config.security_group_id) {
            return Err(CoreError::Types(PubSubError::NodeIdExists(
                config.security_group_id.clone(),
            )));
        }
        let policy = match config.policy {
            SecurityPolicyId::Aes128Ctr => SecurityPolicy::Aes128CtrHmacSha256,
            SecurityPolicyId::Aes256Ctr => SecurityPolicy::Aes256CtrHmacSha256,
        };
        let storage = KeyStorage::new(
            config.security_group_id.clone(),
            policy,
            config.max_past_keys,
            config.max_future_keys,
            Duration::from_millis(config.key_lifetime_ms),
        );
        self.security_groups.insert(
            config.security_group_id.clone(),
            SecurityGroupHandle {
                storage: Arc::new(Mutex::new(storage)),
                policy,
            },
        );
        Ok(())
    }

    pub fn remove_security_group(&mut self, security_group_id: &str) -> Result<()> {
        self.security_groups
            .remove(security_group_id)
            .ok_or_else(|| CoreError::Types(PubSubError::NotFound(security_group_id.to_string())))?;
        Ok(())
    }

    pub fn security_group(&self, security_group_id: &str) -> Option<&SecurityGroupHandle> {
        self.security_groups.get(security_group_id)
    }

    /// Activates the named SecurityGroup's current key into a fresh
    /// [`SecurityContext`], ready to bind onto a WriterGroup/ReaderGroup.
    pub async fn activate_security_context(&self, security_group_id: &str) -> Result<SecurityContext> {
        let handle = self
            .security_groups
            .get(security_group_id)
            .ok_or_else(|| CoreError::NoKeyStorage(security_group_id.to_string()))?;
        let storage = handle.storage.lock().await;
        let activated = storage.activate_into_channel()?;
        let token_id = storage
            .current_key_id()
            .ok_or_else(|| CoreError::NoKeyStorage(security_group_id.to_string()))?;
        let mut ctx = SecurityContext::new(handle.policy, security_group_id);
        ctx.activate(token_id, activated);
        Ok(ctx)
    }

    // -- Reserved ids ---------------------------------------------------------

    pub fn reserve_ids(
        &mut self,
        session_id: u64,
        n_writer_group: u16,
        n_data_set_writer: u16,
        transport_profile: TransportProfile,
    ) -> (Vec<u16>, Vec<u16>) {
        let existing_wg: Vec<u16> = self
            .connections
            .iter()
            .flat_map(|c| c.writer_groups.iter().map(|wg| wg.writer_group_id))
            .collect();
        let existing_dsw: Vec<u16> = self
            .connections
            .iter()
            .flat_map(|c| c.writer_groups.iter().flat_map(|wg| wg.writers.iter().map(|w| w.writer_id)))
            .collect();
        self.reserve_tree.reserve_ids(
            session_id,
            n_writer_group,
            n_data_set_writer,
            transport_profile,
            &existing_wg,
            &existing_dsw,
        )
    }

    pub fn release_session_reservations(&mut self, session_id: u64) {
        self.reserve_tree.mark_session_dead(session_id);
    }

    // -- Connections -----------------------------------------------------------

    /// Builds and registers a Connection from configuration, resolving
    /// PublishedDataSet references and binding each secured group's
    /// SecurityContext from its registered SecurityGroup.
    pub async fn add_connection(&mut self, config: &ConnectionConfig) -> Result<u64> {
        let address = resolve_address(&config.address)?;
        let profile = TransportProfile::from_uri(&config.transport_profile_uri)?;
        let channel_config = ChannelConfig {
            profile,
            address,
            udp: udp_options(&config.address),
            mqtt: mqtt_options(&config.address),
        };

        let id = self.next_id();
        let mut connection = Connection::new(
            id,
            config.name.clone(),
            pubsub_types::PublisherId::from(&config.publisher_id),
            channel_config,
        );

        for wg_config in &config.writer_groups {
            connection.add_writer_group(self.build_writer_group(wg_config).await?);
        }
        for rg_config in &config.reader_groups {
            connection.add_reader_group(self.build_reader_group(rg_config).await?);
        }

        self.connections.push(connection);
        Ok(id)
    }

    async fn build_writer_group(&mut self, config: &WriterGroupConfig) -> Result<WriterGroup> {
        let mut group = WriterGroup::new(
            config.writer_group_id,
            Duration::from_millis(config.publishing_interval_ms),
            config.security_mode.into(),
            config.security_group_id.clone(),
            config.encoding.into(),
        );
        for writer_config in &config.writers {
            group.add_writer(self.build_writer(writer_config)?);
        }
        if let Some(security_group_id) = &config.security_group_id {
            let ctx = self.activate_security_context(security_group_id).await?;
            group.bind_security_context(ctx);
        }
        Ok(group)
    }

    fn build_writer(&self, config: &DataSetWriterConfig) -> Result<DataSetWriter> {
        let data_set = self
            .published_data_sets
            .get(&config.published_data_set)
            .cloned()
            .ok_or_else(|| CoreError::Types(PubSubError::NotFound(config.published_data_set.clone())))?;
        Ok(DataSetWriter::new(config.writer_id, config.key_frame_count, data_set))
    }

    async fn build_reader_group(&mut self, config: &ReaderGroupConfig) -> Result<ReaderGroup> {
        let mut group = ReaderGroup::new(
            config.reader_group_id,
            config.security_mode.into(),
            config.security_group_id.clone(),
            Encoding::Uadp,
        );
        for reader_config in &config.readers {
            group.add_reader(build_reader(reader_config)?);
        }
        if let Some(security_group_id) = &config.security_group_id {
            let ctx = self.activate_security_context(security_group_id).await?;
            group.bind_security_context(ctx);
        }
        Ok(group)
    }

    pub fn connection_mut(&mut self, id: u64) -> Result<&mut Connection> {
        self.connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(CoreError::UnknownConnection(id))
    }

    pub async fn enable_connection(&mut self, id: u64) -> Result<()> {
        self.connection_mut(id)?.enable().await
    }

    pub async fn disable_connection(&mut self, id: u64) -> Result<()> {
        self.connection_mut(id)?.disable().await;
        Ok(())
    }

    /// Runs one tick across every connection: publish for writer groups,
    /// poll for reader groups. A real `pubsubd` calls this off each
    /// connection's own publishing-interval timer; the manager itself stays
    /// timer-agnostic so callers can drive it from `tokio::time::interval`
    /// or a test harness alike.
    pub async fn tick_all(&mut self, node_store: &dyn NodeStore, receive_timeout: Duration) {
        if self.state != ManagerState::Started {
            return;
        }
        for conn in &mut self.connections {
            match conn.state {
                crate::state::ComponentState::Operational => {
                    conn.publish_tick(node_store).await;
                    conn.receive_tick(node_store, receive_timeout).await;
                }
                crate::state::ComponentState::Error => {
                    let delay = conn.backoff_next_delay();
                    warn!(connection = %conn.name, delay_ms = delay.as_millis(), "connection in error, will retry");
                }
                _ => {}
            }
        }
    }
}

fn build_reader(config: &DataSetReaderConfig) -> Result<DataSetReader> {
    let target_variables = config
        .target_variables
        .iter()
        .map(|t| {
            let target_node_id = NodeId::parse(&t.target_node_id).ok_or_else(|| {
                CoreError::Types(PubSubError::InvalidArgument(format!(
                    "malformed node id: {}",
                    t.target_node_id
                )))
            })?;
            Ok(TargetVariable {
                field_name: t.field_name.clone(),
                target_node_id,
                attribute_id: t.attribute_id,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let expected_publisher_id = PublisherId::from(&config.expected_publisher_id);
    Ok(DataSetReader::new(config.data_set_writer_id, target_variables).with_expected_publisher_id(expected_publisher_id))
}

fn resolve_address(config: &AddressConfig) -> Result<Address> {
    match config {
        AddressConfig::Udp { url, interface, .. } => {
            let mut addr = pubsub_transport::address::parse_udp_address(url)?;
            if let (Address::Udp { interface: slot, .. }, Some(iface)) = (&mut addr, interface) {
                *slot = Some(iface.clone());
            }
            Ok(addr)
        }
        AddressConfig::Mqtt { url, .. } => Ok(pubsub_transport::address::parse_mqtt_address(url)?),
        AddressConfig::Ethernet { url } => Ok(pubsub_transport::address::parse_ethernet_address(url)?),
    }
}

fn udp_options(config: &AddressConfig) -> UdpOptions {
    match config {
        AddressConfig::Udp { ttl, loopback, reuse, .. } => UdpOptions {
            ttl: *ttl,
            loopback: *loopback,
            reuse: *reuse,
        },
        _ => UdpOptions::default(),
    }
}

fn mqtt_options(config: &AddressConfig) -> MqttOptions {
    match config {
        AddressConfig::Mqtt { client_id: Some(id), .. } => MqttOptions {
            client_id: id.clone(),
            ..MqttOptions::default()
        },
        _ => MqttOptions::default(),
    }
}

impl PubSubManager {
    /// Loads an entire `ServiceConfig`: SecurityGroups first (so Connections
    /// can activate against them), then PublishedDataSets, then Connections.
    pub async fn load_service_config(&mut self, config: &pubsub_config::ServiceConfig) -> Result<()> {
        for sg in &config.security_groups {
            self.add_security_group(sg)?;
        }
        for ds in &config.published_data_sets {
            self.add_published_data_set_from_config(ds)?;
        }
        for conn in &config.connections {
            self.add_connection(conn).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_security_group_is_rejected() {
        let mut manager = PubSubManager::new();
        let config = SecurityGroupConfig::unsecured("group-1");
        manager.add_security_group(&config).unwrap();
        let result = manager.add_security_group(&config);
        assert!(matches!(
            result,
            Err(CoreError::Types(PubSubError::NodeIdExists(_)))
        ));
    }

    #[test]
    fn duplicate_published_data_set_is_rejected() {
        let mut manager = PubSubManager::new();
        manager
            .add_published_data_set(PublishedDataSet::new("ds1", vec![]))
            .unwrap();
        let result = manager.add_published_data_set(PublishedDataSet::new("ds1", vec![]));
        assert!(matches!(
            result,
            Err(CoreError::Types(PubSubError::NodeIdExists(_)))
        ));
    }

    #[tokio::test]
    async fn removing_referenced_data_set_is_rejected() {
        let mut manager = PubSubManager::new();
        manager
            .add_published_data_set(PublishedDataSet::new(
                "ds1",
                vec![DataSetField {
                    name: "temp".to_string(),
                    source_node_id: NodeId::numeric(1, 1),
                    attribute_id: 13,
                }],
            ))
            .unwrap();

        let mut cfg = ConnectionConfig::udp_minimal_publisher(1);
        cfg.writer_groups[0].writers.push(DataSetWriterConfig {
            writer_id: 1,
            published_data_set: "ds1".to_string(),
            key_frame_count: 1,
        });
        manager.add_connection(&cfg).await.unwrap();

        assert!(matches!(
            manager.remove_published_data_set("ds1"),
            Err(CoreError::PublishedDataSetInUse(_))
        ));
    }

    #[test]
    fn reserve_ids_avoids_existing_writer_group_ids() {
        let mut manager = PubSubManager::new();
        let (wg_ids, _) = manager.reserve_ids(1, 2, 0, TransportProfile::UdpUadp);
        assert!(wg_ids.iter().all(|id| *id >= 0x8000));
    }
}
