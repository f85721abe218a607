//! Connection/Group/Writer/Reader configuration (spec.md §3 data model),
//! following the teacher's `RelayConfig` shape: plain `serde` structs loaded
//! from TOML, with named default constructors for common scenarios.

use serde::{Deserialize, Serialize};

use pubsub_codec::SecurityMode;

/// Mirrors [`pubsub_types::PublisherId`] in a form serde can (de)serialize;
/// converted at load time since the domain type intentionally carries no
/// serde dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PublisherIdConfig {
    Byte(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    String(String),
}

impl From<&PublisherIdConfig> for pubsub_types::PublisherId {
    fn from(c: &PublisherIdConfig) -> Self {
        match c {
            PublisherIdConfig::Byte(v) => pubsub_types::PublisherId::Byte(*v),
            PublisherIdConfig::U16(v) => pubsub_types::PublisherId::U16(*v),
            PublisherIdConfig::U32(v) => pubsub_types::PublisherId::U32(*v),
            PublisherIdConfig::U64(v) => pubsub_types::PublisherId::U64(*v),
            PublisherIdConfig::String(v) => pubsub_types::PublisherId::String(v.clone()),
        }
    }
}

/// One of the three address forms a Connection can carry (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressConfig {
    Udp {
        url: String,
        interface: Option<String>,
        ttl: Option<u32>,
        loopback: Option<bool>,
        reuse: Option<bool>,
    },
    Ethernet {
        url: String,
    },
    Mqtt {
        url: String,
        client_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Uadp,
    Json,
}

fn default_encoding() -> Encoding {
    Encoding::Uadp
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetFieldConfig {
    /// Source NodeId in the textual `ns=<ns>;i=<id>` or `ns=<ns>;s=<id>` form.
    pub source_node_id: String,
    pub attribute_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDataSetConfig {
    pub name: String,
    pub fields: Vec<DataSetFieldConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetWriterConfig {
    pub writer_id: u16,
    pub published_data_set: String,
    /// Every Nth message is a KeyFrame; 0 or 1 means every message is one
    /// (§4.D step 2).
    #[serde(default)]
    pub key_frame_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterGroupConfig {
    pub writer_group_id: u16,
    pub publishing_interval_ms: u64,
    #[serde(default)]
    pub security_mode: SecurityModeConfig,
    #[serde(default)]
    pub security_group_id: Option<String>,
    #[serde(default = "default_encoding")]
    pub encoding: Encoding,
    pub writers: Vec<DataSetWriterConfig>,
    /// MQTT only: topic/QoS for this group's publications.
    #[serde(default)]
    pub mqtt_transport: Option<MqttTransportConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityModeConfig {
    #[default]
    None,
    Sign,
    SignAndEncrypt,
}

impl From<SecurityModeConfig> for SecurityMode {
    fn from(c: SecurityModeConfig) -> Self {
        match c {
            SecurityModeConfig::None => SecurityMode::None,
            SecurityModeConfig::Sign => SecurityMode::Sign,
            SecurityModeConfig::SignAndEncrypt => SecurityMode::SignAndEncrypt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttTransportConfig {
    pub queue_name: String,
    #[serde(default)]
    pub qos: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetVariableConfig {
    pub field_name: String,
    pub target_node_id: String,
    pub attribute_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetReaderConfig {
    pub data_set_writer_id: u16,
    pub expected_publisher_id: PublisherIdConfig,
    pub target_variables: Vec<TargetVariableConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderGroupConfig {
    pub reader_group_id: u16,
    #[serde(default)]
    pub security_mode: SecurityModeConfig,
    #[serde(default)]
    pub security_group_id: Option<String>,
    pub readers: Vec<DataSetReaderConfig>,
    #[serde(default)]
    pub mqtt_transport: Option<MqttTransportConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub publisher_id: PublisherIdConfig,
    pub transport_profile_uri: String,
    pub address: AddressConfig,
    #[serde(default)]
    pub writer_groups: Vec<WriterGroupConfig>,
    #[serde(default)]
    pub reader_groups: Vec<ReaderGroupConfig>,
}

impl ConnectionConfig {
    /// A minimal UDP multicast publisher, matching spec.md §8 Scenario 1.
    pub fn udp_minimal_publisher(publisher_id: u32) -> Self {
        Self {
            name: "udp-publisher".to_string(),
            publisher_id: PublisherIdConfig::U32(publisher_id),
            transport_profile_uri: "http://opcfoundation.org/UA-Profile/Transport/pubsub-udp-uadp"
                .to_string(),
            address: AddressConfig::Udp {
                url: "opc.udp://224.0.0.22:4840/".to_string(),
                interface: None,
                ttl: None,
                loopback: None,
                reuse: None,
            },
            writer_groups: vec![WriterGroupConfig {
                writer_group_id: 1,
                publishing_interval_ms: 500,
                security_mode: SecurityModeConfig::None,
                security_group_id: None,
                encoding: Encoding::Uadp,
                writers: Vec::new(),
                mqtt_transport: None,
            }],
            reader_groups: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_minimal_publisher_matches_scenario_1() {
        let cfg = ConnectionConfig::udp_minimal_publisher(223344);
        assert_eq!(cfg.writer_groups[0].publishing_interval_ms, 500);
        match &cfg.address {
            AddressConfig::Udp { url, .. } => assert_eq!(url, "opc.udp://224.0.0.22:4840/"),
            _ => panic!("expected udp address"),
        }
    }

    #[test]
    fn publisher_id_config_converts_to_domain_type() {
        let cfg = PublisherIdConfig::U32(7);
        assert_eq!(pubsub_types::PublisherId::from(&cfg), pubsub_types::PublisherId::U32(7));
    }
}
