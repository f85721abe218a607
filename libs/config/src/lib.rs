//! Layered TOML/YAML configuration for the PubSub core: connections, groups,
//! security groups, and SKS client endpoints (SPEC_FULL.md §B).

pub mod connection;
pub mod error;
pub mod security;
pub mod service;

pub use connection::{
    AddressConfig, ConnectionConfig, DataSetFieldConfig, DataSetReaderConfig,
    DataSetWriterConfig, Encoding, MqttTransportConfig, PublisherIdConfig,
    PublishedDataSetConfig, ReaderGroupConfig, SecurityModeConfig, TargetVariableConfig,
    WriterGroupConfig,
};
pub use error::{ConfigError, Result};
pub use security::{SecurityGroupConfig, SecurityPolicyId, SksClientConfig};
pub use service::{LoggingConfig, ServiceConfig};
