//! Top-level service configuration: the file a `pubsubd` process loads at
//! startup. Grounded on the teacher's `RelayConfig::from_file` /
//! `*_defaults()` pattern (`pubsub/src/config.rs` in the teacher's
//! `relays` crate).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionConfig, PublishedDataSetConfig};
use crate::error::{ConfigError, Result};
use crate::security::SecurityGroupConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string, e.g. `"info,pubsub_core=debug"`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroupConfig>,
    #[serde(default)]
    pub published_data_sets: Vec<PublishedDataSetConfig>,
}

impl ServiceConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// A single UDP multicast publisher with no security, for quick manual
    /// testing (spec.md §8 Scenario 1).
    pub fn udp_minimal_publisher_defaults() -> Self {
        Self {
            logging: LoggingConfig::default(),
            connections: vec![ConnectionConfig::udp_minimal_publisher(223344)],
            security_groups: Vec::new(),
            published_data_sets: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for conn in &self.connections {
            for wg in &conn.writer_groups {
                if wg.publishing_interval_ms == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "connection {:?} writer group {} has a zero publishing interval",
                        conn.name, wg.writer_group_id
                    )));
                }
                if wg.security_mode != crate::connection::SecurityModeConfig::None
                    && wg.security_group_id.is_none()
                {
                    return Err(ConfigError::Invalid(format!(
                        "connection {:?} writer group {} has a security mode but no security_group_id",
                        conn.name, wg.writer_group_id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_zero_publishing_interval() {
        let mut cfg = ServiceConfig::udp_minimal_publisher_defaults();
        cfg.connections[0].writer_groups[0].publishing_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        let cfg = ServiceConfig::udp_minimal_publisher_defaults();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = ServiceConfig::udp_minimal_publisher_defaults();
        let text = toml::to_string(&cfg).unwrap();
        let parsed: ServiceConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.connections.len(), 1);
    }
}
