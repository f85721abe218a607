//! Transport Channel abstraction (§4.A) and the UDP/Ethernet/MQTT channels a
//! Connection opens against a transport-profile URI (§6).
//!
//! A Connection never constructs a concrete channel type itself — it resolves
//! the configured profile URI via [`open_channel`], which is this crate's
//! factory entry point.

pub mod address;
pub mod channel;
pub mod error;
pub mod ethernet;
pub mod mqtt;
pub mod udp;

pub use address::{Address, TransportProfile};
pub use channel::{Channel, ChannelState, ExtensionSettings, ReceiveOutcome};
pub use error::{Result, TransportError};

/// Configuration needed to open any channel, independent of which profile
/// ends up being selected.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub profile: TransportProfile,
    pub address: Address,
    pub udp: UdpOptions,
    pub mqtt: MqttOptions,
}

#[derive(Debug, Clone, Default)]
pub struct UdpOptions {
    pub ttl: Option<u32>,
    pub loopback: Option<bool>,
    pub reuse: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct MqttOptions {
    pub client_id: String,
    pub send_buffer_size: u32,
    pub recv_buffer_size: u32,
}

impl Default for MqttOptions {
    fn default() -> Self {
        Self {
            client_id: "open62541_pub".to_string(),
            send_buffer_size: 2000,
            recv_buffer_size: 2000,
        }
    }
}

/// Opens a [`Channel`] for the given profile/address. This is the single
/// place a Connection needs to know about in order to go from configuration
/// to a live transport (§4.A "protocol-tagged factory").
pub async fn open_channel(config: ChannelConfig) -> Result<Box<dyn Channel>> {
    match (&config.profile, &config.address) {
        (TransportProfile::UdpUadp, Address::Udp { host, port, interface }) => {
            let mut udp_config = udp::UdpChannelConfig::new(host.clone(), *port);
            udp_config.ttl = config.udp.ttl;
            udp_config.loopback = config.udp.loopback;
            udp_config.reuse = config.udp.reuse;
            udp_config.interface = interface
                .as_ref()
                .and_then(|i| i.parse().ok());
            Ok(Box::new(udp::UdpChannel::open(udp_config).await?))
        }
        (TransportProfile::EthUadp, Address::Ethernet { mac, vlan_id, priority }) => {
            Ok(Box::new(ethernet::EthernetChannel::open(ethernet::EthernetChannelConfig {
                destination_mac: *mac,
                vlan_id: *vlan_id,
                priority: priority.unwrap_or(0),
                interface: None,
            })?))
        }
        (TransportProfile::MqttUadp, Address::Mqtt { broker, port })
        | (TransportProfile::MqttJson, Address::Mqtt { broker, port }) => {
            Ok(Box::new(
                mqtt::MqttChannel::open(mqtt::MqttChannelConfig {
                    broker: broker.clone(),
                    port: *port,
                    options: config.mqtt.clone(),
                })
                .await?,
            ))
        }
        (profile, _) => Err(TransportError::configuration(
            format!("address does not match transport profile {profile:?}"),
            Some("address"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_mismatched_address_and_profile() {
        let config = ChannelConfig {
            profile: TransportProfile::EthUadp,
            address: Address::Udp {
                host: "224.0.0.1".into(),
                port: 4840,
                interface: None,
            },
            udp: UdpOptions::default(),
            mqtt: MqttOptions::default(),
        };
        assert!(open_channel(config).await.is_err());
    }
}
