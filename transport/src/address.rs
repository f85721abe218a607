//! Transport profile URIs and the address forms each one accepts (§6).

use crate::error::{Result, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProfile {
    UdpUadp,
    EthUadp,
    MqttUadp,
    MqttJson,
}

impl TransportProfile {
    pub const UDP_UADP_URI: &'static str =
        "http://opcfoundation.org/UA-Profile/Transport/pubsub-udp-uadp";
    pub const ETH_UADP_URI: &'static str =
        "http://opcfoundation.org/UA-Profile/Transport/pubsub-eth-uadp";
    pub const MQTT_UADP_URI: &'static str =
        "http://opcfoundation.org/UA-Profile/Transport/pubsub-mqtt-uadp";
    pub const MQTT_JSON_URI: &'static str =
        "http://opcfoundation.org/UA-Profile/Transport/pubsub-mqtt-json";

    pub fn from_uri(uri: &str) -> Result<Self> {
        match uri {
            Self::UDP_UADP_URI => Ok(TransportProfile::UdpUadp),
            Self::ETH_UADP_URI => Ok(TransportProfile::EthUadp),
            Self::MQTT_UADP_URI => Ok(TransportProfile::MqttUadp),
            Self::MQTT_JSON_URI => Ok(TransportProfile::MqttJson),
            other => Err(TransportError::configuration(
                format!("unrecognized transport profile: {other}"),
                Some("profileUri"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Udp {
        host: String,
        port: u16,
        interface: Option<String>,
    },
    Mqtt {
        broker: String,
        port: u16,
    },
    Ethernet {
        mac: [u8; 6],
        vlan_id: Option<u16>,
        priority: Option<u8>,
    },
}

const DEFAULT_UDP_PORT: u16 = 4840;

pub fn parse_udp_address(uri: &str) -> Result<Address> {
    let rest = uri
        .strip_prefix("opc.udp://")
        .ok_or_else(|| TransportError::configuration(format!("not a udp address: {uri}"), Some("address")))?;
    let (host_port, _path) = rest.split_once('/').unwrap_or((rest, ""));
    let (host, port) = match host_port.rsplit_once(':') {
        Some((h, p)) => (
            h.to_string(),
            p.parse::<u16>()
                .map_err(|_| TransportError::configuration(format!("invalid port: {p}"), Some("port")))?,
        ),
        None => (host_port.to_string(), DEFAULT_UDP_PORT),
    };
    Ok(Address::Udp {
        host,
        port,
        interface: None,
    })
}

pub fn parse_mqtt_address(uri: &str) -> Result<Address> {
    let rest = uri
        .strip_prefix("opc.mqtt://")
        .ok_or_else(|| TransportError::configuration(format!("not an mqtt address: {uri}"), Some("address")))?;
    let rest = rest.trim_end_matches('/');
    let (broker, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| TransportError::configuration(format!("mqtt address missing port: {uri}"), Some("address")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| TransportError::configuration(format!("invalid mqtt port: {port}"), Some("port")))?;
    Ok(Address::Mqtt {
        broker: broker.to_string(),
        port,
    })
}

pub fn parse_ethernet_address(uri: &str) -> Result<Address> {
    let rest = uri
        .strip_prefix("opc.eth://")
        .ok_or_else(|| TransportError::configuration(format!("not an ethernet address: {uri}"), Some("address")))?;

    let (mac_part, vlan_part) = match rest.split_once(':') {
        Some((m, v)) => (m, Some(v)),
        None => (rest, None),
    };

    let mac = parse_mac(mac_part)?;

    let (vlan_id, priority) = match vlan_part {
        None => (None, None),
        Some(v) => match v.split_once('.') {
            Some((vid, pcp)) => (
                Some(parse_vlan_field(vid, "vlan id")?),
                Some(parse_vlan_field(pcp, "priority")? as u8),
            ),
            None => (Some(parse_vlan_field(v, "vlan id")?), None),
        },
    };

    Ok(Address::Ethernet {
        mac,
        vlan_id,
        priority,
    })
}

fn parse_vlan_field(s: &str, what: &str) -> Result<u16> {
    s.parse()
        .map_err(|_| TransportError::configuration(format!("invalid {what}: {s}"), Some(what)))
}

fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let sep = if s.contains('-') { '-' } else { ' ' };
    let octets: Vec<&str> = s.split(sep).collect();
    if octets.len() != 6 {
        return Err(TransportError::configuration(
            format!("malformed MAC address: {s}"),
            Some("mac"),
        ));
    }
    let mut mac = [0u8; 6];
    for (i, o) in octets.iter().enumerate() {
        mac[i] = u8::from_str_radix(o, 16)
            .map_err(|_| TransportError::configuration(format!("malformed MAC octet: {o}"), Some("mac")))?;
    }
    Ok(mac)
}

pub fn is_multicast_ipv4(host: &str) -> bool {
    host.parse::<std::net::Ipv4Addr>()
        .map(|ip| ip.octets()[0] & 0xF0 == 0xE0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_udp_address_with_default_port() {
        let addr = parse_udp_address("opc.udp://224.0.0.22/").unwrap();
        assert_eq!(
            addr,
            Address::Udp {
                host: "224.0.0.22".into(),
                port: DEFAULT_UDP_PORT,
                interface: None,
            }
        );
    }

    #[test]
    fn parses_udp_address_with_explicit_port() {
        let addr = parse_udp_address("opc.udp://224.0.0.22:4840/").unwrap();
        assert_eq!(
            addr,
            Address::Udp {
                host: "224.0.0.22".into(),
                port: 4840,
                interface: None,
            }
        );
    }

    #[test]
    fn parses_ethernet_address_with_vlan_and_priority() {
        let addr = parse_ethernet_address("opc.eth://01-02-03-04-05-06:100.5").unwrap();
        assert_eq!(
            addr,
            Address::Ethernet {
                mac: [1, 2, 3, 4, 5, 6],
                vlan_id: Some(100),
                priority: Some(5),
            }
        );
    }

    #[test]
    fn recognizes_multicast_ipv4() {
        assert!(is_multicast_ipv4("224.0.0.22"));
        assert!(!is_multicast_ipv4("10.0.0.1"));
    }

    #[test]
    fn rejects_unknown_profile_uri() {
        assert!(TransportProfile::from_uri("http://example.com/not-a-profile").is_err());
    }
}
