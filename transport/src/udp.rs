//! UDP multicast Channel (§6: UDP multicast UADP profile).

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::address::is_multicast_ipv4;
use crate::channel::{Channel, ChannelState, ExtensionSettings, ReceiveOutcome};
use crate::error::{Result, TransportError};

#[derive(Debug, Clone)]
pub struct UdpChannelConfig {
    pub host: String,
    pub port: u16,
    pub ttl: Option<u32>,
    pub loopback: Option<bool>,
    pub reuse: Option<bool>,
    pub interface: Option<Ipv4Addr>,
}

impl UdpChannelConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ttl: None,
            loopback: None,
            reuse: None,
            interface: None,
        }
    }
}

pub struct UdpChannel {
    socket: UdpSocket,
    target: SocketAddr,
    state: ChannelState,
    recv_buf: [u8; 8192],
}

impl UdpChannel {
    pub async fn open(config: UdpChannelConfig) -> Result<Self> {
        let ip: Ipv4Addr = config
            .host
            .parse()
            .map_err(|_| TransportError::configuration(format!("invalid UDP host: {}", config.host), Some("host")))?;
        let target = SocketAddr::new(ip.into(), config.port);

        let bind_addr: SocketAddr = if is_multicast_ipv4(&config.host) {
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), config.port)
        } else {
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
        };

        let std_socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )
        .map_err(|e| TransportError::network_with_source("failed to create UDP socket", e))?;

        if config.reuse.unwrap_or(true) {
            std_socket
                .set_reuse_address(true)
                .map_err(|e| TransportError::network_with_source("failed to set SO_REUSEADDR", e))?;
        }

        std_socket
            .bind(&bind_addr.into())
            .map_err(|e| TransportError::network_with_source("failed to bind UDP socket", e))?;
        std_socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::network_with_source("failed to set non-blocking", e))?;

        let socket = UdpSocket::from_std(std_socket.into())
            .map_err(|e| TransportError::network_with_source("failed to adopt UDP socket into runtime", e))?;

        if is_multicast_ipv4(&config.host) {
            let interface = config.interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
            socket
                .join_multicast_v4(ip, interface)
                .map_err(|e| TransportError::network_with_source("failed to join multicast group", e))?;

            if let Some(loopback) = config.loopback {
                socket
                    .set_multicast_loop_v4(loopback)
                    .map_err(|e| TransportError::network_with_source("failed to set multicast loopback", e))?;
            }
            if let Some(ttl) = config.ttl {
                socket
                    .set_multicast_ttl_v4(ttl)
                    .map_err(|e| TransportError::network_with_source("failed to set multicast TTL", e))?;
            }
        } else if config.ttl.is_some() || config.loopback.is_some() {
            warn!("ttl/loopback options ignored for unicast UDP address");
        }

        Ok(Self {
            socket,
            target,
            state: ChannelState::Ready,
            recv_buf: [0u8; 8192],
        })
    }
}

#[async_trait]
impl Channel for UdpChannel {
    fn state(&self) -> ChannelState {
        self.state
    }

    async fn register(&mut self, _ext: &ExtensionSettings) -> Result<()> {
        // Ethernet/UDP raw receive uses the connection's bound socket directly (§4.A).
        Ok(())
    }

    async fn unregister(&mut self, _ext: &ExtensionSettings) -> Result<()> {
        Ok(())
    }

    async fn send(&mut self, _ext: &ExtensionSettings, bytes: &[u8]) -> Result<()> {
        match self.socket.send_to(bytes, self.target).await {
            Ok(n) => {
                debug!(bytes = n, target = %self.target, "sent UDP datagram");
                Ok(())
            }
            Err(e) => {
                self.state = ChannelState::Error;
                Err(TransportError::network_with_source("UDP send failed", e))
            }
        }
    }

    async fn receive(&mut self, timeout: Duration) -> Result<ReceiveOutcome> {
        match tokio::time::timeout(timeout, self.socket.recv(&mut self.recv_buf)).await {
            Ok(Ok(n)) => Ok(ReceiveOutcome::Data(self.recv_buf[..n].to_vec())),
            Ok(Err(e)) => {
                self.state = ChannelState::Error;
                Err(TransportError::network_with_source("UDP recv failed", e))
            }
            Err(_) => Ok(ReceiveOutcome::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state = ChannelState::Error;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_unicast_send_and_receive() {
        let mut receiver = UdpChannel::open(UdpChannelConfig::new("127.0.0.1", 0))
            .await
            .expect("bind receiver");
        let recv_port = receiver.socket.local_addr().unwrap().port();

        let mut sender = UdpChannel::open(UdpChannelConfig::new("127.0.0.1", recv_port))
            .await
            .expect("bind sender");

        let ext = ExtensionSettings::default();
        sender.send(&ext, b"hello").await.expect("send");

        match receiver
            .receive(Duration::from_millis(500))
            .await
            .expect("receive")
        {
            ReceiveOutcome::Data(bytes) => assert_eq!(bytes, b"hello"),
            _ => panic!("expected data, got a different outcome"),
        }
    }

    #[tokio::test]
    async fn rejects_non_ip_host() {
        let result = UdpChannel::open(UdpChannelConfig::new("not-an-ip", 4840)).await;
        assert!(result.is_err());
    }
}
