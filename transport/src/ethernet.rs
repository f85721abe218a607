//! Raw Ethernet Channel (§6: raw Ethernet UADP profile).
//!
//! Frames are sent over an `AF_PACKET`/`SOCK_RAW` socket bound to an
//! interface index, per `ua_network_pubsub_ethernet.c` (SPEC_FULL.md §C.5).
//! EtherType 0xB62C carries the UADP NetworkMessage; a non-zero VLAN id
//! inserts a 4-byte 802.1Q tag ahead of it.

use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::channel::{Channel, ChannelState, ExtensionSettings, ReceiveOutcome};
use crate::error::{Result, TransportError};

const ETHERTYPE_UADP: u16 = 0xB62C;
const ETHERTYPE_VLAN: u16 = 0x8100;

#[derive(Debug, Clone)]
pub struct EthernetChannelConfig {
    pub destination_mac: [u8; 6],
    pub vlan_id: Option<u16>,
    pub priority: u8,
    /// Interface name (e.g. `"eth0"`); `None` resolves to the first
    /// non-loopback interface index at open time.
    pub interface: Option<String>,
}

pub struct EthernetChannel {
    fd: i32,
    if_index: i32,
    source_mac: [u8; 6],
    destination_mac: [u8; 6],
    vlan_tci: Option<u16>,
    state: ChannelState,
}

fn io_err(what: &str) -> TransportError {
    TransportError::network_with_source(what, std::io::Error::last_os_error())
}

impl EthernetChannel {
    pub fn open(config: EthernetChannelConfig) -> Result<Self> {
        // SAFETY: standard raw-socket setup; each syscall's return value is
        // checked before the fd is trusted to be valid.
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, (libc::ETH_P_ALL as u16).to_be() as i32) };
        if fd < 0 {
            return Err(io_err("failed to open AF_PACKET raw socket (requires CAP_NET_RAW)"));
        }

        let if_name = config.interface.clone().unwrap_or_else(|| "eth0".to_string());
        let if_index = unsafe {
            let c_name = std::ffi::CString::new(if_name.clone())
                .map_err(|_| TransportError::configuration("interface name contains NUL byte", Some("interface")))?;
            libc::if_nametoindex(c_name.as_ptr())
        };
        if if_index == 0 {
            unsafe { libc::close(fd) };
            return Err(TransportError::configuration(
                format!("unknown network interface: {if_name}"),
                Some("interface"),
            ));
        }

        let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as u16;
        sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        sll.sll_ifindex = if_index as i32;

        let rc = unsafe {
            libc::bind(
                fd,
                &sll as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if rc < 0 {
            unsafe { libc::close(fd) };
            return Err(io_err("failed to bind AF_PACKET socket to interface"));
        }

        let source_mac = read_interface_mac(fd, &if_name)?;

        let vlan_tci = config.vlan_id.filter(|&v| v != 0).map(|vid| {
            ((config.priority as u16 & 0x7) << 13) | (vid & 0x0FFF)
        });

        debug!(interface = %if_name, ?vlan_tci, "opened raw Ethernet channel");

        Ok(Self {
            fd,
            if_index: if_index as i32,
            source_mac,
            destination_mac: config.destination_mac,
            vlan_tci,
            state: ChannelState::Ready,
        })
    }

    fn frame(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(14 + 4 + payload.len());
        out.extend_from_slice(&self.destination_mac);
        out.extend_from_slice(&self.source_mac);
        if let Some(tci) = self.vlan_tci {
            out.extend_from_slice(&ETHERTYPE_VLAN.to_be_bytes());
            out.extend_from_slice(&tci.to_be_bytes());
        }
        out.extend_from_slice(&ETHERTYPE_UADP.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}

fn read_interface_mac(fd: i32, if_name: &str) -> Result<[u8; 6]> {
    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    let name_bytes = if_name.as_bytes();
    if name_bytes.len() >= ifr.ifr_name.len() {
        return Err(TransportError::configuration("interface name too long", Some("interface")));
    }
    for (dst, &src) in ifr.ifr_name.iter_mut().zip(name_bytes.iter()) {
        *dst = src as libc::c_char;
    }
    let rc = unsafe { libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut ifr) };
    if rc < 0 {
        return Err(io_err("failed to read interface hardware address"));
    }
    let mut mac = [0u8; 6];
    unsafe {
        for i in 0..6 {
            mac[i] = ifr.ifr_ifru.ifru_hwaddr.sa_data[i] as u8;
        }
    }
    Ok(mac)
}

impl Drop for EthernetChannel {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[async_trait]
impl Channel for EthernetChannel {
    fn state(&self) -> ChannelState {
        self.state
    }

    async fn register(&mut self, _ext: &ExtensionSettings) -> Result<()> {
        Ok(())
    }

    async fn unregister(&mut self, _ext: &ExtensionSettings) -> Result<()> {
        Ok(())
    }

    async fn send(&mut self, _ext: &ExtensionSettings, bytes: &[u8]) -> Result<()> {
        let frame = self.frame(bytes);
        let fd = self.fd;
        let if_index = self.if_index;
        let result = tokio::task::spawn_blocking(move || send_frame(fd, if_index, frame))
            .await
            .map_err(|e| TransportError::network(format!("ethernet send task panicked: {e}")))?;
        if result.is_err() {
            self.state = ChannelState::Error;
        }
        result
    }

    async fn receive(&mut self, timeout: Duration) -> Result<ReceiveOutcome> {
        let fd = self.fd;
        let result = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || recv_frame(fd)),
        )
        .await;

        match result {
            Ok(Ok(Ok(bytes))) => Ok(ReceiveOutcome::Data(bytes)),
            Ok(Ok(Err(e))) => {
                self.state = ChannelState::Error;
                Err(e)
            }
            Ok(Err(e)) => Err(TransportError::network(format!("ethernet recv task panicked: {e}"))),
            Err(_) => Ok(ReceiveOutcome::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.state = ChannelState::Error;
        Ok(())
    }
}

fn send_frame(fd: i32, if_index: i32, frame: Vec<u8>) -> Result<()> {
    let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
    sll.sll_family = libc::AF_PACKET as u16;
    sll.sll_ifindex = if_index;
    sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();

    let rc = unsafe {
        libc::sendto(
            fd,
            frame.as_ptr() as *const libc::c_void,
            frame.len(),
            0,
            &sll as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_ll>() as u32,
        )
    };
    if rc < 0 {
        return Err(io_err("raw Ethernet send failed"));
    }
    Ok(())
}

fn recv_frame(fd: i32) -> Result<Vec<u8>> {
    let mut buf = [0u8; 2048];
    let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
    if n < 0 {
        return Err(io_err("raw Ethernet recv failed"));
    }
    // Strip the 14-byte MAC header (and 4-byte VLAN tag, if present) to
    // hand the caller only the EtherType payload onward.
    let n = n as usize;
    if n < 14 {
        return Err(TransportError::protocol("short Ethernet frame"));
    }
    let mut offset = 12;
    let mut ethertype = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
    offset += 2;
    if ethertype == ETHERTYPE_VLAN {
        if n < offset + 4 {
            return Err(TransportError::protocol("short VLAN-tagged Ethernet frame"));
        }
        offset += 2;
        ethertype = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        offset += 2;
    }
    if ethertype != ETHERTYPE_UADP {
        return Err(TransportError::protocol(format!(
            "unexpected EtherType {ethertype:#06x}, expected {ETHERTYPE_UADP:#06x}"
        )));
    }
    Ok(buf[offset..n].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlan_tci_packs_priority_and_vid() {
        let config = EthernetChannelConfig {
            destination_mac: [1, 2, 3, 4, 5, 6],
            vlan_id: Some(100),
            priority: 5,
            interface: Some("lo".to_string()),
        };
        let tci = config.vlan_id.filter(|&v| v != 0).map(|vid| ((config.priority as u16 & 0x7) << 13) | (vid & 0x0FFF));
        assert_eq!(tci, Some((5u16 << 13) | 100));
    }

    #[test]
    fn zero_vlan_id_means_untagged() {
        let config = EthernetChannelConfig {
            destination_mac: [0; 6],
            vlan_id: Some(0),
            priority: 0,
            interface: None,
        };
        let tci = config.vlan_id.filter(|&v| v != 0);
        assert_eq!(tci, None);
    }
}
