//! Transport Channel abstraction (§4.A): connection-oriented or datagram
//! send/recv, selected by profile URI.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    PublisherOnly,
    Ready,
    PubAndSub,
    SubOnly,
    Error,
}

/// Outcome of a `receive` call; a timeout is a normal, non-critical result
/// (§4.A failure semantics), distinct from a hard error.
pub enum ReceiveOutcome {
    Data(Vec<u8>),
    Timeout,
    Closed,
}

/// Opaque extension settings a register/send call carries — the transport
/// profile chooses what it means (e.g. a BrokerWriterGroupTransport topic
/// for MQTT, unused for UDP/Ethernet).
#[derive(Debug, Clone, Default)]
pub struct ExtensionSettings {
    pub topic: Option<String>,
    pub qos: Option<u8>,
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn state(&self) -> ChannelState;

    async fn register(&mut self, ext: &ExtensionSettings) -> Result<()>;

    async fn unregister(&mut self, ext: &ExtensionSettings) -> Result<()>;

    async fn send(&mut self, ext: &ExtensionSettings, bytes: &[u8]) -> Result<()>;

    async fn receive(&mut self, timeout: Duration) -> Result<ReceiveOutcome>;

    /// Broker-backed channels (MQTT) need a cooperative poll of their
    /// client's event loop; direct-socket channels (UDP/Ethernet) are a
    /// no-op here since their I/O is already non-blocking.
    async fn yield_now(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()>;
}
