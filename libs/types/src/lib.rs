//! Shared value types for the PubSub core: identifiers, variant values, and
//! the OPC-UA status-code taxonomy used across codec, transport, keystorage,
//! core, and sks.

pub mod error;
pub mod node_id;
pub mod publisher_id;
pub mod status;
pub mod variant;

pub use error::PubSubError;
pub use node_id::{NodeId, NodeIdentifier};
pub use publisher_id::PublisherId;
pub use status::StatusCode;
pub use variant::{DataValue, Variant};

/// Result type used throughout the PubSub crates.
pub type Result<T> = std::result::Result<T, PubSubError>;
