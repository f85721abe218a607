//! Wire encoding for PubSub NetworkMessages: the UADP binary layout, the
//! JSON reversible/non-reversible layout, and the message-security framing
//! both sit on top of.

pub mod error;
pub mod flags;
pub mod json;
pub mod message;
pub mod security;
pub mod wire;

pub use error::{CodecError, CodecResult};
pub use message::{
    DataSetMessage, DataSetMessageStatus, DataSetPayload, GroupHeader, NetworkMessage,
    SecurityHeader, SecurityMode,
};
pub use wire::{decode_security_prefix, decode_uadp, DecodedMessage, NetworkMessageBuilder};
