//! Errors specific to the PubSub state machine, layered on top of
//! [`pubsub_types::PubSubError`] (spec.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Types(#[from] pubsub_types::PubSubError),

    #[error(transparent)]
    Codec(#[from] pubsub_codec::CodecError),

    #[error(transparent)]
    Transport(#[from] pubsub_transport::TransportError),

    #[error(transparent)]
    KeyStorage(#[from] pubsub_keystorage::KeyStorageError),

    #[error("security group {0} has no key storage registered")]
    NoKeyStorage(String),

    #[error("published data set {0} is referenced by a DataSetWriter and cannot be removed")]
    PublishedDataSetInUse(String),

    #[error("connection id not found: {0}")]
    UnknownConnection(u64),
}

pub type Result<T> = std::result::Result<T, CoreError>;
