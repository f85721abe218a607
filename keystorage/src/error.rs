//! KeyStorage error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyStorageError {
    #[error("key id {0} not found in storage")]
    NotFound(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("key list has no current item")]
    NoCurrentItem,
}

pub type Result<T> = std::result::Result<T, KeyStorageError>;

impl From<KeyStorageError> for pubsub_types::PubSubError {
    fn from(e: KeyStorageError) -> Self {
        match e {
            KeyStorageError::NotFound(id) => {
                pubsub_types::PubSubError::NotFound(format!("key id {id}"))
            }
            KeyStorageError::InvalidConfig(m) => pubsub_types::PubSubError::InvalidArgument(m),
            KeyStorageError::NoCurrentItem => {
                pubsub_types::PubSubError::InvalidArgument("key storage has no current item".into())
            }
        }
    }
}
