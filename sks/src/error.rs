//! SKS method error taxonomy (spec.md §4.E).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SksError {
    #[error("security mode insufficient: SKS session must be SignAndEncrypt")]
    SecurityModeInsufficient,

    #[error("security group not found: {0}")]
    NotFound(String),

    #[error("user access denied for security group {0}")]
    UserAccessDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("security policy rejected: response policy {response_policy_uri:?} does not match security group {security_group_id:?}'s bound policy")]
    SecurityPolicyRejected {
        security_group_id: String,
        response_policy_uri: String,
    },

    #[error("internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, SksError>;

impl From<SksError> for pubsub_types::PubSubError {
    fn from(e: SksError) -> Self {
        match e {
            SksError::SecurityModeInsufficient => {
                pubsub_types::PubSubError::SecurityModeInsufficient
            }
            SksError::NotFound(id) => pubsub_types::PubSubError::NotFound(id),
            SksError::UserAccessDenied(_) => pubsub_types::PubSubError::UserAccessDenied,
            SksError::InvalidArgument(m) => pubsub_types::PubSubError::InvalidArgument(m),
            SksError::SecurityPolicyRejected {
                security_group_id,
                response_policy_uri,
            } => pubsub_types::PubSubError::SecurityPolicyRejected(format!(
                "{security_group_id}: {response_policy_uri}"
            )),
            SksError::InternalError(m) => pubsub_types::PubSubError::Communication(m),
        }
    }
}

impl From<pubsub_keystorage::KeyStorageError> for SksError {
    fn from(e: pubsub_keystorage::KeyStorageError) -> Self {
        SksError::InternalError(e.to_string())
    }
}
