//! Crate-wide error type, grounded on the teacher's `ProtocolError` /
//! `TransportError` shape: a `thiserror` enum with a `status()` mapping into
//! the wire-level [`crate::StatusCode`] taxonomy.

use crate::status::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("allocation failed: {0}")]
    OutOfMemory(String),

    #[error("communication error: {0}")]
    Communication(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("security check failed: {0}")]
    SecurityChecksFailed(String),

    #[error("security mode insufficient for this operation")]
    SecurityModeInsufficient,

    #[error("user access denied")]
    UserAccessDenied,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("security policy rejected: {0}")]
    SecurityPolicyRejected(String),

    #[error("node id already exists: {0}")]
    NodeIdExists(String),
}

impl PubSubError {
    /// Map to the OPC-UA status code this error kind corresponds to (§7).
    pub fn status(&self) -> StatusCode {
        match self {
            PubSubError::InvalidArgument(_) => StatusCode::BadInvalidArgument,
            PubSubError::OutOfMemory(_) => StatusCode::BadOutOfMemory,
            PubSubError::Communication(_) => StatusCode::BadCommunicationError,
            PubSubError::ConnectionClosed => StatusCode::BadConnectionClosed,
            PubSubError::Encoding(_) => StatusCode::BadEncodingError,
            PubSubError::Decoding(_) => StatusCode::BadDecodingError,
            PubSubError::SecurityChecksFailed(_) => StatusCode::BadSecurityChecksFailed,
            PubSubError::SecurityModeInsufficient => StatusCode::BadSecurityModeInsufficient,
            PubSubError::UserAccessDenied => StatusCode::BadUserAccessDenied,
            PubSubError::NotFound(_) => StatusCode::BadNotFound,
            PubSubError::NotImplemented(_) => StatusCode::BadNotImplemented,
            PubSubError::SecurityPolicyRejected(_) => StatusCode::BadSecurityPolicyRejected,
            PubSubError::NodeIdExists(_) => StatusCode::BadNodeIdExists,
        }
    }

    /// Recoverable in the sense of §7: contained at the message/tick boundary
    /// rather than aborting the owning group.
    pub fn is_recoverable_at_tick(&self) -> bool {
        matches!(
            self,
            PubSubError::Encoding(_)
                | PubSubError::Decoding(_)
                | PubSubError::SecurityChecksFailed(_)
                | PubSubError::OutOfMemory(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_error_kind_table() {
        assert_eq!(
            PubSubError::SecurityChecksFailed("bad mac".into()).status(),
            StatusCode::BadSecurityChecksFailed
        );
        assert_eq!(
            PubSubError::UserAccessDenied.status(),
            StatusCode::BadUserAccessDenied
        );
    }

    #[test]
    fn tick_recoverable_kinds() {
        assert!(PubSubError::Decoding("x".into()).is_recoverable_at_tick());
        assert!(!PubSubError::ConnectionClosed.is_recoverable_at_tick());
    }
}
