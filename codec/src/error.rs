//! Codec error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message too small: need {need} bytes, got {got}")]
    MessageTooSmall { need: usize, got: usize },

    #[error("unsupported publisher id type byte: {0:#x}")]
    UnknownPublisherIdType(u8),

    #[error("truncated field list at offset {offset}")]
    TruncatedPayload { offset: usize },

    #[error("invalid dataset message flags: {0:#x}")]
    InvalidDataSetMessageFlags(u8),

    #[error("string length prefix exceeds remaining buffer: need {need}, got {got}")]
    InvalidStringLength { need: usize, got: usize },

    #[error("security header missing on a message whose security mode requires one")]
    MissingSecurityHeader,

    #[error("signature verification failed")]
    SignatureMismatch,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("json decode error: {0}")]
    Json(String),

    #[error("unknown field index {0} in delta frame")]
    UnknownFieldIndex(u16),
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

impl From<CodecError> for pubsub_types::PubSubError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::SignatureMismatch | CodecError::DecryptionFailed => {
                pubsub_types::PubSubError::SecurityChecksFailed(e.to_string())
            }
            _ => pubsub_types::PubSubError::Decoding(e.to_string()),
        }
    }
}
