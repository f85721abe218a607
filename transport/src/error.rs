//! Transport error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String, field: Option<String> },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("operation timed out: {operation} after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("unsupported operation: {0}")]
    NotImplemented(String),
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        TransportError::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        TransportError::Network {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        TransportError::Configuration {
            message: message.into(),
            field: field.map(String::from),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        TransportError::Protocol {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        TransportError::Timeout {
            operation: operation.into(),
            millis,
        }
    }

    /// Transient send/recv failures get retried on the next publish tick
    /// (§4.A); configuration and protocol errors do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Network { .. } | TransportError::Timeout { .. }
        )
    }
}

impl From<TransportError> for pubsub_types::PubSubError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Network { message, .. } => pubsub_types::PubSubError::Communication(message),
            TransportError::Configuration { message, .. } => {
                pubsub_types::PubSubError::InvalidArgument(message)
            }
            TransportError::Protocol { message } => pubsub_types::PubSubError::Decoding(message),
            TransportError::Timeout { operation, millis } => {
                pubsub_types::PubSubError::Communication(format!("{operation} timed out after {millis}ms"))
            }
            TransportError::ConnectionClosed => pubsub_types::PubSubError::ConnectionClosed,
            TransportError::NotImplemented(what) => pubsub_types::PubSubError::NotImplemented(what),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
