//! PubSub state machine: Connection/WriterGroup/DataSetWriter/PublishedDataSet
//! and the ReaderGroup/DataSetReader mirror, plus the PubSubManager that owns
//! them (spec.md §3, §4.D, §5).

pub mod connection;
pub mod dataset;
pub mod error;
pub mod keys;
pub mod manager;
pub mod nodestore;
pub mod reader;
pub mod reserve;
pub mod state;
pub mod writer;

pub use connection::Connection;
pub use dataset::{DataSetField, PublishedDataSet, TargetVariable};
pub use error::{CoreError, Result};
pub use keys::SecurityContext;
pub use manager::{ManagerState, PubSubManager, SecurityGroupHandle};
pub use nodestore::{InMemoryNodeStore, NodeStore};
pub use reader::{DataSetReader, ReaderGroup};
pub use reserve::{ReservationKind, ReserveIdTree};
pub use state::{ComponentState, RetryBackoff};
pub use writer::{DataSetWriter, Encoding, WriterGroup};
