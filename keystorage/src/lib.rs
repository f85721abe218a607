//! Ordered key lists, rollover scheduling, and channel-context activation
//! for PubSub SecurityGroups (spec.md §4.C).

pub mod error;
pub mod list;
pub mod storage;

pub use error::{KeyStorageError, Result};
pub use list::{KeyList, KeyListItem};
pub use storage::{ActivatedKeys, KeyStorage, RolloverSink, SksPuller};
