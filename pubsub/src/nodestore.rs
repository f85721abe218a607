//! The information-model collaborator this core reads from and writes into.
//! spec.md §1 explicitly scopes node management out as an external
//! collaborator accessed via opaque handles; `NodeStore` is that seam.

use async_trait::async_trait;
use pubsub_types::{DataValue, NodeId};

#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn read(&self, node_id: &NodeId, attribute_id: u32) -> Option<DataValue>;

    async fn write(&self, node_id: &NodeId, attribute_id: u32, value: DataValue);
}

/// An in-memory `NodeStore` for tests and the minimal-publisher scenario;
/// not a real address-space implementation.
#[derive(Default)]
pub struct InMemoryNodeStore {
    values: tokio::sync::RwLock<std::collections::HashMap<(NodeId, u32), DataValue>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, node_id: NodeId, attribute_id: u32, value: DataValue) {
        self.values.write().await.insert((node_id, attribute_id), value);
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn read(&self, node_id: &NodeId, attribute_id: u32) -> Option<DataValue> {
        self.values
            .read()
            .await
            .get(&(node_id.clone(), attribute_id))
            .cloned()
    }

    async fn write(&self, node_id: &NodeId, attribute_id: u32, value: DataValue) {
        self.values
            .write()
            .await
            .insert((node_id.clone(), attribute_id), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsub_types::Variant;

    #[tokio::test]
    async fn round_trips_a_written_value() {
        let store = InMemoryNodeStore::new();
        let node_id = NodeId::numeric(1, 1000);
        store
            .set(node_id.clone(), 13, DataValue::good(Variant::Int32(42)))
            .await;

        let read_back = store.read(&node_id, 13).await.unwrap();
        assert_eq!(read_back.value, Variant::Int32(42));
    }
}
