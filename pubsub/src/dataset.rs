//! PublishedDataSet: a named, ordered set of source fields (spec.md §3).

use pubsub_types::NodeId;

#[derive(Debug, Clone)]
pub struct DataSetField {
    pub name: String,
    pub source_node_id: NodeId,
    pub attribute_id: u32,
}

#[derive(Debug, Clone)]
pub struct PublishedDataSet {
    pub name: String,
    pub fields: Vec<DataSetField>,
}

impl PublishedDataSet {
    pub fn new(name: impl Into<String>, fields: Vec<DataSetField>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Reader-side mirror of a field binding: where to write a received value.
#[derive(Debug, Clone)]
pub struct TargetVariable {
    pub field_name: String,
    pub target_node_id: NodeId,
    pub attribute_id: u32,
}
