//! NodeId: an opaque handle into the information-model collaborator.
//!
//! The PubSub core never dereferences a NodeId itself — reads/writes against
//! the owning Server go through the information-model collaborator named in
//! `SPEC_FULL.md`'s Non-goals. NodeId here only needs enough structure to be
//! compared, hashed, and round-tripped through reversible JSON encoding.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeIdentifier {
    Numeric(u32),
    String(String),
    Guid(uuid::Uuid),
    ByteString(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: NodeIdentifier,
}

impl NodeId {
    pub fn numeric(namespace: u16, id: u32) -> Self {
        Self {
            namespace,
            identifier: NodeIdentifier::Numeric(id),
        }
    }

    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: NodeIdentifier::String(id.into()),
        }
    }

    /// Parses the `ns=<namespace>;i=<id>` / `ns=<namespace>;s=<id>` textual
    /// form configuration files use to name source/target nodes.
    pub fn parse(text: &str) -> Option<Self> {
        let mut namespace = 0u16;
        let mut identifier = None;
        for part in text.split(';') {
            if let Some(ns) = part.strip_prefix("ns=") {
                namespace = ns.parse().ok()?;
            } else if let Some(i) = part.strip_prefix("i=") {
                identifier = Some(NodeIdentifier::Numeric(i.parse().ok()?));
            } else if let Some(s) = part.strip_prefix("s=") {
                identifier = Some(NodeIdentifier::String(s.to_string()));
            }
        }
        Some(Self {
            namespace,
            identifier: identifier?,
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            NodeIdentifier::Numeric(i) => write!(f, "ns={};i={}", self.namespace, i),
            NodeIdentifier::String(s) => write!(f, "ns={};s={}", self.namespace, s),
            NodeIdentifier::Guid(g) => write!(f, "ns={};g={}", self.namespace, g),
            NodeIdentifier::ByteString(b) => write!(f, "ns={};b={}", self.namespace, hex::encode(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_opc_ua_textual_form() {
        let id = NodeId::numeric(1, 1000);
        assert_eq!(id.to_string(), "ns=1;i=1000");
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(NodeId::numeric(1, 1000), NodeId::numeric(1, 1000));
        assert_ne!(NodeId::numeric(1, 1000), NodeId::numeric(2, 1000));
    }

    #[test]
    fn parses_numeric_and_string_textual_forms() {
        assert_eq!(NodeId::parse("ns=1;i=1000"), Some(NodeId::numeric(1, 1000)));
        assert_eq!(
            NodeId::parse("ns=2;s=Temperature"),
            Some(NodeId::string(2, "Temperature"))
        );
        assert_eq!(NodeId::parse("i=5"), Some(NodeId::numeric(0, 5)));
        assert_eq!(NodeId::parse("not-a-node-id"), None);
    }
}
