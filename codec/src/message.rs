//! NetworkMessage / DataSetMessage domain model.
//!
//! These are the logical objects the UADP and JSON codecs both serialize.
//! Field ordering here has no bearing on the wire layout — each codec module
//! owns its own byte-level representation.

use pubsub_types::{DataValue, PublisherId};

/// Content of a single DataSetMessage.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSetPayload {
    /// Full field list, in PublishedDataSet field order.
    KeyFrame(Vec<DataValue>),
    /// Sparse (fieldIndex, value) pairs for fields that changed since the
    /// last KeyFrame.
    DeltaFrame(Vec<(u16, DataValue)>),
    /// No fields; used to keep a reader's watchdog timer from expiring.
    KeepAlive,
}

impl DataSetPayload {
    pub fn is_key_frame(&self) -> bool {
        matches!(self, DataSetPayload::KeyFrame(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetMessageStatus {
    Good,
    Bad,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSetMessage {
    pub data_set_writer_id: u16,
    pub sequence_number: Option<u16>,
    pub timestamp: Option<i64>,
    pub status: DataSetMessageStatus,
    pub payload: DataSetPayload,
}

impl DataSetMessage {
    pub fn key_frame(data_set_writer_id: u16, fields: Vec<DataValue>) -> Self {
        Self {
            data_set_writer_id,
            sequence_number: None,
            timestamp: None,
            status: DataSetMessageStatus::Good,
            payload: DataSetPayload::KeyFrame(fields),
        }
    }

    pub fn delta_frame(data_set_writer_id: u16, changed: Vec<(u16, DataValue)>) -> Self {
        Self {
            data_set_writer_id,
            sequence_number: None,
            timestamp: None,
            status: DataSetMessageStatus::Good,
            payload: DataSetPayload::DeltaFrame(changed),
        }
    }

    pub fn keep_alive(data_set_writer_id: u16) -> Self {
        Self {
            data_set_writer_id,
            sequence_number: None,
            timestamp: None,
            status: DataSetMessageStatus::Good,
            payload: DataSetPayload::KeepAlive,
        }
    }

    pub fn with_sequence_number(mut self, seq: u16) -> Self {
        self.sequence_number = Some(seq);
        self
    }
}

/// Security mode of a WriterGroup/ReaderGroup and the framing it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    #[default]
    None,
    Sign,
    SignAndEncrypt,
}

impl SecurityMode {
    pub fn signs(self) -> bool {
        !matches!(self, SecurityMode::None)
    }

    pub fn encrypts(self) -> bool {
        matches!(self, SecurityMode::SignAndEncrypt)
    }
}

/// Header carried once per NetworkMessage when the group header is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupHeader {
    pub writer_group_id: u16,
    pub group_version: u32,
    pub network_message_number: u16,
    pub sequence_number: u16,
}

/// Security framing fields, present iff the group's security mode ≠ None.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeader {
    pub token_id: u32,
    /// Sender-scoped seed concatenated with a monotonic counter; unique per
    /// message within the key's lifetime (§4.B).
    pub message_nonce: [u8; 8],
    pub signature_length: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMessage {
    pub publisher_id: PublisherId,
    pub group_header: Option<GroupHeader>,
    pub data_set_writer_ids: Option<Vec<u16>>,
    pub timestamp: Option<i64>,
    pub picoseconds: Option<u16>,
    pub promoted_fields: Option<Vec<DataValue>>,
    pub security_header: Option<SecurityHeader>,
    pub payload: Vec<DataSetMessage>,
}

impl NetworkMessage {
    pub fn new(publisher_id: PublisherId) -> Self {
        Self {
            publisher_id,
            group_header: None,
            data_set_writer_ids: None,
            timestamp: None,
            picoseconds: None,
            promoted_fields: None,
            security_header: None,
            payload: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_mode_helpers() {
        assert!(!SecurityMode::None.signs());
        assert!(SecurityMode::Sign.signs());
        assert!(!SecurityMode::Sign.encrypts());
        assert!(SecurityMode::SignAndEncrypt.encrypts());
    }

    #[test]
    fn keep_alive_has_no_fields() {
        let msg = DataSetMessage::keep_alive(7);
        assert_eq!(msg.data_set_writer_id, 7);
        assert_eq!(msg.payload, DataSetPayload::KeepAlive);
    }
}
