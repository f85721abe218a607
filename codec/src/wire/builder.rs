//! Fluent builder for UADP NetworkMessage bytes.
//!
//! Mirrors the shape of a TLV message builder: a typed domain object goes in,
//! a single `build()` call produces the wire bytes. Security framing is
//! applied separately by [`crate::security`] once the plaintext bytes exist,
//! since signing covers the header and encryption covers only the payload
//! section.

use crate::flags::{dataset_message, network_message, WIRE_VERSION};
use crate::message::{DataSetMessage, DataSetMessageStatus, DataSetPayload, NetworkMessage};
use crate::wire::value::{encode_data_value, encode_string, encode_variant};
use pubsub_types::PublisherId;

fn publisher_id_type_tag(id: &PublisherId) -> u8 {
    match id {
        PublisherId::Byte(_) => 0,
        PublisherId::U16(_) => 1,
        PublisherId::U32(_) => 2,
        PublisherId::U64(_) => 3,
        PublisherId::String(_) => 4,
    }
}

fn encode_publisher_id(out: &mut Vec<u8>, id: &PublisherId) {
    out.push(publisher_id_type_tag(id));
    match id {
        PublisherId::Byte(v) => out.push(*v),
        PublisherId::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        PublisherId::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        PublisherId::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        PublisherId::String(s) => encode_string(out, Some(s)),
    }
}

fn encode_dataset_message(out: &mut Vec<u8>, msg: &DataSetMessage) {
    let mut flags = match &msg.payload {
        DataSetPayload::KeyFrame(_) => dataset_message::TYPE_KEY_FRAME,
        DataSetPayload::DeltaFrame(_) => dataset_message::TYPE_DELTA_FRAME,
        DataSetPayload::KeepAlive => dataset_message::TYPE_KEEP_ALIVE,
    };
    if msg.sequence_number.is_some() {
        flags |= dataset_message::SEQUENCE_NUMBER_ENABLED;
    }
    if msg.timestamp.is_some() {
        flags |= dataset_message::TIMESTAMP_ENABLED;
    }
    if msg.status == DataSetMessageStatus::Bad {
        flags |= dataset_message::STATUS_BAD;
    }
    out.push(flags);
    out.extend_from_slice(&msg.data_set_writer_id.to_le_bytes());
    if let Some(seq) = msg.sequence_number {
        out.extend_from_slice(&seq.to_le_bytes());
    }
    if let Some(ts) = msg.timestamp {
        out.extend_from_slice(&ts.to_le_bytes());
    }

    match &msg.payload {
        DataSetPayload::KeyFrame(fields) => {
            out.push(fields.len() as u8);
            for field in fields {
                encode_data_value(out, field);
            }
        }
        DataSetPayload::DeltaFrame(changed) => {
            out.push(changed.len() as u8);
            for (index, field) in changed {
                out.extend_from_slice(&index.to_le_bytes());
                encode_data_value(out, field);
            }
        }
        DataSetPayload::KeepAlive => {}
    }
}

/// Builds the plaintext wire bytes for a [`NetworkMessage`].
///
/// The output is unsigned and unencrypted; callers whose group security mode
/// is not `None` must pass the header/payload split returned by
/// [`NetworkMessageBuilder::build_with_payload_offset`] into
/// [`crate::security`] before sending.
pub struct NetworkMessageBuilder<'a> {
    message: &'a NetworkMessage,
}

impl<'a> NetworkMessageBuilder<'a> {
    pub fn new(message: &'a NetworkMessage) -> Self {
        Self { message }
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_payload_offset().0
    }

    /// Returns the encoded bytes along with the byte offset at which the
    /// DataSetMessage payload section begins, so a security policy can
    /// encrypt only that span.
    pub fn build_with_payload_offset(&self) -> (Vec<u8>, usize) {
        let msg = self.message;
        let mut out = Vec::new();

        let mut flags = (WIRE_VERSION & network_message::VERSION_MASK) << network_message::VERSION_SHIFT;
        flags |= network_message::PUBLISHER_ID_ENABLED;
        if msg.group_header.is_some() {
            flags |= network_message::GROUP_HEADER_ENABLED;
        }
        if msg.data_set_writer_ids.is_some() {
            flags |= network_message::PAYLOAD_HEADER_ENABLED;
        }
        let has_extended =
            msg.timestamp.is_some() || msg.picoseconds.is_some() || msg.promoted_fields.is_some();
        if has_extended {
            flags |= network_message::EXTENDED_FLAGS1_ENABLED;
        }
        if msg.security_header.is_some() {
            flags |= network_message::SECURITY_ENABLED;
        }
        out.push(flags);

        if has_extended {
            let mut ext = 0u8;
            if msg.timestamp.is_some() {
                ext |= network_message::TIMESTAMP_ENABLED;
            }
            if msg.picoseconds.is_some() {
                ext |= network_message::PICOSECONDS_ENABLED;
            }
            if msg.promoted_fields.is_some() {
                ext |= network_message::PROMOTED_FIELDS_ENABLED;
            }
            out.push(ext);
        }

        encode_publisher_id(&mut out, &msg.publisher_id);

        if let Some(gh) = &msg.group_header {
            out.extend_from_slice(&gh.writer_group_id.to_le_bytes());
            out.extend_from_slice(&gh.group_version.to_le_bytes());
            out.extend_from_slice(&gh.network_message_number.to_le_bytes());
            out.extend_from_slice(&gh.sequence_number.to_le_bytes());
        }

        if let Some(ids) = &msg.data_set_writer_ids {
            out.push(ids.len() as u8);
            for id in ids {
                out.extend_from_slice(&id.to_le_bytes());
            }
        }

        if let Some(ts) = msg.timestamp {
            out.extend_from_slice(&ts.to_le_bytes());
        }
        if let Some(ps) = msg.picoseconds {
            out.extend_from_slice(&ps.to_le_bytes());
        }
        if let Some(fields) = &msg.promoted_fields {
            out.push(fields.len() as u8);
            for field in fields {
                encode_variant(&mut out, &field.value);
            }
        }

        if let Some(sh) = &msg.security_header {
            out.extend_from_slice(&sh.token_id.to_le_bytes());
            out.extend_from_slice(&sh.message_nonce);
            out.extend_from_slice(&sh.signature_length.to_le_bytes());
        }

        let payload_offset = out.len();

        out.push(msg.payload.len() as u8);
        for dsm in &msg.payload {
            encode_dataset_message(&mut out, dsm);
        }

        (out, payload_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DataSetMessage, GroupHeader, NetworkMessage};
    use pubsub_types::{DataValue, Variant};

    #[test]
    fn builds_minimal_message_with_publisher_id_only() {
        let mut msg = NetworkMessage::new(PublisherId::U16(7));
        msg.payload.push(DataSetMessage::keep_alive(1));

        let bytes = NetworkMessageBuilder::new(&msg).build();
        assert_eq!(bytes[0] & network_message::PUBLISHER_ID_ENABLED, network_message::PUBLISHER_ID_ENABLED);
        assert_eq!(bytes[0] & network_message::GROUP_HEADER_ENABLED, 0);
    }

    #[test]
    fn payload_offset_points_past_security_header() {
        let mut msg = NetworkMessage::new(PublisherId::Byte(1));
        msg.group_header = Some(GroupHeader {
            writer_group_id: 1,
            group_version: 1,
            network_message_number: 0,
            sequence_number: 0,
        });
        msg.payload.push(DataSetMessage::key_frame(
            1,
            vec![DataValue::good(Variant::Int32(1))],
        ));

        let (bytes, offset) = NetworkMessageBuilder::new(&msg).build_with_payload_offset();
        assert!(offset < bytes.len());
        assert_eq!(bytes[offset], 1, "payload section starts with the DataSetMessage count");
    }
}
