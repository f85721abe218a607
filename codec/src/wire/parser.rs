//! UADP decoder: the inverse of [`crate::wire::builder::NetworkMessageBuilder`].
//!
//! Decoding happens against plaintext bytes — a caller whose group security
//! mode is not `None` must run the received bytes through
//! [`crate::security`] to verify the signature and decrypt the payload
//! span before calling [`decode_uadp`].

use crate::error::{CodecError, CodecResult};
use crate::flags::{dataset_message, network_message};
use crate::message::{
    DataSetMessage, DataSetMessageStatus, DataSetPayload, GroupHeader, NetworkMessage,
    SecurityHeader,
};
use crate::wire::value::{decode_data_value, decode_string, decode_variant};
use pubsub_types::PublisherId;

fn need(data: &[u8], offset: usize, len: usize) -> CodecResult<()> {
    if offset + len > data.len() {
        return Err(CodecError::TruncatedPayload { offset });
    }
    Ok(())
}

fn decode_publisher_id(data: &[u8], offset: &mut usize) -> CodecResult<PublisherId> {
    need(data, *offset, 1)?;
    let tag = data[*offset];
    *offset += 1;
    let id = match tag {
        0 => {
            need(data, *offset, 1)?;
            let v = data[*offset];
            *offset += 1;
            PublisherId::Byte(v)
        }
        1 => {
            need(data, *offset, 2)?;
            let v = u16::from_le_bytes(data[*offset..*offset + 2].try_into().unwrap());
            *offset += 2;
            PublisherId::U16(v)
        }
        2 => {
            need(data, *offset, 4)?;
            let v = u32::from_le_bytes(data[*offset..*offset + 4].try_into().unwrap());
            *offset += 4;
            PublisherId::U32(v)
        }
        3 => {
            need(data, *offset, 8)?;
            let v = u64::from_le_bytes(data[*offset..*offset + 8].try_into().unwrap());
            *offset += 8;
            PublisherId::U64(v)
        }
        4 => {
            let s = decode_string(data, offset)?.unwrap_or_default();
            PublisherId::String(s)
        }
        other => return Err(CodecError::UnknownPublisherIdType(other)),
    };
    Ok(id)
}

fn decode_dataset_message(data: &[u8], offset: &mut usize) -> CodecResult<DataSetMessage> {
    need(data, *offset, 3)?;
    let flags = data[*offset];
    let data_set_writer_id = u16::from_le_bytes(data[*offset + 1..*offset + 3].try_into().unwrap());
    *offset += 3;

    let sequence_number = if flags & dataset_message::SEQUENCE_NUMBER_ENABLED != 0 {
        need(data, *offset, 2)?;
        let v = u16::from_le_bytes(data[*offset..*offset + 2].try_into().unwrap());
        *offset += 2;
        Some(v)
    } else {
        None
    };

    let timestamp = if flags & dataset_message::TIMESTAMP_ENABLED != 0 {
        need(data, *offset, 8)?;
        let v = i64::from_le_bytes(data[*offset..*offset + 8].try_into().unwrap());
        *offset += 8;
        Some(v)
    } else {
        None
    };

    let status = if flags & dataset_message::STATUS_BAD != 0 {
        DataSetMessageStatus::Bad
    } else {
        DataSetMessageStatus::Good
    };

    let payload = match flags & dataset_message::TYPE_MASK {
        dataset_message::TYPE_KEY_FRAME => {
            need(data, *offset, 1)?;
            let count = data[*offset] as usize;
            *offset += 1;
            let mut fields = Vec::with_capacity(count);
            for _ in 0..count {
                fields.push(decode_data_value(data, offset)?);
            }
            DataSetPayload::KeyFrame(fields)
        }
        dataset_message::TYPE_DELTA_FRAME => {
            need(data, *offset, 1)?;
            let count = data[*offset] as usize;
            *offset += 1;
            let mut changed = Vec::with_capacity(count);
            for _ in 0..count {
                need(data, *offset, 2)?;
                let index = u16::from_le_bytes(data[*offset..*offset + 2].try_into().unwrap());
                *offset += 2;
                let value = decode_data_value(data, offset)?;
                changed.push((index, value));
            }
            DataSetPayload::DeltaFrame(changed)
        }
        dataset_message::TYPE_KEEP_ALIVE => DataSetPayload::KeepAlive,
        other => return Err(CodecError::InvalidDataSetMessageFlags(other)),
    };

    Ok(DataSetMessage {
        data_set_writer_id,
        sequence_number,
        timestamp,
        status,
        payload,
    })
}

/// A decoded message plus the offset its DataSetMessage payload started at,
/// mirroring [`crate::wire::builder::NetworkMessageBuilder::build_with_payload_offset`].
pub struct DecodedMessage {
    pub message: NetworkMessage,
    pub payload_offset: usize,
}

/// Walks only the fixed/optional header sections up through the security
/// header, without touching the (possibly still-encrypted) payload that
/// follows. A secured reader needs this to locate `payload_offset` before
/// it can call [`crate::security::open`]; calling [`decode_uadp`] directly
/// on ciphertext would try to parse the DataSetMessage section too early
/// and fail.
pub fn decode_security_prefix(data: &[u8]) -> CodecResult<(Option<SecurityHeader>, usize)> {
    if data.is_empty() {
        return Err(CodecError::MessageTooSmall { need: 1, got: 0 });
    }
    let mut offset = 0usize;
    let flags = data[offset];
    offset += 1;

    let has_extended = flags & network_message::EXTENDED_FLAGS1_ENABLED != 0;
    let ext_flags = if has_extended {
        need(data, offset, 1)?;
        let v = data[offset];
        offset += 1;
        v
    } else {
        0
    };

    if flags & network_message::PUBLISHER_ID_ENABLED != 0 {
        decode_publisher_id(data, &mut offset)?;
    }

    if flags & network_message::GROUP_HEADER_ENABLED != 0 {
        need(data, offset, 10)?;
        offset += 10;
    }

    if flags & network_message::PAYLOAD_HEADER_ENABLED != 0 {
        need(data, offset, 1)?;
        let count = data[offset] as usize;
        offset += 1;
        need(data, offset, count * 2)?;
        offset += count * 2;
    }

    if ext_flags & network_message::TIMESTAMP_ENABLED != 0 {
        need(data, offset, 8)?;
        offset += 8;
    }

    if ext_flags & network_message::PICOSECONDS_ENABLED != 0 {
        need(data, offset, 2)?;
        offset += 2;
    }

    if ext_flags & network_message::PROMOTED_FIELDS_ENABLED != 0 {
        need(data, offset, 1)?;
        let count = data[offset] as usize;
        offset += 1;
        for _ in 0..count {
            decode_variant(data, &mut offset)?;
        }
    }

    let security_header = if flags & network_message::SECURITY_ENABLED != 0 {
        need(data, offset, 14)?;
        let token_id = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        let mut message_nonce = [0u8; 8];
        message_nonce.copy_from_slice(&data[offset + 4..offset + 12]);
        let signature_length = u16::from_le_bytes(data[offset + 12..offset + 14].try_into().unwrap());
        offset += 14;
        Some(SecurityHeader {
            token_id,
            message_nonce,
            signature_length,
        })
    } else {
        None
    };

    Ok((security_header, offset))
}

pub fn decode_uadp(data: &[u8]) -> CodecResult<DecodedMessage> {
    if data.is_empty() {
        return Err(CodecError::MessageTooSmall { need: 1, got: 0 });
    }
    let mut offset = 0usize;
    let flags = data[offset];
    offset += 1;

    let has_extended = flags & network_message::EXTENDED_FLAGS1_ENABLED != 0;
    let ext_flags = if has_extended {
        need(data, offset, 1)?;
        let v = data[offset];
        offset += 1;
        v
    } else {
        0
    };

    let publisher_id = if flags & network_message::PUBLISHER_ID_ENABLED != 0 {
        decode_publisher_id(data, &mut offset)?
    } else {
        PublisherId::Byte(0)
    };

    let group_header = if flags & network_message::GROUP_HEADER_ENABLED != 0 {
        need(data, offset, 10)?;
        let writer_group_id = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap());
        let group_version = u32::from_le_bytes(data[offset + 2..offset + 6].try_into().unwrap());
        let network_message_number =
            u16::from_le_bytes(data[offset + 6..offset + 8].try_into().unwrap());
        let sequence_number = u16::from_le_bytes(data[offset + 8..offset + 10].try_into().unwrap());
        offset += 10;
        Some(GroupHeader {
            writer_group_id,
            group_version,
            network_message_number,
            sequence_number,
        })
    } else {
        None
    };

    let data_set_writer_ids = if flags & network_message::PAYLOAD_HEADER_ENABLED != 0 {
        need(data, offset, 1)?;
        let count = data[offset] as usize;
        offset += 1;
        need(data, offset, count * 2)?;
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap()));
            offset += 2;
        }
        Some(ids)
    } else {
        None
    };

    let timestamp = if ext_flags & network_message::TIMESTAMP_ENABLED != 0 {
        need(data, offset, 8)?;
        let v = i64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
        offset += 8;
        Some(v)
    } else {
        None
    };

    let picoseconds = if ext_flags & network_message::PICOSECONDS_ENABLED != 0 {
        need(data, offset, 2)?;
        let v = u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap());
        offset += 2;
        Some(v)
    } else {
        None
    };

    let promoted_fields = if ext_flags & network_message::PROMOTED_FIELDS_ENABLED != 0 {
        need(data, offset, 1)?;
        let count = data[offset] as usize;
        offset += 1;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let value = decode_variant(data, &mut offset)?;
            fields.push(pubsub_types::DataValue::good(value));
        }
        Some(fields)
    } else {
        None
    };

    let security_header = if flags & network_message::SECURITY_ENABLED != 0 {
        need(data, offset, 14)?;
        let token_id = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
        let mut message_nonce = [0u8; 8];
        message_nonce.copy_from_slice(&data[offset + 4..offset + 12]);
        let signature_length = u16::from_le_bytes(data[offset + 12..offset + 14].try_into().unwrap());
        offset += 14;
        Some(SecurityHeader {
            token_id,
            message_nonce,
            signature_length,
        })
    } else {
        None
    };

    let payload_offset = offset;

    need(data, offset, 1)?;
    let count = data[offset] as usize;
    offset += 1;
    let mut payload = Vec::with_capacity(count);
    for _ in 0..count {
        payload.push(decode_dataset_message(data, &mut offset)?);
    }

    Ok(DecodedMessage {
        message: NetworkMessage {
            publisher_id,
            group_header,
            data_set_writer_ids,
            timestamp,
            picoseconds,
            promoted_fields,
            security_header,
            payload,
        },
        payload_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DataSetMessage;
    use crate::wire::builder::NetworkMessageBuilder;
    use pubsub_types::{DataValue, Variant};

    #[test]
    fn round_trips_key_frame_message() {
        let mut msg = NetworkMessage::new(PublisherId::U32(99));
        msg.payload.push(DataSetMessage::key_frame(
            3,
            vec![
                DataValue::good(Variant::Int32(42)),
                DataValue::good(Variant::String("hi".into())),
            ],
        ));

        let bytes = NetworkMessageBuilder::new(&msg).build();
        let decoded = decode_uadp(&bytes).unwrap();

        assert_eq!(decoded.message.publisher_id, PublisherId::U32(99));
        assert_eq!(decoded.message.payload.len(), 1);
        assert_eq!(decoded.message.payload[0].data_set_writer_id, 3);
    }

    #[test]
    fn rejects_truncated_messages() {
        assert!(decode_uadp(&[]).is_err());
        assert!(decode_uadp(&[network_message::PUBLISHER_ID_ENABLED]).is_err());
    }
}
