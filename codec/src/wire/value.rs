//! Scalar Variant encode/decode shared by KeyFrame fields, DeltaFrame
//! fields, and PromotedFields.

use crate::error::{CodecError, CodecResult};
use crate::flags::NULL_STRING_LEN;
use pubsub_types::{DataValue, StatusCode, Variant};

pub fn encode_string(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => out.extend_from_slice(&NULL_STRING_LEN.to_le_bytes()),
        Some(s) => {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
    }
}

pub fn decode_string(data: &[u8], offset: &mut usize) -> CodecResult<Option<String>> {
    if *offset + 4 > data.len() {
        return Err(CodecError::TruncatedPayload { offset: *offset });
    }
    let len = u32::from_le_bytes(data[*offset..*offset + 4].try_into().unwrap());
    *offset += 4;
    if len == NULL_STRING_LEN {
        return Ok(None);
    }
    let len = len as usize;
    if *offset + len > data.len() {
        return Err(CodecError::InvalidStringLength {
            need: len,
            got: data.len() - *offset,
        });
    }
    let s = String::from_utf8_lossy(&data[*offset..*offset + len]).into_owned();
    *offset += len;
    Ok(Some(s))
}

pub fn encode_variant(out: &mut Vec<u8>, v: &Variant) {
    out.push(v.type_tag());
    match v {
        Variant::Boolean(b) => out.push(*b as u8),
        Variant::Byte(b) => out.push(*b),
        Variant::SByte(b) => out.push(*b as u8),
        Variant::Int16(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::UInt16(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::Int32(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::UInt32(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::Int64(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::UInt64(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::Float(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::Double(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::DateTime(x) => out.extend_from_slice(&x.to_le_bytes()),
        Variant::String(s) => encode_string(out, Some(s)),
        Variant::ByteString(b) => {
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
        }
        Variant::Null => {}
    }
}

pub fn decode_variant(data: &[u8], offset: &mut usize) -> CodecResult<Variant> {
    if *offset + 1 > data.len() {
        return Err(CodecError::TruncatedPayload { offset: *offset });
    }
    let tag = data[*offset];
    *offset += 1;

    macro_rules! take {
        ($ty:ty) => {{
            let n = std::mem::size_of::<$ty>();
            if *offset + n > data.len() {
                return Err(CodecError::TruncatedPayload { offset: *offset });
            }
            let bytes: [u8; std::mem::size_of::<$ty>()] =
                data[*offset..*offset + n].try_into().unwrap();
            *offset += n;
            <$ty>::from_le_bytes(bytes)
        }};
    }

    let value = match tag {
        0 => Variant::Null,
        1 => Variant::Boolean(take!(u8) != 0),
        2 => {
            if *offset + 1 > data.len() {
                return Err(CodecError::TruncatedPayload { offset: *offset });
            }
            let b = data[*offset];
            *offset += 1;
            Variant::Byte(b)
        }
        3 => Variant::SByte(take!(u8) as i8),
        4 => Variant::Int16(take!(i16)),
        5 => Variant::UInt16(take!(u16)),
        6 => Variant::Int32(take!(i32)),
        7 => Variant::UInt32(take!(u32)),
        8 => Variant::Int64(take!(i64)),
        9 => Variant::UInt64(take!(u64)),
        10 => Variant::Float(take!(f32)),
        11 => Variant::Double(take!(f64)),
        12 => Variant::String(decode_string(data, offset)?.unwrap_or_default()),
        13 => Variant::DateTime(take!(i64)),
        14 => {
            if *offset + 4 > data.len() {
                return Err(CodecError::TruncatedPayload { offset: *offset });
            }
            let len = u32::from_le_bytes(data[*offset..*offset + 4].try_into().unwrap()) as usize;
            *offset += 4;
            if *offset + len > data.len() {
                return Err(CodecError::TruncatedPayload { offset: *offset });
            }
            let bytes = data[*offset..*offset + len].to_vec();
            *offset += len;
            Variant::ByteString(bytes)
        }
        other => return Err(CodecError::InvalidDataSetMessageFlags(other)),
    };
    Ok(value)
}

pub fn encode_data_value(out: &mut Vec<u8>, dv: &DataValue) {
    let status_byte = match dv.status {
        StatusCode::Good => 0u8,
        StatusCode::UncertainInitialValue => 1u8,
        _ => 2u8,
    };
    out.push(status_byte);
    match dv.source_timestamp {
        Some(ts) => {
            out.push(1);
            out.extend_from_slice(&ts.to_le_bytes());
        }
        None => out.push(0),
    }
    encode_variant(out, &dv.value);
}

pub fn decode_data_value(data: &[u8], offset: &mut usize) -> CodecResult<DataValue> {
    if *offset + 2 > data.len() {
        return Err(CodecError::TruncatedPayload { offset: *offset });
    }
    let status_byte = data[*offset];
    let has_ts = data[*offset + 1];
    *offset += 2;

    let source_timestamp = if has_ts != 0 {
        if *offset + 8 > data.len() {
            return Err(CodecError::TruncatedPayload { offset: *offset });
        }
        let ts = i64::from_le_bytes(data[*offset..*offset + 8].try_into().unwrap());
        *offset += 8;
        Some(ts)
    } else {
        None
    };

    let value = decode_variant(data, offset)?;
    let status = match status_byte {
        0 => StatusCode::Good,
        1 => StatusCode::UncertainInitialValue,
        _ => StatusCode::BadDecodingError,
    };

    Ok(DataValue {
        value,
        status,
        source_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        for v in [
            Variant::Boolean(true),
            Variant::Int32(-42),
            Variant::UInt64(u64::MAX),
            Variant::Double(3.5),
            Variant::String("hello".into()),
            Variant::ByteString(vec![1, 2, 3]),
            Variant::Null,
        ] {
            let mut buf = Vec::new();
            encode_variant(&mut buf, &v);
            let mut offset = 0;
            let decoded = decode_variant(&buf, &mut offset).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(offset, buf.len());
        }
    }

    #[test]
    fn null_string_round_trips_as_none() {
        let mut buf = Vec::new();
        encode_string(&mut buf, None);
        let mut offset = 0;
        assert_eq!(decode_string(&buf, &mut offset).unwrap(), None);
    }

    #[test]
    fn data_value_round_trip_preserves_status_and_timestamp() {
        let dv = DataValue::good(Variant::Int32(42))
            .with_timestamp(9999)
            .with_status(StatusCode::UncertainInitialValue);
        let mut buf = Vec::new();
        encode_data_value(&mut buf, &dv);
        let mut offset = 0;
        let decoded = decode_data_value(&buf, &mut offset).unwrap();
        assert_eq!(decoded.value, dv.value);
        assert_eq!(decoded.source_timestamp, dv.source_timestamp);
        assert!(decoded.status.is_uncertain());
    }

    #[test]
    fn truncated_variant_errors() {
        let mut offset = 0;
        assert!(decode_variant(&[6, 1, 2], &mut offset).is_err());
    }
}
