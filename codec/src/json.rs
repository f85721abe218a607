//! JSON NetworkMessage encoding, reversible and non-reversible variants.
//!
//! Reversible mode preserves enough structure to decode back into a
//! [`NetworkMessage`] (variant type tags, explicit null markers); the
//! non-reversible mode is a simplified, display-oriented projection used for
//! logging and external consumption, and is encode-only.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CodecError, CodecResult};
use crate::message::{DataSetMessage, DataSetPayload, NetworkMessage};
use pubsub_types::{DataValue, PublisherId, StatusCode, Variant};

fn variant_to_reversible(v: &Variant) -> Value {
    match v {
        Variant::Boolean(b) => json!({"Type": v.type_tag(), "Body": b}),
        Variant::Byte(b) => json!({"Type": v.type_tag(), "Body": b}),
        Variant::SByte(b) => json!({"Type": v.type_tag(), "Body": b}),
        Variant::Int16(x) => json!({"Type": v.type_tag(), "Body": x}),
        Variant::UInt16(x) => json!({"Type": v.type_tag(), "Body": x}),
        Variant::Int32(x) => json!({"Type": v.type_tag(), "Body": x}),
        Variant::UInt32(x) => json!({"Type": v.type_tag(), "Body": x}),
        Variant::Int64(x) => json!({"Type": v.type_tag(), "Body": x.to_string()}),
        Variant::UInt64(x) => json!({"Type": v.type_tag(), "Body": x.to_string()}),
        Variant::Float(x) => json!({"Type": v.type_tag(), "Body": float_to_json(*x as f64)}),
        Variant::Double(x) => json!({"Type": v.type_tag(), "Body": float_to_json(*x)}),
        Variant::String(s) => json!({"Type": v.type_tag(), "Body": s}),
        Variant::DateTime(t) => json!({"Type": v.type_tag(), "Body": opc_ua_ticks_to_iso8601(*t)}),
        Variant::ByteString(b) => json!({"Type": v.type_tag(), "Body": base64_encode(b)}),
        Variant::Null => Value::Null,
    }
}

fn float_to_json(x: f64) -> Value {
    if x.is_nan() {
        Value::String("NaN".to_string())
    } else if x == f64::INFINITY {
        Value::String("Infinity".to_string())
    } else if x == f64::NEG_INFINITY {
        Value::String("-Infinity".to_string())
    } else {
        serde_json::Number::from_f64(x)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

const TICKS_PER_MS: i64 = 10_000;
const EPOCH_DIFF_MS: i64 = 11_644_473_600_000;

fn opc_ua_ticks_to_iso8601(ticks_100ns_since_1601: i64) -> String {
    let unix_ms = ticks_100ns_since_1601 / TICKS_PER_MS - EPOCH_DIFF_MS;
    let dt = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(unix_ms)
        .unwrap_or_else(|| chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap());
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn iso8601_to_opc_ua_ticks(s: &str) -> CodecResult<i64> {
    let dt = chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| CodecError::Json(format!("invalid ISO 8601 DateTime {s:?}: {e}")))?;
    let unix_ms = dt.timestamp_millis();
    Ok((unix_ms + EPOCH_DIFF_MS) * TICKS_PER_MS)
}

fn data_value_to_json(dv: &DataValue, reversible: bool) -> Value {
    if !reversible {
        return match &dv.value {
            Variant::Null => Value::Null,
            _ => variant_display_value(&dv.value),
        };
    }
    let mut obj = serde_json::Map::new();
    obj.insert("Value".to_string(), variant_to_reversible(&dv.value));
    if !dv.status.is_good() {
        obj.insert(
            "Status".to_string(),
            Value::String(format!("{}", dv.status)),
        );
    }
    if let Some(ts) = dv.source_timestamp {
        obj.insert(
            "SourceTimestamp".to_string(),
            Value::String(opc_ua_ticks_to_iso8601(ts)),
        );
    }
    Value::Object(obj)
}

fn variant_display_value(v: &Variant) -> Value {
    match v {
        Variant::Boolean(b) => json!(b),
        Variant::Byte(b) => json!(b),
        Variant::SByte(b) => json!(b),
        Variant::Int16(x) => json!(x),
        Variant::UInt16(x) => json!(x),
        Variant::Int32(x) => json!(x),
        Variant::UInt32(x) => json!(x),
        Variant::Int64(x) => json!(x.to_string()),
        Variant::UInt64(x) => json!(x.to_string()),
        Variant::Float(x) => float_to_json(*x as f64),
        Variant::Double(x) => float_to_json(*x),
        Variant::String(s) => json!(s),
        Variant::DateTime(t) => json!(opc_ua_ticks_to_iso8601(*t)),
        Variant::ByteString(b) => json!(base64_encode(b)),
        Variant::Null => Value::Null,
    }
}

fn publisher_id_to_json(id: &PublisherId) -> Value {
    match id {
        PublisherId::Byte(v) => json!(v),
        PublisherId::U16(v) => json!(v),
        PublisherId::U32(v) => json!(v),
        PublisherId::U64(v) => json!(v.to_string()),
        PublisherId::String(v) => json!(v),
    }
}

fn dataset_message_to_json(msg: &DataSetMessage, reversible: bool) -> Value {
    let payload = match &msg.payload {
        DataSetPayload::KeyFrame(fields) => {
            let mut fields_obj = serde_json::Map::new();
            for (i, f) in fields.iter().enumerate() {
                fields_obj.insert(i.to_string(), data_value_to_json(f, reversible));
            }
            if reversible {
                json!({"Type": "KeyFrame", "Fields": fields_obj})
            } else {
                Value::Object(fields_obj)
            }
        }
        DataSetPayload::DeltaFrame(changed) => {
            let mut fields_obj = serde_json::Map::new();
            for (index, f) in changed {
                fields_obj.insert(index.to_string(), data_value_to_json(f, reversible));
            }
            if reversible {
                json!({"Type": "DeltaFrame", "Fields": fields_obj})
            } else {
                Value::Object(fields_obj)
            }
        }
        DataSetPayload::KeepAlive => Value::Null,
    };

    let mut obj = serde_json::Map::new();
    if reversible {
        obj.insert(
            "DataSetWriterId".to_string(),
            json!(msg.data_set_writer_id),
        );
        if let Some(seq) = msg.sequence_number {
            obj.insert("SequenceNumber".to_string(), json!(seq));
        }
    }
    obj.insert("Payload".to_string(), payload);
    Value::Object(obj)
}

/// Encodes a NetworkMessage as reversible JSON: every field carries enough
/// type information to decode back into the same `NetworkMessage`.
pub fn encode_reversible(msg: &NetworkMessage) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert(
        "MessageType".to_string(),
        Value::String("ua-data".to_string()),
    );
    obj.insert("PublisherId".to_string(), publisher_id_to_json(&msg.publisher_id));
    if let Some(ids) = &msg.data_set_writer_ids {
        obj.insert(
            "DataSetWriterIds".to_string(),
            Value::Array(ids.iter().map(|id| json!(id)).collect()),
        );
    }
    obj.insert(
        "Messages".to_string(),
        Value::Array(
            msg.payload
                .iter()
                .map(|m| dataset_message_to_json(m, true))
                .collect(),
        ),
    );
    Value::Object(obj)
}

/// Encodes a NetworkMessage as non-reversible JSON: a flatter projection
/// intended for logging and external tools, not for decoding back.
pub fn encode_non_reversible(msg: &NetworkMessage) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("publisherId".to_string(), publisher_id_to_json(&msg.publisher_id));
    obj.insert(
        "messages".to_string(),
        Value::Array(
            msg.payload
                .iter()
                .map(|m| dataset_message_to_json(m, false))
                .collect(),
        ),
    );
    Value::Object(obj)
}

#[derive(Debug, Deserialize, Serialize)]
struct ReversibleVariant {
    #[serde(rename = "Type")]
    ty: u8,
    #[serde(rename = "Body")]
    body: Value,
}

fn decode_reversible_variant(v: &Value) -> CodecResult<Variant> {
    if v.is_null() {
        return Ok(Variant::Null);
    }
    let parsed: ReversibleVariant =
        serde_json::from_value(v.clone()).map_err(|e| CodecError::Json(e.to_string()))?;
    let variant = match parsed.ty {
        1 => Variant::Boolean(parsed.body.as_bool().ok_or_else(|| CodecError::Json("expected bool".into()))?),
        2 => Variant::Byte(parsed.body.as_u64().ok_or_else(|| CodecError::Json("expected byte".into()))? as u8),
        3 => Variant::SByte(parsed.body.as_i64().ok_or_else(|| CodecError::Json("expected sbyte".into()))? as i8),
        4 => Variant::Int16(parsed.body.as_i64().ok_or_else(|| CodecError::Json("expected i16".into()))? as i16),
        5 => Variant::UInt16(parsed.body.as_u64().ok_or_else(|| CodecError::Json("expected u16".into()))? as u16),
        6 => Variant::Int32(parsed.body.as_i64().ok_or_else(|| CodecError::Json("expected i32".into()))? as i32),
        7 => Variant::UInt32(parsed.body.as_u64().ok_or_else(|| CodecError::Json("expected u32".into()))? as u32),
        8 => Variant::Int64(
            parsed
                .body
                .as_str()
                .ok_or_else(|| CodecError::Json("expected i64 string".into()))?
                .parse()
                .map_err(|_| CodecError::Json("invalid i64".into()))?,
        ),
        9 => Variant::UInt64(
            parsed
                .body
                .as_str()
                .ok_or_else(|| CodecError::Json("expected u64 string".into()))?
                .parse()
                .map_err(|_| CodecError::Json("invalid u64".into()))?,
        ),
        10 => Variant::Float(json_to_f64(&parsed.body)? as f32),
        11 => Variant::Double(json_to_f64(&parsed.body)?),
        12 => Variant::String(
            parsed
                .body
                .as_str()
                .ok_or_else(|| CodecError::Json("expected string".into()))?
                .to_string(),
        ),
        14 => Variant::ByteString(
            base64_decode(parsed.body.as_str().ok_or_else(|| CodecError::Json("expected base64".into()))?)
                .ok_or_else(|| CodecError::Json("invalid base64".into()))?,
        ),
        other => return Err(CodecError::Json(format!("unsupported reversible type tag {other}"))),
    };
    Ok(variant)
}

fn json_to_f64(v: &Value) -> CodecResult<f64> {
    if let Some(s) = v.as_str() {
        return match s {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => Err(CodecError::Json(format!("invalid float literal {s}"))),
        };
    }
    v.as_f64().ok_or_else(|| CodecError::Json("expected number".into()))
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    BASE64.decode(s).ok()
}

fn decode_status_code(s: &str) -> StatusCode {
    match s {
        "Good" => StatusCode::Good,
        "UncertainInitialValue" => StatusCode::UncertainInitialValue,
        "BadInvalidArgument" => StatusCode::BadInvalidArgument,
        "BadOutOfMemory" => StatusCode::BadOutOfMemory,
        "BadCommunicationError" => StatusCode::BadCommunicationError,
        "BadConnectionClosed" => StatusCode::BadConnectionClosed,
        "BadEncodingError" => StatusCode::BadEncodingError,
        "BadDecodingError" => StatusCode::BadDecodingError,
        "BadSecurityChecksFailed" => StatusCode::BadSecurityChecksFailed,
        "BadSecurityModeInsufficient" => StatusCode::BadSecurityModeInsufficient,
        "BadUserAccessDenied" => StatusCode::BadUserAccessDenied,
        "BadNotFound" => StatusCode::BadNotFound,
        "BadNotImplemented" => StatusCode::BadNotImplemented,
        "BadSecurityPolicyRejected" => StatusCode::BadSecurityPolicyRejected,
        "BadNodeIdExists" => StatusCode::BadNodeIdExists,
        // An unrecognized status name is itself a decoding failure.
        _ => StatusCode::BadDecodingError,
    }
}

fn decode_reversible_data_value(v: &Value) -> CodecResult<DataValue> {
    let variant = v
        .get("Value")
        .map(decode_reversible_variant)
        .transpose()?
        .unwrap_or(Variant::Null);
    let mut dv = DataValue::good(variant);
    if let Some(Value::String(ts)) = v.get("SourceTimestamp") {
        dv = dv.with_timestamp(iso8601_to_opc_ua_ticks(ts)?);
    }
    if let Some(Value::String(status)) = v.get("Status") {
        dv = dv.with_status(decode_status_code(status));
    }
    Ok(dv)
}

/// Decodes reversible JSON back into a NetworkMessage. Only the fields this
/// core's encoder emits are understood; unrecognized keys are ignored.
pub fn decode_reversible(value: &Value) -> CodecResult<NetworkMessage> {
    let publisher_id = match value.get("PublisherId") {
        Some(Value::String(s)) => PublisherId::String(s.clone()),
        Some(Value::Number(n)) if n.is_u64() => PublisherId::U32(n.as_u64().unwrap() as u32),
        _ => return Err(CodecError::Json("missing or invalid PublisherId".into())),
    };

    let mut message = NetworkMessage::new(publisher_id);

    if let Some(Value::Array(messages)) = value.get("Messages") {
        for m in messages {
            let data_set_writer_id = m
                .get("DataSetWriterId")
                .and_then(Value::as_u64)
                .ok_or_else(|| CodecError::Json("missing DataSetWriterId".into()))? as u16;
            let sequence_number = m.get("SequenceNumber").and_then(Value::as_u64).map(|n| n as u16);

            let payload = match m.get("Payload") {
                Some(Value::Object(obj)) => {
                    let frame_type = obj
                        .get("Type")
                        .and_then(Value::as_str)
                        .ok_or_else(|| CodecError::Json("missing Payload.Type".into()))?;
                    let fields = obj
                        .get("Fields")
                        .and_then(Value::as_object)
                        .ok_or_else(|| CodecError::Json("missing Payload.Fields".into()))?;

                    let mut pairs: Vec<(u16, Value)> = fields
                        .iter()
                        .map(|(k, v)| Ok((k.parse::<u16>().map_err(|_| CodecError::Json("bad field index".into()))?, v.clone())))
                        .collect::<CodecResult<_>>()?;
                    pairs.sort_by_key(|(i, _)| *i);

                    let mut decoded = Vec::with_capacity(pairs.len());
                    for (index, v) in &pairs {
                        decoded.push((*index, decode_reversible_data_value(v)?));
                    }

                    match frame_type {
                        "KeyFrame" => {
                            let values = decoded.into_iter().map(|(_, v)| v).collect();
                            DataSetPayload::KeyFrame(values)
                        }
                        "DeltaFrame" => DataSetPayload::DeltaFrame(decoded),
                        other => {
                            return Err(CodecError::Json(format!("unsupported Payload.Type {other}")))
                        }
                    }
                }
                _ => DataSetPayload::KeepAlive,
            };

            let mut dsm = DataSetMessage {
                data_set_writer_id,
                sequence_number,
                timestamp: None,
                status: crate::message::DataSetMessageStatus::Good,
                payload,
            };
            if let Some(seq) = sequence_number {
                dsm = dsm.with_sequence_number(seq);
            }
            message.payload.push(dsm);
        }
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DataSetMessage;
    use pubsub_types::Variant;

    #[test]
    fn reversible_round_trips_scalar_fields() {
        let mut msg = NetworkMessage::new(PublisherId::U32(5));
        msg.payload.push(DataSetMessage::key_frame(
            1,
            vec![
                DataValue::good(Variant::Int32(-7)),
                DataValue::good(Variant::String("x".into())),
            ],
        ));

        let json = encode_reversible(&msg);
        let decoded = decode_reversible(&json).unwrap();
        assert_eq!(decoded.publisher_id, PublisherId::U32(5));
        assert_eq!(decoded.payload.len(), 1);
    }

    #[test]
    fn delta_frame_round_trips_with_its_field_indices_intact() {
        let mut msg = NetworkMessage::new(PublisherId::U32(5));
        msg.payload.push(DataSetMessage::delta_frame(
            1,
            vec![
                (2, DataValue::good(Variant::Int32(11))),
                (5, DataValue::good(Variant::Int32(55))),
            ],
        ));

        let json = encode_reversible(&msg);
        let decoded = decode_reversible(&json).unwrap();
        match &decoded.payload[0].payload {
            DataSetPayload::DeltaFrame(changed) => {
                assert_eq!(changed, &vec![(2, DataValue::good(Variant::Int32(11))), (5, DataValue::good(Variant::Int32(55)))]);
            }
            other => panic!("expected DeltaFrame, got {other:?}"),
        }
    }

    #[test]
    fn key_frame_does_not_decode_as_delta_frame() {
        let mut msg = NetworkMessage::new(PublisherId::U32(5));
        msg.payload.push(DataSetMessage::key_frame(
            1,
            vec![DataValue::good(Variant::Boolean(true)), DataValue::good(Variant::Boolean(false))],
        ));

        let json = encode_reversible(&msg);
        let decoded = decode_reversible(&json).unwrap();
        match &decoded.payload[0].payload {
            DataSetPayload::KeyFrame(values) => assert_eq!(values.len(), 2),
            other => panic!("expected KeyFrame, got {other:?}"),
        }
    }

    #[test]
    fn source_timestamp_and_status_round_trip() {
        let mut msg = NetworkMessage::new(PublisherId::U32(5));
        let value = DataValue::good(Variant::Int32(1))
            .with_timestamp(133_000_000_000_000_000) // arbitrary 100ns ticks since 1601
            .with_status(StatusCode::BadSecurityPolicyRejected);
        msg.payload.push(DataSetMessage::key_frame(1, vec![value]));

        let json = encode_reversible(&msg);
        let decoded = decode_reversible(&json).unwrap();
        match &decoded.payload[0].payload {
            DataSetPayload::KeyFrame(values) => {
                assert_eq!(values[0].status, StatusCode::BadSecurityPolicyRejected);
                assert_eq!(values[0].source_timestamp, Some(133_000_000_000_000_000));
            }
            other => panic!("expected KeyFrame, got {other:?}"),
        }
    }

    #[test]
    fn ticks_format_as_true_iso8601_with_millis() {
        // 2024-01-01T00:00:00.000Z in OPC-UA 100ns ticks since 1601-01-01.
        let unix_ms = 1_704_067_200_000i64;
        let ticks = (unix_ms + EPOCH_DIFF_MS) * TICKS_PER_MS;
        assert_eq!(opc_ua_ticks_to_iso8601(ticks), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn iso8601_parses_back_to_the_same_ticks() {
        let ticks = 133_000_000_000_000_000i64;
        let s = opc_ua_ticks_to_iso8601(ticks);
        assert_eq!(iso8601_to_opc_ua_ticks(&s).unwrap(), ticks);
    }

    #[test]
    fn float_specials_encode_as_strings() {
        assert_eq!(float_to_json(f64::NAN), Value::String("NaN".into()));
        assert_eq!(float_to_json(f64::INFINITY), Value::String("Infinity".into()));
    }

    #[test]
    fn base64_round_trips() {
        let data = b"opc-ua pubsub";
        let encoded = base64_encode(data);
        let decoded = base64_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn non_reversible_omits_type_tags() {
        let mut msg = NetworkMessage::new(PublisherId::Byte(1));
        msg.payload
            .push(DataSetMessage::key_frame(1, vec![DataValue::good(Variant::Boolean(true))]));
        let json = encode_non_reversible(&msg);
        let messages = json.get("messages").unwrap().as_array().unwrap();
        let payload = messages[0].get("Payload").unwrap();
        assert_eq!(payload.get("0").unwrap(), &Value::Bool(true));
    }
}
