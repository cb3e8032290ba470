use crate::error::EncodeError;
use crate::message::DynamicMessage;
use crate::parser::ast::Rule;
use crate::reflect::{Field, Graph, NodeId};
use crate::types::{FieldType, ScalarType};
use crate::value::{coerce_scalar, ProtoValue};

use super::wire::*;

/// Encode a message to the protobuf binary format.
///
/// Fields are written in declaration order, followed by extensions ordered by
/// id. If required fields are missing the bytes that could be written are
/// returned inside [`EncodeError::MissingRequired`].
pub fn encode(message: &DynamicMessage) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::new(message);
    let mut buf = Vec::new();
    encoder.encode_message(message, &mut buf)?;
    encoder.finish(buf)
}

/// Encode a message preceded by its length as a varint.
pub fn encode_delimited(message: &DynamicMessage) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::new(message);
    let mut body = Vec::new();
    encoder.encode_message(message, &mut body)?;
    let mut out = Vec::with_capacity(body.len() + MAX_VARINT_LEN);
    write_length_delimited(&mut out, &body);
    encoder.finish(out)
}

/// Size of the encoding of `message` in bytes.
pub fn encoded_len(message: &DynamicMessage) -> Result<usize, EncodeError> {
    encode(message).map(|buf| buf.len())
}

struct Encoder<'g> {
    graph: &'g Graph,
    /// Qualified names of required fields found absent, nested messages included.
    missing: Vec<String>,
}

impl<'g> Encoder<'g> {
    fn new(message: &'g DynamicMessage) -> Self {
        Encoder {
            graph: message.message_type().graph(),
            missing: Vec::new(),
        }
    }

    fn finish(self, buf: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
        if self.missing.is_empty() {
            Ok(buf)
        } else {
            Err(EncodeError::MissingRequired {
                missing: self.missing,
                encoded: buf,
            })
        }
    }

    fn encode_message(&mut self, message: &DynamicMessage, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let graph = self.graph;
        let msg = message.message_type().id();
        let own = graph.message_fields(msg).iter().copied();
        for fid in own.chain(graph.extensions_of(msg)) {
            let field = graph
                .field(fid)
                .ok_or_else(|| EncodeError::UnresolvedField(graph.fqn(fid)))?;
            match message.get_by_id(fid) {
                Some(value) => self.encode_field(fid, field, value, buf)?,
                None if field.is_required() => self.missing.push(graph.fqn(fid)),
                None => {}
            }
        }
        Ok(())
    }

    fn encode_field(
        &mut self,
        fid: NodeId,
        field: &Field,
        value: &ProtoValue,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        let label = self.graph.field_label(fid);
        let ty = field
            .resolved
            .ok_or_else(|| EncodeError::UnresolvedField(label.clone()))?;

        match field.rule {
            Rule::Map => {
                let map = match value {
                    ProtoValue::Map(map) => map,
                    other => return Err(mismatch(&label, "map", other)),
                };
                let key_type = field
                    .key_type
                    .ok_or_else(|| EncodeError::UnresolvedField(label.clone()))?;
                for (key, value) in map.entries() {
                    let mut entry = Vec::new();
                    self.write_value(&label, 1, FieldType::Scalar(key_type), key, &mut entry)?;
                    self.write_value(&label, 2, ty, value, &mut entry)?;
                    write_key(buf, field.id, WireType::LengthDelimited);
                    write_length_delimited(buf, &entry);
                }
            }
            Rule::Repeated => {
                let items = match value {
                    ProtoValue::List(items) => items,
                    other => return Err(mismatch(&label, "list", other)),
                };
                if items.is_empty() {
                    return Ok(());
                }
                if field.packed && ty.is_packable() {
                    let mut packed = Vec::new();
                    for item in items {
                        write_payload(&label, ty, item, &mut packed)?;
                    }
                    write_key(buf, field.id, WireType::LengthDelimited);
                    write_length_delimited(buf, &packed);
                } else {
                    for item in items {
                        self.write_value(&label, field.id, ty, item, buf)?;
                    }
                }
            }
            _ => {
                if field.has_implicit_presence() && value.is_zero() {
                    return Ok(());
                }
                self.write_value(&label, field.id, ty, value, buf)?;
            }
        }
        Ok(())
    }

    /// Write one keyed value.
    fn write_value(
        &mut self,
        label: &str,
        id: u32,
        ty: FieldType,
        value: &ProtoValue,
        buf: &mut Vec<u8>,
    ) -> Result<(), EncodeError> {
        match ty {
            FieldType::Message(_) => {
                let message = value
                    .as_message()
                    .ok_or_else(|| mismatch(label, "message", value))?;
                let mut nested = Vec::new();
                self.encode_message(message, &mut nested)?;
                write_key(buf, id, WireType::LengthDelimited);
                write_length_delimited(buf, &nested);
            }
            FieldType::Group(_) => {
                let message = value
                    .as_message()
                    .ok_or_else(|| mismatch(label, "group", value))?;
                write_key(buf, id, WireType::StartGroup);
                self.encode_message(message, buf)?;
                write_key(buf, id, WireType::EndGroup);
            }
            _ => {
                write_key(buf, id, ty.wire_type());
                write_payload(label, ty, value, buf)?;
            }
        }
        Ok(())
    }
}

/// Write the unkeyed payload of a scalar or enum value.
fn write_payload(label: &str, ty: FieldType, value: &ProtoValue, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
    match ty {
        FieldType::Enum(_) => {
            let id = value
                .as_integer()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| mismatch(label, "enum", value))?;
            // negative ids are sign-extended to ten bytes like int32
            write_varint(buf, id as i64 as u64);
            Ok(())
        }
        FieldType::Scalar(s) => {
            if write_scalar(buf, s, value) {
                return Ok(());
            }
            let coerced = coerce_scalar(s, value.clone()).map_err(|_| mismatch(label, s.name(), value))?;
            write_scalar(buf, s, &coerced);
            Ok(())
        }
        FieldType::Message(_) | FieldType::Group(_) => Err(mismatch(label, "scalar", value)),
    }
}

/// Write `value` if it is in the canonical representation of `ty`.
fn write_scalar(buf: &mut Vec<u8>, ty: ScalarType, value: &ProtoValue) -> bool {
    match (ty, value) {
        (ScalarType::Int32, ProtoValue::I32(v)) => write_varint(buf, *v as i64 as u64),
        (ScalarType::Int64, ProtoValue::I64(v)) => write_varint(buf, *v as u64),
        (ScalarType::Uint32, ProtoValue::U32(v)) => write_varint(buf, *v as u64),
        (ScalarType::Uint64, ProtoValue::U64(v)) => write_varint(buf, *v),
        (ScalarType::Sint32, ProtoValue::I32(v)) => write_varint(buf, zigzag_encode32(*v) as u64),
        (ScalarType::Sint64, ProtoValue::I64(v)) => write_varint(buf, zigzag_encode64(*v)),
        (ScalarType::Fixed32, ProtoValue::U32(v)) => write_fixed32(buf, *v),
        (ScalarType::Fixed64, ProtoValue::U64(v)) => write_fixed64(buf, *v),
        (ScalarType::Sfixed32, ProtoValue::I32(v)) => write_fixed32(buf, *v as u32),
        (ScalarType::Sfixed64, ProtoValue::I64(v)) => write_fixed64(buf, *v as u64),
        (ScalarType::Float, ProtoValue::F32(v)) => write_fixed32(buf, v.to_bits()),
        (ScalarType::Double, ProtoValue::F64(v)) => write_fixed64(buf, v.to_bits()),
        (ScalarType::Bool, ProtoValue::Bool(v)) => write_varint(buf, *v as u64),
        (ScalarType::String, ProtoValue::String(s)) => write_length_delimited(buf, s.as_bytes()),
        (ScalarType::Bytes, ProtoValue::Bytes(b)) => write_length_delimited(buf, b),
        _ => return false,
    }
    true
}

fn mismatch(field: &str, expected: &str, actual: &ProtoValue) -> EncodeError {
    EncodeError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_scalar_canonical_only() {
        let mut buf = Vec::new();
        assert!(write_scalar(&mut buf, ScalarType::Int32, &ProtoValue::I32(-1)));
        assert_eq!(buf.len(), 10);

        let mut buf = Vec::new();
        assert!(!write_scalar(&mut buf, ScalarType::Uint32, &ProtoValue::I64(1)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_write_payload_coerces() {
        let mut buf = Vec::new();
        write_payload("f", FieldType::Scalar(ScalarType::Sint64), &ProtoValue::I32(-1), &mut buf).unwrap();
        assert_eq!(buf, vec![0x01]);

        let mut buf = Vec::new();
        write_payload("f", FieldType::Scalar(ScalarType::Fixed32), &ProtoValue::U64(1), &mut buf).unwrap();
        assert_eq!(buf, vec![1, 0, 0, 0]);

        let err = write_payload("f", FieldType::Scalar(ScalarType::Bool), &ProtoValue::I32(1), &mut buf);
        assert!(matches!(err, Err(EncodeError::TypeMismatch { .. })));
    }
}
