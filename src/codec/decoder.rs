use tracing::trace;

use crate::error::DecodeError;
use crate::message::{DynamicMessage, MessageType};
use crate::parser::ast::Rule;
use crate::reflect::NodeId;
use crate::types::{FieldType, ScalarType};
use crate::value::ProtoValue;

use super::wire::*;

/// Decode a message of type `ty` from protobuf binary data.
///
/// Unknown fields are skipped. Repeated scalar fields are accepted both packed
/// and unpacked. If required fields are missing the partially decoded message
/// is returned inside [`DecodeError::MissingRequired`].
pub fn decode(ty: &MessageType, data: &[u8]) -> Result<DynamicMessage, DecodeError> {
    let mut reader = Reader::new(data);
    let mut missing = Vec::new();
    let message = decode_message(ty, &mut reader, None, 0, &mut missing)?;
    if missing.is_empty() {
        Ok(message)
    } else {
        Err(DecodeError::MissingRequired {
            missing,
            decoded: Box::new(message),
            consumed: None,
        })
    }
}

/// Decode a varint length-prefixed message.
///
/// Returns `Ok(None)` when `data` holds less than a whole message, otherwise
/// the message and the number of bytes consumed (prefix included). A
/// [`DecodeError::MissingRequired`] carries that count as well.
pub fn decode_delimited(
    ty: &MessageType,
    data: &[u8],
) -> Result<Option<(DynamicMessage, usize)>, DecodeError> {
    let mut reader = Reader::new(data);
    let len = match reader.read_varint() {
        Ok(len) => len,
        Err(DecodeError::Truncated { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    let len = usize::try_from(len)
        .map_err(|_| DecodeError::InvalidData(format!("length {len} too large")))?;
    if reader.remaining() < len {
        return Ok(None);
    }
    let start = reader.position();
    let body = reader.read_bytes(len)?;
    let consumed = start + len;
    let message = decode(ty, body).map_err(|err| match err {
        DecodeError::MissingRequired {
            missing, decoded, ..
        } => DecodeError::MissingRequired {
            missing,
            decoded,
            consumed: Some(consumed),
        },
        other => other,
    })?;
    Ok(Some((message, consumed)))
}

/// Decode fields until the reader is exhausted, or until the end tag of group
/// `end_group` when decoding a group. `depth` counts the enclosing messages.
fn decode_message(
    ty: &MessageType,
    reader: &mut Reader<'_>,
    end_group: Option<u32>,
    depth: usize,
    missing: &mut Vec<String>,
) -> Result<DynamicMessage, DecodeError> {
    if depth > RECURSION_LIMIT {
        return Err(recursion_limit_exceeded());
    }
    let graph = ty.graph();
    let mut message = DynamicMessage::empty(ty.clone());

    loop {
        if reader.is_empty() {
            if let Some(id) = end_group {
                return Err(DecodeError::InvalidData(format!(
                    "missing end group tag for field {id}"
                )));
            }
            break;
        }
        let (id, wire_type) = reader.read_key()?;
        if wire_type == WireType::EndGroup {
            if end_group == Some(id) {
                break;
            }
            return Err(DecodeError::InvalidData(format!(
                "unexpected end group tag {id}"
            )));
        }
        match graph.field_by_id(ty.id(), id) {
            Some(fid) => {
                let slot = Slot { ty, fid, depth };
                slot.decode_field(&mut message, id, wire_type, reader, missing)?;
            }
            None => {
                trace!(message = %ty.fqn(), id, ?wire_type, "skipping unknown field");
                reader.skip_at_depth(id, wire_type, depth)?;
            }
        }
    }

    for &fid in graph.message_fields(ty.id()) {
        let required = graph.field(fid).is_some_and(|f| f.is_required());
        if required && message.get_by_id(fid).is_none() {
            missing.push(graph.fqn(fid));
        }
    }
    message.populate_defaults();
    Ok(message)
}

/// Value of a map entry whose value half was absent on the wire.
fn default_entry_value(ty: &MessageType, field_type: FieldType) -> ProtoValue {
    match field_type {
        FieldType::Message(id) | FieldType::Group(id) => {
            ProtoValue::Message(DynamicMessage::new(ty.for_node(id)))
        }
        other => ty
            .graph()
            .zero_value(other)
            .unwrap_or(ProtoValue::Bytes(Vec::new())),
    }
}

/// The field being decoded, for reading values and labelling errors.
struct Slot<'a> {
    ty: &'a MessageType,
    fid: NodeId,
    depth: usize,
}

impl Slot<'_> {
    fn decode_field(
        &self,
        message: &mut DynamicMessage,
        id: u32,
        wire_type: WireType,
        reader: &mut Reader<'_>,
        missing: &mut Vec<String>,
    ) -> Result<(), DecodeError> {
        let (ty, fid) = (self.ty, self.fid);
        let graph = ty.graph();
        let Some(field) = graph.field(fid) else {
            return reader.skip_at_depth(id, wire_type, self.depth);
        };
        let field_type = field.resolved.ok_or_else(|| {
            DecodeError::InvalidData(format!("field '{}' has no resolved type", graph.field_label(fid)))
        })?;

        match field.rule {
            Rule::Map => {
                self.expect(WireType::LengthDelimited, wire_type)?;
                let key_type = field.key_type.ok_or_else(|| {
                    DecodeError::InvalidData(format!("map field '{}' has no key type", graph.field_label(fid)))
                })?;
                let mut entry = Reader::new(reader.read_length_delimited()?);
                let mut key = None;
                let mut value = None;
                while !entry.is_empty() {
                    let (entry_id, entry_type) = entry.read_key()?;
                    match entry_id {
                        1 => {
                            let key_field = FieldType::Scalar(key_type);
                            key = Some(self.read_single(key_field, 1, entry_type, &mut entry, missing)?);
                        }
                        2 => value = Some(self.read_single(field_type, 2, entry_type, &mut entry, missing)?),
                        _ => entry.skip_at_depth(entry_id, entry_type, self.depth + 1)?,
                    }
                }
                let key = key.unwrap_or_else(|| key_type.zero_value());
                let value = match value {
                    Some(value) => value,
                    None => default_entry_value(ty, field_type),
                };
                message.insert_map_entry(fid, key_type, field_type, key, value);
            }
            Rule::Repeated if wire_type == WireType::LengthDelimited && field_type.is_packable() => {
                let mut packed = Reader::new(reader.read_length_delimited()?);
                while !packed.is_empty() {
                    let value = self.read_payload(field_type, &mut packed)?;
                    message.push_by_id(fid, value);
                }
            }
            Rule::Repeated => {
                let value = self.read_single(field_type, id, wire_type, reader, missing)?;
                message.push_by_id(fid, value);
            }
            _ => {
                let value = self.read_single(field_type, id, wire_type, reader, missing)?;
                message.set_by_id(fid, value);
            }
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.ty.graph().field_label(self.fid)
    }

    fn expect(&self, expected: WireType, actual: WireType) -> Result<(), DecodeError> {
        if expected == actual {
            Ok(())
        } else {
            Err(DecodeError::WireTypeMismatch {
                field: self.label(),
                expected,
                actual,
            })
        }
    }

    /// Read one keyed value whose key has already been consumed.
    fn read_single(
        &self,
        field_type: FieldType,
        id: u32,
        wire_type: WireType,
        reader: &mut Reader<'_>,
        missing: &mut Vec<String>,
    ) -> Result<ProtoValue, DecodeError> {
        match field_type {
            FieldType::Message(mid) => {
                self.expect(WireType::LengthDelimited, wire_type)?;
                let mut nested = Reader::new(reader.read_length_delimited()?);
                let message = decode_message(&self.ty.for_node(mid), &mut nested, None, self.depth + 1, missing)?;
                Ok(ProtoValue::Message(message))
            }
            FieldType::Group(mid) => {
                self.expect(WireType::StartGroup, wire_type)?;
                let message = decode_message(&self.ty.for_node(mid), reader, Some(id), self.depth + 1, missing)?;
                Ok(ProtoValue::Message(message))
            }
            _ => {
                self.expect(field_type.wire_type(), wire_type)?;
                self.read_payload(field_type, reader)
            }
        }
    }

    /// Read the unkeyed payload of a scalar or enum value.
    fn read_payload(&self, field_type: FieldType, reader: &mut Reader<'_>) -> Result<ProtoValue, DecodeError> {
        match field_type {
            FieldType::Enum(_) => Ok(ProtoValue::Enum(reader.read_varint()? as i32)),
            FieldType::Scalar(s) => self.read_scalar(s, reader),
            FieldType::Message(_) | FieldType::Group(_) => Err(DecodeError::InvalidData(format!(
                "field '{}' is not a scalar",
                self.label()
            ))),
        }
    }

    fn read_scalar(&self, ty: ScalarType, reader: &mut Reader<'_>) -> Result<ProtoValue, DecodeError> {
        let value = match ty {
            ScalarType::Int32 => ProtoValue::I32(reader.read_varint()? as i32),
            ScalarType::Int64 => ProtoValue::I64(reader.read_varint()? as i64),
            ScalarType::Uint32 => ProtoValue::U32(reader.read_varint()? as u32),
            ScalarType::Uint64 => ProtoValue::U64(reader.read_varint()?),
            ScalarType::Sint32 => ProtoValue::I32(zigzag_decode32(reader.read_varint()? as u32)),
            ScalarType::Sint64 => ProtoValue::I64(zigzag_decode64(reader.read_varint()?)),
            ScalarType::Fixed32 => ProtoValue::U32(reader.read_fixed32()?),
            ScalarType::Fixed64 => ProtoValue::U64(reader.read_fixed64()?),
            ScalarType::Sfixed32 => ProtoValue::I32(reader.read_fixed32()? as i32),
            ScalarType::Sfixed64 => ProtoValue::I64(reader.read_fixed64()? as i64),
            ScalarType::Float => ProtoValue::F32(f32::from_bits(reader.read_fixed32()?)),
            ScalarType::Double => ProtoValue::F64(f64::from_bits(reader.read_fixed64()?)),
            ScalarType::Bool => ProtoValue::Bool(reader.read_varint()? != 0),
            ScalarType::String => {
                let bytes = reader.read_length_delimited()?.to_vec();
                let s = String::from_utf8(bytes).map_err(|source| DecodeError::InvalidUtf8 {
                    field: self.label(),
                    source,
                })?;
                ProtoValue::String(s)
            }
            ScalarType::Bytes => ProtoValue::Bytes(reader.read_length_delimited()?.to_vec()),
        };
        Ok(value)
    }
}
