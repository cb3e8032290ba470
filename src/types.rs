//! Scalar and field types shared by the type graph and the wire codec.

use crate::codec::wire::WireType;
use crate::reflect::NodeId;
use crate::value::ProtoValue;

/// Smallest legal field id.
pub const ID_MIN: u32 = 1;
/// Largest legal field id (2^29 - 1).
pub const ID_MAX: u32 = 0x1FFF_FFFF;
/// First id of the band reserved for the protobuf implementation.
pub const RESERVED_ID_START: u32 = 19_000;
/// Last id of the reserved band.
pub const RESERVED_ID_END: u32 = 19_999;

/// The fifteen protobuf scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    /// Look up a scalar type by its `.proto` keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "double" => ScalarType::Double,
            "float" => ScalarType::Float,
            "int32" => ScalarType::Int32,
            "int64" => ScalarType::Int64,
            "uint32" => ScalarType::Uint32,
            "uint64" => ScalarType::Uint64,
            "sint32" => ScalarType::Sint32,
            "sint64" => ScalarType::Sint64,
            "fixed32" => ScalarType::Fixed32,
            "fixed64" => ScalarType::Fixed64,
            "sfixed32" => ScalarType::Sfixed32,
            "sfixed64" => ScalarType::Sfixed64,
            "bool" => ScalarType::Bool,
            "string" => ScalarType::String,
            "bytes" => ScalarType::Bytes,
            _ => return None,
        };
        Some(ty)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }

    /// Wire type used for a single (unpacked) value of this type.
    pub fn wire_type(self) -> WireType {
        match self {
            ScalarType::Int32
            | ScalarType::Int64
            | ScalarType::Uint32
            | ScalarType::Uint64
            | ScalarType::Sint32
            | ScalarType::Sint64
            | ScalarType::Bool => WireType::Varint,
            ScalarType::Fixed64 | ScalarType::Sfixed64 | ScalarType::Double => WireType::Fixed64,
            ScalarType::Fixed32 | ScalarType::Sfixed32 | ScalarType::Float => WireType::Fixed32,
            ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
        }
    }

    /// Whether repeated fields of this type may use packed encoding.
    pub fn is_packable(self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }

    /// Whether this type may be used as a map key.
    pub fn is_valid_map_key(self) -> bool {
        !matches!(
            self,
            ScalarType::Double | ScalarType::Float | ScalarType::Bytes
        )
    }

    /// The proto3 zero value, in the canonical representation for this type.
    pub fn zero_value(self) -> ProtoValue {
        match self {
            ScalarType::Double => ProtoValue::F64(0.0),
            ScalarType::Float => ProtoValue::F32(0.0),
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => ProtoValue::I32(0),
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => ProtoValue::I64(0),
            ScalarType::Uint32 | ScalarType::Fixed32 => ProtoValue::U32(0),
            ScalarType::Uint64 | ScalarType::Fixed64 => ProtoValue::U64(0),
            ScalarType::Bool => ProtoValue::Bool(false),
            ScalarType::String => ProtoValue::String(String::new()),
            ScalarType::Bytes => ProtoValue::Bytes(Vec::new()),
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    Enum(NodeId),
    Message(NodeId),
    /// A proto2 group: a message framed by start/end group tags.
    Group(NodeId),
}

impl FieldType {
    pub fn wire_type(self) -> WireType {
        match self {
            FieldType::Scalar(s) => s.wire_type(),
            FieldType::Enum(_) => WireType::Varint,
            FieldType::Message(_) => WireType::LengthDelimited,
            FieldType::Group(_) => WireType::StartGroup,
        }
    }

    pub fn is_packable(self) -> bool {
        match self {
            FieldType::Scalar(s) => s.is_packable(),
            FieldType::Enum(_) => true,
            FieldType::Message(_) | FieldType::Group(_) => false,
        }
    }

    pub fn is_message(self) -> bool {
        matches!(self, FieldType::Message(_) | FieldType::Group(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_names_round_trip() {
        for name in [
            "double", "float", "int32", "int64", "uint32", "uint64", "sint32", "sint64",
            "fixed32", "fixed64", "sfixed32", "sfixed64", "bool", "string", "bytes",
        ] {
            assert_eq!(ScalarType::from_name(name).unwrap().name(), name);
        }
        assert!(ScalarType::from_name("int").is_none());
    }

    #[test]
    fn test_wire_types() {
        assert_eq!(ScalarType::Sint64.wire_type(), WireType::Varint);
        assert_eq!(ScalarType::Double.wire_type(), WireType::Fixed64);
        assert_eq!(ScalarType::Sfixed32.wire_type(), WireType::Fixed32);
        assert_eq!(ScalarType::Bytes.wire_type(), WireType::LengthDelimited);
    }

    #[test]
    fn test_map_keys() {
        assert!(ScalarType::String.is_valid_map_key());
        assert!(ScalarType::Sfixed64.is_valid_map_key());
        assert!(!ScalarType::Float.is_valid_map_key());
        assert!(!ScalarType::Bytes.is_valid_map_key());
    }
}
