use std::fmt;

use crate::map::ProtoMap;
use crate::message::DynamicMessage;
use crate::types::ScalarType;

/// Dynamic value of a message field.
///
/// Each scalar type has one canonical variant (e.g. `sint32` and `sfixed32`
/// are stored as `I32`, `fixed64` as `U64`). Message setters coerce other
/// variants into the canonical one when the conversion is lossless.
#[derive(Debug, Clone)]
pub enum ProtoValue {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Enum value id.
    Enum(i32),
    Message(DynamicMessage),
    /// Elements of a repeated field.
    List(Vec<ProtoValue>),
    Map(ProtoMap),
}

impl ProtoValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ProtoValue::Bool(_) => "bool",
            ProtoValue::I32(_) => "i32",
            ProtoValue::I64(_) => "i64",
            ProtoValue::U32(_) => "u32",
            ProtoValue::U64(_) => "u64",
            ProtoValue::F32(_) => "f32",
            ProtoValue::F64(_) => "f64",
            ProtoValue::String(_) => "string",
            ProtoValue::Bytes(_) => "bytes",
            ProtoValue::Enum(_) => "enum",
            ProtoValue::Message(_) => "message",
            ProtoValue::List(_) => "list",
            ProtoValue::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ProtoValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Any integer variant that fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|v| i64::try_from(v).ok())
    }

    /// Any integer variant that fits in a `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_integer().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ProtoValue::F32(v) => Some(*v as f64),
            ProtoValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ProtoValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ProtoValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<i32> {
        match self {
            ProtoValue::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            ProtoValue::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut DynamicMessage> {
        match self {
            ProtoValue::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ProtoValue]> {
        match self {
            ProtoValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ProtoMap> {
        match self {
            ProtoValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ProtoMap> {
        match self {
            ProtoValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn as_integer(&self) -> Option<i128> {
        match self {
            ProtoValue::I32(v) | ProtoValue::Enum(v) => Some(*v as i128),
            ProtoValue::I64(v) => Some(*v as i128),
            ProtoValue::U32(v) => Some(*v as i128),
            ProtoValue::U64(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// An empty list or map, which is indistinguishable from an absent field.
    pub(crate) fn is_empty_collection(&self) -> bool {
        match self {
            ProtoValue::List(items) => items.is_empty(),
            ProtoValue::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Whether this is the proto3 zero value of its variant.
    pub(crate) fn is_zero(&self) -> bool {
        match self {
            ProtoValue::Bool(v) => !*v,
            ProtoValue::I32(v) | ProtoValue::Enum(v) => *v == 0,
            ProtoValue::I64(v) => *v == 0,
            ProtoValue::U32(v) => *v == 0,
            ProtoValue::U64(v) => *v == 0,
            ProtoValue::F32(v) => v.to_bits() == 0,
            ProtoValue::F64(v) => v.to_bits() == 0,
            ProtoValue::String(s) => s.is_empty(),
            ProtoValue::Bytes(b) => b.is_empty(),
            ProtoValue::Message(_) | ProtoValue::List(_) | ProtoValue::Map(_) => false,
        }
    }
}

/// Convert `value` into the canonical representation of scalar type `ty`.
///
/// Integers convert between widths when the value fits, integers widen to
/// floating point, `f64` narrows to `f32`, and strings are accepted for bytes.
pub(crate) fn coerce_scalar(ty: ScalarType, value: ProtoValue) -> Result<ProtoValue, String> {
    let mismatch = |value: &ProtoValue| format!("expected {ty}, got {}", value.type_name());
    let out_of_range = |v: i128| format!("{v} is out of range for {ty}");

    let coerced = match ty {
        ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => {
            let v = value.as_integer().ok_or_else(|| mismatch(&value))?;
            ProtoValue::I32(i32::try_from(v).map_err(|_| out_of_range(v))?)
        }
        ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => {
            let v = value.as_integer().ok_or_else(|| mismatch(&value))?;
            ProtoValue::I64(i64::try_from(v).map_err(|_| out_of_range(v))?)
        }
        ScalarType::Uint32 | ScalarType::Fixed32 => {
            let v = value.as_integer().ok_or_else(|| mismatch(&value))?;
            ProtoValue::U32(u32::try_from(v).map_err(|_| out_of_range(v))?)
        }
        ScalarType::Uint64 | ScalarType::Fixed64 => {
            let v = value.as_integer().ok_or_else(|| mismatch(&value))?;
            ProtoValue::U64(u64::try_from(v).map_err(|_| out_of_range(v))?)
        }
        ScalarType::Float => match value {
            ProtoValue::F32(v) => ProtoValue::F32(v),
            ProtoValue::F64(v) => ProtoValue::F32(v as f32),
            ref other => match other.as_integer() {
                Some(v) => ProtoValue::F32(v as f32),
                None => return Err(mismatch(other)),
            },
        },
        ScalarType::Double => match value {
            ProtoValue::F64(v) => ProtoValue::F64(v),
            ProtoValue::F32(v) => ProtoValue::F64(v as f64),
            ref other => match other.as_integer() {
                Some(v) => ProtoValue::F64(v as f64),
                None => return Err(mismatch(other)),
            },
        },
        ScalarType::Bool => match value {
            ProtoValue::Bool(v) => ProtoValue::Bool(v),
            other => return Err(mismatch(&other)),
        },
        ScalarType::String => match value {
            ProtoValue::String(s) => ProtoValue::String(s),
            other => return Err(mismatch(&other)),
        },
        ScalarType::Bytes => match value {
            ProtoValue::Bytes(b) => ProtoValue::Bytes(b),
            ProtoValue::String(s) => ProtoValue::Bytes(s.into_bytes()),
            other => return Err(mismatch(&other)),
        },
    };
    Ok(coerced)
}

impl PartialEq for ProtoValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ProtoValue::Bool(a), ProtoValue::Bool(b)) => a == b,
            (ProtoValue::I32(a), ProtoValue::I32(b)) => a == b,
            (ProtoValue::I64(a), ProtoValue::I64(b)) => a == b,
            (ProtoValue::U32(a), ProtoValue::U32(b)) => a == b,
            (ProtoValue::U64(a), ProtoValue::U64(b)) => a == b,
            (ProtoValue::F32(a), ProtoValue::F32(b)) => a.to_bits() == b.to_bits(),
            (ProtoValue::F64(a), ProtoValue::F64(b)) => a.to_bits() == b.to_bits(),
            (ProtoValue::String(a), ProtoValue::String(b)) => a == b,
            (ProtoValue::Bytes(a), ProtoValue::Bytes(b)) => a == b,
            (ProtoValue::Enum(a), ProtoValue::Enum(b)) => a == b,
            (ProtoValue::Message(a), ProtoValue::Message(b)) => a == b,
            (ProtoValue::List(a), ProtoValue::List(b)) => a == b,
            (ProtoValue::Map(a), ProtoValue::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ProtoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoValue::Bool(v) => write!(f, "{v}"),
            ProtoValue::I32(v) | ProtoValue::Enum(v) => write!(f, "{v}"),
            ProtoValue::I64(v) => write!(f, "{v}"),
            ProtoValue::U32(v) => write!(f, "{v}"),
            ProtoValue::U64(v) => write!(f, "{v}"),
            ProtoValue::F32(v) => write!(f, "{v}"),
            ProtoValue::F64(v) => write!(f, "{v}"),
            ProtoValue::String(s) => write!(f, "{s:?}"),
            ProtoValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            ProtoValue::Message(m) => write!(f, "{m}"),
            ProtoValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ProtoValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.entries().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// Convenience conversions

impl From<bool> for ProtoValue {
    fn from(v: bool) -> Self {
        ProtoValue::Bool(v)
    }
}

impl From<i32> for ProtoValue {
    fn from(v: i32) -> Self {
        ProtoValue::I32(v)
    }
}

impl From<i64> for ProtoValue {
    fn from(v: i64) -> Self {
        ProtoValue::I64(v)
    }
}

impl From<u32> for ProtoValue {
    fn from(v: u32) -> Self {
        ProtoValue::U32(v)
    }
}

impl From<u64> for ProtoValue {
    fn from(v: u64) -> Self {
        ProtoValue::U64(v)
    }
}

impl From<f32> for ProtoValue {
    fn from(v: f32) -> Self {
        ProtoValue::F32(v)
    }
}

impl From<f64> for ProtoValue {
    fn from(v: f64) -> Self {
        ProtoValue::F64(v)
    }
}

impl From<&str> for ProtoValue {
    fn from(v: &str) -> Self {
        ProtoValue::String(v.to_string())
    }
}

impl From<String> for ProtoValue {
    fn from(v: String) -> Self {
        ProtoValue::String(v)
    }
}

impl From<Vec<u8>> for ProtoValue {
    fn from(v: Vec<u8>) -> Self {
        ProtoValue::Bytes(v)
    }
}

impl From<&[u8]> for ProtoValue {
    fn from(v: &[u8]) -> Self {
        ProtoValue::Bytes(v.to_vec())
    }
}

impl From<DynamicMessage> for ProtoValue {
    fn from(v: DynamicMessage) -> Self {
        ProtoValue::Message(v)
    }
}

impl From<ProtoMap> for ProtoValue {
    fn from(v: ProtoMap) -> Self {
        ProtoValue::Map(v)
    }
}

impl From<Vec<ProtoValue>> for ProtoValue {
    fn from(v: Vec<ProtoValue>) -> Self {
        ProtoValue::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integers() {
        assert_eq!(
            coerce_scalar(ScalarType::Int32, ProtoValue::I64(-5)).unwrap(),
            ProtoValue::I32(-5)
        );
        assert_eq!(
            coerce_scalar(ScalarType::Fixed64, ProtoValue::I32(7)).unwrap(),
            ProtoValue::U64(7)
        );
        assert!(coerce_scalar(ScalarType::Uint32, ProtoValue::I32(-1)).is_err());
        assert!(coerce_scalar(ScalarType::Int32, ProtoValue::I64(1 << 40)).is_err());
        assert!(coerce_scalar(ScalarType::Int64, ProtoValue::U64(u64::MAX)).is_err());
    }

    #[test]
    fn test_coerce_floats_and_strings() {
        assert_eq!(
            coerce_scalar(ScalarType::Double, ProtoValue::I32(3)).unwrap(),
            ProtoValue::F64(3.0)
        );
        assert_eq!(
            coerce_scalar(ScalarType::Float, ProtoValue::F64(1.5)).unwrap(),
            ProtoValue::F32(1.5)
        );
        assert_eq!(
            coerce_scalar(ScalarType::Bytes, "ab".into()).unwrap(),
            ProtoValue::Bytes(b"ab".to_vec())
        );
        assert!(coerce_scalar(ScalarType::String, ProtoValue::I32(1)).is_err());
        assert!(coerce_scalar(ScalarType::Bool, ProtoValue::I32(1)).is_err());
        assert!(coerce_scalar(ScalarType::Int32, ProtoValue::F64(1.0)).is_err());
    }

    #[test]
    fn test_float_equality_by_bits() {
        assert_eq!(ProtoValue::F64(f64::NAN), ProtoValue::F64(f64::NAN));
        assert_ne!(ProtoValue::F64(0.0), ProtoValue::F64(-0.0));
        assert_ne!(ProtoValue::I32(1), ProtoValue::I64(1));
    }

    #[test]
    fn test_zero_values() {
        assert!(ProtoValue::F64(0.0).is_zero());
        assert!(!ProtoValue::F64(-0.0).is_zero());
        assert!(ProtoValue::String(String::new()).is_zero());
        assert!(!ProtoValue::List(Vec::new()).is_zero());
    }

    #[test]
    fn test_display() {
        let v = ProtoValue::List(vec![1.into(), 2.into(), 3.into()]);
        assert_eq!(v.to_string(), "[1, 2, 3]");
        assert_eq!(ProtoValue::from("hi").to_string(), "\"hi\"");
    }
}
