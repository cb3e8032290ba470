//! Serde integration: typed Rust structs to and from dynamic messages.
//!
//! Struct fields are matched to message fields by name; fields the message
//! does not declare are ignored and `None` leaves a field unset. Unit enum
//! variants map to enum value names. Extensions are not visited.
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: i32,
//! }
//!
//! let builder = protodyn::load_proto(r#"
//!     syntax = "proto3";
//!     message Person {
//!         string name = 1;
//!         int32 age = 2;
//!     }
//! "#).unwrap();
//! let person_type = builder.message_type("Person").unwrap();
//!
//! let person = Person { name: "Alice".into(), age: 30 };
//! let bytes = protodyn::serde::to_bytes(&person_type, &person).unwrap();
//! let decoded: Person = protodyn::serde::from_bytes(&person_type, &bytes).unwrap();
//! assert_eq!(person, decoded);
//! ```

mod de;
mod error;
mod ser;

pub use error::SerdeError;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::map::ProtoMap;
use crate::message::{DynamicMessage, MessageType};
use crate::parser::ast::Rule;
use crate::reflect::Field;
use crate::types::FieldType;
use crate::value::ProtoValue;
use ser::{Loose, LooseSerializer};

/// Build a message of type `ty` from a serializable value.
pub fn to_message<T: ?Sized + Serialize>(
    ty: &MessageType,
    value: &T,
) -> Result<DynamicMessage, SerdeError> {
    match LooseSerializer::serialize(value)? {
        Loose::Struct(fields) => build_message(ty, fields),
        Loose::Map(entries) => build_message(ty, named_entries(entries)?),
        other => Err(mismatch(&ty.fqn(), "struct", &other)),
    }
}

/// Serialize a value straight to protobuf binary format.
pub fn to_bytes<T: ?Sized + Serialize>(ty: &MessageType, value: &T) -> Result<Vec<u8>, SerdeError> {
    Ok(to_message(ty, value)?.encode()?)
}

/// Deserialize a Rust value from a message. Strings and bytes are borrowed
/// from the message where the target type allows it.
pub fn from_message<'de, T: Deserialize<'de>>(message: &'de DynamicMessage) -> Result<T, SerdeError> {
    de::deserialize_message(message)
}

/// Decode protobuf binary data as `ty` and deserialize the result.
pub fn from_bytes<T: DeserializeOwned>(ty: &MessageType, data: &[u8]) -> Result<T, SerdeError> {
    let message = ty.decode(data)?;
    from_message(&message)
}

fn build_message(ty: &MessageType, fields: Vec<(String, Loose)>) -> Result<DynamicMessage, SerdeError> {
    let mut message = ty.new_message();
    for (name, value) in fields {
        if value == Loose::Absent {
            continue;
        }
        let Some(field) = ty.field(&name) else {
            continue;
        };
        let value = field_value(ty, &name, field, value)?;
        message.set(&name, value)?;
    }
    Ok(message)
}

fn named_entries(entries: Vec<(Loose, Loose)>) -> Result<Vec<(String, Loose)>, SerdeError> {
    entries
        .into_iter()
        .map(|(key, value)| match key {
            Loose::Str(name) => Ok((name, value)),
            other => Err(SerdeError::UnsupportedType(format!(
                "message field names must be strings, got {}",
                other.kind()
            ))),
        })
        .collect()
}

fn field_value(ty: &MessageType, name: &str, field: &Field, value: Loose) -> Result<ProtoValue, SerdeError> {
    let field_type = field
        .resolved
        .ok_or_else(|| SerdeError::Custom(format!("field '{name}' has no resolved type")))?;
    match (field.rule, value) {
        (Rule::Repeated, Loose::Seq(items)) => items
            .into_iter()
            .map(|item| element(ty, name, field_type, item))
            .collect::<Result<Vec<_>, _>>()
            .map(ProtoValue::List),
        (Rule::Map, Loose::Map(entries)) => {
            let key_type = field
                .key_type
                .ok_or_else(|| SerdeError::Custom(format!("map field '{name}' has no key type")))?;
            let mut map = ProtoMap::new(key_type, field_type);
            for (key, value) in entries {
                let key = element(ty, name, FieldType::Scalar(key_type), key)?;
                map.set(key, element(ty, name, field_type, value)?)?;
            }
            Ok(ProtoValue::Map(map))
        }
        (Rule::Repeated, other) => Err(mismatch(name, "sequence", &other)),
        (Rule::Map, other) => Err(mismatch(name, "map", &other)),
        (_, value) => element(ty, name, field_type, value),
    }
}

/// Convert a single value. Scalars are passed through loosely and checked
/// by the message setter.
fn element(ty: &MessageType, name: &str, field_type: FieldType, value: Loose) -> Result<ProtoValue, SerdeError> {
    let value = match (field_type, value) {
        (FieldType::Message(id) | FieldType::Group(id), Loose::Struct(fields)) => {
            ProtoValue::Message(build_message(&ty.for_node(id), fields)?)
        }
        (FieldType::Message(id) | FieldType::Group(id), Loose::Map(entries)) => {
            ProtoValue::Message(build_message(&ty.for_node(id), named_entries(entries)?)?)
        }
        (FieldType::Enum(e), Loose::Str(variant)) => {
            let id = ty
                .graph()
                .enum_value_by_name(e, &variant)
                .ok_or_else(|| SerdeError::TypeMismatch {
                    field: name.to_string(),
                    expected: format!("a value of {}", ty.graph().fqn(e)),
                    actual: variant.clone(),
                })?;
            ProtoValue::Enum(id)
        }
        (_, Loose::Bool(v)) => ProtoValue::Bool(v),
        (_, Loose::Int(v)) => ProtoValue::I64(v),
        (_, Loose::Uint(v)) => ProtoValue::U64(v),
        (_, Loose::Float(v)) => ProtoValue::F64(v),
        (_, Loose::Str(s)) => ProtoValue::String(s),
        (_, Loose::Bytes(b)) => ProtoValue::Bytes(b),
        (_, other) => return Err(mismatch(name, "scalar", &other)),
    };
    Ok(value)
}

fn mismatch(field: &str, expected: &str, actual: &Loose) -> SerdeError {
    SerdeError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}
