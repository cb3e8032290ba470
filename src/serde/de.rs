//! Serde deserializer reading Rust values out of dynamic messages.

use serde::de::value::{BorrowedStrDeserializer, SeqDeserializer, U32Deserializer};
use serde::de::{self, DeserializeSeed, Visitor};

use super::error::SerdeError;
use crate::message::DynamicMessage;
use crate::reflect::{Graph, NodeId};
use crate::types::FieldType;
use crate::value::ProtoValue;

/// Stands in for absent repeated and map fields.
static EMPTY_LIST: ProtoValue = ProtoValue::List(Vec::new());

/// Deserializer over one value of a message.
///
/// `field_type` is the declared type of the value (the element type for
/// lists and maps) and lets enum ids come out as value names.
pub(crate) struct ProtoDeserializer<'de> {
    value: &'de ProtoValue,
    graph: &'de Graph,
    field_type: Option<FieldType>,
}

impl<'de> ProtoDeserializer<'de> {
    pub(crate) fn new(value: &'de ProtoValue, graph: &'de Graph, field_type: Option<FieldType>) -> Self {
        ProtoDeserializer {
            value,
            graph,
            field_type,
        }
    }

    fn enum_name(&self, id: i32) -> Option<&'de str> {
        match self.field_type {
            Some(FieldType::Enum(e)) => self.graph.enum_name(e, id),
            _ => None,
        }
    }

    fn mismatch(&self, expected: &str) -> SerdeError {
        SerdeError::TypeMismatch {
            field: String::new(),
            expected: expected.into(),
            actual: self.value.type_name().into(),
        }
    }
}

/// Deserialize a whole message as a struct or map of its present fields.
pub(crate) fn deserialize_message<'de, T: de::Deserialize<'de>>(
    message: &'de DynamicMessage,
) -> Result<T, SerdeError> {
    T::deserialize(MessageDeserializer { message })
}

struct MessageDeserializer<'de> {
    message: &'de DynamicMessage,
}

impl<'de> de::Deserializer<'de> for MessageDeserializer<'de> {
    type Error = SerdeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(MessageAccess::new(self.message))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes
        byte_buf option unit unit_struct newtype_struct seq tuple tuple_struct
        map struct enum identifier ignored_any
    }
}

impl<'de> de::Deserializer<'de> for ProtoDeserializer<'de> {
    type Error = SerdeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Bool(v) => visitor.visit_bool(*v),
            ProtoValue::I32(v) => visitor.visit_i32(*v),
            ProtoValue::I64(v) => visitor.visit_i64(*v),
            ProtoValue::U32(v) => visitor.visit_u32(*v),
            ProtoValue::U64(v) => visitor.visit_u64(*v),
            ProtoValue::F32(v) => visitor.visit_f32(*v),
            ProtoValue::F64(v) => visitor.visit_f64(*v),
            ProtoValue::String(s) => visitor.visit_borrowed_str(s),
            ProtoValue::Bytes(b) => visitor.visit_borrowed_bytes(b),
            ProtoValue::Enum(id) => match self.enum_name(*id) {
                Some(name) => visitor.visit_borrowed_str(name),
                None => visitor.visit_i32(*id),
            },
            ProtoValue::Message(m) => visitor.visit_map(MessageAccess::new(m)),
            ProtoValue::List(_) => self.deserialize_seq(visitor),
            ProtoValue::Map(_) => self.deserialize_map(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        // absent fields never reach a deserializer
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::List(items) => visitor.visit_seq(ListAccess {
                iter: items.iter(),
                graph: self.graph,
                field_type: self.field_type,
            }),
            // Vec<u8> without serde_bytes
            ProtoValue::Bytes(b) => visitor.visit_seq(SeqDeserializer::<_, SerdeError>::new(b.iter().copied())),
            _ => Err(self.mismatch("list")),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Map(map) => visitor.visit_map(EntryAccess {
                iter: Box::new(map.entries()),
                graph: self.graph,
                key_type: FieldType::Scalar(map.key_type()),
                value_type: map.value_type(),
                pending: None,
            }),
            ProtoValue::Message(m) => visitor.visit_map(MessageAccess::new(m)),
            ProtoValue::List(items) if items.is_empty() => {
                visitor.visit_map(de::value::MapDeserializer::<_, SerdeError>::new(
                    std::iter::empty::<(u8, u8)>(),
                ))
            }
            _ => Err(self.mismatch("map")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Message(m) => visitor.visit_map(MessageAccess::new(m)),
            _ => Err(self.mismatch("message")),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.value {
            ProtoValue::Enum(id) => match self.enum_name(*id) {
                Some(name) => visitor.visit_enum(BorrowedStrDeserializer::<SerdeError>::new(name)),
                None => visitor.visit_enum(U32Deserializer::<SerdeError>::new(*id as u32)),
            },
            ProtoValue::String(s) => visitor.visit_enum(BorrowedStrDeserializer::<SerdeError>::new(s)),
            _ => Err(self.mismatch("enum")),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes
        byte_buf unit unit_struct identifier
    }
}

struct ListAccess<'de> {
    iter: std::slice::Iter<'de, ProtoValue>,
    graph: &'de Graph,
    field_type: Option<FieldType>,
}

impl<'de> de::SeqAccess<'de> for ListAccess<'de> {
    type Error = SerdeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        match self.iter.next() {
            Some(value) => seed
                .deserialize(ProtoDeserializer::new(value, self.graph, self.field_type))
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// Present fields of a message, keyed by field name. Absent repeated and map
/// fields show up empty; extensions are left out.
struct MessageAccess<'de> {
    message: &'de DynamicMessage,
    graph: &'de Graph,
    fields: std::slice::Iter<'de, NodeId>,
    pending: Option<(&'de ProtoValue, Option<FieldType>)>,
}

impl<'de> MessageAccess<'de> {
    fn new(message: &'de DynamicMessage) -> Self {
        let ty = message.message_type();
        let graph = ty.graph();
        MessageAccess {
            message,
            graph,
            fields: graph.message_fields(ty.id()).iter(),
            pending: None,
        }
    }
}

impl<'de> de::MapAccess<'de> for MessageAccess<'de> {
    type Error = SerdeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        for &fid in self.fields.by_ref() {
            let Some(field) = self.graph.field(fid) else {
                continue;
            };
            let value = match self.message.get_by_id(fid) {
                Some(value) => value,
                None if field.is_repeated() || field.is_map() => &EMPTY_LIST,
                None => continue,
            };
            self.pending = Some((value, field.resolved));
            let name = self.graph.node(fid).name.as_str();
            return seed
                .deserialize(BorrowedStrDeserializer::<SerdeError>::new(name))
                .map(Some);
        }
        Ok(None)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        let (value, field_type) = self.pending.take().ok_or_else(|| {
            SerdeError::Custom("next_value_seed called before next_key_seed".into())
        })?;
        seed.deserialize(ProtoDeserializer::new(value, self.graph, field_type))
    }
}

/// Entries of a map field.
struct EntryAccess<'de> {
    iter: Box<dyn Iterator<Item = (&'de ProtoValue, &'de ProtoValue)> + 'de>,
    graph: &'de Graph,
    key_type: FieldType,
    value_type: FieldType,
    pending: Option<&'de ProtoValue>,
}

impl<'de> de::MapAccess<'de> for EntryAccess<'de> {
    type Error = SerdeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        match self.iter.next() {
            Some((key, value)) => {
                self.pending = Some(value);
                seed.deserialize(ProtoDeserializer::new(key, self.graph, Some(self.key_type)))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        let value = self.pending.take().ok_or_else(|| {
            SerdeError::Custom("next_value_seed called before next_key_seed".into())
        })?;
        seed.deserialize(ProtoDeserializer::new(value, self.graph, Some(self.value_type)))
    }
}
