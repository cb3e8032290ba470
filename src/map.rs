//! Container for `map<K, V>` fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ValueError;
use crate::message::verify_element;
use crate::reflect::Graph;
use crate::types::{FieldType, ScalarType};
use crate::value::{coerce_scalar, ProtoValue};

/// Contents of a map field.
///
/// Keys are stored under a canonical string form (`"42"`, `"true"`, the string
/// itself), so `I64(1)` and `I32(1)` address the same entry of an `int32`-keyed
/// map. Keys and values are verified against the declared types on insertion.
/// Iteration (and therefore encoding) follows the order of the canonical keys.
///
/// A map obtained from a message knows its schema and verifies enum and
/// message values like a field setter does. A map made with [`ProtoMap::new`]
/// only takes enum ids, and is verified in full when it is set on a message.
#[derive(Clone)]
pub struct ProtoMap {
    key_type: ScalarType,
    value_type: FieldType,
    graph: Option<Arc<Graph>>,
    entries: BTreeMap<String, (ProtoValue, ProtoValue)>,
}

impl ProtoMap {
    pub fn new(key_type: ScalarType, value_type: FieldType) -> Self {
        ProtoMap {
            key_type,
            value_type,
            graph: None,
            entries: BTreeMap::new(),
        }
    }

    /// An empty map whose values are checked against `graph`.
    pub(crate) fn with_graph(key_type: ScalarType, value_type: FieldType, graph: Arc<Graph>) -> Self {
        ProtoMap {
            graph: Some(graph),
            ..ProtoMap::new(key_type, value_type)
        }
    }

    /// Re-verify every value against `graph` and keep checking against it.
    pub(crate) fn bind(mut self, graph: &Arc<Graph>) -> Result<Self, String> {
        let value_type = self.value_type;
        for (_, value) in self.entries.values_mut() {
            let taken = std::mem::replace(value, ProtoValue::Bool(false));
            *value = verify_element(graph, value_type, taken)?;
        }
        self.graph = Some(Arc::clone(graph));
        Ok(self)
    }

    pub fn key_type(&self) -> ScalarType {
        self.key_type
    }

    pub fn value_type(&self) -> FieldType {
        self.value_type
    }

    /// Insert or replace an entry.
    pub fn set(
        &mut self,
        key: impl Into<ProtoValue>,
        value: impl Into<ProtoValue>,
    ) -> Result<&mut Self, ValueError> {
        let key = coerce_scalar(self.key_type, key.into()).map_err(|reason| illegal("key", reason))?;
        let value = self
            .verify_value(value.into())
            .map_err(|reason| illegal("value", reason))?;
        self.entries.insert(canonical_key(&key), (key, value));
        Ok(self)
    }

    pub fn get(&self, key: impl Into<ProtoValue>) -> Option<&ProtoValue> {
        let key = self.lookup_key(key.into())?;
        self.entries.get(&key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: impl Into<ProtoValue>) -> Option<&mut ProtoValue> {
        let key = self.lookup_key(key.into())?;
        self.entries.get_mut(&key).map(|(_, v)| v)
    }

    pub fn has(&self, key: impl Into<ProtoValue>) -> bool {
        self.get(key).is_some()
    }

    /// Remove an entry, returning its value if it was present.
    pub fn delete(&mut self, key: impl Into<ProtoValue>) -> Option<ProtoValue> {
        let key = self.lookup_key(key.into())?;
        self.entries.remove(&key).map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ProtoValue> {
        self.entries.values().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &ProtoValue> {
        self.entries.values().map(|(_, v)| v)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ProtoValue, &ProtoValue)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    /// Insert an entry read off the wire; both halves are already typed.
    pub(crate) fn insert_decoded(&mut self, key: ProtoValue, value: ProtoValue) {
        self.entries.insert(canonical_key(&key), (key, value));
    }

    fn lookup_key(&self, key: ProtoValue) -> Option<String> {
        coerce_scalar(self.key_type, key)
            .ok()
            .map(|k| canonical_key(&k))
    }

    fn verify_value(&self, value: ProtoValue) -> Result<ProtoValue, String> {
        if let Some(graph) = &self.graph {
            return verify_element(graph, self.value_type, value);
        }
        match self.value_type {
            FieldType::Scalar(s) => coerce_scalar(s, value),
            FieldType::Enum(_) => match value.as_integer() {
                Some(v) => i32::try_from(v)
                    .map(ProtoValue::Enum)
                    .map_err(|_| format!("{v} is out of range for an enum")),
                None => Err(format!("expected enum, got {}", value.type_name())),
            },
            FieldType::Message(id) | FieldType::Group(id) => match value {
                ProtoValue::Message(m) if m.message_type().id() == id => Ok(ProtoValue::Message(m)),
                ProtoValue::Message(m) => Err(format!(
                    "expected message '{}', got '{}'",
                    m.message_type().graph().fqn(id),
                    m.message_type().fqn()
                )),
                other => Err(format!("expected message, got {}", other.type_name())),
            },
        }
    }
}

fn illegal(part: &str, reason: String) -> ValueError {
    ValueError::IllegalValue {
        field: format!("<map {part}>"),
        reason,
    }
}

fn canonical_key(key: &ProtoValue) -> String {
    match key {
        ProtoValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Debug for ProtoMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoMap")
            .field("key_type", &self.key_type)
            .field("value_type", &self.value_type)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ProtoMap {
    fn eq(&self, other: &Self) -> bool {
        self.key_type == other.key_type && self.entries == other.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_to_int() -> ProtoMap {
        ProtoMap::new(ScalarType::String, FieldType::Scalar(ScalarType::Int32))
    }

    #[test]
    fn test_set_get_delete() {
        let mut map = string_to_int();
        map.set("a", 1).unwrap().set("b", 2).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(&ProtoValue::I32(1)));
        assert!(map.has("b"));

        map.set("a", 10).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(&ProtoValue::I32(10)));

        assert_eq!(map.delete("a"), Some(ProtoValue::I32(10)));
        assert_eq!(map.delete("a"), None);
        assert!(!map.has("a"));

        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_keys_compare_by_canonical_form() {
        let mut map = ProtoMap::new(ScalarType::Int64, FieldType::Scalar(ScalarType::String));
        map.set(1i32, "one").unwrap();
        assert_eq!(map.get(1i64), Some(&ProtoValue::String("one".into())));
        assert_eq!(map.get(1u32), Some(&ProtoValue::String("one".into())));
        map.set(1u64, "uno").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.keys().next(), Some(&ProtoValue::I64(1)));
    }

    #[test]
    fn test_rejects_illegal_entries() {
        let mut map = string_to_int();
        assert!(map.set(1, 1).is_err());
        assert!(map.set("a", "not a number").is_err());

        let mut bools = ProtoMap::new(ScalarType::Bool, FieldType::Scalar(ScalarType::Bool));
        bools.set(true, false).unwrap();
        assert_eq!(bools.get(true), Some(&ProtoValue::Bool(false)));
        assert_eq!(bools.get("true"), None);
    }

    #[test]
    fn test_entries_iteration() {
        let mut map = string_to_int();
        map.set("x", 1).unwrap().set("y", 2).unwrap();
        let mut entries: Vec<(String, i64)> = map
            .entries()
            .map(|(k, v)| (k.as_str().unwrap().to_string(), v.as_i64().unwrap()))
            .collect();
        entries.sort();
        assert_eq!(entries, vec![("x".to_string(), 1), ("y".to_string(), 2)]);
        assert_eq!(map.values().count(), 2);
    }
}
