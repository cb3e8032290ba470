//! Runtime message types and message instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec;
use crate::error::{DecodeError, EncodeError, ValueError};
use crate::map::ProtoMap;
use crate::parser::ast::{Options, Rule, Syntax};
use crate::reflect::{Field, Graph, NodeId};
use crate::runtime::Runtime;
use crate::types::{FieldType, ScalarType};
use crate::value::{coerce_scalar, ProtoValue};

static NO_OPTIONS: Options = Options::new();

/// A message definition of a built type graph. Cheap to clone.
#[derive(Clone)]
pub struct MessageType {
    graph: Arc<Graph>,
    id: NodeId,
}

impl MessageType {
    pub(crate) fn new(graph: Arc<Graph>, id: NodeId) -> Self {
        MessageType { graph, id }
    }

    /// Another message type of the same graph.
    pub(crate) fn for_node(&self, id: NodeId) -> MessageType {
        MessageType::new(Arc::clone(&self.graph), id)
    }

    pub(crate) fn graph_arc(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.graph.node(self.id).name
    }

    /// Fully qualified name, e.g. `.pkg.Msg`.
    pub fn fqn(&self) -> String {
        self.graph.fqn(self.id)
    }

    pub fn syntax(&self) -> Syntax {
        self.graph.syntax_of(self.id)
    }

    pub fn options(&self) -> &Options {
        self.graph
            .message(self.id)
            .map_or(&NO_OPTIONS, |m| &m.ns.options)
    }

    pub fn is_group(&self) -> bool {
        self.graph.message(self.id).is_some_and(|m| m.is_group)
    }

    /// Names of the message's own fields, in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.graph
            .message_fields(self.id)
            .iter()
            .map(|&f| self.graph.node(f).name.as_str())
            .collect()
    }

    /// Field by name; extensions by their qualified name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.field_node(name).and_then(|f| self.graph.field(f))
    }

    /// Field (own or extension) by wire id.
    pub fn field_by_id(&self, id: u32) -> Option<&Field> {
        self.graph
            .field_by_id(self.id, id)
            .and_then(|f| self.graph.field(f))
    }

    pub(crate) fn field_node(&self, name: &str) -> Option<NodeId> {
        self.graph.field_by_name(self.id, name)
    }

    /// Qualified names of the extensions that target this message.
    pub fn extension_names(&self) -> Vec<String> {
        self.graph
            .extensions_of(self.id)
            .into_iter()
            .map(|f| self.graph.fqn(f))
            .collect()
    }

    /// A nested message, enum or group declared inside this message.
    pub fn nested(&self, name: &str) -> Option<Runtime> {
        let child = self.graph.child(self.id, name)?;
        Runtime::from_node(&self.graph, child)
    }

    /// Whether this is node `id` of `graph` itself, not of a copy.
    pub(crate) fn is_node_of(&self, graph: &Graph, id: NodeId) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.graph), graph) && self.id == id
    }

    pub fn new_message(&self) -> DynamicMessage {
        DynamicMessage::new(self.clone())
    }

    /// Construct a message and set each `(name, value)` pair in turn.
    pub fn from_fields<I, K, V>(&self, fields: I) -> Result<DynamicMessage, ValueError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ProtoValue>,
    {
        let mut message = self.new_message();
        for (name, value) in fields {
            message.set(name.as_ref(), value)?;
        }
        Ok(message)
    }

    pub fn decode(&self, data: &[u8]) -> Result<DynamicMessage, DecodeError> {
        codec::decode(self, data)
    }

    /// Decode a varint length-prefixed message.
    ///
    /// Returns `Ok(None)` while `data` does not yet hold the whole message,
    /// otherwise the message and the number of bytes it occupied.
    pub fn decode_delimited(
        &self,
        data: &[u8],
    ) -> Result<Option<(DynamicMessage, usize)>, DecodeError> {
        codec::decode_delimited(self, data)
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph) && self.id == other.id
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageType").field(&self.fqn()).finish()
    }
}

/// A message instance: a bag of field values keyed by field.
///
/// Setters verify values against the field's declared type and keep at most
/// one member of each oneof set.
#[derive(Clone)]
pub struct DynamicMessage {
    ty: MessageType,
    values: HashMap<NodeId, ProtoValue>,
}

impl DynamicMessage {
    /// A new message, with defaults filled in when the graph's options ask for it.
    pub fn new(ty: MessageType) -> Self {
        let mut message = Self::empty(ty);
        message.populate_defaults();
        message
    }

    pub(crate) fn empty(ty: MessageType) -> Self {
        DynamicMessage {
            ty,
            values: HashMap::new(),
        }
    }

    /// Fill absent required and implicit-presence fields with their defaults.
    pub(crate) fn populate_defaults(&mut self) {
        let graph = Arc::clone(&self.ty.graph);
        if !graph.options().populate_defaults {
            return;
        }
        for &fid in graph.message_fields(self.ty.id) {
            if self.values.contains_key(&fid) {
                continue;
            }
            let Some(field) = graph.field(fid) else {
                continue;
            };
            if !(field.is_required() || field.has_implicit_presence()) {
                continue;
            }
            if let Some(default) = &field.default_value {
                self.values.insert(fid, default.clone());
            }
        }
    }

    pub fn message_type(&self) -> &MessageType {
        &self.ty
    }

    fn field_node(&self, name: &str) -> Result<NodeId, ValueError> {
        self.ty
            .field_node(name)
            .ok_or_else(|| ValueError::NoSuchField {
                message: self.ty.fqn(),
                field: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&ProtoValue> {
        self.ty
            .field_node(name)
            .and_then(|fid| self.values.get(&fid))
    }

    /// Mutable access to a present value. Changes made through it are not verified.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProtoValue> {
        let fid = self.ty.field_node(name)?;
        self.values.get_mut(&fid)
    }

    /// The value if set, else the field's default: the declared default, an
    /// empty list or map, or the type's zero value. Messages have no default.
    pub fn get_or_default(&self, name: &str) -> Option<ProtoValue> {
        let fid = self.ty.field_node(name)?;
        if let Some(value) = self.values.get(&fid) {
            return Some(value.clone());
        }
        let graph = self.ty.graph();
        let field = graph.field(fid)?;
        if let Some(default) = &field.default_value {
            return Some(default.clone());
        }
        match field.rule {
            Rule::Repeated => Some(ProtoValue::List(Vec::new())),
            Rule::Map => Some(ProtoValue::Map(ProtoMap::with_graph(
                field.key_type?,
                field.resolved?,
                Arc::clone(&self.ty.graph),
            ))),
            _ => graph.zero_value(field.resolved?),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a field. Setting a oneof member clears the other members.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<ProtoValue>,
    ) -> Result<&mut Self, ValueError> {
        let fid = self.field_node(name)?;
        let graph = Arc::clone(&self.ty.graph);
        let field = expect_field(&graph, fid, name)?;
        let value = verify_field_value(&graph, field, value.into()).map_err(|reason| {
            ValueError::IllegalValue {
                field: name.to_string(),
                reason,
            }
        })?;
        self.set_by_id(fid, value);
        Ok(self)
    }

    /// Append an element to a repeated field.
    pub fn add(
        &mut self,
        name: &str,
        value: impl Into<ProtoValue>,
    ) -> Result<&mut Self, ValueError> {
        let fid = self.field_node(name)?;
        let graph = Arc::clone(&self.ty.graph);
        let field = expect_field(&graph, fid, name)?;
        if !field.is_repeated() {
            return Err(ValueError::NotRepeated {
                field: name.to_string(),
            });
        }
        let value = field
            .resolved
            .ok_or_else(|| "field type is unresolved".to_string())
            .and_then(|ty| verify_element(&graph, ty, value.into()))
            .map_err(|reason| ValueError::IllegalValue {
                field: name.to_string(),
                reason,
            })?;
        self.push_by_id(fid, value);
        Ok(self)
    }

    /// The map of a map field, created empty if absent.
    pub fn map_mut(&mut self, name: &str) -> Result<&mut ProtoMap, ValueError> {
        let fid = self.field_node(name)?;
        let field = expect_field(&self.ty.graph, fid, name)?;
        let (Some(key_type), Some(value_type), true) = (field.key_type, field.resolved, field.is_map())
        else {
            return Err(ValueError::NotAMap {
                field: name.to_string(),
            });
        };
        let graph = Arc::clone(&self.ty.graph);
        match self
            .values
            .entry(fid)
            .or_insert_with(|| ProtoValue::Map(ProtoMap::with_graph(key_type, value_type, graph)))
        {
            ProtoValue::Map(map) => Ok(map),
            _ => Err(ValueError::NotAMap {
                field: name.to_string(),
            }),
        }
    }

    /// Remove a field's value, returning it.
    pub fn clear(&mut self, name: &str) -> Result<Option<ProtoValue>, ValueError> {
        let fid = self.field_node(name)?;
        Ok(self.values.remove(&fid))
    }

    /// Name of the member of oneof `oneof` that is currently set.
    pub fn which_oneof(&self, oneof: &str) -> Option<&str> {
        let graph = self.ty.graph();
        let oneof = graph
            .child(self.ty.id, oneof)
            .and_then(|o| graph.oneof(o))?;
        oneof
            .fields
            .iter()
            .find(|f| self.values.contains_key(f))
            .map(|&f| graph.node(f).name.as_str())
    }

    /// Present fields: own fields in declaration order, then extensions by id.
    pub fn fields(&self) -> Vec<(String, &ProtoValue)> {
        let graph = self.ty.graph();
        let own = graph.message_fields(self.ty.id).iter().copied();
        own.chain(graph.extensions_of(self.ty.id))
            .filter_map(|fid| {
                self.values
                    .get(&fid)
                    .map(|value| (graph.field_label(fid), value))
            })
            .collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        codec::encode(self)
    }

    /// Encode with a varint length prefix.
    pub fn encode_delimited(&self) -> Result<Vec<u8>, EncodeError> {
        codec::encode_delimited(self)
    }

    /// Number of bytes `encode` produces.
    pub fn encoded_len(&self) -> Result<usize, EncodeError> {
        codec::encoded_len(self)
    }

    // ---- typed access for the codec ----

    pub(crate) fn get_by_id(&self, fid: NodeId) -> Option<&ProtoValue> {
        self.values.get(&fid)
    }

    pub(crate) fn set_by_id(&mut self, fid: NodeId, value: ProtoValue) {
        let graph = Arc::clone(&self.ty.graph);
        if let Some(oneof) = graph
            .field(fid)
            .and_then(|f| f.oneof)
            .and_then(|o| graph.oneof(o))
        {
            for sibling in oneof.fields.iter().filter(|&&s| s != fid) {
                self.values.remove(sibling);
            }
        }
        self.values.insert(fid, value);
    }

    pub(crate) fn push_by_id(&mut self, fid: NodeId, value: ProtoValue) {
        match self
            .values
            .entry(fid)
            .or_insert_with(|| ProtoValue::List(Vec::new()))
        {
            ProtoValue::List(items) => items.push(value),
            slot => *slot = ProtoValue::List(vec![value]),
        }
    }

    pub(crate) fn insert_map_entry(
        &mut self,
        fid: NodeId,
        key_type: ScalarType,
        value_type: FieldType,
        key: ProtoValue,
        value: ProtoValue,
    ) {
        let graph = Arc::clone(&self.ty.graph);
        let slot = self
            .values
            .entry(fid)
            .or_insert_with(|| ProtoValue::Map(ProtoMap::with_graph(key_type, value_type, graph)));
        if let ProtoValue::Map(map) = slot {
            map.insert_decoded(key, value);
        }
    }
}

fn expect_field<'g>(graph: &'g Graph, fid: NodeId, name: &str) -> Result<&'g Field, ValueError> {
    graph.field(fid).ok_or_else(|| ValueError::NoSuchField {
        message: graph.node(fid).parent.map(|p| graph.fqn(p)).unwrap_or_default(),
        field: name.to_string(),
    })
}

/// Verify a whole field value (list, map or single element) against `field`.
fn verify_field_value(graph: &Arc<Graph>, field: &Field, value: ProtoValue) -> Result<ProtoValue, String> {
    let ty = field
        .resolved
        .ok_or_else(|| "field type is unresolved".to_string())?;
    match field.rule {
        Rule::Repeated => match value {
            ProtoValue::List(items) => items
                .into_iter()
                .map(|item| verify_element(graph, ty, item))
                .collect::<Result<Vec<_>, _>>()
                .map(ProtoValue::List),
            other => Err(format!("expected list, got {}", other.type_name())),
        },
        Rule::Map => match value {
            ProtoValue::Map(map)
                if Some(map.key_type()) == field.key_type && map.value_type() == ty =>
            {
                map.bind(graph).map(ProtoValue::Map)
            }
            ProtoValue::Map(_) => Err("map key or value type does not match the field".into()),
            other => Err(format!("expected map, got {}", other.type_name())),
        },
        _ => verify_element(graph, ty, value),
    }
}

/// Verify a single value and convert it to its canonical representation.
///
/// Enums accept ids and value names. proto2 enums only accept declared ids.
pub(crate) fn verify_element(graph: &Graph, ty: FieldType, value: ProtoValue) -> Result<ProtoValue, String> {
    match ty {
        FieldType::Scalar(s) => coerce_scalar(s, value),
        FieldType::Enum(e) => {
            let id = match &value {
                ProtoValue::String(name) => graph.enum_value_by_name(e, name).ok_or_else(|| {
                    format!("'{name}' is not a value of enum '{}'", graph.fqn(e))
                })?,
                other => {
                    let v = other
                        .as_integer()
                        .ok_or_else(|| format!("expected enum, got {}", other.type_name()))?;
                    i32::try_from(v).map_err(|_| format!("{v} is out of range for an enum"))?
                }
            };
            if graph.syntax_of(e) == Syntax::Proto2 && !graph.enum_has_value(e, id) {
                return Err(format!("{id} is not a value of enum '{}'", graph.fqn(e)));
            }
            Ok(ProtoValue::Enum(id))
        }
        FieldType::Message(id) | FieldType::Group(id) => match value {
            ProtoValue::Message(m) if m.message_type().is_node_of(graph, id) => Ok(ProtoValue::Message(m)),
            ProtoValue::Message(m) => Err(format!(
                "expected message '{}', got '{}'",
                graph.fqn(id),
                m.message_type().fqn()
            )),
            other => Err(format!(
                "expected message '{}', got {}",
                graph.fqn(id),
                other.type_name()
            )),
        },
    }
}

impl PartialEq for DynamicMessage {
    /// Same type and same values; an empty repeated or map field equals an absent one.
    fn eq(&self, other: &Self) -> bool {
        if self.ty != other.ty {
            return false;
        }
        let same = |a: &HashMap<NodeId, ProtoValue>, b: &HashMap<NodeId, ProtoValue>| {
            a.iter().all(|(fid, value)| match b.get(fid) {
                Some(theirs) => value == theirs,
                None => value.is_empty_collection(),
            })
        };
        same(&self.values, &other.values) && same(&other.values, &self.values)
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.ty.name());
        for (name, value) in self.fields() {
            s.field(&name, value);
        }
        s.finish()
    }
}

impl fmt::Display for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.ty.name())?;
        for (i, (name, value)) in self.fields().into_iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{name}: {value}")?;
        }
        write!(f, " }}")
    }
}
