//! Reflective type graph.
//!
//! Every definition (namespace, message, field, oneof, enum, enum value,
//! extension, service, method) is a [`Node`] stored in one arena and addressed
//! by [`NodeId`]. Parent links give each node its scope; namespace-like nodes
//! keep an ordered child list so declaration order survives.

mod lookup;

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::options::BuilderOptions;
use crate::parser::ast::{Options, Reserved, Rule, Syntax};
use crate::types::{FieldType, ScalarType};
use crate::value::ProtoValue;

/// Index of a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Namespace(Namespace),
    Message(Message),
    Field(Field),
    OneOf(OneOf),
    Enum(Enum),
    EnumValue(EnumValue),
    Extension(Extension),
    Service(Service),
    Method(Method),
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Namespace(_) => "namespace",
            NodeKind::Message(_) => "message",
            NodeKind::Field(_) => "field",
            NodeKind::OneOf(_) => "oneof",
            NodeKind::Enum(_) => "enum",
            NodeKind::EnumValue(_) => "enum value",
            NodeKind::Extension(_) => "extension",
            NodeKind::Service(_) => "service",
            NodeKind::Method(_) => "method",
        }
    }

    /// Whether the node can hold children that take part in name lookup.
    pub fn is_namespace(&self) -> bool {
        self.scope().is_some()
    }

    fn scope(&self) -> Option<&Namespace> {
        match self {
            NodeKind::Namespace(ns) => Some(ns),
            NodeKind::Message(m) => Some(&m.ns),
            NodeKind::Enum(e) => Some(&e.ns),
            NodeKind::Service(s) => Some(&s.ns),
            _ => None,
        }
    }

    fn scope_mut(&mut self) -> Option<&mut Namespace> {
        match self {
            NodeKind::Namespace(ns) => Some(ns),
            NodeKind::Message(m) => Some(&mut m.ns),
            NodeKind::Enum(e) => Some(&mut e.ns),
            NodeKind::Service(s) => Some(&mut s.ns),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Namespace {
    pub children: Vec<NodeId>,
    pub options: Options,
    pub syntax: Syntax,
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub ns: Namespace,
    /// Own fields in declaration order (extensions live in the graph side-table).
    pub fields: Vec<NodeId>,
    pub oneofs: Vec<NodeId>,
    /// Inclusive extension id ranges.
    pub extension_ranges: Vec<(u32, u32)>,
    pub reserved: Vec<Reserved>,
    pub is_group: bool,
}

impl Message {
    pub fn accepts_extension(&self, id: u32) -> bool {
        self.extension_ranges
            .iter()
            .any(|&(lo, hi)| lo <= id && id <= hi)
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub rule: Rule,
    pub type_name: String,
    pub key_type_name: Option<String>,
    pub id: u32,
    pub options: Options,
    pub oneof: Option<NodeId>,
    /// Name as declared, before any camel-case conversion.
    pub original_name: String,
    pub syntax: Syntax,
    /// The owning extension node for extension fields.
    pub extension: Option<NodeId>,
    // filled in by resolution
    pub resolved: Option<FieldType>,
    pub key_type: Option<ScalarType>,
    pub packed: bool,
    pub default_value: Option<ProtoValue>,
}

impl Field {
    pub fn is_required(&self) -> bool {
        self.rule == Rule::Required
    }

    pub fn is_repeated(&self) -> bool {
        self.rule == Rule::Repeated
    }

    pub fn is_map(&self) -> bool {
        self.rule == Rule::Map
    }

    /// proto3 singular field without explicit presence: zero values are not
    /// written to the wire and are restored on decode.
    pub fn has_implicit_presence(&self) -> bool {
        self.rule == Rule::Implicit
            && self.oneof.is_none()
            && !self.resolved.is_some_and(FieldType::is_message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OneOf {
    pub fields: Vec<NodeId>,
    pub options: Options,
}

#[derive(Debug, Clone, Default)]
pub struct Enum {
    /// Children are the enum values, in declaration order.
    pub ns: Namespace,
}

#[derive(Debug, Clone)]
pub struct EnumValue {
    pub id: i32,
    pub options: Options,
}

#[derive(Debug, Clone)]
pub struct Extension {
    pub extendee: String,
    pub field: NodeId,
    /// Target message once resolved. `None` for skipped `google.protobuf` extendees.
    pub target: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct Service {
    /// Children are the methods.
    pub ns: Namespace,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub request_name: String,
    pub response_name: String,
    pub request_stream: bool,
    pub response_stream: bool,
    pub options: Options,
    pub request: Option<NodeId>,
    pub response: Option<NodeId>,
}

/// The arena of all definitions known to a builder.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    extensions: HashMap<(NodeId, u32), NodeId>,
    options: BuilderOptions,
}

impl Graph {
    pub fn new(options: BuilderOptions) -> Self {
        Graph {
            nodes: vec![Node {
                name: String::new(),
                parent: None,
                kind: NodeKind::Namespace(Namespace::default()),
            }],
            extensions: HashMap::new(),
            options,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Id the next added node will get.
    pub(crate) fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len())
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id).kind.scope() {
            Some(ns) => &ns.children,
            None => &[],
        }
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.node(c).name == name)
    }

    pub fn message(&self, id: NodeId) -> Option<&Message> {
        match &self.node(id).kind {
            NodeKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn field(&self, id: NodeId) -> Option<&Field> {
        match &self.node(id).kind {
            NodeKind::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn oneof(&self, id: NodeId) -> Option<&OneOf> {
        match &self.node(id).kind {
            NodeKind::OneOf(o) => Some(o),
            _ => None,
        }
    }

    pub fn enumeration(&self, id: NodeId) -> Option<&Enum> {
        match &self.node(id).kind {
            NodeKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn namespace(&self, id: NodeId) -> Option<&Namespace> {
        self.node(id).kind.scope()
    }

    pub(crate) fn namespace_mut(&mut self, id: NodeId) -> Option<&mut Namespace> {
        self.node_mut(id).kind.scope_mut()
    }

    pub fn syntax_of(&self, id: NodeId) -> Syntax {
        match &self.node(id).kind {
            NodeKind::Field(f) => f.syntax,
            kind => kind.scope().map(|ns| ns.syntax).unwrap_or_default(),
        }
    }

    /// Fully qualified name with a leading dot, e.g. `.pkg.Outer.Inner`.
    ///
    /// An extension field reports the name of its extension node.
    pub fn fqn(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(self.display_node(id));
        while let Some(cur) = current {
            let node = self.node(cur);
            if node.parent.is_none() {
                break;
            }
            parts.push(node.name.as_str());
            current = node.parent;
        }
        let mut out = String::new();
        for part in parts.iter().rev() {
            out.push('.');
            out.push_str(part);
        }
        out
    }

    fn display_node(&self, id: NodeId) -> NodeId {
        match self.field(id).and_then(|f| f.extension) {
            Some(ext) => ext,
            None => id,
        }
    }

    /// Namespace in which type references of a node are resolved.
    pub(crate) fn scope_of(&self, id: NodeId) -> NodeId {
        let anchor = self.display_node(id);
        self.node(anchor).parent.unwrap_or(self.root())
    }

    /// Add a node below `parent`, registering it as a child and enforcing
    /// unique names (and, for fields, unique ids) within the parent.
    pub(crate) fn add_node(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<NodeId, ValidationError> {
        let id = self.next_id();
        let registers = self.node(parent).kind.is_namespace();

        if registers && self.child(parent, name).is_some() {
            return Err(ValidationError::DuplicateName {
                namespace: self.display_name(parent),
                name: name.to_string(),
            });
        }
        if let (NodeKind::Field(field), Some(msg)) = (&kind, self.message(parent)) {
            if msg
                .fields
                .iter()
                .any(|&f| self.field(f).is_some_and(|other| other.id == field.id))
            {
                return Err(ValidationError::DuplicateFieldId {
                    message: self.fqn(parent),
                    id: field.id,
                });
            }
        }

        let is_field = matches!(kind, NodeKind::Field(_));
        let is_oneof = matches!(kind, NodeKind::OneOf(_));
        self.nodes.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            kind,
        });

        let parent_kind = &mut self.node_mut(parent).kind;
        if let NodeKind::Message(msg) = &mut *parent_kind {
            if is_field {
                msg.fields.push(id);
            } else if is_oneof {
                msg.oneofs.push(id);
            }
        }
        if registers {
            if let Some(ns) = parent_kind.scope_mut() {
                ns.children.push(id);
            }
        }
        Ok(id)
    }

    fn display_name(&self, id: NodeId) -> String {
        if id == self.root() {
            ".".to_string()
        } else {
            self.fqn(id)
        }
    }

    /// Own fields of a message, in declaration order.
    pub fn message_fields(&self, msg: NodeId) -> &[NodeId] {
        match self.message(msg) {
            Some(m) => &m.fields,
            None => &[],
        }
    }

    /// Field of `msg` (own or extension) carrying wire id `id`.
    pub fn field_by_id(&self, msg: NodeId, id: u32) -> Option<NodeId> {
        self.message_fields(msg)
            .iter()
            .copied()
            .find(|&f| self.field(f).is_some_and(|field| field.id == id))
            .or_else(|| self.extensions.get(&(msg, id)).copied())
    }

    /// Field of `msg` by name. Extensions are addressed by their fully
    /// qualified name, with or without the leading dot.
    pub fn field_by_name(&self, msg: NodeId, name: &str) -> Option<NodeId> {
        let own = self
            .message_fields(msg)
            .iter()
            .copied()
            .find(|&f| self.node(f).name == name);
        if own.is_some() {
            return own;
        }
        let wanted = name.strip_prefix('.').unwrap_or(name);
        self.extensions_of(msg)
            .into_iter()
            .find(|&f| self.fqn(f).strip_prefix('.') == Some(wanted))
    }

    /// Extension fields targeting `msg`, ordered by id.
    pub fn extensions_of(&self, msg: NodeId) -> Vec<NodeId> {
        let mut found: Vec<(u32, NodeId)> = self
            .extensions
            .iter()
            .filter(|((target, _), _)| *target == msg)
            .map(|((_, id), field)| (*id, *field))
            .collect();
        found.sort_unstable();
        found.into_iter().map(|(_, field)| field).collect()
    }

    pub(crate) fn set_extensions(&mut self, extensions: HashMap<(NodeId, u32), NodeId>) {
        self.extensions = extensions;
    }

    /// Label used in errors and debug output: the field name, or the
    /// qualified extension name for extension fields.
    pub fn field_label(&self, field: NodeId) -> String {
        match self.field(field).and_then(|f| f.extension) {
            Some(_) => self.fqn(field),
            None => self.node(field).name.clone(),
        }
    }

    /// Enum values in declaration order.
    pub fn enum_values(&self, enum_id: NodeId) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.children(enum_id).iter().filter_map(move |&v| {
            let node = self.node(v);
            match &node.kind {
                NodeKind::EnumValue(ev) => Some((node.name.as_str(), ev.id)),
                _ => None,
            }
        })
    }

    pub fn enum_value_by_name(&self, enum_id: NodeId, name: &str) -> Option<i32> {
        self.enum_values(enum_id)
            .find(|(n, _)| *n == name)
            .map(|(_, id)| id)
    }

    /// Name for an enum id. With aliases the first declared name wins.
    pub fn enum_name(&self, enum_id: NodeId, id: i32) -> Option<&str> {
        self.enum_values(enum_id)
            .find(|(_, v)| *v == id)
            .map(|(n, _)| n)
    }

    pub fn enum_has_value(&self, enum_id: NodeId, id: i32) -> bool {
        self.enum_values(enum_id).any(|(_, v)| v == id)
    }

    /// Default enum value: the first declared one, or 0 for an empty enum.
    pub fn enum_default(&self, enum_id: NodeId) -> i32 {
        self.enum_values(enum_id).next().map_or(0, |(_, id)| id)
    }

    /// Zero value for a resolved singular field type. Messages have none.
    pub fn zero_value(&self, ty: FieldType) -> Option<ProtoValue> {
        match ty {
            FieldType::Scalar(s) => Some(s.zero_value()),
            FieldType::Enum(e) => Some(ProtoValue::Enum(self.enum_default(e))),
            FieldType::Message(_) | FieldType::Group(_) => None,
        }
    }
}
