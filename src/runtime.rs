//! Runtime handles onto a built type graph.
//!
//! [`Builder::build`](crate::Builder::build) returns a [`Runtime`] for the
//! requested namespace. Handles share the frozen graph through an `Arc` and
//! create nested handles on demand.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::message::MessageType;
use crate::parser::ast::Options;
use crate::reflect::{Graph, NodeId, NodeKind};

/// A runtime definition: a namespace of further definitions, a message class,
/// an enum object or a service description.
#[derive(Clone, Debug)]
pub enum Runtime {
    Namespace(NamespaceType),
    Message(MessageType),
    Enum(EnumType),
    Service(ServiceType),
}

impl Runtime {
    /// Runtime handle for a namespace-like node. Fields, values and methods
    /// have none of their own.
    pub(crate) fn from_node(graph: &Arc<Graph>, id: NodeId) -> Option<Runtime> {
        let shared = || Arc::clone(graph);
        match graph.node(id).kind {
            NodeKind::Namespace(_) => Some(Runtime::Namespace(NamespaceType { graph: shared(), id })),
            NodeKind::Message(_) => Some(Runtime::Message(MessageType::new(shared(), id))),
            NodeKind::Enum(_) => Some(Runtime::Enum(EnumType { graph: shared(), id })),
            NodeKind::Service(_) => Some(Runtime::Service(ServiceType { graph: shared(), id })),
            _ => None,
        }
    }

    /// A direct child by name.
    pub fn get(&self, name: &str) -> Option<Runtime> {
        let (graph, id) = self.parts();
        let child = graph.child(id, name)?;
        Runtime::from_node(graph, child)
    }

    /// A descendant by dotted path, e.g. `Outer.Inner`.
    pub fn find(&self, path: &str) -> Option<Runtime> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        parts.try_fold(self.get(first)?, |rt, part| rt.get(part))
    }

    pub fn fqn(&self) -> String {
        let (graph, id) = self.parts();
        graph.fqn(id)
    }

    pub fn as_message(&self) -> Option<&MessageType> {
        match self {
            Runtime::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            Runtime::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceType> {
        match self {
            Runtime::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&NamespaceType> {
        match self {
            Runtime::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn into_message(self) -> Option<MessageType> {
        match self {
            Runtime::Message(m) => Some(m),
            _ => None,
        }
    }

    fn parts(&self) -> (&Arc<Graph>, NodeId) {
        match self {
            Runtime::Namespace(ns) => (&ns.graph, ns.id),
            Runtime::Message(m) => (m.graph_arc(), m.id()),
            Runtime::Enum(e) => (&e.graph, e.id),
            Runtime::Service(s) => (&s.graph, s.id),
        }
    }
}

/// A package (or the root) and the definitions below it.
#[derive(Clone)]
pub struct NamespaceType {
    graph: Arc<Graph>,
    id: NodeId,
}

impl NamespaceType {
    pub fn fqn(&self) -> String {
        self.graph.fqn(self.id)
    }

    /// Names of the direct children, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.graph
            .children(self.id)
            .iter()
            .map(|&c| self.graph.node(c).name.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Runtime> {
        let child = self.graph.child(self.id, name)?;
        Runtime::from_node(&self.graph, child)
    }
}

impl fmt::Debug for NamespaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamespaceType").field(&self.fqn()).finish()
    }
}

/// An enum: a name to id mapping.
#[derive(Clone)]
pub struct EnumType {
    graph: Arc<Graph>,
    id: NodeId,
}

impl EnumType {
    pub fn name(&self) -> &str {
        &self.graph.node(self.id).name
    }

    pub fn fqn(&self) -> String {
        self.graph.fqn(self.id)
    }

    pub fn options(&self) -> Option<&Options> {
        self.graph.enumeration(self.id).map(|e| &e.ns.options)
    }

    /// `(name, id)` pairs in declaration order.
    pub fn values(&self) -> Vec<(&str, i32)> {
        self.graph.enum_values(self.id).collect()
    }

    pub fn value(&self, name: &str) -> Option<i32> {
        self.graph.enum_value_by_name(self.id, name)
    }

    /// Name of an id. With aliases the first declared name is returned.
    pub fn name_of(&self, id: i32) -> Option<&str> {
        self.graph.enum_name(self.id, id)
    }

    pub fn to_map(&self) -> BTreeMap<String, i32> {
        self.graph
            .enum_values(self.id)
            .map(|(name, id)| (name.to_string(), id))
            .collect()
    }
}

impl fmt::Debug for EnumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values()).finish()
    }
}

/// A service: its RPC methods with resolved request and response types.
#[derive(Clone)]
pub struct ServiceType {
    graph: Arc<Graph>,
    id: NodeId,
}

/// One RPC method of a service.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub request: MessageType,
    pub response: MessageType,
    pub request_stream: bool,
    pub response_stream: bool,
    pub options: Options,
}

impl ServiceType {
    pub fn name(&self) -> &str {
        &self.graph.node(self.id).name
    }

    pub fn fqn(&self) -> String {
        self.graph.fqn(self.id)
    }

    /// Methods in declaration order. Methods whose types did not resolve are left out.
    pub fn methods(&self) -> Vec<MethodInfo> {
        self.graph
            .children(self.id)
            .iter()
            .filter_map(|&c| {
                let node = self.graph.node(c);
                let NodeKind::Method(method) = &node.kind else {
                    return None;
                };
                Some(MethodInfo {
                    name: node.name.clone(),
                    request: MessageType::new(Arc::clone(&self.graph), method.request?),
                    response: MessageType::new(Arc::clone(&self.graph), method.response?),
                    request_stream: method.request_stream,
                    response_stream: method.response_stream,
                    options: method.options.clone(),
                })
            })
            .collect()
    }

    pub fn method(&self, name: &str) -> Option<MethodInfo> {
        self.methods().into_iter().find(|m| m.name == name)
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceType").field(&self.fqn()).finish()
    }
}
