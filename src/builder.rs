//! Assembles schema descriptions into a resolved type graph.
//!
//! Construction happens in two passes. `define`/`create`/`import` add nodes
//! below the current namespace pointer and check structure only; type names
//! stay unresolved strings. `resolve_all` then resolves every field,
//! extension and method reference with scoped lookup, validates what needs
//! resolved types (packed, defaults, map keys, extension ranges) and freezes
//! a snapshot of the graph for runtime use.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::error::{BuildError, Error, ResolutionError, ValidationError};
use crate::message::MessageType;
use crate::options::{to_camel_case, BuilderOptions};
use crate::parser;
use crate::parser::ast::{
    Constant, Definition, EnumDef, ExtendDef, FieldDef, MessageDef, Options, ProtoFile, Rule,
    ServiceDef, Syntax,
};
use crate::reflect::{
    Enum, EnumValue, Extension, Field, Graph, Message, Method, Namespace, NodeId, NodeKind, OneOf,
    Service,
};
use crate::runtime::{EnumType, Runtime};
use crate::types::{FieldType, ScalarType, ID_MAX, ID_MIN, RESERVED_ID_END, RESERVED_ID_START};
use crate::value::{coerce_scalar, ProtoValue};

/// Imports of this file are never loaded; it only declares option types.
const DESCRIPTOR_PROTO: &str = "google/protobuf/descriptor.proto";

/// Supplies the text of imported `.proto` files.
pub trait ImportLoader {
    /// Source text for an import path, or `None` if it is unknown.
    fn load(&self, path: &str) -> Option<String>;
}

impl ImportLoader for HashMap<String, String> {
    fn load(&self, path: &str) -> Option<String> {
        self.get(path).cloned()
    }
}

impl ImportLoader for BTreeMap<String, String> {
    fn load(&self, path: &str) -> Option<String> {
        self.get(path).cloned()
    }
}

/// Builds a type graph from one or more schema descriptions.
#[derive(Debug, Clone)]
pub struct Builder {
    graph: Graph,
    /// Namespace that `create` adds definitions to.
    ptr: NodeId,
    /// Syntax of the file being imported.
    syntax: Syntax,
    resolved: bool,
    frozen: Option<Arc<Graph>>,
    files: BTreeSet<String>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of resolving one node, applied once every node has been visited.
enum Update {
    Field {
        id: NodeId,
        resolved: FieldType,
        key_type: Option<ScalarType>,
        packed: bool,
        default_value: Option<ProtoValue>,
    },
    Extension {
        id: NodeId,
        target: Option<NodeId>,
    },
    Method {
        id: NodeId,
        request: NodeId,
        response: NodeId,
    },
}

impl Builder {
    pub fn new() -> Self {
        Self::with_options(BuilderOptions::default())
    }

    pub fn with_options(options: BuilderOptions) -> Self {
        let graph = Graph::new(options);
        let ptr = graph.root();
        Builder {
            graph,
            ptr,
            syntax: Syntax::default(),
            resolved: false,
            frozen: None,
            files: BTreeSet::new(),
        }
    }

    pub fn options(&self) -> &BuilderOptions {
        self.graph.options()
    }

    /// The type graph under construction.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Names of the files imported so far.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    /// Move the namespace pointer back to the root.
    pub fn reset(&mut self) -> &mut Self {
        self.ptr = self.graph.root();
        self
    }

    /// Node at `path` (fully qualified, leading dot optional).
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        self.graph.lookup(path)
    }

    /// Open the namespace for a dotted package name, creating missing parts,
    /// and make it current. `options` are merged into the innermost namespace.
    pub fn define(&mut self, package: &str, options: Options) -> Result<&mut Self, ValidationError> {
        for part in package.split('.').filter(|p| !p.is_empty()) {
            self.ptr = match self.graph.child(self.ptr, part) {
                Some(existing) if matches!(self.graph.node(existing).kind, NodeKind::Namespace(_)) => {
                    existing
                }
                Some(existing) => {
                    return Err(ValidationError::NotANamespace {
                        package: package.to_string(),
                        name: self.graph.fqn(existing),
                    })
                }
                None => {
                    let ns = Namespace {
                        syntax: self.syntax,
                        ..Namespace::default()
                    };
                    self.graph.add_node(self.ptr, part, NodeKind::Namespace(ns))?
                }
            };
        }
        if let Some(ns) = self.graph.namespace_mut(self.ptr) {
            ns.options.extend(options);
        }
        debug!(package, "defined namespace");
        Ok(self)
    }

    /// Add definitions below the current namespace. References stay
    /// unresolved until [`resolve_all`](Self::resolve_all).
    pub fn create(
        &mut self,
        defs: impl IntoIterator<Item = Definition>,
    ) -> Result<&mut Self, ValidationError> {
        self.invalidate();
        let ptr = self.ptr;
        let before = self.graph.len();
        for def in defs {
            match def {
                Definition::Message(msg) => {
                    self.create_message(ptr, msg)?;
                }
                Definition::Enum(e) => {
                    self.create_enum(ptr, e)?;
                }
                Definition::Service(svc) => {
                    self.create_service(ptr, svc)?;
                }
                Definition::Extend(ext) => self.create_extend(ptr, ext)?,
            }
        }
        debug!(
            namespace = %self.graph.fqn(ptr),
            nodes = self.graph.len() - before,
            "created definitions"
        );
        Ok(self)
    }

    /// Import a parsed file: its package becomes the namespace its
    /// definitions are created in. A file name that was already imported is
    /// skipped.
    pub fn import(
        &mut self,
        file: ProtoFile,
        filename: Option<&str>,
    ) -> Result<&mut Self, ValidationError> {
        if let Some(name) = filename {
            if !self.files.insert(name.to_string()) {
                debug!(file = name, "skipping file imported before");
                return Ok(self);
            }
        }
        self.import_file(file)
    }

    fn import_file(&mut self, file: ProtoFile) -> Result<&mut Self, ValidationError> {
        self.syntax = file.syntax;
        self.reset();
        let defs = file.definitions();
        match &file.package {
            Some(package) => {
                self.define(package, file.options)?;
            }
            None => {
                let root = self.graph.root();
                if let Some(ns) = self.graph.namespace_mut(root) {
                    ns.options.extend(file.options);
                }
            }
        }
        self.create(defs)?;
        self.reset();
        Ok(self)
    }

    /// Parse `.proto` text and import it. `import` statements are not followed.
    pub fn load_proto(&mut self, source: &str, filename: Option<&str>) -> Result<&mut Self, Error> {
        let file = parser::parse(source)?;
        self.import(file, filename)?;
        Ok(self)
    }

    /// Parse `.proto` text and import it together with everything it imports,
    /// dependencies first. Import cycles and repeated imports load each file once.
    pub fn load_proto_with<L>(
        &mut self,
        source: &str,
        filename: &str,
        loader: &L,
    ) -> Result<&mut Self, Error>
    where
        L: ImportLoader + ?Sized,
    {
        if self.files.contains(filename) {
            debug!(file = filename, "skipping file imported before");
            return Ok(self);
        }
        let file = parser::parse(source)?;
        self.files.insert(filename.to_string());

        for path in &file.imports {
            if path == DESCRIPTOR_PROTO || self.files.contains(path) {
                continue;
            }
            let text = loader.load(path).ok_or_else(|| Error::Import {
                path: path.clone(),
                importer: filename.to_string(),
            })?;
            self.load_proto_with(&text, path, loader)?;
        }
        self.import_file(file)?;
        Ok(self)
    }

    /// Resolve every type reference and freeze the graph for runtime use.
    /// Does nothing if the graph is already resolved.
    pub fn resolve_all(&mut self) -> Result<&mut Self, Error> {
        if self.resolved {
            return Ok(self);
        }

        let mut updates = Vec::new();
        let mut extensions = HashMap::new();
        for id in self.graph.ids() {
            match &self.graph.node(id).kind {
                NodeKind::Field(field) => updates.push(self.resolve_field(id, field)?),
                NodeKind::Extension(ext) => {
                    updates.push(self.resolve_extension(id, ext, &mut extensions)?)
                }
                NodeKind::Method(method) => updates.push(self.resolve_method(id, method)?),
                _ => {}
            }
        }

        let count = updates.len();
        for update in updates {
            self.apply(update);
        }
        let extension_count = extensions.len();
        self.graph.set_extensions(extensions);
        self.resolved = true;
        self.frozen = Some(Arc::new(self.graph.clone()));
        debug!(
            references = count,
            extensions = extension_count,
            "resolved type graph"
        );
        Ok(self)
    }

    /// Runtime surface for `path` (the root when `None`).
    pub fn build(&self, path: Option<&str>) -> Result<Runtime, BuildError> {
        let graph = match (&self.frozen, self.resolved) {
            (Some(graph), true) => graph,
            _ => return Err(BuildError::Unresolved),
        };
        let path = path.unwrap_or("");
        let id = graph
            .lookup(path)
            .ok_or_else(|| BuildError::NotFound(path.to_string()))?;
        Runtime::from_node(graph, id).ok_or_else(|| BuildError::WrongKind {
            path: path.to_string(),
            expected: "namespace, message, enum or service",
        })
    }

    /// The message type at `path`.
    pub fn message_type(&self, path: &str) -> Result<MessageType, BuildError> {
        match self.build(Some(path))? {
            Runtime::Message(ty) => Ok(ty),
            _ => Err(BuildError::WrongKind {
                path: path.to_string(),
                expected: "message",
            }),
        }
    }

    /// The enum at `path`.
    pub fn enum_type(&self, path: &str) -> Result<EnumType, BuildError> {
        match self.build(Some(path))? {
            Runtime::Enum(ty) => Ok(ty),
            _ => Err(BuildError::WrongKind {
                path: path.to_string(),
                expected: "enum",
            }),
        }
    }

    fn invalidate(&mut self) {
        self.resolved = false;
        self.frozen = None;
    }

    // ---- creation ----

    fn create_message(&mut self, parent: NodeId, def: MessageDef) -> Result<NodeId, ValidationError> {
        let msg = Message {
            ns: Namespace {
                children: Vec::new(),
                options: def.options,
                syntax: self.syntax,
            },
            fields: Vec::new(),
            oneofs: Vec::new(),
            extension_ranges: def.extensions,
            reserved: def.reserved,
            is_group: def.is_group,
        };
        let id = self.graph.add_node(parent, &def.name, NodeKind::Message(msg))?;

        for oneof in def.oneofs {
            let kind = NodeKind::OneOf(OneOf {
                fields: Vec::new(),
                options: oneof.options,
            });
            self.graph.add_node(id, &oneof.name, kind)?;
        }
        for e in def.enums {
            self.create_enum(id, e)?;
        }
        for nested in def.messages {
            self.create_message(id, nested)?;
        }
        for field in def.fields {
            self.create_field(id, field)?;
        }
        for ext in def.extends {
            self.create_extend(id, ext)?;
        }
        Ok(id)
    }

    fn create_field(&mut self, msg: NodeId, def: FieldDef) -> Result<NodeId, ValidationError> {
        let label = format!("{}.{}", self.graph.fqn(msg), def.name);
        check_id(&label, def.id)?;

        if self
            .graph
            .message(msg)
            .is_some_and(|m| m.accepts_extension(def.id))
        {
            return Err(ValidationError::IdInExtensionRange {
                message: self.graph.fqn(msg),
                field: label,
                id: def.id,
            });
        }
        let syntax = self.graph.syntax_of(msg);
        if def.rule == Rule::Required && syntax == Syntax::Proto3 {
            return Err(ValidationError::RequiredInProto3 {
                message: self.graph.fqn(msg),
                field: def.name,
            });
        }

        let oneof = match &def.oneof {
            Some(name) => {
                let oneof = self
                    .graph
                    .child(msg, name)
                    .filter(|&o| self.graph.oneof(o).is_some())
                    .ok_or_else(|| ValidationError::UnknownOneof {
                        oneof: name.clone(),
                        field: label.clone(),
                    })?;
                if matches!(def.rule, Rule::Repeated | Rule::Map) {
                    return Err(ValidationError::RepeatedInOneof {
                        oneof: self.graph.fqn(oneof),
                        field: label,
                    });
                }
                Some(oneof)
            }
            None => None,
        };

        let name = self.field_name(&def.name);
        let field = self.new_field(def, syntax, oneof, None);
        let id = self.graph.add_node(msg, &name, NodeKind::Field(field))?;
        if let Some(oneof) = oneof {
            if let NodeKind::OneOf(o) = &mut self.graph.node_mut(oneof).kind {
                o.fields.push(id);
            }
        }
        Ok(id)
    }

    fn field_name(&self, declared: &str) -> String {
        if self.graph.options().convert_fields_to_camel_case {
            to_camel_case(declared)
        } else {
            declared.to_string()
        }
    }

    fn new_field(
        &self,
        def: FieldDef,
        syntax: Syntax,
        oneof: Option<NodeId>,
        extension: Option<NodeId>,
    ) -> Field {
        Field {
            rule: def.rule,
            type_name: def.type_name,
            key_type_name: def.key_type,
            id: def.id,
            options: def.options,
            oneof,
            original_name: def.name,
            syntax,
            extension,
            resolved: None,
            key_type: None,
            packed: false,
            default_value: None,
        }
    }

    fn create_enum(&mut self, parent: NodeId, def: EnumDef) -> Result<NodeId, ValidationError> {
        if let Some(existing) = self.graph.child(parent, &def.name) {
            return Err(ValidationError::EnumConflict {
                name: self.graph.fqn(existing),
            });
        }
        let kind = NodeKind::Enum(Enum {
            ns: Namespace {
                children: Vec::new(),
                options: def.options,
                syntax: self.syntax,
            },
        });
        let id = self.graph.add_node(parent, &def.name, kind)?;
        for value in def.values {
            let kind = NodeKind::EnumValue(EnumValue {
                id: value.id,
                options: value.options,
            });
            self.graph.add_node(id, &value.name, kind)?;
        }
        Ok(id)
    }

    fn create_service(&mut self, parent: NodeId, def: ServiceDef) -> Result<NodeId, ValidationError> {
        let kind = NodeKind::Service(Service {
            ns: Namespace {
                children: Vec::new(),
                options: def.options,
                syntax: self.syntax,
            },
        });
        let id = self.graph.add_node(parent, &def.name, kind)?;
        for method in def.methods {
            let kind = NodeKind::Method(Method {
                request_name: method.request,
                response_name: method.response,
                request_stream: method.request_stream,
                response_stream: method.response_stream,
                options: method.options,
                request: None,
                response: None,
            });
            self.graph.add_node(id, &method.name, kind)?;
        }
        Ok(id)
    }

    /// Each extension field becomes an `Extension` node in `parent` that owns
    /// the field node. The target is looked up during resolution.
    fn create_extend(&mut self, parent: NodeId, def: ExtendDef) -> Result<(), ValidationError> {
        for group in def.messages {
            self.create_message(parent, group)?;
        }
        for field_def in def.fields {
            let label = format!("{}.{}", self.graph.fqn(parent), field_def.name);
            check_id(&label, field_def.id)?;

            let name = self.field_name(&field_def.name);
            let ext = self.graph.add_node(
                parent,
                &name,
                NodeKind::Extension(Extension {
                    extendee: def.extendee.clone(),
                    field: parent,
                    target: None,
                }),
            )?;
            let field = self.new_field(field_def, self.syntax, None, Some(ext));
            let fid = self.graph.add_node(ext, &name, NodeKind::Field(field))?;
            if let NodeKind::Extension(e) = &mut self.graph.node_mut(ext).kind {
                e.field = fid;
            }
        }
        Ok(())
    }

    // ---- resolution ----

    fn resolve_field(&self, id: NodeId, field: &Field) -> Result<Update, Error> {
        let graph = &self.graph;
        let label = graph.fqn(id);

        let resolved = match ScalarType::from_name(&field.type_name) {
            Some(scalar) => FieldType::Scalar(scalar),
            None => {
                let target = graph
                    .resolve(graph.scope_of(id), &field.type_name, true)
                    .ok_or_else(|| ResolutionError::UnresolvedType {
                        type_name: field.type_name.clone(),
                        referenced_by: label.clone(),
                    })?;
                match &graph.node(target).kind {
                    NodeKind::Message(m) if m.is_group => FieldType::Group(target),
                    NodeKind::Message(_) => FieldType::Message(target),
                    NodeKind::Enum(_) => FieldType::Enum(target),
                    _ => {
                        return Err(ResolutionError::WrongKind {
                            type_name: field.type_name.clone(),
                            referenced_by: label,
                            expected: "message or enum",
                        }
                        .into())
                    }
                }
            }
        };

        let key_type = match (&field.key_type_name, field.rule) {
            (Some(name), _) => Some(
                ScalarType::from_name(name)
                    .filter(|k| k.is_valid_map_key())
                    .ok_or_else(|| ValidationError::InvalidMapKey {
                        field: label.clone(),
                        key_type: name.clone(),
                    })?,
            ),
            (None, Rule::Map) => {
                return Err(ValidationError::InvalidMapKey {
                    field: label,
                    key_type: String::new(),
                }
                .into())
            }
            (None, _) => None,
        };

        let packed = match field.options.get("packed") {
            None => field.syntax == Syntax::Proto3,
            Some(Constant::Bool(packed)) => *packed,
            Some(other) => {
                return Err(ValidationError::InvalidOption {
                    field: label,
                    option: "packed".to_string(),
                    reason: format!("expected a bool, got {other:?}"),
                }
                .into())
            }
        } && field.is_repeated()
            && resolved.is_packable();

        let default_value = match field.options.get("default") {
            Some(constant) => Some(self.explicit_default(&label, field, resolved, constant)?),
            None if field.rule == Rule::Implicit && field.oneof.is_none() => {
                graph.zero_value(resolved)
            }
            None => None,
        };

        Ok(Update::Field {
            id,
            resolved,
            key_type,
            packed,
            default_value,
        })
    }

    fn explicit_default(
        &self,
        label: &str,
        field: &Field,
        ty: FieldType,
        constant: &Constant,
    ) -> Result<ProtoValue, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidDefault {
            field: label.to_string(),
            reason,
        };
        if field.syntax == Syntax::Proto3 {
            return Err(invalid("explicit defaults are not allowed in proto3".into()));
        }
        if field.is_repeated() || field.is_map() {
            return Err(invalid("repeated fields cannot have a default".into()));
        }

        match ty {
            FieldType::Enum(e) => {
                let id = match constant {
                    Constant::Ident(name) => self.graph.enum_value_by_name(e, name),
                    Constant::Int(v) => i32::try_from(*v)
                        .ok()
                        .filter(|&v| self.graph.enum_has_value(e, v)),
                    _ => None,
                };
                id.map(ProtoValue::Enum).ok_or_else(|| {
                    invalid(format!("{constant:?} is not a value of '{}'", self.graph.fqn(e)))
                })
            }
            FieldType::Scalar(scalar) => {
                let value = constant_value(constant)
                    .ok_or_else(|| invalid(format!("{constant:?} is not a {scalar} constant")))?;
                coerce_scalar(scalar, value).map_err(invalid)
            }
            FieldType::Message(_) | FieldType::Group(_) => {
                Err(invalid("message fields cannot have a default".into()))
            }
        }
    }

    fn resolve_extension(
        &self,
        id: NodeId,
        ext: &Extension,
        table: &mut HashMap<(NodeId, u32), NodeId>,
    ) -> Result<Update, Error> {
        let graph = &self.graph;
        let label = graph.fqn(id);

        let target = match graph.resolve(graph.scope_of(id), &ext.extendee, true) {
            Some(target) => target,
            None if is_descriptor_type(&ext.extendee) => {
                debug!(extension = %label, extendee = %ext.extendee, "skipping extension of a descriptor type");
                return Ok(Update::Extension { id, target: None });
            }
            None => {
                return Err(ResolutionError::UnresolvedType {
                    type_name: ext.extendee.clone(),
                    referenced_by: label,
                }
                .into())
            }
        };
        let msg = graph.message(target).ok_or_else(|| ValidationError::NotExtendable {
            name: graph.fqn(target),
        })?;
        let Some(field) = graph.field(ext.field) else {
            return Ok(Update::Extension { id, target: None });
        };

        if !msg.accepts_extension(field.id) {
            return Err(ValidationError::ExtensionOutOfRange {
                message: graph.fqn(target),
                field: label,
                id: field.id,
            }
            .into());
        }
        let taken = graph
            .message_fields(target)
            .iter()
            .any(|&f| graph.field(f).is_some_and(|own| own.id == field.id));
        if taken || table.contains_key(&(target, field.id)) {
            return Err(ValidationError::DuplicateFieldId {
                message: graph.fqn(target),
                id: field.id,
            }
            .into());
        }
        table.insert((target, field.id), ext.field);
        Ok(Update::Extension {
            id,
            target: Some(target),
        })
    }

    fn resolve_method(&self, id: NodeId, method: &Method) -> Result<Update, Error> {
        let graph = &self.graph;
        let scope = graph.scope_of(id);
        let message = |name: &str| -> Result<NodeId, ResolutionError> {
            let target = graph
                .resolve(scope, name, true)
                .ok_or_else(|| ResolutionError::UnresolvedType {
                    type_name: name.to_string(),
                    referenced_by: graph.fqn(id),
                })?;
            if graph.message(target).is_none() {
                return Err(ResolutionError::WrongKind {
                    type_name: name.to_string(),
                    referenced_by: graph.fqn(id),
                    expected: "message",
                });
            }
            Ok(target)
        };
        Ok(Update::Method {
            id,
            request: message(&method.request_name)?,
            response: message(&method.response_name)?,
        })
    }

    fn apply(&mut self, update: Update) {
        match update {
            Update::Field {
                id,
                resolved,
                key_type,
                packed,
                default_value,
            } => {
                if let NodeKind::Field(field) = &mut self.graph.node_mut(id).kind {
                    field.resolved = Some(resolved);
                    field.key_type = key_type;
                    field.packed = packed;
                    field.default_value = default_value;
                }
            }
            Update::Extension { id, target } => {
                if let NodeKind::Extension(ext) = &mut self.graph.node_mut(id).kind {
                    ext.target = target;
                }
            }
            Update::Method {
                id,
                request,
                response,
            } => {
                if let NodeKind::Method(method) = &mut self.graph.node_mut(id).kind {
                    method.request = Some(request);
                    method.response = Some(response);
                }
            }
        }
    }
}

fn check_id(label: &str, id: u32) -> Result<(), ValidationError> {
    if !(ID_MIN..=ID_MAX).contains(&id) {
        return Err(ValidationError::IdOutOfRange {
            field: label.to_string(),
            id,
        });
    }
    if (RESERVED_ID_START..=RESERVED_ID_END).contains(&id) {
        return Err(ValidationError::ReservedId {
            field: label.to_string(),
            id,
        });
    }
    Ok(())
}

fn is_descriptor_type(name: &str) -> bool {
    name.strip_prefix('.')
        .unwrap_or(name)
        .starts_with("google.protobuf.")
}

fn constant_value(constant: &Constant) -> Option<ProtoValue> {
    match constant {
        Constant::Int(v) => Some(ProtoValue::I64(*v)),
        Constant::Uint(v) => Some(ProtoValue::U64(*v)),
        Constant::Float(v) => Some(ProtoValue::F64(*v)),
        Constant::Str(s) => Some(ProtoValue::String(s.clone())),
        Constant::Bool(b) => Some(ProtoValue::Bool(*b)),
        Constant::Ident(_) | Constant::Aggregate(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(source: &str) -> Builder {
        let mut builder = Builder::new();
        builder.load_proto(source, Some("test.proto")).unwrap();
        builder
    }

    #[test]
    fn test_define_nested_packages() {
        let mut builder = Builder::new();
        builder.define("a.b.c", Options::new()).unwrap();
        builder.reset().define("a.b", Options::new()).unwrap();
        assert!(builder.lookup(".a.b.c").is_some());
        assert_eq!(builder.graph().children(builder.graph().root()).len(), 1);
    }

    #[test]
    fn test_define_through_message_fails() {
        let mut builder = builder("package p; message M {}");
        let err = builder.define("p.M.x", Options::new()).unwrap_err();
        assert!(matches!(err, ValidationError::NotANamespace { .. }));
    }

    #[test]
    fn test_build_requires_resolution() {
        let mut builder = builder("message M { optional int32 a = 1; }");
        assert!(matches!(builder.build(None), Err(BuildError::Unresolved)));
        builder.resolve_all().unwrap();
        assert!(builder.is_resolved());
        assert!(builder.message_type("M").is_ok());
        assert!(matches!(
            builder.build(Some("Missing")),
            Err(BuildError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_invalidates_resolution() {
        let mut builder = builder("message A {}");
        builder.resolve_all().unwrap();
        builder
            .create(vec![Definition::Message(MessageDef::new("B"))])
            .unwrap();
        assert!(!builder.is_resolved());
        builder.resolve_all().unwrap();
        assert!(builder.message_type("B").is_ok());
    }

    #[test]
    fn test_duplicate_import_skipped() {
        let mut builder = builder("message A {}");
        builder
            .load_proto("message A {}", Some("test.proto"))
            .unwrap();
        assert_eq!(builder.files().collect::<Vec<_>>(), vec!["test.proto"]);
    }

    #[test]
    fn test_resolved_field_metadata() {
        let mut builder = builder(
            r#"
            syntax = "proto2";
            enum Color { RED = 1; GREEN = 2; }
            message M {
                optional Color color = 1 [default = GREEN];
                repeated int32 plain = 2;
                repeated int32 packed = 3 [packed = true];
                optional string name = 4 [default = "x"];
            }
            "#,
        );
        builder.resolve_all().unwrap();
        let ty = builder.message_type("M").unwrap();
        assert_eq!(ty.field("color").unwrap().default_value, Some(ProtoValue::Enum(2)));
        assert!(!ty.field("plain").unwrap().packed);
        assert!(ty.field("packed").unwrap().packed);
        assert_eq!(
            ty.field("name").unwrap().default_value,
            Some(ProtoValue::String("x".into()))
        );
    }

    #[test]
    fn test_camel_case_option() {
        let mut builder = Builder::with_options(BuilderOptions::new().camel_case(true));
        builder
            .load_proto("message M { optional int32 foo_bar = 1; }", None)
            .unwrap();
        builder.resolve_all().unwrap();
        let ty = builder.message_type("M").unwrap();
        assert_eq!(ty.field_names(), vec!["fooBar"]);
        assert_eq!(ty.field("fooBar").unwrap().original_name, "foo_bar");
    }

    #[test]
    fn test_import_loader() {
        let mut files = HashMap::new();
        files.insert(
            "common.proto".to_string(),
            "package common; import \"main.proto\"; message Shared { optional int32 v = 1; }"
                .to_string(),
        );
        let mut builder = Builder::new();
        builder
            .load_proto_with(
                "package app; import \"common.proto\"; import \"google/protobuf/descriptor.proto\";
                 message Root { optional common.Shared s = 1; }",
                "main.proto",
                &files,
            )
            .unwrap();
        builder.resolve_all().unwrap();
        assert!(builder.message_type("app.Root").is_ok());
        assert_eq!(builder.files().count(), 2);

        let mut missing = Builder::new();
        let err = missing
            .load_proto_with("import \"nope.proto\";", "x.proto", &files)
            .unwrap_err();
        assert!(matches!(err, Error::Import { ref path, .. } if path == "nope.proto"));
    }
}
