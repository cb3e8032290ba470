//! Schema description: the parsed form of a `.proto` file.
//!
//! These types are plain data. The builder consumes them to populate the type
//! graph; they can also be constructed directly (or deserialized, with the
//! `serde` feature) by adapters that obtain schemas from elsewhere.

use std::collections::BTreeMap;
use std::fmt;

/// Option name to value. A repeated option keeps the last value.
pub type Options = BTreeMap<String, Constant>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Proto2 => f.write_str("proto2"),
            Syntax::Proto3 => f.write_str("proto3"),
        }
    }
}

/// Field cardinality as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rule {
    Required,
    Optional,
    Repeated,
    /// `map<K, V>` fields.
    Map,
    /// proto3 field declared without a label: implicit presence.
    Implicit,
}

/// A constant appearing in an option or default value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Ident(String),
    Int(i64),
    /// Integers above `i64::MAX`.
    Uint(u64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// Text-format aggregate value `{ name: value ... }`.
    Aggregate(Vec<(String, Constant)>),
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtoFile {
    pub syntax: Syntax,
    pub package: Option<String>,
    pub imports: Vec<String>,
    pub options: Options,
    pub messages: Vec<MessageDef>,
    pub enums: Vec<EnumDef>,
    pub services: Vec<ServiceDef>,
    pub extends: Vec<ExtendDef>,
}

impl ProtoFile {
    /// Top-level definitions in the order the builder creates them.
    pub fn definitions(&self) -> Vec<Definition> {
        let mut defs = Vec::with_capacity(
            self.messages.len() + self.enums.len() + self.services.len() + self.extends.len(),
        );
        defs.extend(self.messages.iter().cloned().map(Definition::Message));
        defs.extend(self.enums.iter().cloned().map(Definition::Enum));
        defs.extend(self.services.iter().cloned().map(Definition::Service));
        defs.extend(self.extends.iter().cloned().map(Definition::Extend));
        defs
    }
}

/// A definition that can be handed to `Builder::create`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Definition {
    Message(MessageDef),
    Enum(EnumDef),
    Service(ServiceDef),
    Extend(ExtendDef),
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageDef {
    pub name: String,
    pub is_group: bool,
    pub fields: Vec<FieldDef>,
    pub oneofs: Vec<OneOfDef>,
    pub enums: Vec<EnumDef>,
    pub messages: Vec<MessageDef>,
    pub extends: Vec<ExtendDef>,
    pub options: Options,
    /// Inclusive extension id ranges.
    pub extensions: Vec<(u32, u32)>,
    pub reserved: Vec<Reserved>,
    pub line: usize,
}

impl MessageDef {
    pub fn new(name: impl Into<String>) -> Self {
        MessageDef {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub rule: Rule,
    pub type_name: String,
    /// Key type of a `map<K, V>` field.
    pub key_type: Option<String>,
    pub name: String,
    pub id: u32,
    pub options: Options,
    /// Name of the enclosing oneof, if any.
    pub oneof: Option<String>,
    pub line: usize,
}

impl FieldDef {
    pub fn new(rule: Rule, type_name: impl Into<String>, name: impl Into<String>, id: u32) -> Self {
        FieldDef {
            rule,
            type_name: type_name.into(),
            key_type: None,
            name: name.into(),
            id,
            options: Options::new(),
            oneof: None,
            line: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OneOfDef {
    pub name: String,
    pub options: Options,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<EnumValueDef>,
    pub options: Options,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumValueDef {
    pub name: String,
    pub id: i32,
    pub options: Options,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceDef {
    pub name: String,
    pub methods: Vec<MethodDef>,
    pub options: Options,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodDef {
    pub name: String,
    pub request: String,
    pub response: String,
    pub request_stream: bool,
    pub response_stream: bool,
    pub options: Options,
}

/// An `extend Target { ... }` block.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtendDef {
    pub extendee: String,
    pub fields: Vec<FieldDef>,
    /// Group bodies declared inside the extend block.
    pub messages: Vec<MessageDef>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reserved {
    Range(u32, u32),
    Name(String),
}
