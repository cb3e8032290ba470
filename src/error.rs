use crate::codec::wire::WireType;
use crate::message::DynamicMessage;

/// Errors from the `.proto` tokenizer and parser.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unterminated string literal at line {line}")]
    UnterminatedString { line: usize },

    #[error("illegal character '{ch}' at line {line}")]
    IllegalCharacter { line: usize, ch: char },
}

impl ParseError {
    /// Source line the error was reported at.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Syntax { line, .. }
            | ParseError::UnterminatedString { line }
            | ParseError::IllegalCharacter { line, .. } => *line,
        }
    }
}

/// Structural errors detected while adding definitions to the type graph.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate name '{name}' in '{namespace}'")]
    DuplicateName { namespace: String, name: String },

    #[error("duplicate field id {id} in message '{message}'")]
    DuplicateFieldId { message: String, id: u32 },

    #[error("field '{field}' has id {id}, which is outside 1..=536870911")]
    IdOutOfRange { field: String, id: u32 },

    #[error("field '{field}' has id {id}, which lies in the reserved range 19000..=19999")]
    ReservedId { field: String, id: u32 },

    #[error("field '{field}' id {id} overlaps an extension range of '{message}'")]
    IdInExtensionRange {
        message: String,
        field: String,
        id: u32,
    },

    #[error("extension '{field}' id {id} is outside the extension ranges of '{message}'")]
    ExtensionOutOfRange {
        message: String,
        field: String,
        id: u32,
    },

    #[error("oneof '{oneof}' contains repeated field '{field}'")]
    RepeatedInOneof { oneof: String, field: String },

    #[error("proto3 message '{message}' declares required field '{field}'")]
    RequiredInProto3 { message: String, field: String },

    #[error("enum '{name}' conflicts with an existing definition")]
    EnumConflict { name: String },

    #[error("invalid default value for field '{field}': {reason}")]
    InvalidDefault { field: String, reason: String },

    #[error("invalid value for option '{option}' on '{field}': {reason}")]
    InvalidOption {
        field: String,
        option: String,
        reason: String,
    },

    #[error("invalid map key type '{key_type}' for field '{field}'")]
    InvalidMapKey { field: String, key_type: String },

    #[error("'{name}' is not a message and cannot be extended")]
    NotExtendable { name: String },

    #[error("unknown oneof '{oneof}' referenced by field '{field}'")]
    UnknownOneof { oneof: String, field: String },

    #[error("cannot define package '{package}': '{name}' is not a namespace")]
    NotANamespace { package: String, name: String },
}

/// Errors from resolving type references.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("unresolvable type reference '{type_name}' in '{referenced_by}'")]
    UnresolvedType {
        type_name: String,
        referenced_by: String,
    },

    #[error("'{type_name}' referenced by '{referenced_by}' is not a {expected}")]
    WrongKind {
        type_name: String,
        referenced_by: String,
        expected: &'static str,
    },
}

/// Errors from producing runtime types.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("cannot build an unresolved type graph")]
    Unresolved,

    #[error("no such type or namespace '{0}'")]
    NotFound(String),

    #[error("'{path}' is not a {expected}")]
    WrongKind { path: String, expected: &'static str },
}

/// Errors from message accessors.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("message '{message}' has no field '{field}'")]
    NoSuchField { message: String, field: String },

    #[error("illegal value for field '{field}': {reason}")]
    IllegalValue { field: String, reason: String },

    #[error("field '{field}' is not repeated")]
    NotRepeated { field: String },

    #[error("field '{field}' is not a map")]
    NotAMap { field: String },
}

/// Errors from the binary encoder.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("type mismatch for field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("field '{0}' has no resolved type")]
    UnresolvedField(String),

    /// Required fields were absent. `encoded` holds everything that could be written.
    #[error("missing required field(s): {}", .missing.join(", "))]
    MissingRequired { missing: Vec<String>, encoded: Vec<u8> },
}

impl EncodeError {
    /// Bytes produced before the missing required fields were detected.
    pub fn partial(&self) -> Option<&[u8]> {
        match self {
            EncodeError::MissingRequired { encoded, .. } => Some(encoded),
            _ => None,
        }
    }

    pub fn into_partial(self) -> Option<Vec<u8>> {
        match self {
            EncodeError::MissingRequired { encoded, .. } => Some(encoded),
            _ => None,
        }
    }
}

/// Errors from the binary decoder.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated data: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("wire type mismatch for field '{field}': expected {expected:?}, got {actual:?}")]
    WireTypeMismatch {
        field: String,
        expected: WireType,
        actual: WireType,
    },

    #[error("invalid utf-8 string in field '{field}': {source}")]
    InvalidUtf8 {
        field: String,
        source: std::string::FromUtf8Error,
    },

    /// Required fields were absent. `decoded` holds the message as far as it was read.
    /// `consumed` is set by delimited decoding to the size of the whole frame.
    #[error("missing required field(s): {}", .missing.join(", "))]
    MissingRequired {
        missing: Vec<String>,
        decoded: Box<DynamicMessage>,
        consumed: Option<usize>,
    },
}

impl DecodeError {
    /// The partially decoded message, when required fields were missing.
    pub fn partial(&self) -> Option<&DynamicMessage> {
        match self {
            DecodeError::MissingRequired { decoded, .. } => Some(decoded),
            _ => None,
        }
    }

    pub fn into_partial(self) -> Option<DynamicMessage> {
        match self {
            DecodeError::MissingRequired { decoded, .. } => Some(*decoded),
            _ => None,
        }
    }

    /// Bytes of input the partial message occupied, when decoded from a
    /// length-prefixed frame.
    pub fn consumed(&self) -> Option<usize> {
        match self {
            DecodeError::MissingRequired { consumed, .. } => *consumed,
            _ => None,
        }
    }
}

/// Top-level error type for the protodyn crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("cannot load import '{path}' requested by '{importer}'")]
    Import { path: String, importer: String },
}

pub type Result<T> = std::result::Result<T, Error>;
