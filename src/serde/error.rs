//! Errors raised while moving data between Rust types and messages.

use std::fmt::Display;

use thiserror::Error;

use crate::error::{DecodeError, EncodeError, ValueError};

#[derive(Debug, Error)]
pub enum SerdeError {
    /// A value does not fit the shape the other side expects.
    #[error("field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// The Rust type has no protobuf counterpart.
    #[error("{0} cannot be represented in a message")]
    UnsupportedType(String),

    /// A message setter rejected a value.
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("decoding failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for SerdeError {
    fn custom<T: Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}

impl serde::de::Error for SerdeError {
    fn custom<T: Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}
