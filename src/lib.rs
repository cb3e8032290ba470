//! Protodyn: dynamic Protocol Buffers for Rust.
//!
//! Schemas are read from `.proto` text at runtime (proto2 and proto3), turned
//! into a resolved type graph, and used to build, inspect, encode and decode
//! messages without generated code.
//!
//! # Quick Start
//!
//! ```rust
//! let builder = protodyn::load_proto(r#"
//!     syntax = "proto3";
//!     package demo;
//!     message Person {
//!         string name = 1;
//!         int32 age = 2;
//!         repeated string emails = 3;
//!     }
//! "#).unwrap();
//!
//! let person_type = builder.message_type("demo.Person").unwrap();
//! let mut person = person_type.new_message();
//! person.set("name", "Alice").unwrap();
//! person.set("age", 30).unwrap();
//! person.add("emails", "alice@example.com").unwrap();
//!
//! let encoded = person.encode().unwrap();
//! let decoded = person_type.decode(&encoded).unwrap();
//! assert_eq!(person, decoded);
//! ```

pub mod builder;
pub mod codec;
pub mod error;
pub mod map;
pub mod message;
pub mod options;
pub mod parser;
pub mod reflect;
pub mod runtime;
pub mod types;
pub mod value;

#[cfg(feature = "serde")]
pub mod serde;

pub use builder::{Builder, ImportLoader};
pub use error::{
    BuildError, DecodeError, EncodeError, Error, ParseError, ResolutionError, Result,
    ValidationError, ValueError,
};
pub use map::ProtoMap;
pub use message::{DynamicMessage, MessageType};
pub use options::BuilderOptions;
pub use reflect::{Graph, NodeId};
pub use runtime::{EnumType, MethodInfo, NamespaceType, Runtime, ServiceType};
pub use types::{FieldType, ScalarType};
pub use value::ProtoValue;

/// Parse a single `.proto` source, import it into a fresh [`Builder`] and
/// resolve it.
pub fn load_proto(source: &str) -> Result<Builder> {
    let mut builder = Builder::new();
    builder.load_proto(source, None)?.resolve_all()?;
    Ok(builder)
}
