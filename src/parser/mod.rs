pub mod ast;
pub mod grammar;
pub mod lexer;

use crate::error::ParseError;
use ast::ProtoFile;

/// Parse `.proto` source text into a schema description.
///
/// This is the main entry point for the parser module. The result still has to
/// be handed to a [`Builder`](crate::Builder) to become a usable type graph.
pub fn parse(source: &str) -> Result<ProtoFile, ParseError> {
    grammar::parse_schema(source)
}
