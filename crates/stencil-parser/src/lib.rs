//! Stencil parser: converts a token stream into a template AST.

mod parse_expr;
mod parse_node;
mod parser;

pub use parser::{ParseOptions, ParseResult, Parser, MAX_BLOCK_DEPTH, MAX_GROUP_DEPTH};
