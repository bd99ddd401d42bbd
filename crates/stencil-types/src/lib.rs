//! Shared types for the Stencil template engine.
//!
//! This crate defines the AST node types, source spans, error types,
//! and the runtime [`Value`] model used across all stages.

mod error;
mod span;
pub mod ast;
pub mod value;

pub use error::{CompileErrors, ErrorCategory, ErrorCode, StencilError, MAX_ERRORS};
pub use span::{SourceFile, Span};
pub use value::{format_number, Bindings, TemplateObject, Value};

/// Result type used throughout the Stencil compiler.
pub type Result<T> = std::result::Result<T, StencilError>;
