//! Stencil compiler: orchestrates the compilation pipeline and persists the
//! result.
//!
//! ```text
//! Template source → Lexer → Parser → Template AST → CompiledUnit → .stc cache file
//! ```

mod cache;
mod error;
mod unit;

pub use cache::{cache_file_name, UnitCache, CACHE_EXTENSION};
pub use error::CacheError;
pub use unit::{modified_ns, source_fingerprint, CompiledUnit, FORMAT_VERSION};

use stencil_lexer::Lexer;
use stencil_parser::{ParseOptions, Parser};
use stencil_types::ast::Template;
use stencil_types::{CompileErrors, SourceFile};

/// Compilation options.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// `{include ...}` is a compile error when false.
    pub allow_includes: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            allow_includes: true,
        }
    }
}

/// Compile a file template (includes allowed).
pub fn compile(name: &str, source: &str) -> Result<Template, CompileErrors> {
    compile_with(name, source, CompileOptions::default())
}

/// Compile template source into its AST, collecting every diagnostic from
/// both the lexer and the parser.
pub fn compile_with(
    name: &str,
    source: &str,
    options: CompileOptions,
) -> Result<Template, CompileErrors> {
    let source_file = SourceFile::new(name, source);

    let lex = Lexer::new(&source_file).lex();
    let mut errors = lex.errors;

    let parse = Parser::with_options(
        lex.tokens,
        &source_file,
        ParseOptions {
            allow_includes: options.allow_includes,
        },
    )
    .parse();
    errors.extend(parse.errors);

    match parse.template {
        Some(template) if !errors.has_errors() => {
            tracing::debug!(template = name, nodes = template.nodes.len(), "compiled template");
            Ok(template)
        }
        _ => {
            tracing::debug!(template = name, errors = errors.total_errors, "template failed to compile");
            Err(errors)
        }
    }
}
