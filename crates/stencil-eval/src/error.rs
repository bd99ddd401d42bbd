//! Render error types for the Stencil runtime.

use std::path::PathBuf;
use stencil_types::CompileErrors;
use thiserror::Error;

/// A render failure. Every variant aborts the render that raised it; nothing
/// is retried and partial output is discarded.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template source does not compile. The message names the template
    /// and the first offending fragment.
    #[error("template '{template}' failed to compile: {errors}")]
    Compile {
        template: String,
        errors: CompileErrors,
    },

    /// A method call that is not on the whitelist was executed.
    #[error("calling {object}.{method}() is not allowed (template '{template}')")]
    MethodNotAllowed {
        object: String,
        method: String,
        template: String,
    },

    /// A host object reported a failure from one of its methods.
    #[error("{object}.{method}() failed: {message}")]
    MethodFailed {
        object: String,
        method: String,
        message: String,
    },

    /// A template included itself directly.
    #[error("template '{template}' includes itself")]
    SelfInclusion { template: String },

    /// Nested includes went deeper than `max_include_depth`.
    #[error("include depth {depth} exceeded while entering '{template}'")]
    IncludeDepthExceeded { template: String, depth: usize },

    /// The template file does not exist.
    #[error("template '{path}' does not exist")]
    MissingTemplate { path: String },

    /// `/` or `%` with a zero right-hand side.
    #[error("division by zero in template '{template}'")]
    DivisionByZero { template: String },

    /// `render(None, ..)` or `bind_variable` without a selected template.
    #[error("no template selected")]
    NoTemplateSelected,

    /// The template file exists but could not be read.
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result alias for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
