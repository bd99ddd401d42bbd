//! Stencil runtime: the template [`Handler`] and its tree-walking evaluator.
//!
//! The handler owns all render state (per-template bindings, globals, the
//! method whitelist, the selection and call stacks, compiled units) and is
//! passed by `&mut` through evaluation, so nothing is shared implicitly
//! between handlers.

mod config;
mod env;
mod error;
mod evaluator;
mod handler;
mod methods;

pub use config::{ConfigError, HandlerConfig};
pub use error::{RenderError, RenderResult};
pub use handler::{CacheStats, Handler, TemplateId, INLINE_TEMPLATE};
pub use methods::{MethodRegistry, ANY_METHOD};

pub use stencil_types::{Bindings, TemplateObject, Value};
