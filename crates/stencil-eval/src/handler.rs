//! The template handler: bindings, selection, method whitelist and unit
//! loading.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::sync::{Arc, Once};

use serde::Serialize;
use stencil_compiler::{compile, compile_with, modified_ns, CompileOptions, CompiledUnit, UnitCache};
use stencil_types::{Bindings, Value};

use crate::config::HandlerConfig;
use crate::error::{RenderError, RenderResult};
use crate::evaluator::{Evaluator, Frame};
use crate::methods::MethodRegistry;

/// Name reported for templates rendered from a string.
pub const INLINE_TEMPLATE: &str = "<string>";

static CACHE_WRITE_WARNING: Once = Once::new();

/// A template path plus an instance number, so one file can be rendered
/// several times with independent bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TemplateId {
    pub path: String,
    pub number: u32,
}

impl TemplateId {
    pub fn new(path: impl Into<String>, number: u32) -> Self {
        Self {
            path: path.into(),
            number,
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path, self.number)
    }
}

/// Where compiled units came from, counted over the handler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Sources compiled.
    pub compiles: u64,
    /// Fresh units read from the cache directory.
    pub disk_hits: u64,
    /// Fresh units reused from memory.
    pub memory_hits: u64,
}

/// Renders templates and owns every piece of mutable render state.
///
/// ```no_run
/// use stencil_eval::{Handler, HandlerConfig};
///
/// let mut handler = Handler::new(HandlerConfig::new("templates").with_cache_dir("cache"));
/// handler.select_template("page.htm", 0);
/// handler.bind_variable("title", "Welcome").unwrap();
/// let html = handler.render(None, false, None).unwrap();
/// ```
#[derive(Debug)]
pub struct Handler {
    config: HandlerConfig,
    cache: Option<UnitCache>,
    units: HashMap<String, Arc<CompiledUnit>>,
    bindings: HashMap<TemplateId, Bindings>,
    globals: Bindings,
    methods: MethodRegistry,
    selection: Vec<TemplateId>,
    /// Paths of the templates currently executing, outermost first.
    call_stack: Vec<String>,
    stats: CacheStats,
}

impl Handler {
    pub fn new(config: HandlerConfig) -> Self {
        let cache = config.cache_dir.clone().map(UnitCache::new);
        Self {
            config,
            cache,
            units: HashMap::new(),
            bindings: HashMap::new(),
            globals: Bindings::new(),
            methods: MethodRegistry::new(),
            selection: Vec::new(),
            call_stack: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    // ── Selection ─────────────────────────────────────────────────────────

    /// Make `(path, number)` the current template, creating its binding
    /// table on first use.
    pub fn select_template(&mut self, path: &str, number: u32) {
        let id = TemplateId::new(path, number);
        self.bindings.entry(id.clone()).or_default();
        self.selection.push(id);
    }

    /// Return to the previously selected template.
    pub fn restore_template(&mut self) -> Option<TemplateId> {
        self.selection.pop()
    }

    pub fn current_template(&self) -> Option<&TemplateId> {
        self.selection.last()
    }

    // ── Bindings ──────────────────────────────────────────────────────────

    /// Bind a variable visible to every template.
    pub fn bind_global(&mut self, name: &str, value: impl Into<Value>) {
        self.globals.insert(name.to_string(), value.into());
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Bind a variable in the current template.
    pub fn bind_variable(&mut self, name: &str, value: impl Into<Value>) -> RenderResult<()> {
        let id = self
            .selection
            .last()
            .cloned()
            .ok_or(RenderError::NoTemplateSelected)?;
        self.frame_bindings_mut(&id)
            .insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn bind_variable_at(&mut self, path: &str, number: u32, name: &str, value: impl Into<Value>) {
        let id = TemplateId::new(path, number);
        self.frame_bindings_mut(&id)
            .insert(name.to_string(), value.into());
    }

    /// A variable of `(path, number)`, including values written by `SET`.
    pub fn variable(&self, path: &str, number: u32, name: &str) -> Option<&Value> {
        self.frame_bindings(&TemplateId::new(path, number))?.get(name)
    }

    pub fn clear_variables(&mut self, path: &str, number: u32) {
        if let Some(bindings) = self.bindings.get_mut(&TemplateId::new(path, number)) {
            bindings.clear();
        }
    }

    pub(crate) fn frame_bindings(&self, id: &TemplateId) -> Option<&Bindings> {
        self.bindings.get(id)
    }

    pub(crate) fn frame_bindings_mut(&mut self, id: &TemplateId) -> &mut Bindings {
        self.bindings.entry(id.clone()).or_default()
    }

    // ── Methods ───────────────────────────────────────────────────────────

    /// Allow templates to call `object.method()`; `"*"` allows every method.
    pub fn allow_method(&mut self, object: &str, method: &str) {
        self.methods.allow(object, method);
    }

    /// Whether a call would pass the whitelist. Always true when
    /// `limit_method_calls` is off.
    pub fn is_method_allowed(&self, object: &str, method: &str) -> bool {
        !self.config.limit_method_calls || self.methods.is_allowed(object, method)
    }

    // ── Rendering ─────────────────────────────────────────────────────────

    /// Render a template.
    ///
    /// With a path, `(path, number or 0)` is selected first and, when
    /// `restore` is set, the previous selection is restored afterwards. Without
    /// a path the current selection is rendered; `number` then picks another
    /// instance of the same file.
    pub fn render(&mut self, path: Option<&str>, restore: bool, number: Option<u32>) -> RenderResult<String> {
        match path {
            Some(path) => {
                self.select_template(path, number.unwrap_or(0));
                let id = TemplateId::new(path, number.unwrap_or(0));
                let result = self.execute(id);
                if restore {
                    self.restore_template();
                }
                result
            }
            None => {
                let mut id = self
                    .current_template()
                    .cloned()
                    .ok_or(RenderError::NoTemplateSelected)?;
                if let Some(number) = number {
                    id.number = number;
                }
                self.execute(id)
            }
        }
    }

    /// Render `path` as instance 0 and restore the selection afterwards.
    pub fn render_template(&mut self, path: &str) -> RenderResult<String> {
        self.render(Some(path), true, None)
    }

    /// Render template source that does not come from a file. Includes are
    /// rejected at compile time; `SET` writes only affect this render.
    pub fn render_string(&mut self, source: &str, bindings: &Bindings) -> RenderResult<String> {
        let options = CompileOptions {
            allow_includes: false,
        };
        let template =
            compile_with(INLINE_TEMPLATE, source, options).map_err(|errors| RenderError::Compile {
                template: INLINE_TEMPLATE.to_string(),
                errors,
            })?;
        Evaluator::new(self, Frame::Inline(bindings.clone()), INLINE_TEMPLATE).render(&template.nodes)
    }

    /// Run one template invocation on top of the call stack.
    pub(crate) fn execute(&mut self, id: TemplateId) -> RenderResult<String> {
        if self.call_stack.last() == Some(&id.path) {
            return Err(RenderError::SelfInclusion { template: id.path });
        }
        if self.call_stack.len() >= self.config.max_include_depth {
            return Err(RenderError::IncludeDepthExceeded {
                template: id.path,
                depth: self.call_stack.len(),
            });
        }
        let unit = self.load_unit(&id.path)?;

        self.call_stack.push(id.path.clone());
        let template = id.path.clone();
        let result = Evaluator::new(self, Frame::Template(id), template).render(&unit.template.nodes);
        self.call_stack.pop();
        result
    }

    // ── Units ─────────────────────────────────────────────────────────────

    /// A fresh compiled unit for `path`: memory, then the cache directory,
    /// then a new compile. A stale unit whose source text is unchanged (the
    /// file was only touched) is refreshed instead of recompiled.
    fn load_unit(&mut self, path: &str) -> RenderResult<Arc<CompiledUnit>> {
        let source_path = self.config.template_dir.join(path);
        let missing = |e: std::io::Error| match e.kind() {
            ErrorKind::NotFound => RenderError::MissingTemplate {
                path: path.to_string(),
            },
            _ => RenderError::Io {
                path: source_path.clone(),
                source: e,
            },
        };
        let mtime = modified_ns(&fs::metadata(&source_path).map_err(missing)?);

        let in_memory = self.units.get(path).cloned();
        if let Some(unit) = in_memory.as_ref().filter(|u| u.is_fresh(mtime)) {
            self.stats.memory_hits += 1;
            tracing::debug!(template = path, "compiled unit reused from memory");
            return Ok(Arc::clone(unit));
        }

        let on_disk = self.load_cached(path);
        if let Some(unit) = on_disk.as_ref().filter(|u| u.is_fresh(mtime)) {
            self.stats.disk_hits += 1;
            tracing::debug!(template = path, "compiled unit read from cache");
            let unit = Arc::new(unit.clone());
            self.units.insert(path.to_string(), Arc::clone(&unit));
            return Ok(unit);
        }

        let source = fs::read_to_string(&source_path).map_err(missing)?;
        let unchanged = match (in_memory, on_disk) {
            (Some(unit), _) if unit.matches_source(&source) => {
                self.stats.memory_hits += 1;
                Some(CompiledUnit::clone(&unit))
            }
            (_, Some(unit)) if unit.matches_source(&source) => {
                self.stats.disk_hits += 1;
                Some(unit)
            }
            _ => None,
        };

        let unit = match unchanged {
            Some(mut unit) => {
                tracing::debug!(template = path, "source touched but unchanged; unit refreshed");
                unit.source_mtime_ns = mtime;
                unit
            }
            None => {
                let template = compile(path, &source).map_err(|errors| RenderError::Compile {
                    template: path.to_string(),
                    errors,
                })?;
                self.stats.compiles += 1;
                CompiledUnit::new(path, &source, mtime, template)
            }
        };

        let unit = Arc::new(unit);
        self.persist(&unit);
        self.units.insert(path.to_string(), Arc::clone(&unit));
        Ok(unit)
    }

    /// The stored unit for `path`, fresh or not. Unreadable entries count as
    /// absent.
    fn load_cached(&self, path: &str) -> Option<CompiledUnit> {
        let cache = self.cache.as_ref()?;
        match cache.load(path) {
            Ok(unit) => unit,
            Err(e) => {
                tracing::debug!(template = path, error = %e, "unreadable cache entry treated as absent");
                None
            }
        }
    }

    /// Write a unit to the cache directory. A failure only costs the next
    /// process a recompile, so it is reported once and otherwise ignored.
    fn persist(&self, unit: &CompiledUnit) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.store(unit) {
            CACHE_WRITE_WARNING.call_once(|| {
                tracing::warn!(
                    cache_dir = %cache.dir().display(),
                    error = %e,
                    "template cache is not writable; compiled units are kept in memory only"
                );
            });
        }
    }
}
