//! Scoped loop environment for the Stencil evaluator.

use stencil_types::{Bindings, Value};

/// The loop counter backing `.current`.
#[derive(Debug, Clone)]
struct LoopCounter {
    /// Path of the iterated array, e.g. `users:active`.
    path: String,
    value: usize,
}

/// One running loop: its variables and, for array loops, its counter.
#[derive(Debug, Clone)]
struct Scope {
    bindings: Bindings,
    counter: Option<LoopCounter>,
}

/// Loop variables, innermost scope last.
///
/// Only loops open scopes; template-level variables live in the frame's
/// binding table, which the evaluator consults after this environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope for a loop body. `counter_path` names the iterated array
    /// for array loops.
    pub fn push_scope(&mut self, counter_path: Option<String>) {
        self.scopes.push(Scope {
            bindings: Bindings::new(),
            counter: counter_path.map(|path| LoopCounter { path, value: 0 }),
        });
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Define a variable in the innermost scope.
    pub fn define(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), value);
        }
    }

    /// Set the innermost scope's loop counter.
    pub fn set_counter(&mut self, value: usize) {
        if let Some(counter) = self.scopes.last_mut().and_then(|s| s.counter.as_mut()) {
            counter.value = value;
        }
    }

    /// Look up a variable, searching from innermost to outermost scope.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    /// Update a variable in the first scope where it exists.
    /// Returns `true` if found and updated.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.bindings.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        false
    }

    /// Counter of the innermost running loop over `path`.
    pub fn current(&self, path: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .filter_map(|scope| scope.counter.as_ref())
            .find(|counter| counter.path == path)
            .map(|counter| counter.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows() {
        let mut env = Environment::new();
        env.push_scope(None);
        env.define("v", Value::from(1));
        env.push_scope(None);
        env.define("v", Value::from(2));
        assert_eq!(env.get("v"), Some(&Value::from(2)));
        env.pop_scope();
        assert_eq!(env.get("v"), Some(&Value::from(1)));
        env.pop_scope();
        assert_eq!(env.get("v"), None);
    }

    #[test]
    fn define_without_scope_is_ignored() {
        let mut env = Environment::new();
        env.define("v", Value::from(1));
        assert_eq!(env.get("v"), None);
        assert!(!env.set("v", Value::Null));
    }

    #[test]
    fn counters_resolve_by_path() {
        let mut env = Environment::new();
        env.push_scope(Some("rows".into()));
        env.set_counter(3);
        env.push_scope(Some("cells".into()));
        env.set_counter(1);
        env.push_scope(None);
        assert_eq!(env.current("rows"), Some(3));
        assert_eq!(env.current("cells"), Some(1));
        assert_eq!(env.current("other"), None);
    }

    #[test]
    fn nested_loop_over_same_path_uses_innermost() {
        let mut env = Environment::new();
        env.push_scope(Some("a".into()));
        env.set_counter(5);
        env.push_scope(Some("a".into()));
        env.set_counter(0);
        assert_eq!(env.current("a"), Some(0));
    }
}
