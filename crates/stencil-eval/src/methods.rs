//! The allowed-method registry.

use std::collections::BTreeSet;

/// Method name that allows every method of an object.
pub const ANY_METHOD: &str = "*";

/// Set of `(object, method)` pairs templates may call.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    allowed: BTreeSet<(String, String)>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `object.method()`. Pass [`ANY_METHOD`] to allow all methods.
    pub fn allow(&mut self, object: &str, method: &str) {
        self.allowed.insert((object.to_string(), method.to_string()));
    }

    pub fn is_allowed(&self, object: &str, method: &str) -> bool {
        [method, ANY_METHOD]
            .iter()
            .any(|m| self.allowed.contains(&(object.to_string(), m.to_string())))
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}
