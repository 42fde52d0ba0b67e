/// Process-wide named variable store
///
/// Read and written by Memory Storage nodes, merged into formula and loop
/// condition environments, and exposed through `/api/variables`. Absence of a
/// name and presence with `None` are different states.

use crate::eval::{Environment, Value};
use std::collections::HashMap;

/// Named mapping of values living for the whole process
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    /// Current values by name (case-sensitive)
    values: HashMap<String, Value>,

    /// Name each writer last stored under
    /// Key: writer identity (e.g. a memory node id), Value: variable name
    writers: HashMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite `name`
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Remove a single name, returning its last value
    pub fn clear(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Remove every entry and forget all writers
    pub fn clear_all(&mut self) {
        self.values.clear();
        self.writers.clear();
    }

    /// Names currently present, sorted for stable listings
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of all entries, usable as an evaluator environment
    pub fn snapshot(&self) -> Environment {
        self.values.clone()
    }

    /// Store on behalf of `writer`
    ///
    /// When the writer previously stored under a different name, the old entry
    /// is moved to `name` rather than left behind. A `None` value keeps whatever
    /// is already held (moved or existing). Returns the value now under `name`.
    pub fn store(&mut self, writer: &str, name: &str, value: Option<Value>) -> Option<Value> {
        if let Some(previous) = self.writers.get(writer).filter(|p| p.as_str() != name).cloned() {
            if let Some(moved) = self.values.remove(&previous) {
                tracing::debug!("🔀 Variable renamed by {}: {} -> {}", writer, previous, name);
                self.values.insert(name.to_string(), moved);
            }
        }
        if let Some(value) = value {
            self.values.insert(name.to_string(), value);
        }
        self.writers.insert(writer.to_string(), name.to_string());
        self.values.get(name).cloned()
    }

    /// Forget the value held by `writer`, wherever it was last stored
    pub fn reset_writer(&mut self, writer: &str, name: &str) {
        if let Some(previous) = self.writers.insert(writer.to_string(), name.to_string()) {
            self.values.remove(&previous);
        }
        self.values.remove(name);
    }
}
