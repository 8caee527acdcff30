//! Execution context: the task-scoped binding map threaded through every
//! sandbox call.
//!
//! The context is owned by the reasoning loop, never by the sandbox, and is
//! mutated only after an evaluation fully succeeds. One task owns exactly one
//! context; parallel tasks must each own their own instance, so no locking is
//! carried here.

use std::collections::{HashMap, HashSet};

use super::expression::Value;

/// Binding updated after every successful evaluation.
pub const LAST_RESULT: &str = "last_result";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    bindings: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Names the validator should treat as bound.
    pub fn known_names(&self) -> HashSet<String> {
        self.bindings.keys().cloned().collect()
    }

    pub fn last_result(&self) -> Option<&Value> {
        self.bindings.get(LAST_RESULT)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
