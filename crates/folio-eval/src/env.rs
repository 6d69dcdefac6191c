//! Scoped variable environment for the Folio evaluator.

use crate::value::{MapRef, Value};
use indexmap::IndexMap;

/// Scoped variable environment with push/pop semantics.
///
/// The outermost scope is the page scope, shared by every lifecycle hook of
/// a page. Variables are looked up from the innermost scope outward.
/// `define` creates in the innermost scope; `assign` updates the first scope
/// where the variable exists and otherwise creates a page binding.
#[derive(Debug)]
pub struct Environment {
    page: MapRef,
    scopes: Vec<IndexMap<String, Value>>,
}

impl Environment {
    /// Create an environment over a page scope.
    pub fn new(page: MapRef) -> Self {
        Self {
            page,
            scopes: Vec::new(),
        }
    }

    /// Push a new scope (loop bodies, function calls).
    pub fn push_scope(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    /// Pop the innermost scope. The page scope is never popped.
    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Define a variable in the innermost scope.
    pub fn define(&mut self, name: &str, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => {
                self.page.borrow_mut().insert(name.to_string(), value);
            }
        }
    }

    /// Look up a variable, searching from innermost to outermost scope.
    pub fn get(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v.clone());
            }
        }
        self.page.borrow().get(name).cloned()
    }

    /// Update the nearest existing binding, or create a page binding.
    pub fn assign(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.page.borrow_mut().insert(name.to_string(), value);
    }

    /// Bind directly in the page scope.
    pub fn define_page(&mut self, name: &str, value: Value) {
        self.page.borrow_mut().insert(name.to_string(), value);
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}
