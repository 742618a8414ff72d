//! Nested hint execution scopes (spec §4.7 step 1, §6).
//!
//! Hints run with their own Python-like local namespace that can nest
//! (`with vm_enter_scope(): ...`) and unwind; [`ExecutionScopes`] is that
//! namespace stack, keyed by name and holding arbitrary hint-defined values.

use std::any::Any;
use std::collections::HashMap;

use crate::errors::hint_errors::HintError;

/// A stack of variable scopes a hint processor can push/pop as it executes
/// nested hint blocks.
#[derive(Default)]
pub struct ExecutionScopes {
    scopes: Vec<HashMap<String, Box<dyn Any>>>,
}

impl std::fmt::Debug for ExecutionScopes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionScopes")
            .field("depth", &self.scopes.len())
            .finish()
    }
}

impl ExecutionScopes {
    /// Creates a fresh scope stack with a single, empty root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    /// Pushes a new, empty scope.
    pub fn enter_scope(&mut self, new_scope: HashMap<String, Box<dyn Any>>) {
        self.scopes.push(new_scope);
    }

    /// Pops the current scope. Fails if only the root scope remains.
    pub fn exit_scope(&mut self) -> Result<(), HintError> {
        if self.scopes.len() <= 1 {
            return Err(HintError::CustomHint("cannot exit the root scope".into()));
        }
        self.scopes.pop();
        Ok(())
    }

    /// Inserts `value` under `name` in the current (innermost) scope.
    pub fn insert_value<T: Any>(&mut self, name: &str, value: T) {
        self.current_scope_mut().insert(name.to_string(), Box::new(value));
    }

    /// Looks up `name`, searching from the innermost scope outward, and
    /// downcasts it to `T`.
    pub fn get<T: Any>(&self, name: &str) -> Result<&T, HintError> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return value
                    .downcast_ref::<T>()
                    .ok_or_else(|| HintError::VariableNotInScope(name.to_string()));
            }
        }
        Err(HintError::VariableNotInScope(name.to_string()))
    }

    /// Current scope nesting depth (1 at the root).
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn current_scope_mut(&mut self) -> &mut HashMap<String, Box<dyn Any>> {
        self.scopes.last_mut().expect("root scope is never popped")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scope_shadows_and_unwinds() {
        let mut scopes = ExecutionScopes::new();
        scopes.insert_value("x", 1i32);
        scopes.enter_scope(HashMap::new());
        scopes.insert_value("x", 2i32);
        assert_eq!(*scopes.get::<i32>("x").unwrap(), 2);
        scopes.exit_scope().unwrap();
        assert_eq!(*scopes.get::<i32>("x").unwrap(), 1);
    }

    #[test]
    fn exiting_root_scope_fails() {
        let mut scopes = ExecutionScopes::new();
        assert!(scopes.exit_scope().is_err());
    }
}
