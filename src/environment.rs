//! Lexical scope chain.
//!
//! An `Environment` is a node in a tree rooted at the global scope. Child
//! scopes hold a strong reference to their parent; closures hold a strong
//! reference to whatever scope they were created in. This can form
//! reference cycles (a closure stored back into the scope that captured
//! it) which are accepted as a bounded per-process leak rather than
//! mitigated with `Weak` back-references, since each script run is a
//! short-lived process (see DESIGN.md).

use crate::error::ScopeError;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Shared handle to an [`Environment`] node.
pub type EnvHandle = Rc<RefCell<Environment>>;

/// A single lexical scope.
#[derive(Debug)]
pub struct Environment {
    parent: Option<EnvHandle>,
    bindings: HashMap<String, Value>,
    const_names: HashSet<String>,
    module_exports: Option<HashMap<String, Value>>,
}

impl Environment {
    /// Creates a fresh root environment with no parent.
    pub fn root() -> EnvHandle {
        Rc::new(RefCell::new(Environment {
            parent: None,
            bindings: HashMap::new(),
            const_names: HashSet::new(),
            module_exports: None,
        }))
    }

    /// Creates a child scope of `parent`.
    pub fn child(parent: &EnvHandle) -> EnvHandle {
        Rc::new(RefCell::new(Environment {
            parent: Some(Rc::clone(parent)),
            bindings: HashMap::new(),
            const_names: HashSet::new(),
            module_exports: None,
        }))
    }

    /// Creates a child scope of `parent` that additionally owns a module
    /// export table (used for the environment a module body evaluates in).
    pub fn module_child(parent: &EnvHandle) -> EnvHandle {
        Rc::new(RefCell::new(Environment {
            parent: Some(Rc::clone(parent)),
            bindings: HashMap::new(),
            const_names: HashSet::new(),
            module_exports: Some(HashMap::new()),
        }))
    }

    /// Declares `name` in this scope. Fatal if already declared here.
    pub fn declare_var(&mut self, name: &str, value: Value, is_const: bool) -> Result<(), ScopeError> {
        if self.bindings.contains_key(name) {
            return Err(ScopeError::AlreadyDeclared { name: name.to_string() });
        }
        self.bindings.insert(name.to_string(), value);
        if is_const {
            self.const_names.insert(name.to_string());
        }
        Ok(())
    }

    /// True if `name` is bound in this exact scope (not an ancestor).
    pub fn has_own_binding(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Returns true if `name` is bound somewhere in `env`'s ancestor chain.
pub fn has_binding(env: &EnvHandle, name: &str) -> bool {
    resolve(env, name).is_some()
}

/// Walks toward the root, returning the first environment node that owns
/// `name`, or `None`.
pub fn resolve(env: &EnvHandle, name: &str) -> Option<EnvHandle> {
    let mut current = Rc::clone(env);
    loop {
        if current.borrow().bindings.contains_key(name) {
            return Some(current);
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return None,
        }
    }
}

/// Declares `name` in `env`'s own scope.
pub fn declare_var(env: &EnvHandle, name: &str, value: Value, is_const: bool) -> Result<(), ScopeError> {
    env.borrow_mut().declare_var(name, value, is_const)
}

/// Looks up `name` by walking toward the root; fatal if unbound anywhere.
pub fn lookup_var(env: &EnvHandle, name: &str) -> Result<Value, ScopeError> {
    let owner = resolve(env, name).ok_or_else(|| ScopeError::UndefinedVariable { name: name.to_string() })?;
    Ok(owner.borrow().bindings.get(name).cloned().expect("resolve guarantees presence"))
}

/// Assigns to the nearest binding named `name`; fatal if unbound or const.
pub fn assign_var(env: &EnvHandle, name: &str, value: Value) -> Result<(), ScopeError> {
    let owner = resolve(env, name).ok_or_else(|| ScopeError::UndefinedVariable { name: name.to_string() })?;
    let mut owner_mut = owner.borrow_mut();
    if owner_mut.const_names.contains(name) {
        return Err(ScopeError::AssignToConst { name: name.to_string() });
    }
    owner_mut.bindings.insert(name.to_string(), value);
    Ok(())
}

/// Removes the nearest binding named `name`, if any. Silent if absent.
pub fn remove_var(env: &EnvHandle, name: &str) {
    if let Some(owner) = resolve(env, name) {
        let mut owner_mut = owner.borrow_mut();
        owner_mut.bindings.remove(name);
        owner_mut.const_names.remove(name);
    }
}

/// Records `name` as an export of the nearest module-bearing ancestor (or
/// `env` itself). Panics if no ancestor carries a module export table,
/// which would indicate evaluating an export statement outside a module
/// body — a parser/evaluator invariant violation, not a user-facing error.
pub fn set_module_export(env: &EnvHandle, name: &str, value: Value) {
    let mut current = Rc::clone(env);
    loop {
        if current.borrow().module_exports.is_some() {
            current
                .borrow_mut()
                .module_exports
                .as_mut()
                .unwrap()
                .insert(name.to_string(), value);
            return;
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => panic!("set_module_export called outside any module scope"),
        }
    }
}

/// Returns the export table of the nearest module-bearing ancestor.
pub fn get_module_exports(env: &EnvHandle) -> HashMap<String, Value> {
    let mut current = Rc::clone(env);
    loop {
        if let Some(exports) = &current.borrow().module_exports {
            return exports.clone();
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaration_in_same_scope_is_fatal() {
        let env = Environment::root();
        declare_var(&env, "x", Value::Number(1.0), false).unwrap();
        let err = declare_var(&env, "x", Value::Number(2.0), false);
        assert!(matches!(err, Err(ScopeError::AlreadyDeclared { .. })));
    }

    #[test]
    fn child_scope_resolves_ancestor_bindings() {
        let parent = Environment::root();
        declare_var(&parent, "x", Value::Number(1.0), false).unwrap();
        let child = Environment::child(&parent);
        assert_eq!(lookup_var(&child, "x").unwrap().display_string(), "1");
    }

    #[test]
    fn shadowing_is_lexical() {
        let parent = Environment::root();
        declare_var(&parent, "x", Value::Number(1.0), false).unwrap();
        let child = Environment::child(&parent);
        declare_var(&child, "x", Value::Number(2.0), false).unwrap();
        assert_eq!(lookup_var(&child, "x").unwrap().display_string(), "2");
        assert_eq!(lookup_var(&parent, "x").unwrap().display_string(), "1");
    }

    #[test]
    fn assigning_to_const_is_fatal() {
        let env = Environment::root();
        declare_var(&env, "x", Value::Number(1.0), true).unwrap();
        let err = assign_var(&env, "x", Value::Number(2.0));
        assert!(matches!(err, Err(ScopeError::AssignToConst { .. })));
    }

    #[test]
    fn unknown_name_lookup_is_fatal() {
        let env = Environment::root();
        assert!(matches!(
            lookup_var(&env, "nope"),
            Err(ScopeError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn module_exports_climb_to_nearest_module_scope() {
        let root = Environment::root();
        let module_env = Environment::module_child(&root);
        let inner = Environment::child(&module_env);
        set_module_export(&inner, "add", Value::Number(1.0));
        assert!(get_module_exports(&module_env).contains_key("add"));
    }
}
