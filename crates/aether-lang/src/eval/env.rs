use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::{ast::IdentName, value::Value};

pub type Scope = FxHashMap<IdentName, Value>;

#[derive(Error, Debug, PartialEq)]
pub enum EnvError {
    #[error("Undefined variable `{0}`")]
    UndefinedVariable(IdentName),
}

/// A chain of scopes, root first.
///
/// The chain itself is the parent link: a scope never holds a reference to
/// its parent, so a closure that captured a chain keeps every scope on it
/// alive without creating ownership between scopes. Cloning an `Env` shares
/// the scopes.
#[derive(Clone)]
pub struct Env {
    scopes: Vec<Rc<RefCell<Scope>>>,
}

impl Default for Env {
    fn default() -> Self {
        Self {
            scopes: vec![Rc::new(RefCell::new(Scope::default()))],
        }
    }
}

impl Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("depth", &self.scopes.len())
            .finish()
    }
}

impl PartialEq for Env {
    fn eq(&self, other: &Self) -> bool {
        self.scopes.len() == other.scopes.len()
            && self
                .scopes
                .iter()
                .zip(other.scopes.iter())
                .all(|(a, b)| Rc::ptr_eq(a, b))
    }
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    fn current(&self) -> &Rc<RefCell<Scope>> {
        // The root scope is never popped.
        &self.scopes[self.scopes.len() - 1]
    }

    #[inline(always)]
    fn root(&self) -> &Rc<RefCell<Scope>> {
        &self.scopes[0]
    }

    /// Number of scopes on the chain, the root included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Binds `name` in the innermost scope, shadowing outer bindings.
    #[inline(always)]
    pub fn define(&self, name: IdentName, value: Value) {
        self.current().borrow_mut().insert(name, value);
    }

    pub fn get(&self, name: &str) -> Result<Value, EnvError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.borrow().get(name).cloned())
            .ok_or_else(|| EnvError::UndefinedVariable(IdentName::new(name)))
    }

    /// Updates the nearest scope that defines `name`.
    pub fn set(&self, name: &str, value: Value) -> Result<(), EnvError> {
        self.try_set(name, value)
            .map_err(|_| EnvError::UndefinedVariable(IdentName::new(name)))
    }

    /// Updates the nearest scope that defines `name`, or binds it in the
    /// innermost scope when no scope does.
    pub fn assign(&self, name: &IdentName, value: Value) {
        if let Err(value) = self.try_set(name, value) {
            self.define(name.clone(), value);
        }
    }

    /// Hands `value` back when no scope defines `name`.
    fn try_set(&self, name: &str, value: Value) -> Result<(), Value> {
        match self.defining_scope(name) {
            Some(scope) => {
                scope.borrow_mut().insert(IdentName::new(name), value);
                Ok(())
            }
            None => Err(value),
        }
    }

    fn defining_scope(&self, name: &str) -> Option<&Rc<RefCell<Scope>>> {
        self.scopes
            .iter()
            .rev()
            .find(|scope| scope.borrow().contains_key(name))
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Rc::new(RefCell::new(Scope::default())));
    }

    /// Drops the innermost scope. Returns `false` when only the root is left.
    pub fn pop_scope(&mut self) -> bool {
        if self.scopes.len() > 1 {
            if let Some(scope) = self.scopes.pop() {
                release(scope);
            }
            true
        } else {
            false
        }
    }

    /// A new chain that extends this one with a fresh innermost scope.
    pub fn child(&self) -> Env {
        let mut env = self.clone();
        env.push_scope();
        env
    }

    /// Drops every transient scope, leaving the root intact.
    fn unwind_to_root(&mut self) {
        self.scopes.truncate(1);
    }

    /// Back to a single empty global scope.
    ///
    /// Every scope reachable from a global closure is emptied as well, which
    /// breaks the cycles between closures and the call scopes they were
    /// created in. Closures handed out earlier lose their captured bindings.
    pub fn reset(&mut self) {
        self.unwind_to_root();

        let mut pending: Vec<Value> = drain(self.root());
        let mut visited = FxHashSet::default();
        visited.insert(Rc::as_ptr(self.root()));

        while let Some(value) = pending.pop() {
            match value {
                Value::Function(closure) => {
                    for scope in &closure.env.scopes {
                        if visited.insert(Rc::as_ptr(scope)) {
                            pending.extend(drain(scope));
                        }
                    }
                }
                Value::List(items) => pending.extend(items),
                Value::Map(map) => pending.extend(map.into_values()),
                _ => {}
            }
        }
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.root().borrow().get(name).cloned()
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.root().borrow_mut().insert(IdentName::new(name), value);
    }
}

fn drain(scope: &Rc<RefCell<Scope>>) -> Vec<Value> {
    scope.borrow_mut().drain().map(|(_, value)| value).collect()
}

/// Empties a scope that left the chain when the only references still
/// pointing at it come from closures stored inside it.
fn release(scope: Rc<RefCell<Scope>>) {
    if Rc::strong_count(&scope) == 1 {
        return;
    }

    let captured = scope
        .borrow()
        .values()
        .map(|value| self_captures(value, &scope))
        .sum::<usize>();

    if Rc::strong_count(&scope) == captured + 1 {
        drop(drain(&scope));
    }
}

/// References to `scope` held by closures owned solely by `value`.
fn self_captures(value: &Value, scope: &Rc<RefCell<Scope>>) -> usize {
    match value {
        Value::Function(closure) if Rc::strong_count(closure) == 1 => closure
            .env
            .scopes
            .iter()
            .filter(|captured| Rc::ptr_eq(captured, scope))
            .count(),
        Value::List(items) => items.iter().map(|item| self_captures(item, scope)).sum(),
        Value::Map(map) => map.values().map(|item| self_captures(item, scope)).sum(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Closure;
    use rstest::{fixture, rstest};

    #[fixture]
    fn env() -> Env {
        let env = Env::new();
        env.define("X".into(), Value::from(1));
        env
    }

    #[rstest]
    fn test_get_walks_outward(mut env: Env) {
        env.push_scope();
        assert_eq!(env.get("X"), Ok(Value::from(1)));
        assert_eq!(
            env.get("Y"),
            Err(EnvError::UndefinedVariable("Y".into()))
        );
    }

    #[rstest]
    fn test_shadowing(mut env: Env) {
        env.push_scope();
        env.define("X".into(), Value::from(2));
        assert_eq!(env.get("X"), Ok(Value::from(2)));
        env.pop_scope();
        assert_eq!(env.get("X"), Ok(Value::from(1)));
    }

    #[rstest]
    fn test_set_updates_nearest_defining_scope(mut env: Env) {
        env.push_scope();
        assert_eq!(env.set("X", Value::from(5)), Ok(()));
        env.pop_scope();
        assert_eq!(env.get_global("X"), Some(Value::from(5)));
        assert_eq!(
            env.set("Y", Value::Null),
            Err(EnvError::UndefinedVariable("Y".into()))
        );
        assert!(env.get("Y").is_err());
    }

    #[rstest]
    fn test_assign_creates_in_current_scope(mut env: Env) {
        env.push_scope();
        env.assign(&"Y".into(), Value::from(3));
        env.assign(&"X".into(), Value::from(4));
        assert_eq!(env.get("Y"), Ok(Value::from(3)));
        env.pop_scope();
        assert!(env.get("Y").is_err());
        assert_eq!(env.get("X"), Ok(Value::from(4)));
    }

    #[rstest]
    fn test_pop_scope_keeps_root(mut env: Env) {
        assert!(!env.pop_scope());
        assert_eq!(env.depth(), 1);
        assert_eq!(env.get("X"), Ok(Value::from(1)));
    }

    #[rstest]
    fn test_child_shares_scopes(env: Env) {
        let child = env.child();
        child.assign(&"X".into(), Value::from(9));
        child.define("LOCAL".into(), Value::Null);
        assert_eq!(env.get("X"), Ok(Value::from(9)));
        assert!(env.get("LOCAL").is_err());
    }

    #[rstest]
    fn test_reset(mut env: Env) {
        env.push_scope();
        env.reset();
        assert_eq!(env.depth(), 1);
        assert_eq!(env.get_global("X"), None);
    }

    #[rstest]
    fn test_globals_ignore_transient_scopes(mut env: Env) {
        env.push_scope();
        env.define("TMP".into(), Value::from(1));
        env.set_global("G", Value::from(2));
        assert_eq!(env.get_global("TMP"), None);
        assert_eq!(env.get_global("G"), Some(Value::from(2)));
        assert_eq!(env.get_global("X"), Some(Value::from(1)));
    }

    fn closure_over(env: &Env) -> Rc<Closure> {
        Rc::new(Closure {
            name: Some("G".into()),
            params: Default::default(),
            body: Vec::new(),
            env: env.clone(),
        })
    }

    #[rstest]
    fn test_pop_scope_releases_self_captured_closure(mut env: Env) {
        env.push_scope();
        let closure = closure_over(&env);
        let weak = Rc::downgrade(&closure);
        env.define("G".into(), Value::List(vec![Value::Function(closure)]));

        env.pop_scope();
        assert!(weak.upgrade().is_none());
    }

    #[rstest]
    fn test_pop_scope_keeps_escaped_closure(mut env: Env) {
        env.push_scope();
        env.define("LOCAL".into(), Value::from(7));
        let closure = closure_over(&env);
        env.define("G".into(), Value::Function(Rc::clone(&closure)));

        env.pop_scope();
        assert_eq!(closure.env.get("LOCAL"), Ok(Value::from(7)));
    }

    #[rstest]
    fn test_reset_breaks_closure_cycles(mut env: Env) {
        let mut call = env.child();
        let closure = closure_over(&call);
        call.define("G".into(), Value::Function(Rc::clone(&closure)));
        env.set_global("K", Value::Function(Rc::clone(&closure)));
        call.pop_scope();
        assert_eq!(Rc::strong_count(&closure), 3);

        env.reset();
        assert_eq!(Rc::strong_count(&closure), 1);
    }
}
