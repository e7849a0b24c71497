use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::runtime_value::{ObjectRef, Value};
use crate::ast::Ident;

#[derive(Error, Debug, PartialEq)]
pub enum EnvError {
    #[error("Assignment to constant variable.")]
    AssignToConstant,
    #[error("{0} is not defined")]
    NotDefined(Ident),
}

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
}

/// Per-call state that arrow functions inherit from their enclosing function.
#[derive(Debug, Clone, Default)]
pub struct FunctionFrame {
    pub this: Value,
    /// The object the running method was defined on.
    pub home: Option<ObjectRef>,
    /// The class whose constructor is running, for `super(...)`.
    pub constructor: Option<ObjectRef>,
}

#[derive(Debug, Default)]
struct Scope {
    bindings: FxHashMap<Ident, Binding>,
    parent: Option<Env>,
    frame: Option<FunctionFrame>,
}

/// A lexical scope. Clones share the same bindings.
#[derive(Debug, Clone, Default)]
pub struct Env(Rc<RefCell<Scope>>);

impl Env {
    /// A top-level scope whose `this` is `this`.
    pub fn root(this: Value) -> Self {
        Env(Rc::new(RefCell::new(Scope {
            frame: Some(FunctionFrame {
                this,
                ..Default::default()
            }),
            ..Default::default()
        })))
    }

    /// A block scope nested in this one.
    pub fn child(&self) -> Self {
        Env(Rc::new(RefCell::new(Scope {
            parent: Some(self.clone()),
            ..Default::default()
        })))
    }

    /// The scope of a non-arrow function call.
    pub fn function(&self, frame: FunctionFrame) -> Self {
        Env(Rc::new(RefCell::new(Scope {
            parent: Some(self.clone()),
            frame: Some(frame),
            ..Default::default()
        })))
    }

    /// The scope of an arrow function call. `var`s land here but `this`
    /// resolves through the parent.
    pub fn arrow(&self) -> Self {
        self.child()
    }

    pub fn declare(&self, name: Ident, value: Value, mutable: bool) {
        self.0
            .borrow_mut()
            .bindings
            .insert(name, Binding { value, mutable });
    }

    /// Declares `name` as `undefined` unless it already exists in this scope.
    pub fn declare_var(&self, name: Ident) {
        self.0
            .borrow_mut()
            .bindings
            .entry(name)
            .or_insert(Binding {
                value: Value::Undefined,
                mutable: true,
            });
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut env = self.clone();

        loop {
            let parent = {
                let scope = env.0.borrow();
                if let Some(binding) = scope.bindings.get(name) {
                    return Some(binding.value.clone());
                }
                scope.parent.clone()
            };
            env = parent?;
        }
    }

    /// Updates the nearest binding of `name`.
    pub fn assign(&self, name: &Ident, value: Value) -> Result<(), EnvError> {
        let mut env = self.clone();

        loop {
            let parent = {
                let mut scope = env.0.borrow_mut();
                if let Some(binding) = scope.bindings.get_mut(name) {
                    if !binding.mutable {
                        return Err(EnvError::AssignToConstant);
                    }
                    binding.value = value;
                    return Ok(());
                }
                scope.parent.clone()
            };
            env = parent.ok_or_else(|| EnvError::NotDefined(name.clone()))?;
        }
    }

    /// The innermost function frame, skipping arrow and block scopes.
    pub fn frame(&self) -> FunctionFrame {
        let mut env = self.clone();

        loop {
            let parent = {
                let scope = env.0.borrow();
                if let Some(frame) = &scope.frame {
                    return frame.clone();
                }
                scope.parent.clone()
            };
            match parent {
                Some(parent) => env = parent,
                None => return FunctionFrame::default(),
            }
        }
    }

    /// Rebinds `this` in the innermost function frame, after `super(...)`.
    pub fn set_this(&self, this: Value) {
        let mut env = self.clone();

        loop {
            let parent = {
                let mut scope = env.0.borrow_mut();
                if let Some(frame) = &mut scope.frame {
                    frame.this = this;
                    return;
                }
                scope.parent.clone()
            };
            match parent {
                Some(parent) => env = parent,
                None => return,
            }
        }
    }

    /// Copies `names` into a fresh sibling scope, giving each `for` iteration
    /// its own `let` bindings.
    pub fn copy_for_iteration(&self, names: &[Ident]) -> Self {
        let scope = self.0.borrow();
        let copy = Env(Rc::new(RefCell::new(Scope {
            parent: scope.parent.clone(),
            ..Default::default()
        })));

        for name in names {
            if let Some(binding) = scope.bindings.get(name) {
                copy.0.borrow_mut().bindings.insert(name.clone(), binding.clone());
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;

    #[test]
    fn test_lookup_through_parents() {
        let root = Env::root(Value::Undefined);
        root.declare(SmolStr::new("x"), Value::Number(1.0), true);
        let child = root.child();

        assert!(matches!(child.lookup("x"), Some(Value::Number(n)) if n == 1.0));
        assert!(child.lookup("y").is_none());
    }

    #[test]
    fn test_assign_updates_nearest_binding() {
        let root = Env::root(Value::Undefined);
        root.declare(SmolStr::new("x"), Value::Number(1.0), true);
        let child = root.child();
        child.declare(SmolStr::new("x"), Value::Number(2.0), true);

        child.assign(&SmolStr::new("x"), Value::Number(3.0)).unwrap();
        assert!(matches!(child.lookup("x"), Some(Value::Number(n)) if n == 3.0));
        assert!(matches!(root.lookup("x"), Some(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn test_assign_errors() {
        let root = Env::root(Value::Undefined);
        root.declare(SmolStr::new("c"), Value::Null, false);

        assert_eq!(
            root.assign(&SmolStr::new("c"), Value::Null),
            Err(EnvError::AssignToConstant)
        );
        assert_eq!(
            root.assign(&SmolStr::new("missing"), Value::Null),
            Err(EnvError::NotDefined(SmolStr::new("missing")))
        );
    }

    #[test]
    fn test_arrow_scopes_inherit_this() {
        let root = Env::root(Value::Bool(true));
        let function = root.function(FunctionFrame {
            this: Value::Number(7.0),
            ..Default::default()
        });
        let arrow = function.arrow();

        assert!(matches!(arrow.frame().this, Value::Number(n) if n == 7.0));
        assert!(matches!(root.child().frame().this, Value::Bool(true)));
    }

    #[test]
    fn test_iteration_copies_are_independent() {
        let outer = Env::root(Value::Undefined);
        let first = outer.child();
        first.declare(SmolStr::new("i"), Value::Number(0.0), true);

        let second = first.copy_for_iteration(&[SmolStr::new("i")]);
        second.assign(&SmolStr::new("i"), Value::Number(1.0)).unwrap();

        assert!(matches!(first.lookup("i"), Some(Value::Number(n)) if n == 0.0));
        assert!(matches!(second.lookup("i"), Some(Value::Number(n)) if n == 1.0));
    }
}
