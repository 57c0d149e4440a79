use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Procedure, Value};
use crate::builtinops::BuiltinOp;

/// Environment for variable bindings
///
/// A handle to one frame of the lexical chain. Cloning the handle shares the frame: a
/// `define` or `set!` made through any clone is seen through all of them, and a frame stays
/// alive for as long as a child frame, a closure or an active call still holds it.
#[derive(Clone, Default)]
pub struct Environment(Rc<Frame>);

#[derive(Default)]
struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bindings may hold closures over this frame, so only the shape is printed
        f.debug_struct("Environment")
            .field("bindings", &self.0.bindings.borrow().len())
            .field("depth", &self.depth())
            .finish()
    }
}

/// Frames are compared by identity
impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Environment {
    /// Create a root frame with no bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty frame whose lookups fall back to `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        }))
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Number of frames between this one and the root
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// The root frame of this chain
    pub fn global(&self) -> Environment {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current.clone()
    }

    /// Bind `name` in this frame, replacing any binding it already has here.
    /// Parent frames are never consulted.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Find the nearest binding of `name`, walking outwards through the parents
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut current = Some(self);
        while let Some(env) = current {
            if let Some(value) = env.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            current = env.parent();
        }
        None
    }

    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
    }

    /// Overwrite the nearest existing binding of `name` in place
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut current = Some(self);
        while let Some(env) = current {
            if let Some(slot) = env.0.bindings.borrow_mut().get_mut(name) {
                *slot = value;
                return Ok(());
            }
            current = env.parent();
        }
        Err(Error::UnboundVariable(name.to_owned()))
    }

    /// Bind a primitive procedure under its registered name.
    ///
    /// This is how the global environment is populated, and how a host program adds its
    /// own operations:
    ///
    /// ```
    /// use schemelet::builtinops::BuiltinOp;
    /// use schemelet::evaluator::{Arity, CallContext, create_global_env};
    /// use schemelet::{Error, Value};
    ///
    /// fn answer(_args: &[Value], _ctx: &CallContext<'_>) -> Result<Value, Error> {
    ///     Ok(Value::Integer(42))
    /// }
    ///
    /// static ANSWER: BuiltinOp = BuiltinOp {
    ///     name: "answer",
    ///     arity: Arity::Exact(0),
    ///     func: answer,
    /// };
    ///
    /// let env = create_global_env();
    /// env.register_builtin(&ANSWER);
    /// let result = schemelet::run_source("(+ (answer) 1)", &env).unwrap();
    /// assert_eq!(result, Value::Integer(43));
    /// ```
    pub fn register_builtin(&self, op: &'static BuiltinOp) {
        self.define(op.name, Value::Procedure(Procedure::Primitive(op)));
    }

    /// Get all bindings visible from this environment.
    /// Returns a Vec of (name, value) pairs sorted by name; inner bindings shadow outer ones.
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        let mut current = Some(self);
        while let Some(env) = current {
            for (name, value) in env.0.bindings.borrow().iter() {
                bindings
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            current = env.parent();
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}
