//! Literal nodes: constants, settable variables and interpolated strings

use std::cell::RefCell;
use std::rc::Rc;

use super::{checked_clone, Evaluate, NodeKind, NodeRef};
use crate::context::CloneContext;
use crate::error::{CloneError, EvalError};
use crate::value::Value;

/// An immutable value. Always fixed.
#[derive(Debug, Clone)]
pub struct Constant {
    value: Value,
}

impl Constant {
    /// Create a constant.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Create a constant behind a [`NodeRef`].
    pub fn shared(value: impl Into<Value>) -> NodeRef {
        Rc::new(Self::new(value))
    }
}

impl Evaluate for Constant {
    fn evaluate(&self) -> Result<Value, EvalError> {
        Ok(self.value.clone())
    }

    fn is_fixed(&self) -> bool {
        true
    }

    fn clone_node(&self, _ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(self.clone()))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Constant
    }
}

/// A plain value defined in the tree. Settable, hence never fixed.
#[derive(Debug)]
pub struct Variable {
    value: RefCell<Value>,
}

impl Variable {
    /// Create a variable.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: RefCell::new(value.into()),
        }
    }

    /// Create a variable behind a [`NodeRef`].
    pub fn shared(value: impl Into<Value>) -> NodeRef {
        Rc::new(Self::new(value))
    }
}

impl Evaluate for Variable {
    fn evaluate(&self) -> Result<Value, EvalError> {
        Ok(self.value.borrow().clone())
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn set(&self, value: &Value) -> bool {
        *self.value.borrow_mut() = value.clone();
        true
    }

    fn clone_node(&self, _ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(Self::new(self.value.borrow().clone())))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Variable
    }
}

/// A string built by concatenating the string form of each part.
pub struct Interpolate {
    parts: Vec<NodeRef>,
}

impl Interpolate {
    /// Create an interpolation from its parts.
    pub fn new(parts: Vec<NodeRef>) -> Self {
        Self { parts }
    }

    /// The parts, in order.
    pub fn parts(&self) -> &[NodeRef] {
        &self.parts
    }
}

impl Evaluate for Interpolate {
    fn evaluate(&self) -> Result<Value, EvalError> {
        let mut out = String::new();
        for part in &self.parts {
            out.push_str(&part.evaluate_string()?);
        }
        Ok(Value::String(out))
    }

    fn is_fixed(&self) -> bool {
        self.parts.iter().all(|part| part.is_fixed())
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        let parts = self
            .parts
            .iter()
            .map(|part| checked_clone(part, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Rc::new(Self::new(parts)))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Interpolate
    }
}
