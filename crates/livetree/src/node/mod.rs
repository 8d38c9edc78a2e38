//! Lazily evaluated nodes
//!
//! Every value in a tree is a node behind a [`NodeRef`]. A node can be
//! evaluated any number of times, may report itself as fixed, may accept
//! writes, and knows how to copy itself into a [`CloneContext`].
//!
//! Node families:
//! - literals: [`Constant`], [`Variable`], [`Interpolate`]
//! - sources: [`Env`], [`File`], [`Cmd`]
//! - transforms: [`Map`], [`Smooth`], [`Clock`], [`Save`], [`Color`]
//! - caches: [`TimedCache`], [`SourceChangedCache`], [`IndexedCache`]
//! - references: [`AddressRef`](crate::AddressRef), [`Ref`]

pub mod cache;
pub mod color;
pub mod literal;
pub mod source;
pub mod transform;

pub use cache::{IndexedCache, SharedMemo, SourceChangedCache, TimedCache};
pub use color::{Color, ColorSpace, Modification, Rgba};
pub use literal::{Constant, Interpolate, Variable};
pub use source::{Cmd, Env, File};
pub use transform::{Clock, Map, Range, Save, Smooth};

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::context::CloneContext;
use crate::error::{CloneError, EvalError};
use crate::reference::Ref;
use crate::value::Value;

/// Shared handle to a node.
pub type NodeRef = Rc<dyn Evaluate>;

/// The capability set of a node.
///
/// `evaluate` may have side effects (reading the environment, a file, or
/// running a command) unless the node is fixed. `set` and the `as_*`
/// downcasts default to "not supported".
pub trait Evaluate {
    /// Compute the current value.
    fn evaluate(&self) -> Result<Value, EvalError>;

    /// Whether every future `evaluate` call returns the same result.
    fn is_fixed(&self) -> bool;

    /// Try to write `value` into the node's underlying state.
    ///
    /// Returns `false` when the node is not settable or the write target
    /// cannot be reached.
    fn set(&self, _value: &Value) -> bool {
        false
    }

    /// Produce an independent copy of this node.
    ///
    /// Callers go through [`checked_clone`], which deduplicates and
    /// validates the result.
    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError>;

    /// The node's kind, for diagnostics and clone validation.
    fn kind(&self) -> NodeKind;

    /// Probe: this node as a direct link.
    fn as_link(&self) -> Option<&Ref> {
        None
    }

    /// Probe: this node as an indexed cache.
    fn as_indexed_cache(&self) -> Option<&IndexedCache> {
        None
    }

    /// Evaluate and convert to a string.
    fn evaluate_string(&self) -> Result<String, EvalError> {
        self.evaluate().map(Value::into_string)
    }

    /// Evaluate and convert to an integer.
    fn evaluate_int(&self) -> Result<i64, EvalError> {
        self.evaluate()?.to_int()
    }

    /// Evaluate and convert to a float.
    fn evaluate_float(&self) -> Result<f64, EvalError> {
        self.evaluate()?.to_float()
    }
}

impl fmt::Debug for dyn Evaluate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.kind())
    }
}

/// The closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Immutable literal
    Constant,
    /// Settable literal
    Variable,
    /// String built from parts
    Interpolate,
    /// Path reference against an ancestor container
    AddressRef,
    /// Direct link produced by optimization
    Ref,
    /// Environment variable
    Env,
    /// File contents
    File,
    /// Shell command output
    Cmd,
    /// Color transform
    Color,
    /// Linear rescale
    Map,
    /// Damped spring
    Smooth,
    /// Monotonic tick counter
    Clock,
    /// Split-and-write-back
    Save,
    /// Time-to-live cache
    TimedCache,
    /// Key-invalidated cache
    SourceChangedCache,
    /// Per-index memo
    IndexedCache,
}

impl NodeKind {
    /// Whether nodes of this kind resolve to another node.
    pub fn is_reference(self) -> bool {
        matches!(self, NodeKind::AddressRef | NodeKind::Ref)
    }

    /// Lower-case name, matching the expression operator where there is one.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Constant => "constant",
            NodeKind::Variable => "variable",
            NodeKind::Interpolate => "interpolate",
            NodeKind::AddressRef => "address_ref",
            NodeKind::Ref => "ref",
            NodeKind::Env => "env",
            NodeKind::File => "file",
            NodeKind::Cmd => "cmd",
            NodeKind::Color => "color",
            NodeKind::Map => "map",
            NodeKind::Smooth => "smooth",
            NodeKind::Clock => "clock",
            NodeKind::Save => "save",
            NodeKind::TimedCache => "cache",
            NodeKind::SourceChangedCache => "source_cache",
            NodeKind::IndexedCache => "array_cache",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Fallback
// ═══════════════════════════════════════════════════════════════════════

/// Recovery policy shared by meta nodes.
///
/// Holds the dotted path of the owning node and an optional fallback node.
/// On failure the fallback is evaluated if present; otherwise the failure
/// is annotated with the owner's path.
#[derive(Clone, Default)]
pub struct Fallback {
    origin: String,
    node: Option<NodeRef>,
}

impl Fallback {
    /// A fallback-less policy for the node at `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            node: None,
        }
    }

    /// Set the fallback node.
    pub fn with_node(mut self, node: NodeRef) -> Self {
        self.node = Some(node);
        self
    }

    /// Set or clear the fallback node.
    pub fn with_optional(mut self, node: Option<NodeRef>) -> Self {
        self.node = node;
        self
    }

    /// Dotted path of the owning node.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The fallback node, if any.
    pub fn node(&self) -> Option<&NodeRef> {
        self.node.as_ref()
    }

    /// Recover from `error`, or annotate and return it.
    pub fn recover(&self, error: EvalError) -> Result<Value, EvalError> {
        match &self.node {
            Some(fallback) => {
                debug!(origin = %self.origin, %error, "using fallback");
                fallback.evaluate()
            }
            None if self.origin.is_empty() => Err(error),
            None => Err(EvalError::At {
                path: self.origin.clone(),
                source: Box::new(error),
            }),
        }
    }

    /// Whether the fallback (if any) is fixed.
    pub fn is_fixed(&self) -> bool {
        self.node.as_ref().map_or(true, |node| node.is_fixed())
    }

    /// Forward a write to the fallback node.
    pub fn set(&self, value: &Value) -> bool {
        self.node.as_ref().map_or(false, |node| node.set(value))
    }

    /// Clone the fallback node into `ctx`.
    pub fn clone_in(&self, ctx: &mut CloneContext) -> Result<Self, CloneError> {
        let node = match &self.node {
            Some(node) => Some(checked_clone(node, ctx)?),
            None => None,
        };
        Ok(Self {
            origin: self.origin.clone(),
            node,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Re-entry Guard
// ═══════════════════════════════════════════════════════════════════════

/// RAII guard that marks a node as busy while it evaluates.
///
/// Entering an already-busy node fails, which turns a reference cycle into
/// an error instead of unbounded recursion.
pub(crate) struct Reentry<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> Reentry<'a> {
    /// Mark `flag` busy, or return `None` if it already is.
    pub(crate) fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl<'a> Drop for Reentry<'a> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Checked Clone
// ═══════════════════════════════════════════════════════════════════════

/// Identity of a node, stable for as long as the node is alive.
pub(crate) fn node_key(node: &NodeRef) -> usize {
    Rc::as_ptr(node) as *const () as usize
}

/// Clone `node` into `ctx`, at most once per source node.
///
/// With `optimize` set, a fixed node that evaluates successfully is
/// replaced by a [`Constant`] and references may turn into direct links or
/// their fallbacks. A reference may always come back as the other kind of
/// reference. Any other change of kind is a contract violation.
pub fn checked_clone(node: &NodeRef, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
    let key = node_key(node);
    if let Some(existing) = ctx.memoized(key) {
        return Ok(existing);
    }

    let kind = node.kind();
    let mut transformed = ctx.optimize() && kind.is_reference();
    let clone = if ctx.optimize() && node.is_fixed() {
        match node.evaluate() {
            Ok(value) => {
                transformed = true;
                Rc::new(Constant::new(value)) as NodeRef
            }
            Err(_) => node.clone_node(ctx)?,
        }
    } else {
        node.clone_node(ctx)?
    };

    // A cycle may have cloned this node while we were cloning it.
    if let Some(existing) = ctx.memoized(key) {
        return Ok(existing);
    }

    let relinked = kind.is_reference() && clone.kind().is_reference();
    if !transformed && !relinked && clone.kind() != kind {
        return Err(CloneError::UnexpectedKind {
            expected: kind.to_string(),
            got: clone.kind().to_string(),
        });
    }

    ctx.memoize(key, clone.clone());
    Ok(clone)
}

/// Clone an optional node.
pub(crate) fn clone_optional(
    node: &Option<NodeRef>,
    ctx: &mut CloneContext,
) -> Result<Option<NodeRef>, CloneError> {
    node.as_ref().map(|node| checked_clone(node, ctx)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentry_guard_blocks_second_entry() {
        let flag = Cell::new(false);
        let guard = Reentry::enter(&flag);
        assert!(guard.is_some());
        assert!(Reentry::enter(&flag).is_none());
        drop(guard);
        assert!(!flag.get());
        assert!(Reentry::enter(&flag).is_some());
    }

    #[test]
    fn test_fallback_recover_uses_node() {
        let fallback = Fallback::new("a").with_node(Constant::shared("fb"));
        let result = fallback.recover(EvalError::MissingEnv {
            name: "X".to_string(),
        });
        assert_eq!(result.unwrap(), Value::from("fb"));
    }

    #[test]
    fn test_fallback_recover_annotates_without_node() {
        let fallback = Fallback::new("section.key");
        let err = fallback
            .recover(EvalError::MissingEnv {
                name: "X".to_string(),
            })
            .unwrap_err();
        match err {
            EvalError::At { path, .. } => assert_eq!(path, "section.key"),
            other => panic!("Expected At, got {:?}", other),
        }
    }

    #[test]
    fn test_checked_clone_replaces_fixed_when_optimizing() {
        let node: NodeRef = Rc::new(Interpolate::new(vec![
            Constant::shared("a"),
            Constant::shared("b"),
        ]));
        let mut ctx = CloneContext::new(true, false);
        let clone = checked_clone(&node, &mut ctx).unwrap();
        assert_eq!(clone.kind(), NodeKind::Constant);
        assert_eq!(clone.evaluate_string().unwrap(), "ab");
    }

    #[test]
    fn test_checked_clone_deduplicates() {
        let node = Variable::shared("v");
        let mut ctx = CloneContext::new(false, false);
        let first = checked_clone(&node, &mut ctx).unwrap();
        let second = checked_clone(&node, &mut ctx).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(!Rc::ptr_eq(&first, &node));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(NodeKind::TimedCache.to_string(), "cache");
        assert!(NodeKind::Ref.is_reference());
        assert!(!NodeKind::Map.is_reference());
    }
}
