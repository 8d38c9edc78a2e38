//! Reference nodes
//!
//! An [`AddressRef`] names its target by path, relative to an ancestor
//! container, and resolves it on every evaluation. A [`Ref`] is what an
//! optimizing clone turns a resolvable `AddressRef` into: a direct link to
//! the target node.
//!
//! Both hold their anchors weakly. A tree owns its nodes, never the other
//! way round, so a reference outliving its tree reports the loss instead of
//! keeping the tree alive.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::container::Container;
use crate::context::CloneContext;
use crate::error::{CloneError, EvalError};
use crate::node::{Evaluate, NodeKind, NodeRef, Reentry};
use crate::path::Path;
use crate::resolver;
use crate::value::Value;

// ═══════════════════════════════════════════════════════════════════════
// AddressRef
// ═══════════════════════════════════════════════════════════════════════

/// A path reference resolved against an ancestor container.
///
/// When the path does not resolve, the fallback (if any) is evaluated
/// instead. Errors raised by a resolved target are passed through
/// unchanged; only a missing target triggers the fallback.
pub struct AddressRef {
    ancestor: Weak<Container>,
    path: Path,
    fallback: Option<NodeRef>,
    busy: Cell<bool>,
}

impl AddressRef {
    /// Reference `path` below `ancestor`.
    pub fn new(ancestor: &Rc<Container>, path: Path) -> Self {
        Self {
            ancestor: Rc::downgrade(ancestor),
            path,
            fallback: None,
            busy: Cell::new(false),
        }
    }

    /// Set the node evaluated when the path does not resolve.
    pub fn with_fallback(mut self, fallback: NodeRef) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub(crate) fn with_optional_fallback(mut self, fallback: Option<NodeRef>) -> Self {
        self.fallback = fallback;
        self
    }

    /// The referenced path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The ancestor the path is resolved against, if still alive.
    pub fn ancestor(&self) -> Option<Rc<Container>> {
        self.ancestor.upgrade()
    }

    /// The fallback node, if any.
    pub fn fallback(&self) -> Option<&NodeRef> {
        self.fallback.as_ref()
    }

    /// Look the target up.
    ///
    /// `Ok(None)` means the path does not currently resolve.
    pub fn resolve(&self) -> Result<Option<NodeRef>, EvalError> {
        let ancestor = self.ancestor.upgrade().ok_or_else(|| EvalError::AncestorDestroyed {
            path: self.path.to_string(),
        })?;
        Ok(ancestor.get_child_ptr(&self.path))
    }

    fn cyclic(&self) -> EvalError {
        EvalError::CyclicReference {
            path: self.path.to_string(),
        }
    }
}

impl Evaluate for AddressRef {
    fn evaluate(&self) -> Result<Value, EvalError> {
        let _guard = Reentry::enter(&self.busy).ok_or_else(|| self.cyclic())?;
        match self.resolve()? {
            Some(target) => {
                trace!(path = %self.path, "reference resolved");
                target.evaluate()
            }
            None => match &self.fallback {
                Some(fallback) => {
                    trace!(path = %self.path, "reference unresolved, using fallback");
                    fallback.evaluate()
                }
                None => Err(EvalError::KeyNotFound {
                    path: self.path.to_string(),
                }),
            },
        }
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn set(&self, value: &Value) -> bool {
        let Some(_guard) = Reentry::enter(&self.busy) else {
            return false;
        };
        match self.resolve() {
            Ok(Some(target)) => target.set(value),
            Ok(None) => self
                .fallback
                .as_ref()
                .map_or(false, |fallback| fallback.set(value)),
            Err(_) => false,
        }
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        resolver::clone_reference(&self.ancestor, &self.path, self.fallback.as_ref(), ctx)
    }

    fn kind(&self) -> NodeKind {
        NodeKind::AddressRef
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Ref
// ═══════════════════════════════════════════════════════════════════════

/// Where a [`Ref`] came from: the path it was resolved from and that
/// reference's fallback.
#[derive(Clone)]
struct Origin {
    ancestor: Weak<Container>,
    path: Path,
    fallback: Option<NodeRef>,
}

/// A direct link to another node.
///
/// Evaluation and writes are forwarded to the target. A link never points
/// at another link: building one on top of a `Ref` links straight to that
/// `Ref`'s target.
pub struct Ref {
    target: Weak<dyn Evaluate>,
    origin: Option<Origin>,
    busy: Cell<bool>,
}

impl Ref {
    /// Link to `target`.
    pub fn new(target: &NodeRef) -> Self {
        let target = match target.as_link() {
            Some(link) => link.target.clone(),
            None => Rc::downgrade(target),
        };
        Self {
            target,
            origin: None,
            busy: Cell::new(false),
        }
    }

    /// Link to `target` behind a [`NodeRef`].
    pub fn shared(target: &NodeRef) -> NodeRef {
        Rc::new(Self::new(target))
    }

    /// Remember the path this link was resolved from, so later clones can
    /// re-resolve it in their own tree.
    pub(crate) fn with_origin(
        mut self,
        ancestor: &Rc<Container>,
        path: Path,
        fallback: Option<NodeRef>,
    ) -> Self {
        self.origin = Some(Origin {
            ancestor: Rc::downgrade(ancestor),
            path,
            fallback,
        });
        self
    }

    /// The linked node, if still alive.
    pub fn target(&self) -> Option<NodeRef> {
        self.target.upgrade()
    }

    fn describe(&self) -> String {
        self.origin
            .as_ref()
            .map_or_else(|| "<link>".to_string(), |origin| origin.path.to_string())
    }
}

impl Evaluate for Ref {
    fn evaluate(&self) -> Result<Value, EvalError> {
        let _guard = Reentry::enter(&self.busy).ok_or_else(|| EvalError::CyclicReference {
            path: self.describe(),
        })?;
        let target = self.target().ok_or_else(|| EvalError::AncestorDestroyed {
            path: self.describe(),
        })?;
        target.evaluate()
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn set(&self, value: &Value) -> bool {
        let Some(_guard) = Reentry::enter(&self.busy) else {
            return false;
        };
        self.target().map_or(false, |target| target.set(value))
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        if let Some(origin) = &self.origin {
            return resolver::clone_reference(
                &origin.ancestor,
                &origin.path,
                origin.fallback.as_ref(),
                ctx,
            );
        }

        let target = self.target().ok_or_else(|| CloneError::AncestorDestroyed {
            path: self.describe(),
        })?;
        resolver::clone_link(&target, &self.describe(), ctx)
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Ref
    }

    fn as_link(&self) -> Option<&Ref> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CloneOptions;
    use crate::node::{Constant, Variable};

    #[test]
    fn test_address_ref_follows_target() {
        let root = Container::shared();
        root.add(&Path::parse("key").unwrap(), Variable::shared("a"))
            .unwrap();
        let reference = AddressRef::new(&root, Path::parse("key").unwrap());
        assert_eq!(reference.evaluate_string().unwrap(), "a");
        assert!(root.set("key", "b"));
        assert_eq!(reference.evaluate_string().unwrap(), "b");
        assert!(!reference.is_fixed());
    }

    #[test]
    fn test_address_ref_missing_uses_fallback() {
        let root = Container::shared();
        let reference = AddressRef::new(&root, Path::parse("nope").unwrap())
            .with_fallback(Constant::shared("fb"));
        assert_eq!(reference.evaluate_string().unwrap(), "fb");

        let bare = AddressRef::new(&root, Path::parse("nope").unwrap());
        assert!(matches!(
            bare.evaluate().unwrap_err(),
            EvalError::KeyNotFound { path } if path == "nope"
        ));
    }

    #[test]
    fn test_address_ref_dropped_ancestor() {
        let root = Container::shared();
        let reference = AddressRef::new(&root, Path::parse("key").unwrap());
        drop(root);
        assert!(matches!(
            reference.evaluate().unwrap_err(),
            EvalError::AncestorDestroyed { .. }
        ));
        assert!(!reference.set(&Value::from("x")));
    }

    #[test]
    fn test_address_ref_set_writes_through() {
        let root = Container::shared();
        root.add(&Path::parse("key").unwrap(), Variable::shared("a"))
            .unwrap();
        let reference = AddressRef::new(&root, Path::parse("key").unwrap());
        assert!(reference.set(&Value::from("z")));
        assert_eq!(root.get_child("key").unwrap().as_deref(), Some("z"));
    }

    #[test]
    fn test_ref_collapses_chains() {
        let target = Variable::shared("t");
        let first = Ref::shared(&target);
        let second = Ref::new(&first);
        let linked = second.target().unwrap();
        assert!(Rc::ptr_eq(&linked, &target));
        assert_eq!(second.evaluate_string().unwrap(), "t");
    }

    #[test]
    fn test_reresolved_link_keeps_fallback() {
        let root = Container::shared();
        let stale = Variable::shared("stale");
        let with_fallback = Ref::new(&stale).with_origin(
            &root,
            Path::parse("gone").unwrap(),
            Some(Constant::shared("fb")),
        );
        let bare = Ref::new(&stale).with_origin(&root, Path::parse("gone").unwrap(), None);
        root.insert("soft", Rc::new(with_fallback)).unwrap();
        root.insert("hard", Rc::new(bare)).unwrap();

        let outcome = root.clone_tree(CloneOptions::optimized()).unwrap();
        assert_eq!(outcome.root.get_child("soft").unwrap().as_deref(), Some("fb"));
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].path, "hard");
        assert!(matches!(
            outcome.errors[0].error,
            CloneError::Eval(EvalError::KeyNotFound { .. })
        ));

        let copy = root.clone_tree(CloneOptions::copy()).unwrap();
        assert_eq!(copy.root.get_child("soft").unwrap().as_deref(), Some("fb"));
    }

    #[test]
    fn test_ref_outlived_target() {
        let target = Variable::shared("t");
        let link = Ref::new(&target);
        drop(target);
        assert!(matches!(
            link.evaluate().unwrap_err(),
            EvalError::AncestorDestroyed { .. }
        ));
    }
}
