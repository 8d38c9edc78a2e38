//! Clone/optimize resolver
//!
//! Copies a container tree into a destination tree while keeping the
//! structure of shared references intact:
//!
//! - every source node is cloned at most once, so references that pointed
//!   at the same node still do
//! - a reference anchored inside the cloned subtree is re-anchored on the
//!   clone of its anchor
//! - with `optimize`, a reference whose target resolves becomes a direct
//!   [`Ref`] to the clone of the target, which is materialized on demand
//!   at its own location in the destination tree
//!
//! While a target is being materialized its source slot is replaced by a
//! [`Slot::Detached`] tombstone, so a cycle of references finds the slot
//! missing instead of recursing forever.
//!
//! Errors against a single child are recorded in the [`CloneContext`] and
//! the clone carries on with the next child. Fatal errors abort the whole
//! operation.

use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::container::{Container, Slot};
use crate::context::{CloneContext, CloneFailure, CloneOptions};
use crate::error::{CloneError, EvalError, TreeError};
use crate::node::{checked_clone, clone_optional, node_key, NodeRef};
use crate::path::Path;
use crate::reference::{AddressRef, Ref};

/// Result of a tree-wide clone.
#[derive(Debug)]
pub struct CloneOutcome {
    /// The cloned tree
    pub root: Rc<Container>,

    /// Per-path errors; the affected children are absent from `root`
    pub errors: Vec<CloneFailure>,
}

impl CloneOutcome {
    /// Whether every child was cloned.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Container {
    /// Clone this tree into a fresh container.
    pub fn clone_tree(self: &Rc<Self>, options: CloneOptions) -> Result<CloneOutcome, CloneError> {
        let root = Container::shared();
        let errors = root.merge_from(self, options)?;
        Ok(CloneOutcome { root, errors })
    }

    /// Clone `source` into this container, merging with what is already
    /// here.
    ///
    /// Nested containers are merged recursively. A value that lands on an
    /// occupied slot is recorded as a duplicate. Returns the per-path errors.
    pub fn merge_from(
        self: &Rc<Self>,
        source: &Rc<Container>,
        options: CloneOptions,
    ) -> Result<Vec<CloneFailure>, CloneError> {
        debug!(
            optimize = options.optimize,
            no_dependency = options.no_dependency,
            "cloning tree"
        );
        let mut ctx = CloneContext::with_options(options);
        clone_into(source, self, &mut ctx)?;
        Ok(ctx.into_errors())
    }
}

/// Clone the contents of `source` into `dest` under `ctx`.
///
/// Returns only fatal errors; everything else is recorded.
pub fn clone_into(
    source: &Rc<Container>,
    dest: &Rc<Container>,
    ctx: &mut CloneContext,
) -> Result<(), CloneError> {
    let depth = ctx.depth();
    ctx.push_ancestor(source.clone(), dest.clone());
    let result = clone_children(source, dest, ctx);
    ctx.truncate(depth);
    result
}

fn clone_children(
    source: &Rc<Container>,
    dest: &Rc<Container>,
    ctx: &mut CloneContext,
) -> Result<(), CloneError> {
    if let Slot::Node(own) = source.own_slot() {
        let result = place_clone(dest, None, &own, ctx);
        settle(result, ctx)?;
    }

    for (name, slot) in source.entries() {
        ctx.enter(name.as_str());
        let result = clone_child(dest, &name, slot, ctx);
        let settled = settle(result, ctx);
        ctx.leave();
        settled?;
    }
    Ok(())
}

fn clone_child(
    dest: &Rc<Container>,
    name: &str,
    slot: Slot,
    ctx: &mut CloneContext,
) -> Result<(), CloneError> {
    match slot {
        Slot::Empty => {
            dest.declare(&Path::from_segments([name]))?;
            Ok(())
        }
        // Being materialized further up the stack; it will be placed there.
        Slot::Detached => Ok(()),
        Slot::Node(node) => place_clone(dest, Some(name), &node, ctx),
        Slot::Container(child) => {
            let target = dest.child_for_merge(name, &ctx.dotted_path())?;
            clone_into(&child, &target, ctx)
        }
    }
}

/// Clone `node` and put it at `key` in `dest`, unless the resolver already
/// placed that very clone there.
fn place_clone(
    dest: &Container,
    key: Option<&str>,
    node: &NodeRef,
    ctx: &mut CloneContext,
) -> Result<(), CloneError> {
    let clone = checked_clone(node, ctx)?;
    dest.place(key, clone, &ctx.dotted_path())?;
    Ok(())
}

/// Record a non-fatal error, pass a fatal one through.
fn settle(result: Result<(), CloneError>, ctx: &mut CloneContext) -> Result<(), CloneError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            ctx.record(err);
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Reference Resolution
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of looking a reference target up during a clone.
enum Target {
    /// The clone of the target, placed in the destination tree
    Found(NodeRef),
    /// Nothing at the path
    Missing,
    /// The target is itself being cloned further up the stack
    InProgress,
}

/// Clone a reference to `path` below `ancestor`.
///
/// `fallback` is the source reference's fallback, cloned here only if it is
/// kept.
pub(crate) fn clone_reference(
    ancestor: &Weak<Container>,
    path: &Path,
    fallback: Option<&NodeRef>,
    ctx: &mut CloneContext,
) -> Result<NodeRef, CloneError> {
    let original = ancestor
        .upgrade()
        .ok_or_else(|| CloneError::AncestorDestroyed {
            path: path.to_string(),
        })?;

    let (anchor, internal) = match ctx.find_clone(&original) {
        Some(clone) => (clone, true),
        None if ctx.no_dependency() => {
            return Err(CloneError::ExternalDependency {
                path: path.to_string(),
            })
        }
        None => (original.clone(), false),
    };

    if !ctx.optimize() {
        let fallback = clone_optional(&fallback.cloned(), ctx)?;
        let reference = AddressRef::new(&anchor, path.clone()).with_optional_fallback(fallback);
        return Ok(Rc::new(reference));
    }

    let target = if internal {
        materialize(&original, &anchor, path, ctx)?
    } else {
        original
            .get_child_ptr(path)
            .map_or(Target::Missing, Target::Found)
    };

    match (target, fallback) {
        (Target::Found(node), fallback) => {
            trace!(%path, internal, "reference linked");
            let fallback = keep_fallback(fallback, ctx)?;
            let link = Ref::new(&node).with_origin(&anchor, path.clone(), fallback);
            Ok(Rc::new(link))
        }
        (Target::Missing | Target::InProgress, Some(fallback)) => {
            trace!(%path, "reference replaced by its fallback");
            checked_clone(fallback, ctx)
        }
        (Target::Missing, None) => Err(EvalError::KeyNotFound {
            path: path.to_string(),
        }
        .into()),
        (Target::InProgress, None) => Err(EvalError::CyclicReference {
            path: path.to_string(),
        }
        .into()),
    }
}

/// Clone the fallback of a reference that resolved, so the link can fall
/// back again when it is re-resolved in a later clone. A fallback that
/// cannot be cloned is dropped; the link itself is fine.
fn keep_fallback(
    fallback: Option<&NodeRef>,
    ctx: &mut CloneContext,
) -> Result<Option<NodeRef>, CloneError> {
    let Some(fallback) = fallback else {
        return Ok(None);
    };
    match checked_clone(fallback, ctx) {
        Ok(clone) => Ok(Some(clone)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            trace!(%err, "dropping fallback of linked reference");
            Ok(None)
        }
    }
}

/// Clone a direct link to `target`.
///
/// A target inside the cloned subtree is cloned at its own location first,
/// so the link and the tree share one clone whichever is visited first.
/// Only a target outside the subtree is subject to `no_dependency`.
pub(crate) fn clone_link(
    target: &NodeRef,
    describe: &str,
    ctx: &mut CloneContext,
) -> Result<NodeRef, CloneError> {
    if let Some(clone) = ctx.memoized(node_key(target)) {
        return Ok(Ref::shared(&clone));
    }

    if let Some((original, clone)) = ctx.outermost() {
        if let Some(path) = locate(&original, target) {
            return match materialize(&original, &clone, &path, ctx)? {
                Target::Found(node) => Ok(Ref::shared(&node)),
                Target::Missing => Err(EvalError::KeyNotFound {
                    path: path.to_string(),
                }
                .into()),
                Target::InProgress => Err(EvalError::CyclicReference {
                    path: path.to_string(),
                }
                .into()),
            };
        }
    }

    if ctx.no_dependency() {
        return Err(CloneError::ExternalDependency {
            path: describe.to_string(),
        });
    }
    Ok(Ref::shared(target))
}

/// Path of `target` below `root`, found by node identity.
fn locate(root: &Container, target: &NodeRef) -> Option<Path> {
    let key = node_key(target);
    let mut found = None;
    root.walk(|dotted, node| {
        if found.is_none() && node_key(node) == key {
            found = Some(Path::from_segments(
                dotted.split('.').filter(|segment| !segment.is_empty()),
            ));
        }
    });
    found
}

/// Make sure the clone of the node at `path` (below `original`) exists in
/// the destination tree (below `clone`), creating it and every container on
/// the way if needed.
fn materialize(
    original: &Rc<Container>,
    clone: &Rc<Container>,
    path: &Path,
    ctx: &mut CloneContext,
) -> Result<Target, CloneError> {
    let depth = ctx.depth();
    let result = walk_to_target(original, clone, path, ctx);
    ctx.truncate(depth);
    result
}

fn walk_to_target(
    original: &Rc<Container>,
    clone: &Rc<Container>,
    path: &Path,
    ctx: &mut CloneContext,
) -> Result<Target, CloneError> {
    let mut source = original.clone();
    let mut dest = clone.clone();
    for segment in path.indirect() {
        let Some(next) = source.child(segment) else {
            return Ok(Target::Missing);
        };
        dest = descend(&dest, segment, path)?;
        source = next;
        ctx.push_ancestor(source.clone(), dest.clone());
    }

    let Some(key) = path.direct() else {
        return resolve_own(&source, &dest, path, ctx);
    };

    match source.slot(key) {
        Some(Slot::Container(child)) => {
            let dest_child = descend(&dest, key, path)?;
            ctx.push_ancestor(child.clone(), dest_child.clone());
            resolve_own(&child, &dest_child, path, ctx)
        }
        Some(Slot::Node(node)) => {
            if let Some(Slot::Node(existing)) = dest.slot(key) {
                return Ok(Target::Found(existing));
            }
            let guard = Tombstone::new(&source, Some(key), node.clone());
            let cloned = checked_clone(&node, ctx);
            drop(guard);
            let cloned = cloned?;
            dest.place(Some(key), cloned.clone(), &path.to_string())?;
            Ok(Target::Found(cloned))
        }
        Some(Slot::Detached) => match dest.slot(key).and_then(|slot| slot.value()) {
            Some(existing) => Ok(Target::Found(existing)),
            None => Ok(Target::InProgress),
        },
        Some(Slot::Empty) | None => Ok(dest
            .slot(key)
            .and_then(|slot| slot.value())
            .map_or(Target::Missing, Target::Found)),
    }
}

fn resolve_own(
    source: &Rc<Container>,
    dest: &Rc<Container>,
    path: &Path,
    ctx: &mut CloneContext,
) -> Result<Target, CloneError> {
    if let Some(existing) = dest.value() {
        return Ok(Target::Found(existing));
    }
    match source.own_slot() {
        Slot::Node(node) => {
            let guard = Tombstone::new(source, None, node.clone());
            let cloned = checked_clone(&node, ctx);
            drop(guard);
            let cloned = cloned?;
            dest.place(None, cloned.clone(), &path.to_string())?;
            Ok(Target::Found(cloned))
        }
        Slot::Detached => Ok(Target::InProgress),
        Slot::Empty | Slot::Container(_) => Ok(Target::Missing),
    }
}

fn descend(dest: &Container, name: &str, path: &Path) -> Result<Rc<Container>, CloneError> {
    dest.child_for_merge(name, &path.to_string())
        .map_err(|err| match err {
            TreeError::ShapeConflict { .. } => CloneError::Tree(TreeError::ShapeConflict {
                path: path.to_string(),
            }),
            other => CloneError::Tree(other),
        })
}

/// Keeps a source slot detached while its node is being cloned and puts
/// the node back when dropped, on success and failure alike.
struct Tombstone<'a> {
    container: &'a Container,
    key: Option<&'a str>,
    node: NodeRef,
}

impl<'a> Tombstone<'a> {
    fn new(container: &'a Container, key: Option<&'a str>, node: NodeRef) -> Self {
        container.replace_slot(key, Slot::Detached);
        Self {
            container,
            key,
            node,
        }
    }
}

impl<'a> Drop for Tombstone<'a> {
    fn drop(&mut self) {
        self.container
            .replace_slot(self.key, Slot::Node(self.node.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Constant, Variable};

    fn reference(anchor: &Rc<Container>, path: &str) -> NodeRef {
        Rc::new(AddressRef::new(anchor, Path::parse(path).unwrap()))
    }

    #[test]
    fn test_tombstone_restores_slot() {
        let root = Container::shared();
        let node = Variable::shared("v");
        root.insert("k", node.clone()).unwrap();
        {
            let _guard = Tombstone::new(&root, Some("k"), node.clone());
            assert!(matches!(root.slot("k"), Some(Slot::Detached)));
            assert!(root.get_child_ptr(&Path::parse("k").unwrap()).is_none());
        }
        assert!(Rc::ptr_eq(
            &root.get_child_ptr(&Path::parse("k").unwrap()).unwrap(),
            &node
        ));
    }

    #[test]
    fn test_optimized_reference_becomes_link() {
        let root = Container::shared();
        root.insert("key", Variable::shared("a")).unwrap();
        root.insert("r", reference(&root, "key")).unwrap();

        let outcome = root.clone_tree(CloneOptions::optimized()).unwrap();
        assert!(outcome.is_complete());
        let cloned_ref = outcome.root.slot("r").and_then(|s| s.value()).unwrap();
        let cloned_key = outcome.root.slot("key").and_then(|s| s.value()).unwrap();
        let link = cloned_ref.as_link().unwrap();
        assert!(Rc::ptr_eq(&link.target().unwrap(), &cloned_key));
    }

    #[test]
    fn test_cycle_is_recorded_not_fatal() {
        let root = Container::shared();
        root.insert("a", reference(&root, "b")).unwrap();
        root.insert("b", reference(&root, "a")).unwrap();
        root.insert("c", Constant::shared("ok")).unwrap();

        let outcome = root.clone_tree(CloneOptions::optimized()).unwrap();
        let failed: Vec<_> = outcome.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(failed, vec!["a", "b"]);
        assert_eq!(outcome.root.get_child("c").unwrap().as_deref(), Some("ok"));
        assert!(matches!(root.slot("a"), Some(Slot::Node(_))));
        assert!(matches!(root.slot("b"), Some(Slot::Node(_))));
    }
}
