//! Clone context threaded through the clone/optimize resolver

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::container::Container;
use crate::error::CloneError;
use crate::node::{NodeRef, SharedMemo};

/// Flags controlling a clone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Collapse resolvable references into direct links and fixed nodes
    /// into constants
    pub optimize: bool,

    /// Reject references to containers outside the cloned subtree
    pub no_dependency: bool,
}

impl CloneOptions {
    /// Plain copy: references keep their paths and may alias the source.
    pub fn copy() -> Self {
        Self::default()
    }

    /// Copy with indirection pre-resolved.
    pub fn optimized() -> Self {
        Self {
            optimize: true,
            no_dependency: false,
        }
    }

    /// Forbid links to the outside of the cloned subtree.
    pub fn isolated(mut self) -> Self {
        self.no_dependency = true;
        self
    }
}

/// A per-path error recorded during a tree-wide clone.
#[derive(Debug, Clone)]
pub struct CloneFailure {
    /// Dotted path of the child that failed
    pub path: String,

    /// What went wrong
    pub error: CloneError,
}

impl fmt::Display for CloneFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.error)
    }
}

/// State for one clone invocation.
///
/// Tracks which source containers are currently mapped to which clones
/// (innermost last), the dotted path of the child being cloned, the
/// per-path errors recorded so far, and which source nodes have already
/// been cloned.
pub struct CloneContext {
    ancestors: Vec<(Rc<Container>, Rc<Container>)>,
    options: CloneOptions,
    errors: Vec<CloneFailure>,
    path: Vec<String>,
    memo: HashMap<usize, NodeRef>,
    arrays: HashMap<usize, SharedMemo>,
}

impl CloneContext {
    /// Create a context with the given flags.
    pub fn new(optimize: bool, no_dependency: bool) -> Self {
        Self::with_options(CloneOptions {
            optimize,
            no_dependency,
        })
    }

    /// Create a context from options.
    pub fn with_options(options: CloneOptions) -> Self {
        Self {
            ancestors: Vec::new(),
            options,
            errors: Vec::new(),
            path: Vec::new(),
            memo: HashMap::new(),
            arrays: HashMap::new(),
        }
    }

    /// Whether references are collapsed into direct links.
    pub fn optimize(&self) -> bool {
        self.options.optimize
    }

    /// Whether links outside the cloned subtree are errors.
    pub fn no_dependency(&self) -> bool {
        self.options.no_dependency
    }

    // ═══════════════════════════════════════════════════════════════════
    // Ancestor Stack
    // ═══════════════════════════════════════════════════════════════════

    /// Enter a container pair.
    pub fn push_ancestor(&mut self, original: Rc<Container>, clone: Rc<Container>) {
        self.ancestors.push((original, clone));
    }

    /// Leave the innermost container pair.
    pub fn pop_ancestor(&mut self) {
        self.ancestors.pop();
    }

    /// Number of container pairs currently entered.
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Drop pairs until only `depth` remain.
    pub fn truncate(&mut self, depth: usize) {
        self.ancestors.truncate(depth);
    }

    /// The outermost pair: the root of the cloned subtree and its clone.
    pub(crate) fn outermost(&self) -> Option<(Rc<Container>, Rc<Container>)> {
        self.ancestors.first().cloned()
    }

    /// Find the clone paired with `original`, searching innermost first.
    pub fn find_clone(&self, original: &Rc<Container>) -> Option<Rc<Container>> {
        self.ancestors
            .iter()
            .rev()
            .find(|(source, _)| Rc::ptr_eq(source, original))
            .map(|(_, clone)| clone.clone())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Path Tracking and Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Enter a child name.
    pub fn enter(&mut self, name: impl Into<String>) {
        self.path.push(name.into());
    }

    /// Leave the innermost child name.
    pub fn leave(&mut self) {
        self.path.pop();
    }

    /// Dotted path of the child currently being cloned.
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }

    /// Record a non-fatal error against the current path.
    pub fn record(&mut self, error: CloneError) {
        let path = self.dotted_path();
        warn!(%path, %error, "clone failed for child");
        self.errors.push(CloneFailure { path, error });
    }

    /// Errors recorded so far, in the order they happened.
    pub fn errors(&self) -> &[CloneFailure] {
        &self.errors
    }

    /// Take the recorded errors.
    pub fn into_errors(self) -> Vec<CloneFailure> {
        self.errors
    }

    // ═══════════════════════════════════════════════════════════════════
    // Memoization
    // ═══════════════════════════════════════════════════════════════════

    /// The clone already produced for the source node with identity `key`.
    pub(crate) fn memoized(&self, key: usize) -> Option<NodeRef> {
        self.memo.get(&key).cloned()
    }

    /// Remember the clone of the source node with identity `key`.
    pub(crate) fn memoize(&mut self, key: usize, clone: NodeRef) {
        self.memo.insert(key, clone);
    }

    /// The cloned counterpart of a shared cache array, created on first use.
    pub(crate) fn shared_array(
        &mut self,
        source: &SharedMemo,
        make: impl FnOnce() -> SharedMemo,
    ) -> SharedMemo {
        let key = Rc::as_ptr(source) as *const () as usize;
        self.arrays.entry(key).or_insert_with(make).clone()
    }
}

impl Default for CloneContext {
    fn default() -> Self {
        Self::with_options(CloneOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_clone_innermost_first() {
        let original = Container::shared();
        let outer = Container::shared();
        let inner = Container::shared();
        let mut ctx = CloneContext::default();
        ctx.push_ancestor(original.clone(), outer);
        ctx.push_ancestor(original.clone(), inner.clone());
        let found = ctx.find_clone(&original).unwrap();
        assert!(Rc::ptr_eq(&found, &inner));
        ctx.pop_ancestor();
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_record_uses_dotted_path() {
        let mut ctx = CloneContext::new(true, true);
        ctx.enter("a");
        ctx.enter("b");
        ctx.record(CloneError::ExternalDependency {
            path: "x".to_string(),
        });
        ctx.leave();
        ctx.leave();
        assert_eq!(ctx.errors().len(), 1);
        assert_eq!(ctx.errors()[0].path, "a.b");
        assert!(ctx.optimize());
        assert!(ctx.no_dependency());
    }

    #[test]
    fn test_options_constructors() {
        assert!(!CloneOptions::copy().optimize);
        let isolated = CloneOptions::optimized().isolated();
        assert!(isolated.optimize && isolated.no_dependency);
    }
}
