//! Hierarchical containers
//!
//! A [`Container`] owns an ordered map of named child slots plus an
//! optional value of its own. Children keep insertion order, which is the
//! order iteration and cloning visit them in.
//!
//! Containers are shared behind `Rc` and mutated through `&self`: references
//! hold weak handles to their anchor containers while the tree is still
//! being built around them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{EvalError, TreeError};
use crate::node::NodeRef;
use crate::path::{is_valid_name, Path};
use crate::value::Value;

/// What a named child (or a container's own value) holds.
#[derive(Clone)]
pub enum Slot {
    /// Declared but never assigned
    Empty,
    /// A value node
    Node(NodeRef),
    /// A nested container
    Container(Rc<Container>),
    /// Temporarily taken out while the resolver clones it
    Detached,
}

impl Slot {
    /// Whether the slot holds nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    /// The slot's value node: the node itself, or a nested container's own
    /// value.
    pub fn value(&self) -> Option<NodeRef> {
        match self {
            Slot::Node(node) => Some(node.clone()),
            Slot::Container(container) => container.value(),
            Slot::Empty | Slot::Detached => None,
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Empty => write!(f, "Empty"),
            Slot::Node(node) => write!(f, "{:?}", node),
            Slot::Container(container) => write!(f, "{:?}", container),
            Slot::Detached => write!(f, "Detached"),
        }
    }
}

/// A node of the configuration tree.
pub struct Container {
    own: RefCell<Slot>,
    children: RefCell<IndexMap<String, Slot>>,
}

impl Container {
    /// Create an empty container.
    pub fn new() -> Self {
        Self {
            own: RefCell::new(Slot::Empty),
            children: RefCell::new(IndexMap::new()),
        }
    }

    /// Create an empty container behind an `Rc`.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Create a container whose own value is `node`.
    pub fn with_value(node: NodeRef) -> Self {
        let container = Self::new();
        container.own.replace(Slot::Node(node));
        container
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    /// Whether there are no children.
    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }

    /// Whether a direct child named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.children.borrow().contains_key(name)
    }

    /// Names of the direct children, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.children.borrow().keys().cloned().collect()
    }

    /// The container's own value node.
    pub fn value(&self) -> Option<NodeRef> {
        match &*self.own.borrow() {
            Slot::Node(node) => Some(node.clone()),
            _ => None,
        }
    }

    /// Evaluate the container's own value.
    pub fn evaluate(&self) -> Result<Value, EvalError> {
        match self.value() {
            Some(node) => node.evaluate(),
            None => Err(EvalError::RequiredFieldNull {
                field: "<own value>".to_string(),
            }),
        }
    }

    /// Whether the container's own value is present and fixed.
    pub fn is_fixed(&self) -> bool {
        self.value().map_or(false, |node| node.is_fixed())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════════════

    /// The nested container named `name`.
    pub fn child(&self, name: &str) -> Option<Rc<Container>> {
        match self.slot(name)? {
            Slot::Container(container) => Some(container),
            _ => None,
        }
    }

    /// Find the node at `path`.
    ///
    /// Indirect segments must name containers. The final segment may name
    /// either a node or a container, in which case that container's own
    /// value is returned. The empty path returns this container's own value.
    /// Empty and detached slots are not found.
    pub fn get_child_ptr(&self, path: &Path) -> Option<NodeRef> {
        let Some(direct) = path.direct() else {
            return self.value();
        };

        let mut holder: Option<Rc<Container>> = None;
        for segment in path.indirect() {
            let scope: &Container = holder.as_deref().unwrap_or(self);
            let next = scope.child(segment)?;
            holder = Some(next);
        }
        let scope: &Container = holder.as_deref().unwrap_or(self);
        scope.slot(direct)?.value()
    }

    /// Evaluate the node at a dotted path to a string.
    ///
    /// An unparsable or unresolved path is `Ok(None)`; a failing
    /// evaluation is an error.
    pub fn get_child(&self, path: &str) -> Result<Option<String>, EvalError> {
        self.get_value(path)
            .map(|value| value.map(Value::into_string))
    }

    /// Evaluate the node at a dotted path.
    pub fn get_value(&self, path: &str) -> Result<Option<Value>, EvalError> {
        let Ok(path) = Path::parse(path) else {
            return Ok(None);
        };
        match self.get_child_ptr(&path) {
            Some(node) => node.evaluate().map(Some),
            None => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Mutation
    // ═══════════════════════════════════════════════════════════════════

    /// Insert `node` at `path`, creating intermediate containers.
    ///
    /// A value already sitting where an intermediate container is needed is
    /// moved into the new container's own slot. Inserting onto an occupied
    /// slot fails, except onto a container whose own slot is still empty.
    pub fn add(&self, path: &Path, node: NodeRef) -> Result<(), TreeError> {
        validate(path)?;
        let Some(direct) = path.direct() else {
            return self.place_own(node, &path.to_string());
        };

        let mut holder: Option<Rc<Container>> = None;
        for segment in path.indirect() {
            let scope: &Container = holder.as_deref().unwrap_or(self);
            let next = scope.child_or_create(segment, path)?;
            holder = Some(next);
        }
        let scope: &Container = holder.as_deref().unwrap_or(self);
        scope.insert_direct(direct, node, path)
    }

    /// Insert `node` at a dotted path.
    pub fn insert(&self, path: &str, node: NodeRef) -> Result<(), TreeError> {
        let parsed = Path::parse(path).map_err(|_| TreeError::InvalidName {
            name: path.to_string(),
        })?;
        self.add(&parsed, node)
    }

    /// Declare `path` without giving it a value.
    ///
    /// Declaring an existing slot is a no-op.
    pub fn declare(&self, path: &Path) -> Result<(), TreeError> {
        validate(path)?;
        let Some(direct) = path.direct() else {
            return Ok(());
        };

        let mut holder: Option<Rc<Container>> = None;
        for segment in path.indirect() {
            let scope: &Container = holder.as_deref().unwrap_or(self);
            let next = scope.child_or_create(segment, path)?;
            holder = Some(next);
        }
        let scope: &Container = holder.as_deref().unwrap_or(self);
        scope
            .children
            .borrow_mut()
            .entry(direct.to_string())
            .or_insert(Slot::Empty);
        Ok(())
    }

    /// Write `value` into the node at a dotted path.
    ///
    /// Returns `false` when the path does not resolve or the node refuses
    /// the write.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> bool {
        let Ok(path) = Path::parse(path) else {
            return false;
        };
        match self.get_child_ptr(&path) {
            Some(node) => node.set(&value.into()),
            None => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Iteration
    // ═══════════════════════════════════════════════════════════════════

    /// Visit the direct children in insertion order.
    ///
    /// The visitor sees a snapshot, so it may freely mutate this container.
    pub fn iterate_children(&self, mut visit: impl FnMut(&str, &Slot)) {
        for (name, slot) in self.entries() {
            visit(&name, &slot);
        }
    }

    /// Visit every value node below this container, depth first, with its
    /// dotted path. A container's own value is visited before its children.
    pub fn walk(&self, mut visit: impl FnMut(&str, &NodeRef)) {
        self.walk_inner(&mut Vec::new(), &mut visit);
    }

    fn walk_inner(&self, prefix: &mut Vec<String>, visit: &mut dyn FnMut(&str, &NodeRef)) {
        if let Some(own) = self.value() {
            visit(&prefix.join("."), &own);
        }
        for (name, slot) in self.entries() {
            prefix.push(name);
            match slot {
                Slot::Node(node) => visit(&prefix.join("."), &node),
                Slot::Container(child) => child.walk_inner(prefix, visit),
                Slot::Empty | Slot::Detached => {}
            }
            prefix.pop();
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Slot Access (resolver)
    // ═══════════════════════════════════════════════════════════════════

    /// A copy of the slot named `name`.
    pub(crate) fn slot(&self, name: &str) -> Option<Slot> {
        self.children.borrow().get(name).cloned()
    }

    /// A copy of the own-value slot.
    pub(crate) fn own_slot(&self) -> Slot {
        self.own.borrow().clone()
    }

    /// Snapshot of all children.
    pub(crate) fn entries(&self) -> Vec<(String, Slot)> {
        self.children
            .borrow()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect()
    }

    /// Overwrite a child slot (`Some(name)`) or the own slot (`None`),
    /// returning what was there.
    pub(crate) fn replace_slot(&self, key: Option<&str>, slot: Slot) -> Slot {
        match key {
            None => self.own.replace(slot),
            Some(name) => self
                .children
                .borrow_mut()
                .insert(name.to_string(), slot)
                .unwrap_or(Slot::Empty),
        }
    }

    /// The nested container `name`, created if the slot is missing or
    /// empty. A value in the way is moved into the new container's own
    /// slot.
    pub(crate) fn child_or_create(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<Rc<Container>, TreeError> {
        let mut children = self.children.borrow_mut();
        let container = match children.get(name) {
            Some(Slot::Container(existing)) => return Ok(existing.clone()),
            Some(Slot::Node(node)) => Rc::new(Container::with_value(node.clone())),
            Some(Slot::Detached) => {
                return Err(TreeError::ShapeConflict {
                    path: path.to_string(),
                })
            }
            Some(Slot::Empty) | None => Container::shared(),
        };
        children.insert(name.to_string(), Slot::Container(container.clone()));
        Ok(container)
    }

    /// Like [`child_or_create`](Self::child_or_create), but a value in the
    /// way is a conflict instead of being moved.
    pub(crate) fn child_for_merge(&self, name: &str, path: &str) -> Result<Rc<Container>, TreeError> {
        let mut children = self.children.borrow_mut();
        match children.get(name) {
            Some(Slot::Container(existing)) => Ok(existing.clone()),
            Some(Slot::Empty) | None => {
                let container = Container::shared();
                children.insert(name.to_string(), Slot::Container(container.clone()));
                Ok(container)
            }
            Some(Slot::Node(_)) | Some(Slot::Detached) => Err(TreeError::ShapeConflict {
                path: path.to_string(),
            }),
        }
    }

    /// Put a cloned node into a child slot (`Some(name)`) or the own slot
    /// (`None`).
    ///
    /// Placing the very node that is already there is a no-op. A container
    /// in the way takes the node as its own value.
    pub(crate) fn place(&self, key: Option<&str>, node: NodeRef, path: &str) -> Result<(), TreeError> {
        let Some(name) = key else {
            return self.place_own(node, path);
        };

        let existing = self.slot(name);
        match existing {
            None | Some(Slot::Empty) => {
                self.children
                    .borrow_mut()
                    .insert(name.to_string(), Slot::Node(node));
                Ok(())
            }
            Some(Slot::Node(current)) if Rc::ptr_eq(&current, &node) => Ok(()),
            Some(Slot::Container(container)) => container.place_own(node, path),
            Some(Slot::Node(_)) | Some(Slot::Detached) => Err(TreeError::DuplicateKey {
                path: path.to_string(),
            }),
        }
    }

    fn place_own(&self, node: NodeRef, path: &str) -> Result<(), TreeError> {
        let mut own = self.own.borrow_mut();
        match &*own {
            Slot::Empty => {
                *own = Slot::Node(node);
                Ok(())
            }
            Slot::Node(current) if Rc::ptr_eq(current, &node) => Ok(()),
            _ => Err(TreeError::DuplicateKey {
                path: path.to_string(),
            }),
        }
    }

    fn insert_direct(&self, name: &str, node: NodeRef, path: &Path) -> Result<(), TreeError> {
        let existing = self.slot(name);
        match existing {
            None | Some(Slot::Empty) => {
                self.children
                    .borrow_mut()
                    .insert(name.to_string(), Slot::Node(node));
                Ok(())
            }
            Some(Slot::Container(container)) => container.place_own(node, &path.to_string()),
            Some(Slot::Node(_)) | Some(Slot::Detached) => Err(TreeError::DuplicateKey {
                path: path.to_string(),
            }),
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        if let Slot::Node(own) = &*self.own.borrow() {
            map.entry(&"<own>", own);
        }
        for (name, slot) in self.children.borrow().iter() {
            map.entry(name, slot);
        }
        map.finish()
    }
}

fn validate(path: &Path) -> Result<(), TreeError> {
    match path.segments().iter().find(|segment| !is_valid_name(segment)) {
        Some(bad) => Err(TreeError::InvalidName { name: bad.clone() }),
        None => Ok(()),
    }
}
