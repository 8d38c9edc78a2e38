//! Caching nodes
//!
//! Three invalidation policies:
//! - [`TimedCache`]: recompute once the previous result has expired
//! - [`SourceChangedCache`]: recompute when a key value changes (or expires)
//! - [`IndexedCache`]: compute each index once, ever, in an array that
//!   sibling caches may share

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{checked_clone, Evaluate, NodeKind, NodeRef};
use crate::context::CloneContext;
use crate::error::{CloneError, EvalError};
use crate::value::Value;

/// Memo array shared by sibling [`IndexedCache`]s.
pub type SharedMemo = Rc<RefCell<Vec<Option<Value>>>>;

// ═══════════════════════════════════════════════════════════════════════
// TimedCache
// ═══════════════════════════════════════════════════════════════════════

/// Memoizes its source for a fixed duration.
///
/// A zero duration recomputes on every read.
pub struct TimedCache {
    source: NodeRef,
    duration: Duration,
    state: RefCell<Option<(Value, Instant)>>,
}

impl TimedCache {
    /// Create a cache over `source`.
    pub fn new(source: NodeRef, duration: Duration) -> Self {
        Self {
            source,
            duration,
            state: RefCell::new(None),
        }
    }

    /// Forget the memoized value.
    pub fn invalidate(&self) {
        self.state.replace(None);
    }
}

impl Evaluate for TimedCache {
    fn evaluate(&self) -> Result<Value, EvalError> {
        let now = Instant::now();
        if let Some((value, expiry)) = &*self.state.borrow() {
            if !self.duration.is_zero() && now <= *expiry {
                return Ok(value.clone());
            }
        }

        debug!(duration_ms = self.duration.as_millis() as u64, "timed cache recomputing");
        let value = self.source.evaluate()?;
        self.state
            .replace(Some((value.clone(), now + self.duration)));
        Ok(value)
    }

    fn is_fixed(&self) -> bool {
        self.source.is_fixed()
    }

    fn set(&self, value: &Value) -> bool {
        let accepted = self.source.set(value);
        if accepted {
            self.invalidate();
        }
        accepted
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        let clone = Self::new(checked_clone(&self.source, ctx)?, self.duration);
        clone.state.replace(self.state.borrow().clone());
        Ok(Rc::new(clone))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::TimedCache
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SourceChangedCache
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct Observed {
    key: String,
    value: Value,
    expiry: Option<Instant>,
}

/// Memoizes a calculator until a key value changes.
///
/// Recomputes when there is no prior value, when the key's string differs
/// from the last observed one, or when the optional time-to-live elapsed.
pub struct SourceChangedCache {
    key: NodeRef,
    calculator: NodeRef,
    ttl: Option<Duration>,
    state: RefCell<Option<Observed>>,
}

impl SourceChangedCache {
    /// Create a cache keyed on `key`.
    pub fn new(key: NodeRef, calculator: NodeRef, ttl: Option<Duration>) -> Self {
        Self {
            key,
            calculator,
            ttl,
            state: RefCell::new(None),
        }
    }
}

impl Evaluate for SourceChangedCache {
    fn evaluate(&self) -> Result<Value, EvalError> {
        let key = self.key.evaluate_string()?;
        let now = Instant::now();
        if let Some(observed) = &*self.state.borrow() {
            let fresh = observed.expiry.map_or(true, |expiry| now <= expiry);
            if fresh && observed.key == key {
                return Ok(observed.value.clone());
            }
        }

        debug!(%key, "source changed cache recomputing");
        let value = self.calculator.evaluate()?;
        self.state.replace(Some(Observed {
            key,
            value: value.clone(),
            expiry: self.ttl.map(|ttl| now + ttl),
        }));
        Ok(value)
    }

    fn is_fixed(&self) -> bool {
        self.key.is_fixed() && self.calculator.is_fixed()
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        let clone = Self::new(
            checked_clone(&self.key, ctx)?,
            checked_clone(&self.calculator, ctx)?,
            self.ttl,
        );
        clone.state.replace(self.state.borrow().clone());
        Ok(Rc::new(clone))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::SourceChangedCache
    }
}

// ═══════════════════════════════════════════════════════════════════════
// IndexedCache
// ═══════════════════════════════════════════════════════════════════════

/// Memoizes a calculator per index.
///
/// Evaluating reads the index node and returns `get(index)`. Every cache
/// built on the same [`SharedMemo`] sees the others' results, so each index
/// is computed at most once across all of them.
pub struct IndexedCache {
    index: NodeRef,
    calculator: NodeRef,
    memo: SharedMemo,
}

impl IndexedCache {
    /// Create a cache with its own array of `size` entries.
    pub fn with_capacity(size: usize, index: NodeRef, calculator: NodeRef) -> Self {
        Self::sharing(Rc::new(RefCell::new(vec![None; size])), index, calculator)
    }

    /// Create a cache on an existing array.
    pub fn sharing(memo: SharedMemo, index: NodeRef, calculator: NodeRef) -> Self {
        Self {
            index,
            calculator,
            memo,
        }
    }

    /// The backing array.
    pub fn memo(&self) -> &SharedMemo {
        &self.memo
    }

    /// Number of indices the array holds.
    pub fn size(&self) -> usize {
        self.memo.borrow().len()
    }

    /// The value at `index`, computing it on first request.
    pub fn get(&self, index: usize) -> Result<Value, EvalError> {
        {
            let memo = self.memo.borrow();
            match memo.get(index) {
                None => {
                    return Err(EvalError::IndexOutOfRange {
                        index: index as i64,
                        size: memo.len(),
                    })
                }
                Some(Some(value)) => return Ok(value.clone()),
                Some(None) => {}
            }
        }

        debug!(index, "indexed cache computing");
        let value = self.calculator.evaluate()?;
        let mut memo = self.memo.borrow_mut();
        match memo.get_mut(index) {
            Some(slot) => Ok(slot.get_or_insert(value).clone()),
            None => Ok(value),
        }
    }
}

impl Evaluate for IndexedCache {
    fn evaluate(&self) -> Result<Value, EvalError> {
        let index = self.index.evaluate_int()?;
        let index = usize::try_from(index).map_err(|_| EvalError::IndexOutOfRange {
            index,
            size: self.size(),
        })?;
        self.get(index)
    }

    fn is_fixed(&self) -> bool {
        self.index.is_fixed() && self.calculator.is_fixed()
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        let memo = ctx.shared_array(&self.memo, || {
            Rc::new(RefCell::new(self.memo.borrow().clone()))
        });
        Ok(Rc::new(Self::sharing(
            memo,
            checked_clone(&self.index, ctx)?,
            checked_clone(&self.calculator, ctx)?,
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::IndexedCache
    }

    fn as_indexed_cache(&self) -> Option<&IndexedCache> {
        Some(self)
    }
}
