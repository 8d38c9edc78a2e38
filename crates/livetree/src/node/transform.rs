//! Transform nodes: numeric rescale, damped spring, clock and write-back

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{checked_clone, Evaluate, Fallback, NodeKind, NodeRef};
use crate::context::CloneContext;
use crate::error::{CloneError, EvalError};
use crate::value::Value;

// ═══════════════════════════════════════════════════════════════════════
// Map
// ═══════════════════════════════════════════════════════════════════════

/// A closed numeric range `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl Range {
    /// Create a range.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Distance between the bounds.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Position of `x` inside the range, clamped to `0..=1`.
    ///
    /// An empty range maps everything below its bound to 0 and the rest
    /// to 1.
    pub fn unit(&self, x: f64) -> f64 {
        let span = self.span();
        if span == 0.0 {
            return if x < self.min { 0.0 } else { 1.0 };
        }
        ((x - self.min) / span).clamp(0.0, 1.0)
    }

    /// The point at `t` (in `0..=1`) along the range.
    pub fn lerp(&self, t: f64) -> f64 {
        self.min + self.span() * t
    }
}

/// Linearly rescales its inner number from one range to another, always
/// clamping to the destination range.
pub struct Map {
    from: Range,
    to: Range,
    value: NodeRef,
    fallback: Fallback,
}

impl Map {
    /// Create a rescale.
    pub fn new(from: Range, to: Range, value: NodeRef, fallback: Fallback) -> Self {
        Self {
            from,
            to,
            value,
            fallback,
        }
    }

    fn rescale(&self) -> Result<Value, EvalError> {
        let x = self.value.evaluate_float()?;
        Ok(Value::Float(self.to.lerp(self.from.unit(x))))
    }
}

impl Evaluate for Map {
    fn evaluate(&self) -> Result<Value, EvalError> {
        self.rescale().or_else(|err| self.fallback.recover(err))
    }

    fn is_fixed(&self) -> bool {
        self.value.is_fixed() && self.fallback.is_fixed()
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(Self::new(
            self.from,
            self.to,
            checked_clone(&self.value, ctx)?,
            self.fallback.clone_in(ctx)?,
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Map
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Smooth
// ═══════════════════════════════════════════════════════════════════════

/// A damped spring following its inner number.
///
/// Every evaluation advances the spring one step:
/// `velocity += (target - current) * spring - velocity * drag`, then
/// `current += velocity`. The first evaluation snaps to the target.
pub struct Smooth {
    target: NodeRef,
    spring: f64,
    drag: f64,
    state: Cell<Option<(f64, f64)>>,
    fallback: Fallback,
}

impl Smooth {
    /// Create a spring with the given stiffness and drag.
    pub fn new(target: NodeRef, spring: f64, drag: f64, fallback: Fallback) -> Self {
        Self {
            target,
            spring,
            drag,
            state: Cell::new(None),
            fallback,
        }
    }

    fn step(&self) -> Result<Value, EvalError> {
        let target = self.target.evaluate_float()?;
        let (current, velocity) = match self.state.get() {
            None => (target, 0.0),
            Some((current, velocity)) => {
                let velocity = velocity + (target - current) * self.spring - velocity * self.drag;
                (current + velocity, velocity)
            }
        };
        self.state.set(Some((current, velocity)));
        Ok(Value::Float(current))
    }
}

impl Evaluate for Smooth {
    fn evaluate(&self) -> Result<Value, EvalError> {
        self.step().or_else(|err| self.fallback.recover(err))
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        let clone = Self::new(
            checked_clone(&self.target, ctx)?,
            self.spring,
            self.drag,
            self.fallback.clone_in(ctx)?,
        );
        clone.state.set(self.state.get());
        Ok(Rc::new(clone))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Smooth
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════════════════

/// Counts ticks on a monotonic clock, wrapping at `loop_count`.
///
/// The count starts at `zero_tick` when the node is created.
#[derive(Debug, Clone)]
pub struct Clock {
    tick: Duration,
    loop_count: u64,
    zero_tick: u64,
    started: Instant,
}

impl Clock {
    /// Create a clock starting now.
    pub fn new(tick: Duration, loop_count: u64, zero_tick: u64) -> Self {
        Self {
            tick,
            loop_count,
            zero_tick,
            started: Instant::now(),
        }
    }

    /// The tick count at `now`.
    pub fn ticks_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.started).as_nanos();
        let ticks = match self.tick.as_nanos() {
            0 => 0,
            tick => elapsed / tick,
        };
        let total = ticks.saturating_add(self.zero_tick as u128);
        (total % self.loop_count.max(1) as u128) as u64
    }
}

impl Evaluate for Clock {
    fn evaluate(&self) -> Result<Value, EvalError> {
        Ok(Value::Int(self.ticks_at(Instant::now()) as i64))
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn clone_node(&self, _ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(self.clone()))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Clock
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Save
// ═══════════════════════════════════════════════════════════════════════

/// Splits its inner string at the last delimiter, writes the prefix to a
/// settable target and returns the suffix.
///
/// Without a delimiter in the string nothing is written and the whole
/// string is returned. A target that refuses the write is a hard failure
/// and never falls back.
pub struct Save {
    target: NodeRef,
    target_path: String,
    value: NodeRef,
    delimiter: char,
    fallback: Fallback,
}

impl Save {
    /// Create a write-back node.
    pub fn new(
        target: NodeRef,
        target_path: impl Into<String>,
        value: NodeRef,
        delimiter: char,
        fallback: Fallback,
    ) -> Self {
        Self {
            target,
            target_path: target_path.into(),
            value,
            delimiter,
            fallback,
        }
    }
}

impl Evaluate for Save {
    fn evaluate(&self) -> Result<Value, EvalError> {
        let text = match self.value.evaluate_string() {
            Ok(text) => text,
            Err(err) => return self.fallback.recover(err),
        };
        match text.rsplit_once(self.delimiter) {
            Some((prefix, suffix)) => {
                if !self.target.set(&Value::from(prefix)) {
                    return Err(EvalError::Rejected {
                        path: self.target_path.clone(),
                    });
                }
                debug!(target = %self.target_path, "saved prefix");
                Ok(Value::from(suffix))
            }
            None => Ok(Value::String(text)),
        }
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(Self::new(
            checked_clone(&self.target, ctx)?,
            self.target_path.clone(),
            checked_clone(&self.value, ctx)?,
            self.delimiter,
            self.fallback.clone_in(ctx)?,
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Save
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Constant, Variable};

    #[test]
    fn test_map_midpoint() {
        let map = Map::new(
            Range::new(5.0, 10.0),
            Range::new(0.0, 2.0),
            Constant::shared(7.5),
            Fallback::default(),
        );
        assert_eq!(map.evaluate_float().unwrap(), 1.0);
        assert_eq!(map.evaluate_int().unwrap(), 1);
        assert!(map.is_fixed());
    }

    #[test]
    fn test_map_clamps() {
        let above = Map::new(
            Range::new(0.0, 10.0),
            Range::new(100.0, 200.0),
            Constant::shared(50),
            Fallback::default(),
        );
        assert_eq!(above.evaluate_float().unwrap(), 200.0);

        let below = Map::new(
            Range::new(0.0, 10.0),
            Range::new(100.0, 200.0),
            Constant::shared(-5),
            Fallback::default(),
        );
        assert_eq!(below.evaluate_float().unwrap(), 100.0);
    }

    #[test]
    fn test_map_inverted_destination() {
        let map = Map::new(
            Range::new(0.0, 4.0),
            Range::new(1.0, 0.0),
            Constant::shared(1),
            Fallback::default(),
        );
        assert_eq!(map.evaluate_float().unwrap(), 0.75);
    }

    #[test]
    fn test_map_non_numeric_uses_fallback() {
        let map = Map::new(
            Range::new(0.0, 1.0),
            Range::new(0.0, 1.0),
            Constant::shared("abc"),
            Fallback::new("m").with_node(Constant::shared("n/a")),
        );
        assert_eq!(map.evaluate_string().unwrap(), "n/a");
    }

    #[test]
    fn test_smooth_snaps_then_springs() {
        let target = Variable::shared(0.0);
        let smooth = Smooth::new(target.clone(), 0.5, 0.0, Fallback::default());
        assert_eq!(smooth.evaluate_float().unwrap(), 0.0);

        assert!(target.set(&Value::Float(10.0)));
        // velocity = 10 * 0.5 = 5, current = 5
        assert_eq!(smooth.evaluate_float().unwrap(), 5.0);
        // velocity = 5 + 5 * 0.5 = 7.5, current = 12.5
        assert_eq!(smooth.evaluate_float().unwrap(), 12.5);
        assert!(!smooth.is_fixed());
    }

    #[test]
    fn test_clock_starts_at_zero_tick() {
        let clock = Clock::new(Duration::from_secs(3600), 10, 3);
        assert_eq!(clock.evaluate_int().unwrap(), 3);
        assert!(!clock.is_fixed());
    }

    #[test]
    fn test_clock_wraps() {
        let clock = Clock::new(Duration::from_millis(10), 4, 1);
        let later = clock.started + Duration::from_millis(55);
        // 5 ticks elapsed + 1 = 6, mod 4
        assert_eq!(clock.ticks_at(later), 2);
    }

    #[test]
    fn test_save_writes_prefix_returns_suffix() {
        let target = Variable::shared("");
        let save = Save::new(
            target.clone(),
            "state",
            Constant::shared("a;b;c"),
            ';',
            Fallback::default(),
        );
        assert_eq!(save.evaluate_string().unwrap(), "c");
        assert_eq!(target.evaluate_string().unwrap(), "a;b");
    }

    #[test]
    fn test_save_without_delimiter_returns_whole() {
        let target = Variable::shared("old");
        let save = Save::new(
            target.clone(),
            "state",
            Constant::shared("abc"),
            ';',
            Fallback::default(),
        );
        assert_eq!(save.evaluate_string().unwrap(), "abc");
        assert_eq!(target.evaluate_string().unwrap(), "old");
    }

    #[test]
    fn test_save_rejected_target_fails_hard() {
        let save = Save::new(
            Constant::shared("ro"),
            "state",
            Constant::shared("a;b"),
            ';',
            Fallback::new("s").with_node(Constant::shared("fb")),
        );
        assert!(matches!(
            save.evaluate().unwrap_err(),
            EvalError::Rejected { path } if path == "state"
        ));
    }
}
