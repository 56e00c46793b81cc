//! Static timeline tree: the declarative shape of an animation.
//!
//! Nodes are immutable after construction and shareable; every duration is
//! computed once here and never changes. All playback bookkeeping lives on
//! the plan side (see `plan.rs`), so several plans can play one static tree
//! simultaneously.

use std::fmt;
use std::rc::Rc;

use choreo_signal_core::Signal;
use serde::{Deserialize, Serialize};

use crate::error::TimelineError;
use crate::interp::Easing;
use crate::value::Value;

/// Repeat count: a fixed number of iterations or unbounded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatCount {
    Finite(u32),
    Infinite,
}

impl RepeatCount {
    #[inline]
    pub fn is_infinite(self) -> bool {
        matches!(self, RepeatCount::Infinite)
    }
}

/// Direction of travel reported to step callbacks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
}

/// Context handed to a step callback when it fires.
#[derive(Clone, Debug)]
pub struct StepContext {
    /// Local progress of the step at the moment it fired (1.0 on commit).
    pub progress: f32,
    /// The owning plan's progress before the current update call.
    pub previous_progress: f32,
    pub direction: Direction,
}

/// Target value of a tween: a constant, or a thunk re-evaluated at every run
/// (supports chasing a moving target, e.g. another signal).
#[derive(Clone)]
pub enum TweenTo {
    Const(Value),
    Dynamic(Rc<dyn Fn() -> Value>),
}

impl fmt::Debug for TweenTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TweenTo::Const(v) => f.debug_tuple("Const").field(v).finish(),
            TweenTo::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<Value> for TweenTo {
    fn from(v: Value) -> Self {
        TweenTo::Const(v)
    }
}

impl From<f32> for TweenTo {
    fn from(v: f32) -> Self {
        TweenTo::Const(Value::Float(v))
    }
}

/// Interpolate a signal from a start value to a target over a duration.
#[derive(Clone, Debug)]
pub struct Tween {
    pub(crate) signal: Signal<Value>,
    /// Start value; captured from the signal at entry when unset.
    pub(crate) from: Option<Value>,
    pub(crate) to: TweenTo,
    pub(crate) duration: f32,
    pub(crate) ease: Easing,
}

impl Tween {
    pub fn new(signal: Signal<Value>, to: impl Into<TweenTo>, duration: f32) -> Self {
        Self {
            signal,
            from: None,
            to: to.into(),
            duration,
            ease: Easing::default(),
        }
    }

    pub fn with_from(mut self, from: Value) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_ease(mut self, ease: Easing) -> Self {
        self.ease = ease;
        self
    }
}

/// Consume clock time with no side effect.
#[derive(Clone, Debug)]
pub struct Wait {
    pub(crate) duration: f32,
}

impl Wait {
    pub fn new(duration: f32) -> Self {
        Self { duration }
    }
}

/// Run a callback exactly once per entry. Steps are instantaneous: the
/// commit loop completes them the moment their turn arrives, which is what
/// guarantees run-once semantics under arbitrarily large deltas.
#[derive(Clone)]
pub struct Step {
    pub(crate) run: Rc<dyn Fn(&StepContext)>,
}

impl Step {
    pub fn new(run: impl Fn(&StepContext) + 'static) -> Self {
        Self { run: Rc::new(run) }
    }

    /// Checked constructor for data-driven builders where the duration is
    /// config input rather than fixed by the call site.
    pub fn with_duration(
        duration: f32,
        run: impl Fn(&StepContext) + 'static,
    ) -> Result<Self, TimelineError> {
        if duration != 0.0 {
            return Err(TimelineError::StepWithDuration);
        }
        Ok(Self::new(run))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Step { duration: 0 }")
    }
}

/// Children played back to back; duration is the sum.
#[derive(Clone, Debug)]
pub struct Sequence {
    pub(crate) children: Vec<TimelineNode>,
    pub(crate) duration: f32,
}

impl Sequence {
    pub fn new(children: Vec<TimelineNode>) -> Self {
        let duration = total_duration(&children);
        Self { children, duration }
    }
}

/// Children played simultaneously; duration is the max. A parallel with an
/// infinite child is itself infinite and never completes; finite children
/// complete early and hold their final value.
#[derive(Clone, Debug)]
pub struct Parallel {
    pub(crate) children: Vec<TimelineNode>,
    pub(crate) duration: f32,
}

impl Parallel {
    pub fn new(children: Vec<TimelineNode>) -> Self {
        let duration = children
            .iter()
            .map(TimelineNode::duration)
            .fold(0.0f32, f32::max);
        Self { children, duration }
    }
}

/// Play the body `times` times (or forever).
#[derive(Clone, Debug)]
pub struct Repeat {
    pub(crate) children: Vec<TimelineNode>,
    pub(crate) times: RepeatCount,
    /// Duration of one iteration of the body.
    pub(crate) child_duration: f32,
    pub(crate) duration: f32,
}

impl Repeat {
    pub fn new(times: RepeatCount, children: Vec<TimelineNode>) -> Result<Self, TimelineError> {
        let child_duration = total_duration(&children);
        if times.is_infinite() && child_duration == 0.0 {
            return Err(TimelineError::InfiniteZeroDuration);
        }
        let duration = match times {
            RepeatCount::Finite(n) => child_duration * n as f32,
            RepeatCount::Infinite => f32::INFINITY,
        };
        Ok(Self {
            children,
            times,
            child_duration,
            duration,
        })
    }
}

/// One node of the static timeline tree.
#[derive(Clone, Debug)]
pub enum TimelineNode {
    Tween(Tween),
    Wait(Wait),
    Step(Step),
    Sequence(Sequence),
    Parallel(Parallel),
    Repeat(Repeat),
}

impl TimelineNode {
    /// Total duration in ms; infinite for unbounded repeats.
    pub fn duration(&self) -> f32 {
        match self {
            TimelineNode::Tween(t) => t.duration,
            TimelineNode::Wait(w) => w.duration,
            TimelineNode::Step(_) => 0.0,
            TimelineNode::Sequence(s) => s.duration,
            TimelineNode::Parallel(p) => p.duration,
            TimelineNode::Repeat(r) => r.duration,
        }
    }

    /// Child nodes, empty for leaves.
    pub(crate) fn children(&self) -> &[TimelineNode] {
        match self {
            TimelineNode::Sequence(s) => &s.children,
            TimelineNode::Parallel(p) => &p.children,
            TimelineNode::Repeat(r) => &r.children,
            TimelineNode::Tween(_) | TimelineNode::Wait(_) | TimelineNode::Step(_) => &[],
        }
    }
}

impl From<Tween> for TimelineNode {
    fn from(t: Tween) -> Self {
        TimelineNode::Tween(t)
    }
}

impl From<Wait> for TimelineNode {
    fn from(w: Wait) -> Self {
        TimelineNode::Wait(w)
    }
}

impl From<Step> for TimelineNode {
    fn from(s: Step) -> Self {
        TimelineNode::Step(s)
    }
}

impl From<Sequence> for TimelineNode {
    fn from(s: Sequence) -> Self {
        TimelineNode::Sequence(s)
    }
}

impl From<Parallel> for TimelineNode {
    fn from(p: Parallel) -> Self {
        TimelineNode::Parallel(p)
    }
}

impl From<Repeat> for TimelineNode {
    fn from(r: Repeat) -> Self {
        TimelineNode::Repeat(r)
    }
}

fn total_duration(children: &[TimelineNode]) -> f32 {
    children.iter().map(TimelineNode::duration).sum()
}
