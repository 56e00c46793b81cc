//! AnimationPlan: the overshoot-safe scheduler over a static timeline tree.
//!
//! `update(delta)` advances a logical clock and walks the tree, committing
//! every wholly-elapsed step at full effect before running the current step
//! at fractional progress. Because whole steps are committed in a loop, a
//! delta far larger than any single step's duration never skips work: every
//! step callback and intermediate signal write still happens.

use std::rc::Rc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::interp::linear_value;
use crate::timeline::{Direction, Repeat, RepeatCount, StepContext, TimelineNode, TweenTo};
use crate::value::Value;

/// Playback status of a plan.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Pristine,
    Running,
    Paused,
    Stopped,
}

/// Per-node runtime bookkeeping, mirroring the static tree shape. Only the
/// fields relevant to a node's kind are used; the rest stay at their
/// defaults.
#[derive(Clone, Debug, Default)]
struct NodeState {
    /// Tween start value, captured at entry.
    start: Option<Value>,
    /// Step already fired this entry.
    triggered: bool,
    /// Group cursor (sequence/repeat body, and the plan root).
    current_step: usize,
    step_clock: f32,
    /// Repeat iteration index.
    iteration: u32,
    /// Zero-duration repeat body already ran its iterations this entry.
    exhausted: bool,
    children: Vec<NodeState>,
}

fn mirror(nodes: &[TimelineNode]) -> Vec<NodeState> {
    nodes
        .iter()
        .map(|node| NodeState {
            children: mirror(node.children()),
            ..NodeState::default()
        })
        .collect()
}

fn clear_state(st: &mut NodeState) {
    st.start = None;
    st.triggered = false;
    st.current_step = 0;
    st.step_clock = 0.0;
    st.iteration = 0;
    st.exhausted = false;
    for child in &mut st.children {
        clear_state(child);
    }
}

struct RunContext {
    previous_progress: f32,
}

/// A playable instance of a static timeline tree.
///
/// The tree itself is shared and immutable; all bookkeeping lives here, so
/// several plans may play one tree simultaneously. Plans are reusable:
/// `reset()` returns to `Pristine` with all nested state reinitialized.
pub struct AnimationPlan {
    steps: Rc<[TimelineNode]>,
    duration: f32,
    clock: f32,
    progress: f32,
    previous_progress: f32,
    status: PlanStatus,
    root: NodeState,
}

impl AnimationPlan {
    pub fn new(steps: Vec<TimelineNode>) -> Self {
        Self::from_shared(Rc::from(steps))
    }

    /// Build a plan over an already-shared tree (another plan may be playing
    /// the same tree at the same time).
    pub fn from_shared(steps: Rc<[TimelineNode]>) -> Self {
        let duration = steps.iter().map(TimelineNode::duration).sum();
        let root = NodeState {
            children: mirror(&steps),
            ..NodeState::default()
        };
        Self {
            steps,
            duration,
            clock: 0.0,
            progress: 0.0,
            previous_progress: 0.0,
            status: PlanStatus::Pristine,
            root,
        }
    }

    /// The shared static tree, for building further plans.
    pub fn steps(&self) -> Rc<[TimelineNode]> {
        Rc::clone(&self.steps)
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    /// Global progress in [0,1]; 1 when the duration is 0, and 0 forever for
    /// infinite plans.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.duration.is_finite() && self.progress >= 1.0
    }

    pub fn pause(&mut self) {
        if self.status == PlanStatus::Running {
            self.status = PlanStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == PlanStatus::Paused {
            self.status = PlanStatus::Running;
        }
    }

    pub fn stop(&mut self) {
        self.status = PlanStatus::Stopped;
    }

    /// Return to `Pristine`: zero all clocks and recursively reinitialize the
    /// runtime tree. No steps run; tween start values are recaptured from
    /// their signals on the next entry.
    pub fn reset(&mut self) -> &mut Self {
        self.clock = 0.0;
        self.progress = 0.0;
        self.previous_progress = 0.0;
        self.status = PlanStatus::Pristine;
        clear_state(&mut self.root);
        self
    }

    /// Advance the clock by at most `delta_ms` (clamped so it never exceeds
    /// the duration) and apply all resulting effects. Returns the time
    /// actually consumed; paused and stopped plans consume nothing. Negative
    /// deltas are treated as zero: the engine is forward-only.
    pub fn update(&mut self, delta_ms: f32) -> f32 {
        match self.status {
            PlanStatus::Paused | PlanStatus::Stopped => return 0.0,
            PlanStatus::Pristine => {
                self.status = PlanStatus::Running;
                let steps = Rc::clone(&self.steps);
                if let Some(first) = steps.first() {
                    enter_node(first, &mut self.root.children[0]);
                }
            }
            PlanStatus::Running => {}
        }
        let delta = delta_ms.max(0.0);
        let before = self.clock;
        self.clock = (self.clock + delta).min(self.duration);
        let consumed = self.clock - before;
        self.previous_progress = self.progress;
        self.progress = if self.duration == 0.0 {
            1.0
        } else {
            (self.clock / self.duration).min(1.0)
        };
        let ctx = RunContext {
            previous_progress: self.previous_progress,
        };
        let steps = Rc::clone(&self.steps);
        advance_group(&steps, &mut self.root, self.clock, &ctx);
        trace!(
            "plan update: clock={} progress={} consumed={}",
            self.clock,
            self.progress,
            consumed
        );
        consumed
    }
}

/// Initialize a node's runtime state at the moment it becomes current:
/// capture the tween start from its signal, re-arm steps, and recursively
/// prime nested groups (first child for sequences and repeats, every child
/// for parallels).
fn enter_node(node: &TimelineNode, st: &mut NodeState) {
    clear_state(st);
    match node {
        TimelineNode::Tween(t) => {
            st.start = Some(t.from.clone().unwrap_or_else(|| t.signal.get()));
        }
        TimelineNode::Wait(_) | TimelineNode::Step(_) => {}
        TimelineNode::Sequence(s) => {
            if let Some(first) = s.children.first() {
                enter_node(first, &mut st.children[0]);
            }
        }
        TimelineNode::Parallel(p) => {
            for (child, cst) in p.children.iter().zip(st.children.iter_mut()) {
                enter_node(child, cst);
            }
        }
        TimelineNode::Repeat(r) => {
            if let Some(first) = r.children.first() {
                enter_node(first, &mut st.children[0]);
            }
        }
    }
}

/// Apply a node's effect at a given local progress/clock.
fn run_node(
    node: &TimelineNode,
    st: &mut NodeState,
    progress: f32,
    local_clock: f32,
    ctx: &RunContext,
) {
    match node {
        TimelineNode::Tween(t) => {
            let start = match &st.start {
                Some(v) => v.clone(),
                None => t.signal.get(),
            };
            let end = match &t.to {
                TweenTo::Const(v) => v.clone(),
                TweenTo::Dynamic(f) => f(),
            };
            t.signal.set(linear_value(&start, &end, t.ease.apply(progress)));
        }
        TimelineNode::Wait(_) => {}
        TimelineNode::Step(s) => {
            if !st.triggered {
                st.triggered = true;
                (s.run)(&StepContext {
                    progress,
                    previous_progress: ctx.previous_progress,
                    direction: Direction::Forward,
                });
            }
        }
        TimelineNode::Sequence(seq) => {
            advance_group(&seq.children, st, local_clock, ctx);
        }
        TimelineNode::Parallel(par) => {
            // Clock-first scaling: a child shorter than the block completes
            // early and holds; an infinite child just keeps receiving the
            // parent's local clock.
            for (child, cst) in par.children.iter().zip(st.children.iter_mut()) {
                let d = child.duration();
                let child_clock = local_clock.min(d);
                let child_progress = if d == 0.0 {
                    1.0
                } else {
                    (child_clock / d).min(1.0)
                };
                run_node(child, cst, child_progress, child_clock, ctx);
            }
        }
        TimelineNode::Repeat(rep) => {
            run_repeat(rep, st, local_clock, ctx);
        }
    }
}

/// Process a list of children given the group's local clock: commit every
/// wholly-elapsed step at full effect, entering each successor as the cursor
/// advances, then run the in-range current step at fractional progress.
fn advance_group(nodes: &[TimelineNode], st: &mut NodeState, clock: f32, ctx: &RunContext) {
    while st.current_step < nodes.len() {
        let idx = st.current_step;
        let node = &nodes[idx];
        let d = node.duration();
        if d.is_finite() && clock >= st.step_clock + d {
            run_node(node, &mut st.children[idx], 1.0, d, ctx);
            st.step_clock += d;
            st.current_step += 1;
            if st.current_step < nodes.len() {
                let next = st.current_step;
                enter_node(&nodes[next], &mut st.children[next]);
            }
        } else {
            break;
        }
    }
    if st.current_step < nodes.len() {
        let idx = st.current_step;
        let node = &nodes[idx];
        let d = node.duration();
        let local = (clock - st.step_clock).max(0.0);
        let progress = if d == 0.0 { 1.0 } else { (local / d).min(1.0) };
        run_node(node, &mut st.children[idx], progress, local.min(d), ctx);
    }
}

/// Reset a group's cursor for the next repeat iteration and prime its first
/// child.
fn rearm_group(nodes: &[TimelineNode], st: &mut NodeState) {
    st.current_step = 0;
    st.step_clock = 0.0;
    if let Some(first) = nodes.first() {
        enter_node(first, &mut st.children[0]);
    }
}

fn run_repeat(rep: &Repeat, st: &mut NodeState, local_clock: f32, ctx: &RunContext) {
    let cd = rep.child_duration;
    if let RepeatCount::Finite(0) = rep.times {
        return;
    }
    if cd == 0.0 {
        // No time axis to scrub along: run the whole body per iteration the
        // moment the node is reached, exactly once per entry. Construction
        // rejects the infinite case.
        if st.exhausted {
            return;
        }
        let times = match rep.times {
            RepeatCount::Finite(n) => n,
            RepeatCount::Infinite => 1,
        };
        for i in 0..times {
            if i > 0 {
                rearm_group(&rep.children, st);
            }
            advance_group(&rep.children, st, 0.0, ctx);
        }
        st.exhausted = true;
        return;
    }
    let target_iteration = match rep.times {
        RepeatCount::Infinite => (local_clock / cd).floor() as u32,
        RepeatCount::Finite(n) => (((local_clock / cd).floor()) as u32).min(n - 1),
    };
    // Catch up one iteration at a time so trailing steps inside the body fire
    // once per skipped iteration, no matter how large the delta was.
    while st.iteration < target_iteration {
        advance_group(&rep.children, st, cd, ctx);
        st.iteration += 1;
        rearm_group(&rep.children, st);
    }
    let mut iteration_time = local_clock - st.iteration as f32 * cd;
    if let RepeatCount::Finite(n) = rep.times {
        // Past the final iteration the body freezes at its final value.
        if local_clock >= cd * n as f32 {
            iteration_time = cd;
        }
    }
    advance_group(&rep.children, st, iteration_time.clamp(0.0, cd), ctx);
}
