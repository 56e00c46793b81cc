//! MotionMachine: animated state transitions over hierarchical states.
//!
//! Each state carries enter/active/exit animation sets. A transition between
//! dot-path states is planned as an ordered task list: exit hops from the
//! current path's deepest level up to (but excluding) the shared ancestor,
//! then enter hops down to the goal. The underlying state only commits when
//! the goal hop begins, and a transition requested while another is in
//! flight is deferred (last request wins) until the first fully resolves.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use choreo_animation_core::AnimationPlan;
use hashbrown::HashMap;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::MachineError;
use crate::fsm::{FiniteStateMachine, TransitionDef};

/// Hard cap on phase-advancing passes inside one `update` call. Exceeding it
/// means the animation graph never reports completion.
pub const MAX_UPDATE_ITERATIONS: usize = 1000;

/// Which animation set is currently driving playback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionPhase {
    Entering,
    Active,
    Exiting,
}

/// One hop in a precomputed hierarchical transition plan. `goal` marks the
/// hop whose start also commits the underlying state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationTask {
    pub state: String,
    pub phase: MotionPhase,
    pub goal: bool,
}

/// An animation plan attached to a state. `looped` plans restart in place
/// while their state stays active and no transition is scheduled.
///
/// Plans are shared handles: the same plan instance may be attached to
/// several states, but it is reset before every reuse and must not drive two
/// phases at once.
#[derive(Clone)]
pub struct MotionAnimation {
    pub(crate) plan: Rc<RefCell<AnimationPlan>>,
    pub(crate) looped: bool,
}

impl MotionAnimation {
    pub fn new(plan: AnimationPlan) -> Self {
        Self {
            plan: Rc::new(RefCell::new(plan)),
            looped: false,
        }
    }

    pub fn looped(plan: AnimationPlan) -> Self {
        Self {
            plan: Rc::new(RefCell::new(plan)),
            looped: true,
        }
    }

    /// Shared handle to the underlying plan (e.g. to inspect progress).
    pub fn plan(&self) -> Rc<RefCell<AnimationPlan>> {
        Rc::clone(&self.plan)
    }
}

/// Per-state animation sets.
#[derive(Clone, Default)]
pub struct StateAnimations {
    pub enter: Vec<MotionAnimation>,
    pub active: Vec<MotionAnimation>,
    pub exit: Vec<MotionAnimation>,
}

/// Declarative state description consumed by [`MotionMachine::add_state`].
pub struct MotionStateDef {
    pub id: String,
    pub transitions: Vec<TransitionDef>,
    pub animations: StateAnimations,
}

impl MotionStateDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transitions: Vec::new(),
            animations: StateAnimations::default(),
        }
    }

    pub fn with_transitions(mut self, transitions: Vec<TransitionDef>) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_animations(mut self, animations: StateAnimations) -> Self {
        self.animations = animations;
        self
    }
}

/// Split both dotted ids on `.`, find the longest common full-level prefix,
/// and build the ordered hop list: exits from the current path's deepest
/// level down to the boundary (exclusive), then enters from the boundary to
/// the goal's deepest level, the last one flagged `goal`. A self-transition
/// degenerates to a single goal enter (the state's enter set replays); a
/// transition to a strict ancestor yields exits only, resolved by the
/// terminal hop in `animations_completed`.
pub(crate) fn collect_animation_tasks(current: &str, goal: &str) -> VecDeque<AnimationTask> {
    let cur: Vec<&str> = current.split('.').collect();
    let dst: Vec<&str> = goal.split('.').collect();
    let mut common = 0;
    while common < cur.len() && common < dst.len() && cur[common] == dst[common] {
        common += 1;
    }
    let mut tasks = VecDeque::new();
    for depth in ((common + 1)..=cur.len()).rev() {
        tasks.push_back(AnimationTask {
            state: cur[..depth].join("."),
            phase: MotionPhase::Exiting,
            goal: false,
        });
    }
    let mut entered_any = false;
    for depth in (common + 1)..=dst.len() {
        tasks.push_back(AnimationTask {
            state: dst[..depth].join("."),
            phase: MotionPhase::Entering,
            goal: false,
        });
        entered_any = true;
    }
    if entered_any {
        if let Some(last) = tasks.back_mut() {
            last.goal = true;
        }
    } else if tasks.is_empty() {
        tasks.push_back(AnimationTask {
            state: goal.to_string(),
            phase: MotionPhase::Entering,
            goal: true,
        });
    }
    tasks
}

/// A finite-state machine whose transitions are animated.
pub struct MotionMachine {
    fsm: FiniteStateMachine,
    animations: HashMap<String, StateAnimations>,
    phase: MotionPhase,
    current_animations: Vec<MotionAnimation>,
    tasks: VecDeque<AnimationTask>,
    /// State/event committed when the goal hop begins.
    target: Option<(String, Option<String>)>,
    /// Transition requested while another was in flight; applied once the
    /// in-flight one resolves. Last request wins.
    scheduled: Option<(String, Option<String>)>,
}

impl Default for MotionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionMachine {
    pub fn new() -> Self {
        Self {
            fsm: FiniteStateMachine::new(),
            animations: HashMap::new(),
            phase: MotionPhase::Active,
            current_animations: Vec::new(),
            tasks: VecDeque::new(),
            target: None,
            scheduled: None,
        }
    }

    /// Register a state with its transitions and animation sets. The first
    /// added state becomes current and the machine starts in its entering
    /// phase, so startup intros play and settle into `Active`.
    pub fn add_state(&mut self, def: MotionStateDef) -> Result<(), MachineError> {
        let first = self.fsm.is_empty();
        self.fsm.add_state(def.id.clone(), def.transitions)?;
        self.animations.insert(def.id.clone(), def.animations);
        if first {
            debug!("motion: initial state {}", def.id);
            self.phase = MotionPhase::Entering;
            self.current_animations = self.select_set(&def.id, MotionPhase::Entering);
            self.prime_current();
        }
        Ok(())
    }

    /// The underlying state table and its observable signals.
    pub fn fsm(&self) -> &FiniteStateMachine {
        &self.fsm
    }

    pub fn phase(&self) -> MotionPhase {
        self.phase
    }

    pub fn current_state(&self) -> Option<String> {
        self.fsm.current_id()
    }

    /// True while a hierarchical transition is still playing out.
    pub fn is_transitioning(&self) -> bool {
        self.target.is_some() || !self.tasks.is_empty()
    }

    /// Take the transition matching `event` from the current state, routed
    /// through the animated path. `Ok(false)` when nothing matches.
    pub fn transition(&mut self, event: &str) -> Result<bool, MachineError> {
        match self.fsm.evaluate(event) {
            Some(target) => {
                self.set_state(&target, Some(event))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Request an animated transition to `state`. While a transition is in
    /// flight (or a finite current animation is still running) the request is
    /// queued and applied once the machine settles; otherwise the task list
    /// is computed and the first hop begins at once.
    pub fn set_state(&mut self, state: &str, event: Option<&str>) -> Result<(), MachineError> {
        if !self.fsm.has_state(state) {
            return Err(MachineError::UnknownState(state.to_string()));
        }
        if self.is_busy() {
            debug!("motion: transition to {state} deferred");
            self.scheduled = Some((state.to_string(), event.map(str::to_string)));
            return Ok(());
        }
        let current = match self.fsm.current_id() {
            Some(current) => current,
            None => return self.fsm.set_state(state, event),
        };
        self.tasks = collect_animation_tasks(&current, state);
        self.target = Some((state.to_string(), event.map(str::to_string)));
        // The first hop (exiting the current leaf) begins immediately.
        if let Some(task) = self.tasks.pop_front() {
            self.start_task(task)?;
        }
        Ok(())
    }

    /// Distribute `delta` across the current animation set, advancing through
    /// phases as sets complete, until the delta is exhausted or the machine
    /// is steady. A set that finishes mid-call hands its unused budget to the
    /// next phase, so one large update can walk through several hops.
    pub fn update(&mut self, delta: f32) -> Result<(), MachineError> {
        let mut budget = delta.max(0.0);
        for _ in 0..MAX_UPDATE_ITERATIONS {
            if self.current_animations.is_empty() {
                let steady = self.phase == MotionPhase::Active
                    && self.tasks.is_empty()
                    && self.scheduled.is_none();
                if steady {
                    return Ok(());
                }
                self.animations_completed()?;
                continue;
            }
            let mut consumed = 0.0f32;
            for anim in &self.current_animations {
                consumed = consumed.max(anim.plan.borrow_mut().update(budget));
            }
            let reaped = self.reap_completed();
            budget = (budget - consumed).max(0.0);
            trace!(
                "motion update: phase={:?} consumed={consumed} budget={budget} reaped={reaped}",
                self.phase
            );
            // A queued transition must not wait on infinite ambients: once
            // every finite animation has settled, it applies.
            if self.scheduled.is_some() && !self.is_busy() {
                if let Some((state, event)) = self.scheduled.take() {
                    self.set_state(&state, event.as_deref())?;
                }
                continue;
            }
            if budget <= 0.0 && reaped == 0 {
                return Ok(());
            }
        }
        Err(MachineError::IterationCapExceeded {
            cap: MAX_UPDATE_ITERATIONS,
        })
    }

    /// Scrub the current animation set to an absolute normalized progress.
    /// Plans with infinite or zero duration have no progress mapping and are
    /// skipped. When everything is done and `progress >= 1`, the machine
    /// advances as if the set had completed under `update`.
    pub fn set_progress(&mut self, progress: f32) -> Result<(), MachineError> {
        for anim in &self.current_animations {
            let mut plan = anim.plan.borrow_mut();
            let duration = plan.duration();
            if !duration.is_finite() || duration == 0.0 {
                continue;
            }
            let delta = progress * duration - plan.clock();
            if delta > 0.0 {
                plan.update(delta);
            }
        }
        self.current_animations.retain(|anim| {
            let plan = anim.plan.borrow();
            !(plan.duration().is_finite() && plan.progress() >= 1.0)
        });
        if self.current_animations.is_empty() && progress >= 1.0 {
            self.animations_completed()?;
        }
        Ok(())
    }

    /// A transition may only start while the machine is settled: no pending
    /// hops, no uncommitted target, and no finite current animation still
    /// mid-flight. Infinite ambient animations never block a transition.
    fn is_busy(&self) -> bool {
        self.target.is_some()
            || !self.tasks.is_empty()
            || self.current_animations.iter().any(|anim| {
                let plan = anim.plan.borrow();
                plan.duration().is_finite() && plan.progress() < 1.0
            })
    }

    /// The active set for the current phase finished: pop the next hop, or
    /// settle the lifecycle. Called from `update`/`set_progress` whenever the
    /// current set drains.
    fn animations_completed(&mut self) -> Result<(), MachineError> {
        if let Some(task) = self.tasks.pop_front() {
            self.start_task(task)?;
        } else {
            match self.phase {
                MotionPhase::Entering => {
                    self.phase = MotionPhase::Active;
                    if let Some(state) = self.fsm.current_id() {
                        debug!("motion: state {state} active");
                        self.current_animations = self.select_set(&state, MotionPhase::Active);
                        self.prime_current();
                    }
                }
                MotionPhase::Exiting => {
                    // Terminal hop: the goal is a shared ancestor that was
                    // never exited, so its enter set must not replay. Commit
                    // and pass through an empty entering phase.
                    if let Some((state, event)) = self.target.take() {
                        self.fsm.set_state(&state, event.as_deref())?;
                    }
                    self.phase = MotionPhase::Entering;
                    self.current_animations = Vec::new();
                }
                MotionPhase::Active => {}
            }
        }
        // A transition queued mid-flight applies once the machine settles.
        if self.target.is_none() && self.tasks.is_empty() && self.phase == MotionPhase::Active {
            if let Some((state, event)) = self.scheduled.take() {
                self.set_state(&state, event.as_deref())?;
            }
        }
        Ok(())
    }

    fn start_task(&mut self, task: AnimationTask) -> Result<(), MachineError> {
        debug!("motion: {:?} {}", task.phase, task.state);
        if task.goal {
            if let Some((state, event)) = self.target.take() {
                self.fsm.set_state(&state, event.as_deref())?;
            }
        }
        self.phase = task.phase;
        self.current_animations = self.select_set(&task.state, task.phase);
        self.prime_current();
        Ok(())
    }

    fn select_set(&self, state: &str, phase: MotionPhase) -> Vec<MotionAnimation> {
        self.animations
            .get(state)
            .map(|sets| match phase {
                MotionPhase::Entering => sets.enter.clone(),
                MotionPhase::Active => sets.active.clone(),
                MotionPhase::Exiting => sets.exit.clone(),
            })
            .unwrap_or_default()
    }

    /// Every freshly selected plan replays from scratch.
    fn prime_current(&mut self) {
        for anim in &self.current_animations {
            let mut plan = anim.plan.borrow_mut();
            plan.reset();
            plan.update(0.0);
        }
    }

    /// Drop completed finite plans from the current set; looped plans in a
    /// steady active phase restart in place instead, unless a transition is
    /// scheduled (which lets the cycle finish and the queue drain). Returns
    /// how many plans were dropped or restarted.
    fn reap_completed(&mut self) -> usize {
        let scheduled_pending = self.scheduled.is_some();
        let in_active = self.phase == MotionPhase::Active;
        let mut touched = 0;
        self.current_animations.retain(|anim| {
            let mut plan = anim.plan.borrow_mut();
            if plan.duration().is_finite() && plan.progress() >= 1.0 {
                touched += 1;
                if anim.looped && in_active && !scheduled_pending {
                    plan.reset();
                    plan.update(0.0);
                    true
                } else {
                    false
                }
            } else {
                true
            }
        });
        touched
    }
}
