//! Plain finite-state machine: a state/transition/event table with
//! observable current/previous/last-event signals.

use std::fmt;
use std::rc::Rc;

use choreo_signal_core::Signal;
use hashbrown::HashMap;
use log::debug;

use crate::error::MachineError;

/// A single transition rule: on `on`, move to `target` if `guard` allows.
#[derive(Clone)]
pub struct TransitionDef {
    pub on: String,
    pub target: String,
    pub guard: Option<Rc<dyn Fn() -> bool>>,
}

impl TransitionDef {
    pub fn new(on: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            on: on.into(),
            target: target.into(),
            guard: None,
        }
    }

    pub fn with_guard(mut self, guard: impl Fn() -> bool + 'static) -> Self {
        self.guard = Some(Rc::new(guard));
        self
    }
}

impl fmt::Debug for TransitionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionDef")
            .field("on", &self.on)
            .field("target", &self.target)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct StateDef {
    pub transitions: Vec<TransitionDef>,
}

/// State/transition table. `current`, `previous` and `last_event` are
/// exposed as signals so other components can react to state changes.
///
/// The first added state becomes the current state.
pub struct FiniteStateMachine {
    states: HashMap<String, StateDef>,
    current: Signal<Option<String>>,
    previous: Signal<Option<String>>,
    last_event: Signal<Option<String>>,
}

impl Default for FiniteStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl FiniteStateMachine {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            current: Signal::new(None),
            previous: Signal::new(None),
            last_event: Signal::new(None),
        }
    }

    pub fn add_state(
        &mut self,
        id: impl Into<String>,
        transitions: Vec<TransitionDef>,
    ) -> Result<(), MachineError> {
        let id = id.into();
        if self.states.contains_key(&id) {
            return Err(MachineError::DuplicateState(id));
        }
        let first = self.states.is_empty();
        self.states.insert(id.clone(), StateDef { transitions });
        if first {
            self.current.set(Some(id));
        }
        Ok(())
    }

    #[inline]
    pub fn has_state(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Handle to the current-state signal.
    pub fn current(&self) -> Signal<Option<String>> {
        self.current.clone()
    }

    pub fn previous(&self) -> Signal<Option<String>> {
        self.previous.clone()
    }

    pub fn last_event(&self) -> Signal<Option<String>> {
        self.last_event.clone()
    }

    #[inline]
    pub fn current_id(&self) -> Option<String> {
        self.current.get()
    }

    /// Look up the transition `event` would take from the current state,
    /// without committing it. Guards are consulted here.
    pub fn evaluate(&self, event: &str) -> Option<String> {
        let current = self.current.get()?;
        let def = self.states.get(&current)?;
        def.transitions
            .iter()
            .find(|t| t.on == event && t.guard.as_ref().map_or(true, |g| g()))
            .map(|t| t.target.clone())
    }

    /// Take the transition matching `event`, if any. A missing or
    /// guard-rejected transition returns `Ok(false)`: a normal outcome, not
    /// an error.
    pub fn transition(&mut self, event: &str) -> Result<bool, MachineError> {
        match self.evaluate(event) {
            Some(target) => {
                self.set_state(&target, Some(event))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move directly to `state`. Updates `last_event`, then `previous`, then
    /// `current` — in that order, so subscribers of `current` observe the
    /// already-updated companions.
    pub fn set_state(&mut self, state: &str, event: Option<&str>) -> Result<(), MachineError> {
        if !self.states.contains_key(state) {
            return Err(MachineError::UnknownState(state.to_string()));
        }
        debug!("fsm: {:?} -> {} (event {:?})", self.current.get(), state, event);
        self.last_event.set(event.map(str::to_string));
        self.previous.set(self.current.get());
        self.current.set(Some(state.to_string()));
        Ok(())
    }
}

impl fmt::Debug for FiniteStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiniteStateMachine")
            .field("states", &self.states.len())
            .field("current", &self.current.get())
            .finish()
    }
}
