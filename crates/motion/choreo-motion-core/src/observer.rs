//! StateObserver: lifecycle hooks over a state machine's `current` signal.
//!
//! On every state change the registered hooks fire in a fixed order that
//! callers may rely on: event handlers first, then exit handlers for the
//! previous state, then transition handlers for the (previous, current)
//! pair, then enter handlers for the new state. Within one kind, hooks fire
//! in registration order.

use std::rc::Rc;

use choreo_signal_core::Subscription;
use serde::{Deserialize, Serialize};

use crate::fsm::FiniteStateMachine;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookKind {
    Enter,
    Exit,
    Event,
    Transition,
}

/// Snapshot handed to a hook when it fires.
#[derive(Clone, Debug)]
pub struct HookContext {
    pub previous: Option<String>,
    pub current: Option<String>,
    pub event: Option<String>,
    pub kind: HookKind,
}

type HookFn = Rc<dyn Fn(&HookContext)>;

/// One registered lifecycle callback.
pub struct StateHook {
    kind: HookKind,
    /// Enter/exit: the state to match. Transition: unused.
    state: String,
    /// Event hooks: the event to match.
    event: String,
    /// Transition hooks: the (from, to) pair to match.
    from: String,
    to: String,
    run: HookFn,
}

impl StateHook {
    pub fn on_enter(state: impl Into<String>, run: impl Fn(&HookContext) + 'static) -> Self {
        Self {
            kind: HookKind::Enter,
            state: state.into(),
            event: String::new(),
            from: String::new(),
            to: String::new(),
            run: Rc::new(run),
        }
    }

    pub fn on_exit(state: impl Into<String>, run: impl Fn(&HookContext) + 'static) -> Self {
        Self {
            kind: HookKind::Exit,
            state: state.into(),
            event: String::new(),
            from: String::new(),
            to: String::new(),
            run: Rc::new(run),
        }
    }

    pub fn on_event(event: impl Into<String>, run: impl Fn(&HookContext) + 'static) -> Self {
        Self {
            kind: HookKind::Event,
            state: String::new(),
            event: event.into(),
            from: String::new(),
            to: String::new(),
            run: Rc::new(run),
        }
    }

    pub fn on_transition(
        from: impl Into<String>,
        to: impl Into<String>,
        run: impl Fn(&HookContext) + 'static,
    ) -> Self {
        Self {
            kind: HookKind::Transition,
            state: String::new(),
            event: String::new(),
            from: from.into(),
            to: to.into(),
            run: Rc::new(run),
        }
    }
}

/// Owns the subscription wiring hooks to a state machine. Dropping the
/// observer unhooks everything.
pub struct StateObserver {
    _subscription: Subscription,
}

impl StateObserver {
    /// Wire `hooks` to the machine's `current` signal. Hooks fire on future
    /// state changes only; registration itself has no visible effect.
    pub fn attach(fsm: &FiniteStateMachine, hooks: Vec<StateHook>) -> Self {
        let previous = fsm.previous();
        let last_event = fsm.last_event();
        let subscription = fsm.current().on_change(move |current| {
            let previous = previous.get();
            let event = last_event.get();
            let ctx = |kind| HookContext {
                previous: previous.clone(),
                current: current.clone(),
                event: event.clone(),
                kind,
            };
            for hook in hooks.iter().filter(|h| h.kind == HookKind::Event) {
                if event.as_deref() == Some(hook.event.as_str()) {
                    (hook.run)(&ctx(HookKind::Event));
                }
            }
            for hook in hooks.iter().filter(|h| h.kind == HookKind::Exit) {
                if previous.as_deref() == Some(hook.state.as_str()) {
                    (hook.run)(&ctx(HookKind::Exit));
                }
            }
            for hook in hooks.iter().filter(|h| h.kind == HookKind::Transition) {
                if previous.as_deref() == Some(hook.from.as_str())
                    && current.as_deref() == Some(hook.to.as_str())
                {
                    (hook.run)(&ctx(HookKind::Transition));
                }
            }
            for hook in hooks.iter().filter(|h| h.kind == HookKind::Enter) {
                if current.as_deref() == Some(hook.state.as_str()) {
                    (hook.run)(&ctx(HookKind::Enter));
                }
            }
        });
        Self {
            _subscription: subscription,
        }
    }
}
