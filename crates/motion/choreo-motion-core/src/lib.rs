//! choreo-motion-core
//!
//! A finite-state machine whose states carry enter/active/exit animation
//! sets. Transitions between hierarchical (dot-path) states are animated:
//! the machine computes the shared-ancestor path, plays exit animations from
//! the deepest abandoned level outward and enter animations inward to the
//! goal, and only commits the underlying state once the goal hop begins.

pub mod error;
pub mod fsm;
pub mod machine;
pub mod observer;

pub use error::MachineError;
pub use fsm::{FiniteStateMachine, StateDef, TransitionDef};
pub use machine::{
    AnimationTask, MotionAnimation, MotionMachine, MotionPhase, MotionStateDef, StateAnimations,
};
pub use observer::{HookContext, HookKind, StateHook, StateObserver};
