//! choreo-animation-core (engine-agnostic)
//!
//! A deterministic, re-entrant timed-animation engine: a static tree of
//! timing primitives (tween/wait/step/sequence/parallel/repeat) advanced by
//! caller-supplied deltas. Advancing by one large delta produces the same
//! final state as advancing by many small ones; step callbacks fire exactly
//! once per entry no matter how far a single delta overshoots.

pub mod error;
pub mod interp;
pub mod plan;
pub mod timeline;
pub mod value;

// Re-exports for consumers (motion machine, hosts)
pub use error::TimelineError;
pub use interp::{lerp, linear_value, Easing};
pub use plan::{AnimationPlan, PlanStatus};
pub use timeline::{
    Direction, Parallel, Repeat, RepeatCount, Sequence, Step, StepContext, TimelineNode, Tween,
    TweenTo, Wait,
};
pub use value::{Value, ValueKind};
