//! Error types for the motion state machine.

use serde::{Deserialize, Serialize};

/// Errors raised while configuring or driving a state machine.
///
/// `DuplicateState` and `UnknownState` are configuration errors and abort
/// machine construction; `IterationCapExceeded` is fatal, surfaces a
/// misconfigured animation graph that never reports completion, and is not
/// recoverable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum MachineError {
    #[error("State {0} already exists")]
    DuplicateState(String),

    #[error("unknown state: {0}")]
    UnknownState(String),

    #[error("update exceeded {cap} iterations; the animation graph never completes")]
    IterationCapExceeded { cap: usize },
}
