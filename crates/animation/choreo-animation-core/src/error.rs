//! Error types for timeline construction.

use serde::{Deserialize, Serialize};

/// Configuration errors raised while building a timeline tree.
/// These abort construction; playback itself never raises them.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TimelineError {
    /// Step nodes are instantaneous by contract.
    #[error("Step elements cannot have duration")]
    StepWithDuration,

    /// An infinite repeat whose body sums to zero duration would never advance.
    #[error("infinite repeat requires a body with nonzero duration")]
    InfiniteZeroDuration,
}
