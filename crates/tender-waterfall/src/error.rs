//! Run error types.

use thiserror::Error;

use crate::runner::RunStatus;

/// Result type alias for runner operations.
pub type RunResult<T> = Result<T, RunError>;

/// A mutator was called in a state that does not allow it.
///
/// These indicate a host integration bug. They are reported and never
/// applied: the run state is untouched when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("cannot {op} a run that is {status}")]
    InvalidState { op: &'static str, status: RunStatus },

    #[error("waterfall has no stages")]
    NoStages,

    #[error("stage {stage} has no carriers")]
    EmptyStage { stage: usize },

    #[error("stage {stage} has a zero-minute response window")]
    ZeroWindowStage { stage: usize },

    #[error("carrier {carrier} appears in stage {first} and stage {second}")]
    CarrierInMultipleStages {
        carrier: String,
        first: usize,
        second: usize,
    },

    #[error("carrier {carrier} is not offered in stage {stage}")]
    CarrierNotInStage { carrier: String, stage: usize },

    #[error("carrier {carrier} already responded ({outcome})")]
    CarrierNotPending { carrier: String, outcome: String },
}
