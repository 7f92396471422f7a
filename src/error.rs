//! Error taxonomy for the workflow engine.
//!
//! `FlowError` is the type threaded through builder validation, store
//! I/O, and step execution; `FlowResult::error` holds at most one of
//! these (the first primary failure, see [`crate::result`]).

use thiserror::Error;

/// Errors raised while constructing or running a [`crate::Flow`].
#[derive(Debug, Error)]
pub enum FlowError {
    /// An IR invariant was violated at build time (duplicate step name,
    /// `Break` outside a loop, `If` with zero branches, `WithCompensation`
    /// attached to a non-`Step` node, ...).
    #[error("flow build error: {0}")]
    Build(String),

    /// A step body returned `Err`.
    #[error("step {step_name:?} failed: {source}")]
    StepFailure {
        step_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A step body returned `Ok(false)`, a non-exceptional stop signal.
    #[error("step {0:?} requested stop")]
    StepStopped(String),

    /// Caller cancellation was observed before or during a step.
    #[error("flow execution cancelled")]
    Cancelled,

    /// The flow store or serializer failed.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// `resume` found a checkpoint whose schema version this build
    /// cannot read.
    #[error("checkpoint for flow {flow_id:?} has incompatible schema version {found} (expected {expected})")]
    IncompatibleCheckpoint {
        flow_id: String,
        found: u32,
        expected: u32,
    },

    /// A `While`/`Repeat` loop ran past `ExecutorConfig::max_loop_iterations`
    /// without terminating. An ambient safety backstop against a
    /// non-terminating guard function.
    #[error("loop at {0:?} exceeded the configured iteration budget")]
    LoopBudgetExceeded(Vec<usize>),

    /// The state value's `flow_id()` was empty.
    #[error("state's flow_id must be non-empty")]
    InvalidState,

    /// `resume` was called for a flow id with no stored checkpoint.
    #[error("no checkpoint found for flow {0:?}")]
    NoCheckpoint(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowError>;
