//! Execution outcomes: `FlowResult<State>` and `StepRecord`.

use std::time::Duration;

use crate::error::FlowError;

/// What happened to a single node during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The body returned `Ok(true)`.
    Ok,
    /// The body returned `Ok(false)`, a non-exceptional stop signal.
    Stopped,
    /// The body returned `Err`.
    Failed,
    /// A compensation body ran for this step (recorded in addition to
    /// the step's own `Ok`/`Stopped`/`Failed` record).
    Compensated,
}

/// One entry in a [`FlowResult::trace`].
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// The step's declared name, or a synthesized label for non-`Step`
    /// nodes (`"if"`, `"while"`, `"foreach[2]"`, ...).
    pub name: String,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
    /// Ordinal path of the node this record belongs to, for log
    /// correlation.
    pub step_path: Vec<usize>,
    /// Present when `outcome` is `Failed` or `Compensated` and the body
    /// raised an error; carries its message (errors themselves are not
    /// `Clone`, so the trace keeps only their rendering).
    pub error_message: Option<String>,
}

impl StepRecord {
    pub(crate) fn ok(name: impl Into<String>, step_path: Vec<usize>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Ok,
            elapsed,
            step_path,
            error_message: None,
        }
    }

    pub(crate) fn stopped(name: impl Into<String>, step_path: Vec<usize>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Stopped,
            elapsed,
            step_path,
            error_message: None,
        }
    }

    pub(crate) fn failed(
        name: impl Into<String>,
        step_path: Vec<usize>,
        elapsed: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Failed,
            elapsed,
            step_path,
            error_message: Some(message.into()),
        }
    }

    pub(crate) fn compensated(
        name: impl Into<String>,
        step_path: Vec<usize>,
        elapsed: Duration,
        error_message: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            outcome: StepOutcome::Compensated,
            elapsed,
            step_path,
            error_message,
        }
    }
}

/// The terminal outcome of [`crate::Executor::execute`] or
/// [`crate::Executor::resume`].
#[derive(Debug)]
pub struct FlowResult<S> {
    pub is_success: bool,
    /// The state as it stands after execution (and, on failure, after
    /// compensation completes). The engine does not retain it beyond
    /// this value.
    pub state: S,
    /// The first primary failure, if any. Compensation failures never
    /// occupy this slot.
    pub error: Option<FlowError>,
    pub trace: Vec<StepRecord>,
}

impl<S> FlowResult<S> {
    pub(crate) fn success(state: S, trace: Vec<StepRecord>) -> Self {
        Self {
            is_success: true,
            state,
            error: None,
            trace,
        }
    }

    pub(crate) fn failure(state: S, error: FlowError, trace: Vec<StepRecord>) -> Self {
        Self {
            is_success: false,
            state,
            error: Some(error),
            trace,
        }
    }
}
