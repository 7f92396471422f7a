//! The flow IR: an immutable tree of control-flow nodes.
//!
//! Step and compensation bodies are stored as boxed, higher-ranked async
//! closures rather than a custom `async_trait` trait, the same shape
//! `BoxFuture` users reach for before `async fn` in traits existed, and
//! it sidesteps the self-referential-future problem a blanket impl over
//! a plain `Fn(&mut S, ..) -> impl Future` would hit.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::cancel::CancellationToken;
use crate::executor::{run_nodes, RunCtx, Signal};
use crate::result::StepRecord;
use crate::state::FlowState;

/// A step body: `(state, cancel) -> Result<bool>`. `Ok(false)` is a
/// non-exceptional "stop" signal.
pub type StepBodyFn<S> =
    dyn for<'a> Fn(&'a mut S, &'a CancellationToken) -> BoxFuture<'a, anyhow::Result<bool>>
        + Send
        + Sync;

/// A compensation body: `(state, cancel) -> Result<()>`.
pub type CompensationBodyFn<S> =
    dyn for<'a> Fn(&'a mut S, &'a CancellationToken) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync;

/// A synchronous guard evaluated against the state.
pub type GuardFn<S> = dyn Fn(&S) -> bool + Send + Sync;

/// A synchronous in-place state mutation.
pub type MutationFn<S> = dyn Fn(&mut S) + Send + Sync;

/// Policy governing how [`NodeKind::ForEach`] handles an element failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForEachPolicy {
    /// Propagate the first element failure (and trigger rollback)
    /// immediately, leaving later elements unentered.
    StopOnFirstFailure,
    /// Record the failure in the trace and continue with the next
    /// element; the `ForEach` as a whole still succeeds.
    ContinueOnFailure,
}

pub(crate) struct Branch<S> {
    pub guard: Arc<GuardFn<S>>,
    pub body: Vec<FlowNode<S>>,
}

/// Type-erases the per-element type of a [`NodeKind::ForEach`] node so it
/// can sit in the IR tree alongside every other node kind without making
/// the whole IR generic over it.
#[async_trait]
pub(crate) trait ForEachRunner<S>: Send + Sync {
    async fn run(
        &self,
        state: &mut S,
        cancel: &CancellationToken,
        path: &[usize],
        ctx: &mut RunCtx<'_, S>,
    ) -> Signal;
}

pub(crate) struct ForEachSpec<S, T> {
    pub select: Arc<dyn Fn(&S) -> Vec<T> + Send + Sync>,
    pub body: Arc<dyn Fn(T) -> Flow<S> + Send + Sync>,
    pub policy: ForEachPolicy,
}

#[async_trait]
impl<S, T> ForEachRunner<S> for ForEachSpec<S, T>
where
    S: FlowState,
    T: Send + 'static,
{
    async fn run(
        &self,
        state: &mut S,
        cancel: &CancellationToken,
        path: &[usize],
        ctx: &mut RunCtx<'_, S>,
    ) -> Signal {
        let items = (self.select)(state);
        for (index, item) in items.into_iter().enumerate() {
            let sub_flow = (self.body)(item);
            let mut element_path = path.to_vec();
            element_path.push(index);

            let signal = run_nodes(&sub_flow.nodes, state, cancel, ctx).await;
            match signal {
                Signal::Continue => continue,
                Signal::Failed(err) if self.policy == ForEachPolicy::ContinueOnFailure => {
                    // Only user-thrown step failures are absorbed; a
                    // deliberate stop/cancellation/infra failure still
                    // ends the whole ForEach regardless of policy.
                    if matches!(err, crate::error::FlowError::StepFailure { .. }) {
                        tracing::warn!(
                            element = index,
                            error = %err,
                            "foreach element failed, continuing under ContinueOnFailure policy"
                        );
                        ctx.trace.push(StepRecord::failed(
                            format!("foreach[{index}]"),
                            element_path,
                            std::time::Duration::ZERO,
                            err.to_string(),
                        ));
                        continue;
                    }
                    return Signal::Failed(err);
                }
                other => return other,
            }
        }
        Signal::Continue
    }
}

pub(crate) enum NodeKind<S> {
    Step {
        name: String,
        body: Arc<StepBodyFn<S>>,
        compensation: Option<Arc<CompensationBodyFn<S>>>,
    },
    Mutation {
        label: String,
        apply: Arc<MutationFn<S>>,
    },
    If {
        branches: Vec<Branch<S>>,
        else_body: Option<Vec<FlowNode<S>>>,
    },
    While {
        guard: Arc<GuardFn<S>>,
        body: Vec<FlowNode<S>>,
    },
    Repeat {
        count: usize,
        body: Vec<FlowNode<S>>,
    },
    Break {
        guard: Option<Arc<GuardFn<S>>>,
    },
    ForEach {
        runner: Arc<dyn ForEachRunner<S>>,
    },
}

impl<S> fmt::Debug for NodeKind<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Step { name, .. } => write!(f, "Step({name})"),
            NodeKind::Mutation { label, .. } => write!(f, "Mutation({label})"),
            NodeKind::If { branches, else_body } => {
                write!(f, "If({} branches, else={})", branches.len(), else_body.is_some())
            }
            NodeKind::While { .. } => write!(f, "While"),
            NodeKind::Repeat { count, .. } => write!(f, "Repeat({count})"),
            NodeKind::Break { guard } => write!(f, "Break(conditional={})", guard.is_some()),
            NodeKind::ForEach { .. } => write!(f, "ForEach"),
        }
    }
}

/// A single node in the built IR, tagged with its ordinal path.
pub struct FlowNode<S> {
    pub(crate) path: Vec<usize>,
    pub(crate) kind: NodeKind<S>,
}

impl<S> FlowNode<S> {
    pub(crate) fn new(kind: NodeKind<S>) -> Self {
        Self { path: Vec::new(), kind }
    }

    /// The step name if this node is a `Step`, for duplicate-name
    /// validation and compensation lookup.
    pub(crate) fn step_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Step { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }
}

/// An immutable, buildable flow. Safe to run concurrently over
/// independent state instances.
pub struct Flow<S> {
    pub(crate) name: String,
    pub(crate) nodes: Vec<FlowNode<S>>,
}

impl<S> Flow<S> {
    /// The name given at `FlowBuilder::new`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Recursively finds the compensation body registered for `step_name`,
/// searching the statically-built tree (branches of `If`, bodies of
/// `While`/`Repeat`). `ForEach` bodies are built per-element at runtime
/// and are not reachable here. A compensation pushed from inside a
/// `ForEach` element cannot currently be recovered across a resume.
pub(crate) fn find_compensation<S>(
    nodes: &[FlowNode<S>],
    step_name: &str,
) -> Option<Arc<CompensationBodyFn<S>>> {
    for node in nodes {
        match &node.kind {
            NodeKind::Step { name, compensation, .. } if name == step_name => {
                return compensation.clone();
            }
            NodeKind::If { branches, else_body } => {
                for branch in branches {
                    if let Some(found) = find_compensation(&branch.body, step_name) {
                        return Some(found);
                    }
                }
                if let Some(else_b) = else_body {
                    if let Some(found) = find_compensation(else_b, step_name) {
                        return Some(found);
                    }
                }
            }
            NodeKind::While { body, .. } | NodeKind::Repeat { body, .. } => {
                if let Some(found) = find_compensation(body, step_name) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}
