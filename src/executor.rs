//! The interpreter: walks a [`Flow`] against a `FlowState`, threading a
//! compensation stack, a trace, and (optionally) checkpointing.
//!
//! The traversal matches the current node kind and recurses into the
//! chosen branch, generalized from a single linear `Node -> next` chain
//! to the nested control-flow tree in [`crate::ir`].

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::cancel::{uncancellable, CancellationToken};
use crate::error::FlowError;
use crate::ir::{find_compensation, CompensationBodyFn, Flow, FlowNode, NodeKind};
use crate::resilience::{NoRetryPipeline, ResiliencePipeline};
use crate::result::{FlowResult, StepRecord};
use crate::state::FlowState;
use crate::store::{Checkpoint, CompensationRef, FlowStore, CHECKPOINT_SCHEMA_VERSION};

/// Tunables for a single [`Executor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// `While` loops failing with [`FlowError::LoopBudgetExceeded`] past
    /// this many iterations. Guards against a non-terminating guard
    /// function running the process out of memory via an ever-growing
    /// trace.
    pub max_loop_iterations: usize,
    /// Whether to checkpoint after every successful `Step`. Disabling
    /// this drops resume support but removes a store round-trip per
    /// step; most callers want the default.
    pub checkpoint_on_every_step: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 100_000,
            checkpoint_on_every_step: true,
        }
    }
}

/// The outcome of running (or partially running, via `ForEach`) a node
/// list: what should happen to the nodes after it.
pub(crate) enum Signal {
    Continue,
    /// Raised by `Break`, absorbed by the nearest enclosing `While`/`Repeat`.
    BreakLoop,
    Failed(FlowError),
}

pub(crate) struct CompEntry<S> {
    pub step_name: String,
    pub compensation: Option<Arc<CompensationBodyFn<S>>>,
}

/// Shared, mutable run state threaded through the whole traversal,
/// including into `ForEach` sub-flows so compensation and trace stay
/// global across the entire run. A `ForEach` element shares the parent
/// flow's compensation stack rather than getting its own.
pub(crate) struct RunCtx<'a, S> {
    pub flow_id: String,
    pub store: Option<&'a dyn FlowStore>,
    pub resilience: &'a dyn ResiliencePipeline<S>,
    pub config: &'a ExecutorConfig,
    pub trace: Vec<StepRecord>,
    pub comp_stack: Vec<CompEntry<S>>,
    /// True while replaying past a resume checkpoint's cursor.
    pub resuming: bool,
    pub skip_steps_remaining: usize,
    pub total_steps_completed: usize,
}

/// Runs a sibling node list in order, short-circuiting on the first
/// non-`Continue` signal.
///
/// Resume's cursor is tracked as a completed-step count rather than a
/// literal ordinal-path comparison: `Step`/`Repeat`/`While` bodies are
/// revisited on every loop iteration, so a static path cannot uniquely
/// address "the Nth time we reach this node" the way it can for a
/// strictly sequential flow. Counting completed steps sidesteps that
/// ambiguity.
pub(crate) async fn run_nodes<S: FlowState>(
    nodes: &[FlowNode<S>],
    state: &mut S,
    cancel: &CancellationToken,
    ctx: &mut RunCtx<'_, S>,
) -> Signal {
    for node in nodes {
        let signal = run_node(node, state, cancel, ctx).await;
        if !matches!(signal, Signal::Continue) {
            return signal;
        }
    }
    Signal::Continue
}

async fn run_node<S: FlowState>(
    node: &FlowNode<S>,
    state: &mut S,
    cancel: &CancellationToken,
    ctx: &mut RunCtx<'_, S>,
) -> Signal {
    match &node.kind {
        NodeKind::Step { name, body, compensation } => {
            run_step(node, name, body, compensation, state, cancel, ctx).await
        }
        NodeKind::Mutation { label, apply } => {
            if ctx.resuming {
                return Signal::Continue;
            }
            apply(state);
            ctx.trace.push(StepRecord::ok(label.clone(), node.path.clone(), std::time::Duration::ZERO));
            Signal::Continue
        }
        NodeKind::If { branches, else_body } => {
            for branch in branches {
                if (branch.guard)(state) {
                    return Box::pin(run_nodes(&branch.body, state, cancel, ctx)).await;
                }
            }
            if let Some(else_b) = else_body {
                return Box::pin(run_nodes(else_b, state, cancel, ctx)).await;
            }
            Signal::Continue
        }
        NodeKind::While { guard, body } => {
            let mut iterations = 0usize;
            while (guard)(state) {
                iterations += 1;
                if iterations > ctx.config.max_loop_iterations {
                    return Signal::Failed(FlowError::LoopBudgetExceeded(node.path.clone()));
                }
                match Box::pin(run_nodes(body, state, cancel, ctx)).await {
                    Signal::Continue => continue,
                    Signal::BreakLoop => break,
                    other => return other,
                }
            }
            Signal::Continue
        }
        NodeKind::Repeat { count, body } => {
            for _ in 0..*count {
                match Box::pin(run_nodes(body, state, cancel, ctx)).await {
                    Signal::Continue => continue,
                    Signal::BreakLoop => break,
                    other => return other,
                }
            }
            Signal::Continue
        }
        NodeKind::Break { guard } => {
            if let Some(g) = guard {
                if !(g)(state) {
                    return Signal::Continue;
                }
            }
            Signal::BreakLoop
        }
        NodeKind::ForEach { runner } => runner.run(state, cancel, &node.path, ctx).await,
    }
}

async fn run_step<S: FlowState>(
    node: &FlowNode<S>,
    name: &str,
    body: &Arc<crate::ir::StepBodyFn<S>>,
    compensation: &Option<Arc<CompensationBodyFn<S>>>,
    state: &mut S,
    cancel: &CancellationToken,
    ctx: &mut RunCtx<'_, S>,
) -> Signal {
    if ctx.resuming {
        ctx.skip_steps_remaining = ctx.skip_steps_remaining.saturating_sub(1);
        if ctx.skip_steps_remaining == 0 {
            ctx.resuming = false;
        }
        return Signal::Continue;
    }

    if cancel.is_cancelled() {
        ctx.trace.push(StepRecord::stopped(name, node.path.clone(), std::time::Duration::ZERO));
        return Signal::Failed(FlowError::Cancelled);
    }

    let start = Instant::now();
    let outcome = ctx.resilience.run(body.as_ref(), state, cancel).await;
    let elapsed = start.elapsed();

    match outcome {
        Ok(true) => {
            ctx.trace.push(StepRecord::ok(name, node.path.clone(), elapsed));
            ctx.total_steps_completed += 1;
            if compensation.is_some() {
                ctx.comp_stack.push(CompEntry {
                    step_name: name.to_string(),
                    compensation: compensation.clone(),
                });
            }
            if let Some(store) = ctx.store {
                if ctx.config.checkpoint_on_every_step {
                    if let Err(e) = write_checkpoint(store, &ctx.flow_id, node, state, &ctx.comp_stack, ctx.total_steps_completed).await {
                        return Signal::Failed(e);
                    }
                }
            }
            Signal::Continue
        }
        Ok(false) => {
            ctx.trace.push(StepRecord::stopped(name, node.path.clone(), elapsed));
            Signal::Failed(FlowError::StepStopped(name.to_string()))
        }
        Err(e) => {
            ctx.trace.push(StepRecord::failed(name, node.path.clone(), elapsed, e.to_string()));
            Signal::Failed(FlowError::StepFailure { step_name: name.to_string(), source: e })
        }
    }
}

async fn write_checkpoint<S: FlowState>(
    store: &dyn FlowStore,
    flow_id: &str,
    node: &FlowNode<S>,
    state: &S,
    comp_stack: &[CompEntry<S>],
    steps_completed: usize,
) -> Result<(), FlowError> {
    let state_json = serde_json::to_value(state)
        .map_err(|e| FlowError::Infrastructure(format!("serializing state: {e}")))?;
    let compensation_stack = comp_stack
        .iter()
        .filter(|e| e.compensation.is_some())
        .map(|e| CompensationRef { step_name: e.step_name.clone() })
        .collect();
    store
        .save(Checkpoint {
            flow_id: flow_id.to_string(),
            cursor: node.path.clone(),
            steps_completed,
            state_json,
            compensation_stack,
            schema_version: CHECKPOINT_SCHEMA_VERSION,
        })
        .await
}

async fn rollback<S: FlowState>(state: &mut S, ctx: &mut RunCtx<'_, S>) {
    let token = uncancellable();
    while let Some(entry) = ctx.comp_stack.pop() {
        let Some(compensation) = entry.compensation else { continue };
        let start = Instant::now();
        let result = compensation(state, &token).await;
        let elapsed = start.elapsed();
        match result {
            Ok(()) => {
                ctx.trace.push(StepRecord::compensated(entry.step_name, Vec::new(), elapsed, None));
            }
            Err(e) => {
                tracing::warn!(step = %entry.step_name, error = %e, "compensation failed");
                ctx.trace.push(StepRecord::compensated(
                    entry.step_name,
                    Vec::new(),
                    elapsed,
                    Some(e.to_string()),
                ));
            }
        }
    }
}

/// Runs flows and manages their checkpoint lifecycle.
///
/// One `Executor<S>` is bound to a single state type; share it across
/// concurrently-running flows of that type via `Arc` (it holds only
/// shared references and an `Arc`'d store, so it is itself `Send + Sync`
/// whenever `S` is).
pub struct Executor<S> {
    store: Option<Arc<dyn FlowStore>>,
    resilience: Arc<dyn ResiliencePipeline<S>>,
    config: ExecutorConfig,
}

impl<S: FlowState> Executor<S> {
    pub fn new(store: Option<Arc<dyn FlowStore>>) -> Self {
        Self {
            store,
            resilience: Arc::new(NoRetryPipeline),
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_resilience(mut self, resilience: Arc<dyn ResiliencePipeline<S>>) -> Self {
        self.resilience = resilience;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs `flow` from the start against `state`.
    pub async fn execute(&self, flow: &Flow<S>, mut state: S, cancel: CancellationToken) -> FlowResult<S> {
        if state.flow_id().is_empty() {
            return FlowResult::failure(state, FlowError::InvalidState, Vec::new());
        }
        let flow_id = state.flow_id().to_string();
        let span = tracing::info_span!("flow_execute", flow = flow.name(), flow_id = %flow_id);
        async {
            tracing::info!("flow execution starting");
            let mut ctx = RunCtx {
                flow_id: flow_id.clone(),
                store: self.store.as_deref(),
                resilience: self.resilience.as_ref(),
                config: &self.config,
                trace: Vec::new(),
                comp_stack: Vec::new(),
                resuming: false,
                skip_steps_remaining: 0,
                total_steps_completed: 0,
            };
            let signal = run_nodes(&flow.nodes, &mut state, &cancel, &mut ctx).await;
            self.finish(flow, signal, state, ctx).await
        }
        .instrument(span)
        .await
    }

    /// Resumes `flow_id` from its last checkpoint, restoring state and
    /// the compensation stack before continuing past the recorded
    /// cursor. The checkpointed state always wins over any
    /// caller-supplied value passed elsewhere.
    pub async fn resume(&self, flow: &Flow<S>, flow_id: &str, cancel: CancellationToken) -> Result<FlowResult<S>, FlowError> {
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| FlowError::Infrastructure("resume requires a configured FlowStore".into()))?;
        let checkpoint = store
            .load(flow_id)
            .await?
            .ok_or_else(|| FlowError::NoCheckpoint(flow_id.to_string()))?;
        if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(FlowError::IncompatibleCheckpoint {
                flow_id: flow_id.to_string(),
                found: checkpoint.schema_version,
                expected: CHECKPOINT_SCHEMA_VERSION,
            });
        }
        let mut state: S = serde_json::from_value(checkpoint.state_json)
            .map_err(|e| FlowError::Infrastructure(format!("deserializing checkpointed state: {e}")))?;

        let mut comp_stack = Vec::with_capacity(checkpoint.compensation_stack.len());
        for entry in &checkpoint.compensation_stack {
            comp_stack.push(CompEntry {
                step_name: entry.step_name.clone(),
                compensation: find_compensation(&flow.nodes, &entry.step_name),
            });
        }

        let span = tracing::info_span!("flow_resume", flow = flow.name(), flow_id = %flow_id, steps_completed = checkpoint.steps_completed);
        async move {
            tracing::info!(cursor = ?checkpoint.cursor, "flow execution resuming");
            let mut ctx = RunCtx {
                flow_id: flow_id.to_string(),
                store: Some(store),
                resilience: self.resilience.as_ref(),
                config: &self.config,
                trace: Vec::new(),
                comp_stack,
                resuming: checkpoint.steps_completed > 0,
                skip_steps_remaining: checkpoint.steps_completed,
                total_steps_completed: checkpoint.steps_completed,
            };
            let signal = run_nodes(&flow.nodes, &mut state, &cancel, &mut ctx).await;
            Ok(self.finish(flow, signal, state, ctx).await)
        }
        .instrument(span)
        .await
    }

    async fn finish(&self, flow: &Flow<S>, signal: Signal, mut state: S, mut ctx: RunCtx<'_, S>) -> FlowResult<S> {
        match signal {
            Signal::Continue => {
                if let Some(store) = ctx.store {
                    if let Err(e) = store.delete(&ctx.flow_id).await {
                        tracing::warn!(flow = flow.name(), error = %e, "failed to delete checkpoint after success");
                    }
                }
                tracing::info!(flow = flow.name(), "flow execution succeeded");
                FlowResult::success(state, ctx.trace)
            }
            other => {
                let err = match other {
                    Signal::Failed(e) => e,
                    // Unreachable in a flow that passed `FlowBuilder::build`'s
                    // validation (a bare `Break` outside a loop fails the
                    // build), but handled defensively rather than panicking.
                    Signal::BreakLoop => FlowError::Infrastructure("break escaped its enclosing loop".into()),
                    Signal::Continue => unreachable!(),
                };
                tracing::warn!(flow = flow.name(), error = %err, "flow execution failed, running compensation");
                rollback(&mut state, &mut ctx).await;
                if let Some(store) = ctx.store {
                    if let Err(e) = store.delete(&ctx.flow_id).await {
                        tracing::warn!(flow = flow.name(), error = %e, "failed to delete checkpoint after terminal failure");
                    }
                }
                FlowResult::failure(state, err, ctx.trace)
            }
        }
    }
}
