//! The fluent builder. Nested blocks (`if_`/`while_`/`repeat`) are
//! tracked with an explicit stack of open frames rather than one struct
//! per nesting level, an "accumulate into whichever scope is current"
//! approach generalized to a tree.
//!
//! Validation (duplicate step names, a dangling `break_if` outside any
//! loop, unclosed blocks) is deferred to [`FlowBuilder::build`] rather
//! than failing eagerly, so the fluent chain itself never needs to
//! return `Result` mid-chain.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::cancel::CancellationToken;
use crate::error::FlowError;
use crate::ir::{
    Branch, CompensationBodyFn, Flow, FlowNode, ForEachPolicy, ForEachSpec, GuardFn, MutationFn,
    NodeKind, StepBodyFn,
};
use crate::state::FlowState;

struct IfFrame<S> {
    branches: Vec<(Arc<GuardFn<S>>, Vec<FlowNode<S>>)>,
    else_body: Option<Vec<FlowNode<S>>>,
    in_else: bool,
}

impl<S> IfFrame<S> {
    fn current_body_mut(&mut self) -> &mut Vec<FlowNode<S>> {
        if self.in_else {
            self.else_body.get_or_insert_with(Vec::new)
        } else {
            &mut self.branches.last_mut().expect("if_ seeds the first branch").1
        }
    }
}

enum Frame<S> {
    Root(Vec<FlowNode<S>>),
    If(IfFrame<S>),
    While { guard: Arc<GuardFn<S>>, body: Vec<FlowNode<S>> },
    Repeat { count: usize, body: Vec<FlowNode<S>> },
}

impl<S> Frame<S> {
    fn body_mut(&mut self) -> &mut Vec<FlowNode<S>> {
        match self {
            Frame::Root(v) => v,
            Frame::If(f) => f.current_body_mut(),
            Frame::While { body, .. } => body,
            Frame::Repeat { body, .. } => body,
        }
    }
}

/// Builds a [`Flow`] one node at a time via method chaining.
pub struct FlowBuilder<S> {
    name: String,
    stack: Vec<Frame<S>>,
    errors: Vec<String>,
    /// Index of the last `Step` pushed into the current body, so
    /// `with_compensation` can reject anything that isn't immediately
    /// after a `Step` with no compensation yet.
    last_step: Option<usize>,
}

impl<S: FlowState> FlowBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack: vec![Frame::Root(Vec::new())],
            errors: Vec::new(),
            last_step: None,
        }
    }

    fn push_finished(&mut self, node: FlowNode<S>) {
        self.stack.last_mut().expect("stack is never empty").body_mut().push(node);
        self.last_step = None;
    }

    fn inside_loop(&self) -> bool {
        self.stack.iter().any(|f| matches!(f, Frame::While { .. } | Frame::Repeat { .. }))
    }

    /// Adds a step. `body` receives the mutable state and a cancellation
    /// token, returning `Ok(true)` to continue, `Ok(false)` to stop the
    /// whole flow without failing, or `Err` to fail and trigger rollback.
    pub fn step<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a mut S, &'a CancellationToken) -> BoxFuture<'a, anyhow::Result<bool>>
            + Send
            + Sync
            + 'static,
    {
        let node = FlowNode::new(NodeKind::Step {
            name: name.into(),
            body: Arc::new(body),
            compensation: None,
        });
        let frame = self.stack.last_mut().expect("stack is never empty");
        let body_vec = frame.body_mut();
        body_vec.push(node);
        self.last_step = Some(body_vec.len() - 1);
        self
    }

    /// Attaches a compensation to the immediately-preceding `Step`.
    /// Anything else (no preceding step, a step that already has one, a
    /// non-step node in between) is a build error.
    pub fn with_compensation<F>(mut self, compensation: F) -> Self
    where
        F: for<'a> Fn(&'a mut S, &'a CancellationToken) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        let Some(idx) = self.last_step else {
            self.errors.push("with_compensation() must immediately follow a step()".into());
            return self;
        };
        let frame = self.stack.last_mut().expect("stack is never empty");
        match &mut frame.body_mut()[idx].kind {
            NodeKind::Step { compensation: slot @ None, .. } => {
                *slot = Some(Arc::new(compensation) as Arc<CompensationBodyFn<S>>);
            }
            NodeKind::Step { .. } => {
                self.errors.push("step already has a compensation attached".into());
            }
            _ => self.errors.push("with_compensation() must immediately follow a step()".into()),
        }
        self
    }

    /// Adds a synchronous in-place mutation (equivalent to a step that
    /// always succeeds.
    pub fn mutate(mut self, label: impl Into<String>, apply: impl Fn(&mut S) + Send + Sync + 'static) -> Self {
        let node = FlowNode::new(NodeKind::Mutation { label: label.into(), apply: Arc::new(apply) as Arc<MutationFn<S>> });
        self.push_finished(node);
        self
    }

    /// Opens an `If`. Chain `.step`/`.mutate`/nested control flow to
    /// build the first branch's body, then `.elseif`/`.else_branch`/`.end_if`.
    pub fn if_(mut self, guard: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        self.stack.push(Frame::If(IfFrame {
            branches: vec![(Arc::new(guard) as Arc<GuardFn<S>>, Vec::new())],
            else_body: None,
            in_else: false,
        }));
        self.last_step = None;
        self
    }

    pub fn elseif(mut self, guard: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        match self.stack.last_mut() {
            Some(Frame::If(f)) if !f.in_else => f.branches.push((Arc::new(guard) as Arc<GuardFn<S>>, Vec::new())),
            _ => self.errors.push("elseif() without a matching if_()".into()),
        }
        self.last_step = None;
        self
    }

    pub fn else_branch(mut self) -> Self {
        match self.stack.last_mut() {
            Some(Frame::If(f)) if !f.in_else && f.else_body.is_none() => {
                f.in_else = true;
                f.else_body = Some(Vec::new());
            }
            Some(Frame::If(_)) => self.errors.push("else_branch() called more than once".into()),
            _ => self.errors.push("else_branch() without a matching if_()".into()),
        }
        self.last_step = None;
        self
    }

    pub fn end_if(mut self) -> Self {
        match self.stack.pop() {
            Some(Frame::If(f)) => {
                if f.branches.is_empty() {
                    self.errors.push("if_() requires at least one branch".into());
                }
                let branches = f
                    .branches
                    .into_iter()
                    .map(|(guard, body)| Branch { guard, body })
                    .collect();
                let node = FlowNode::new(NodeKind::If { branches, else_body: f.else_body });
                self.push_finished(node);
            }
            Some(other) => {
                self.stack.push(other);
                self.errors.push("end_if() without a matching if_()".into());
            }
            None => self.errors.push("end_if() with no open block".into()),
        }
        self
    }

    /// Opens a `While`, re-checking `guard` before every iteration.
    pub fn while_(mut self, guard: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        self.stack.push(Frame::While { guard: Arc::new(guard) as Arc<GuardFn<S>>, body: Vec::new() });
        self.last_step = None;
        self
    }

    pub fn end_while(mut self) -> Self {
        match self.stack.pop() {
            Some(Frame::While { guard, body }) => {
                let node = FlowNode::new(NodeKind::While { guard, body });
                self.push_finished(node);
            }
            Some(other) => {
                self.stack.push(other);
                self.errors.push("end_while() without a matching while_()".into());
            }
            None => self.errors.push("end_while() with no open block".into()),
        }
        self
    }

    /// Opens a fixed `count`-iteration `Repeat`. Place a `break_if` inside
    /// the body to stop early.
    pub fn repeat(mut self, count: usize) -> Self {
        self.stack.push(Frame::Repeat { count, body: Vec::new() });
        self.last_step = None;
        self
    }

    pub fn end_repeat(mut self) -> Self {
        match self.stack.pop() {
            Some(Frame::Repeat { count, body }) => {
                let node = FlowNode::new(NodeKind::Repeat { count, body });
                self.push_finished(node);
            }
            Some(other) => {
                self.stack.push(other);
                self.errors.push("end_repeat() without a matching repeat()".into());
            }
            None => self.errors.push("end_repeat() with no open block".into()),
        }
        self
    }

    /// Unconditionally breaks the nearest enclosing loop.
    pub fn break_now(self) -> Self {
        self.break_if_inner(None)
    }

    /// Breaks the nearest enclosing loop when `guard(state)` is true,
    /// checked at the point this node sits in its body (place it at the
    /// end of a `repeat` body to check after the body runs).
    pub fn break_if(self, guard: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        self.break_if_inner(Some(Arc::new(guard) as Arc<GuardFn<S>>))
    }

    fn break_if_inner(mut self, guard: Option<Arc<GuardFn<S>>>) -> Self {
        if !self.inside_loop() {
            self.errors.push("break_if()/break_now() used outside any while_()/repeat()".into());
        }
        let node = FlowNode::new(NodeKind::Break { guard });
        self.push_finished(node);
        self
    }

    /// Snapshots `select(state)` at entry, then runs `body(element)` as
    /// a sub-flow per element, sharing this flow's state and
    /// compensation stack.
    pub fn foreach<T, F, B>(mut self, select: F, body: B, policy: ForEachPolicy) -> Self
    where
        T: Send + 'static,
        F: Fn(&S) -> Vec<T> + Send + Sync + 'static,
        B: Fn(T) -> Flow<S> + Send + Sync + 'static,
    {
        let runner = ForEachSpec { select: Arc::new(select), body: Arc::new(body), policy };
        let node = FlowNode::new(NodeKind::ForEach { runner: Arc::new(runner) });
        self.push_finished(node);
        self
    }

    /// Validates structural invariants and produces an immutable [`Flow`].
    pub fn build(mut self) -> Result<Flow<S>, FlowError> {
        if self.stack.len() != 1 {
            self.errors.push(format!("{} block(s) left unclosed", self.stack.len() - 1));
        }
        if !self.errors.is_empty() {
            return Err(FlowError::Build(self.errors.join("; ")));
        }

        let root = match self.stack.into_iter().next().expect("stack is never empty") {
            Frame::Root(v) => v,
            _ => unreachable!("validated above"),
        };

        let mut seen = HashSet::new();
        validate_step_names(&root, &mut seen)?;

        let mut nodes = root;
        assign_paths(&mut nodes, &mut Vec::new());

        tracing::debug!(flow = %self.name, nodes = nodes.len(), "flow built");
        Ok(Flow { name: self.name, nodes })
    }
}

fn validate_step_names<S>(nodes: &[FlowNode<S>], seen: &mut HashSet<String>) -> Result<(), FlowError> {
    for node in nodes {
        if let Some(name) = node.step_name() {
            if !seen.insert(name.to_string()) {
                return Err(FlowError::Build(format!("duplicate step name {name:?}")));
            }
        }
        match &node.kind {
            NodeKind::If { branches, else_body } => {
                for branch in branches {
                    validate_step_names(&branch.body, seen)?;
                }
                if let Some(else_b) = else_body {
                    validate_step_names(else_b, seen)?;
                }
            }
            NodeKind::While { body, .. } | NodeKind::Repeat { body, .. } => {
                validate_step_names(body, seen)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn assign_paths<S>(nodes: &mut [FlowNode<S>], prefix: &mut Vec<usize>) {
    for (index, node) in nodes.iter_mut().enumerate() {
        prefix.push(index);
        node.path = prefix.clone();
        match &mut node.kind {
            NodeKind::If { branches, else_body } => {
                for branch in branches.iter_mut() {
                    assign_paths(&mut branch.body, prefix);
                }
                if let Some(else_b) = else_body {
                    assign_paths(else_b, prefix);
                }
            }
            NodeKind::While { body, .. } | NodeKind::Repeat { body, .. } => {
                assign_paths(body, prefix);
            }
            _ => {}
        }
        prefix.pop();
    }
}

/// A reusable, named group of builder calls, a config-object authoring
/// style that produces the same IR as the equivalent fluent chain.
pub trait FlowConfigurable<S: FlowState>: Send + Sync {
    fn configure(&self, builder: FlowBuilder<S>) -> FlowBuilder<S>;
}

impl<S: FlowState> Flow<S> {
    /// Builds a flow from a [`FlowConfigurable`] instead of an inline
    /// chain.
    pub fn from_config(name: impl Into<String>, config: &impl FlowConfigurable<S>) -> Result<Flow<S>, FlowError> {
        config.configure(FlowBuilder::new(name)).build()
    }
}
