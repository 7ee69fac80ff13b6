//! Declarative DAG workflow: sequential, parallel, conditional, and loop edges
//! over a fixed node map, built by [`DagWorkflowBuilder`] and frozen into an
//! immutable [`DagWorkflow`].
//!
//! This sits alongside [`crate::builder::StateGraph`] rather than replacing it:
//! `StateGraph`/`Pregel` is the general message-passing graph substrate this
//! crate is built on, with cycles expressed as ordinary conditional edges
//! bounded by a single graph-wide step budget (`PregelLoop::max_steps`). This
//! module instead models the higher-level workflow vocabulary explicitly —
//! a distinct `Loop` edge variant with its own iteration counter, independent
//! of any other node's budget — for callers that want that vocabulary
//! directly instead of hand-rolling it on top of conditional routing.
//!
//! Each node's outgoing routing is looked up by node id, mirroring one edge
//! per `from` in the underlying data model (each edge names a single
//! source). Node execution is a plain iterative loop — no
//! recursion — so a long `Sequential` chain or a slow-converging `Loop`
//! can't blow the call stack.

use crate::error::{GraphError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Node identifier (re-exported shape of [`crate::graph::NodeId`]).
pub type NodeId = String;

/// A node's executor: `state -> Result<new state>`.
pub type WorkflowNodeFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
/// Routes a conditional edge: `state -> one or more next node ids`.
pub type SelectorFn = Arc<dyn Fn(&Value) -> SelectorResult + Send + Sync>;
/// Evaluated after running a loop edge's `back` node to decide whether to repeat.
pub type ConditionFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// What a [`SelectorFn`] picked.
#[derive(Debug, Clone)]
pub enum SelectorResult {
    One(NodeId),
    Many(Vec<NodeId>),
}

/// What happens to the workflow when a node's executor returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Terminate the workflow run (default, per §7).
    #[default]
    Fail,
    /// Log the error via [`WorkflowHooks::on_node_error`] and keep routing with
    /// the state unchanged, as if the node were a no-op.
    Continue,
}

/// One node's routing. Keyed by the node's own id in [`DagWorkflow`]'s edge map —
/// a node with no entry has no outgoing edge and is a leaf.
pub enum WorkflowEdge {
    Sequential {
        to: NodeId,
    },
    /// Runs `targets` concurrently (bounded by `targets.len()`); once every
    /// target's branch reaches `join` (or a leaf, if `join` is `None`), execution
    /// continues from `join` with the branch states merged (JSON-object merge,
    /// rightmost/last-finished wins on overlapping keys, in the finishing order
    /// of `targets`) — the concrete form "waits for all to complete before
    /// advancing to a node that depends on all of them" (§4.7) takes here.
    Parallel {
        targets: Vec<NodeId>,
        join: Option<NodeId>,
    },
    Conditional {
        selector: SelectorFn,
        /// Declared possible targets, used for validation only.
        targets: Vec<NodeId>,
    },
    Loop {
        condition: ConditionFn,
        back: NodeId,
        exit: NodeId,
        max_iterations: usize,
    },
}

impl std::fmt::Debug for WorkflowEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowEdge::Sequential { to } => f.debug_struct("Sequential").field("to", to).finish(),
            WorkflowEdge::Parallel { targets, join } => {
                f.debug_struct("Parallel").field("targets", targets).field("join", join).finish()
            }
            WorkflowEdge::Conditional { targets, .. } => {
                f.debug_struct("Conditional").field("targets", targets).finish()
            }
            WorkflowEdge::Loop { back, exit, max_iterations, .. } => f
                .debug_struct("Loop")
                .field("back", back)
                .field("exit", exit)
                .field("max_iterations", max_iterations)
                .finish(),
        }
    }
}

struct WorkflowNode {
    on_error: OnError,
    executor: WorkflowNodeFn,
}

/// Optional observation hooks fired around node execution. None of these
/// cross a component boundary on their own — a caller wires them to its own
/// event bus / checkpoint store.
#[derive(Clone, Default)]
pub struct WorkflowHooks {
    pub on_node_start: Option<Arc<dyn Fn(&NodeId) + Send + Sync>>,
    pub on_node_complete: Option<Arc<dyn Fn(&NodeId, &Value) + Send + Sync>>,
    pub on_node_error: Option<Arc<dyn Fn(&NodeId, &GraphError) + Send + Sync>>,
    /// Called before each node executes, so a caller can persist a checkpoint
    /// (state snapshot + current node) ahead of a potentially side-effectful
    /// call, per §4.7.
    pub on_checkpoint: Option<Arc<dyn Fn(&NodeId, &Value) + Send + Sync>>,
}

/// An immutable, validated DAG workflow.
pub struct DagWorkflow {
    pub name: String,
    nodes: HashMap<NodeId, WorkflowNode>,
    edges: HashMap<NodeId, WorkflowEdge>,
    pub entry_point: NodeId,
    /// Non-fatal notices recorded during `build()`, e.g. an ambiguous entry
    /// point resolved by declaration order. A caller typically republishes
    /// these as `log_entry` events.
    pub warnings: Vec<String>,
}

impl DagWorkflow {
    pub fn builder(name: impl Into<String>) -> DagWorkflowBuilder {
        DagWorkflowBuilder::new(name)
    }

    /// Runs the workflow from its entry point.
    pub async fn execute(&self, input: Value, hooks: &WorkflowHooks) -> Result<Value> {
        self.execute_from(&self.entry_point, input, hooks).await
    }

    /// Runs the workflow starting at an arbitrary node with arbitrary state —
    /// the resume path after a checkpoint or an approved human-in-the-loop gate.
    /// Predecessors of `start` are never replayed, so side-effectful nodes
    /// already executed before the checkpoint don't re-run.
    pub async fn execute_from(&self, start: &NodeId, input: Value, hooks: &WorkflowHooks) -> Result<Value> {
        if !self.nodes.contains_key(start) {
            return Err(GraphError::Validation(format!("unknown start node '{start}'")));
        }
        self.run_branch(start, input, hooks).await
    }

    fn run_branch<'a>(&'a self, node_id: &'a NodeId, state: Value, hooks: &'a WorkflowHooks) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let state = self.run_node(node_id, state, hooks).await?;

            let Some(edge) = self.edges.get(node_id) else {
                return Ok(state);
            };

            match edge {
                WorkflowEdge::Sequential { to } => self.run_branch(to, state, hooks).await,
                WorkflowEdge::Parallel { targets, join } => {
                    self.run_parallel(targets, join.as_ref(), state, hooks).await
                }
                WorkflowEdge::Conditional { selector, .. } => match selector(&state) {
                    SelectorResult::One(target) => self.run_branch(&target, state, hooks).await,
                    SelectorResult::Many(targets) => self.run_parallel(&targets, None, state, hooks).await,
                },
                WorkflowEdge::Loop { condition, back, exit, max_iterations } => {
                    self.run_loop(back, exit, condition, *max_iterations, state, hooks).await
                }
            }
        })
    }

    async fn run_node(&self, node_id: &NodeId, state: Value, hooks: &WorkflowHooks) -> Result<Value> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| GraphError::Validation(format!("unknown node '{node_id}'")))?;

        if let Some(cb) = &hooks.on_checkpoint {
            cb(node_id, &state);
        }
        if let Some(cb) = &hooks.on_node_start {
            cb(node_id);
        }

        match (node.executor)(state.clone()).await {
            Ok(next_state) => {
                if let Some(cb) = &hooks.on_node_complete {
                    cb(node_id, &next_state);
                }
                Ok(next_state)
            }
            Err(err) => {
                if let Some(cb) = &hooks.on_node_error {
                    cb(node_id, &err);
                }
                match node.on_error {
                    OnError::Fail => Err(err),
                    OnError::Continue => Ok(state),
                }
            }
        }
    }

    async fn run_parallel<'a>(
        &'a self,
        targets: &'a [NodeId],
        join: Option<&'a NodeId>,
        state: Value,
        hooks: &'a WorkflowHooks,
    ) -> Result<Value> {
        let branch_inputs = state.clone();
        let futures = targets.iter().map(|target| {
            let branch_inputs = branch_inputs.clone();
            async move { self.run_to(target, join, branch_inputs, hooks).await }
        });
        let results = futures::future::join_all(futures).await;

        let mut merged = state;
        for result in results {
            let branch_state = result?;
            merged = merge_states(merged, branch_state);
        }

        match join {
            Some(join_node) => self.run_branch(join_node, merged, hooks).await,
            None => Ok(merged),
        }
    }

    /// Runs a branch starting at `node_id`, stopping at `stop_at` (exclusive)
    /// without executing it — used so parallel branches converge at `join`
    /// exactly once instead of each branch re-running it.
    fn run_to<'a>(&'a self, node_id: &'a NodeId, stop_at: Option<&'a NodeId>, state: Value, hooks: &'a WorkflowHooks) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if Some(node_id) == stop_at {
                return Ok(state);
            }
            let state = self.run_node(node_id, state, hooks).await?;
            let Some(edge) = self.edges.get(node_id) else {
                return Ok(state);
            };
            match edge {
                WorkflowEdge::Sequential { to } => self.run_to(to, stop_at, state, hooks).await,
                WorkflowEdge::Parallel { targets, join } => {
                    self.run_parallel(targets, join.as_ref(), state, hooks).await
                }
                WorkflowEdge::Conditional { selector, .. } => match selector(&state) {
                    SelectorResult::One(target) => self.run_to(&target, stop_at, state, hooks).await,
                    SelectorResult::Many(targets) => self.run_parallel(&targets, None, state, hooks).await,
                },
                WorkflowEdge::Loop { condition, back, exit, max_iterations } => {
                    self.run_loop(back, exit, condition, *max_iterations, state, hooks).await
                }
            }
        })
    }

    async fn run_loop(
        &self,
        back: &NodeId,
        exit: &NodeId,
        condition: &ConditionFn,
        max_iterations: usize,
        mut state: Value,
        hooks: &WorkflowHooks,
    ) -> Result<Value> {
        let mut iterations: usize = 0;
        loop {
            state = self.run_node(back, state, hooks).await?;
            iterations += 1;
            if iterations > max_iterations {
                return Err(GraphError::Execution(format!(
                    "loop limit exceeded: '{back}' did not satisfy its exit condition within {max_iterations} iterations"
                )));
            }
            if !condition(&state) {
                break;
            }
        }
        self.run_branch(exit, state, hooks).await
    }
}

fn merge_states(left: Value, right: Value) -> Value {
    if let (Some(left_obj), Some(right_obj)) = (left.as_object(), right.as_object()) {
        let mut merged = left_obj.clone();
        for (key, value) in right_obj {
            merged.insert(key.clone(), value.clone());
        }
        Value::Object(merged)
    } else {
        right
    }
}

/// Builds a [`DagWorkflow`]: records nodes and edges, then validates and
/// freezes them on [`build`](Self::build).
pub struct DagWorkflowBuilder {
    name: String,
    nodes: HashMap<NodeId, WorkflowNode>,
    edges: HashMap<NodeId, WorkflowEdge>,
    declaration_order: Vec<NodeId>,
    entry_point: Option<NodeId>,
}

const DEFAULT_MAX_LOOP_ITERATIONS: usize = 1000;

impl DagWorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            declaration_order: Vec::new(),
            entry_point: None,
        }
    }

    fn record_declaration(&mut self, id: &NodeId) {
        if !self.declaration_order.contains(id) {
            self.declaration_order.push(id.clone());
        }
    }

    pub fn add_node(
        &mut self,
        id: impl Into<NodeId>,
        executor: impl Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    ) -> &mut Self {
        self.add_node_with(id, executor, OnError::Fail)
    }

    pub fn add_node_with(
        &mut self,
        id: impl Into<NodeId>,
        executor: impl Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
        on_error: OnError,
    ) -> &mut Self {
        let id = id.into();
        self.record_declaration(&id);
        self.nodes.insert(id, WorkflowNode { on_error, executor: Arc::new(executor) });
        self
    }

    pub fn entry_point(&mut self, id: impl Into<NodeId>) -> &mut Self {
        self.entry_point = Some(id.into());
        self
    }

    pub fn sequential(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        let from = from.into();
        self.record_declaration(&from);
        self.edges.insert(from, WorkflowEdge::Sequential { to: to.into() });
        self
    }

    pub fn parallel(&mut self, from: impl Into<NodeId>, targets: Vec<NodeId>, join: Option<NodeId>) -> &mut Self {
        let from = from.into();
        self.record_declaration(&from);
        self.edges.insert(from, WorkflowEdge::Parallel { targets, join });
        self
    }

    pub fn conditional(
        &mut self,
        from: impl Into<NodeId>,
        selector: impl Fn(&Value) -> SelectorResult + Send + Sync + 'static,
        targets: Vec<NodeId>,
    ) -> &mut Self {
        let from = from.into();
        self.record_declaration(&from);
        self.edges.insert(from, WorkflowEdge::Conditional { selector: Arc::new(selector), targets });
        self
    }

    /// Adds a loop edge with the default 1000-iteration guard (§4.7).
    pub fn loop_edge(
        &mut self,
        from: impl Into<NodeId>,
        condition: impl Fn(&Value) -> bool + Send + Sync + 'static,
        back: impl Into<NodeId>,
        exit: impl Into<NodeId>,
    ) -> &mut Self {
        self.loop_edge_with_limit(from, condition, back, exit, DEFAULT_MAX_LOOP_ITERATIONS)
    }

    pub fn loop_edge_with_limit(
        &mut self,
        from: impl Into<NodeId>,
        condition: impl Fn(&Value) -> bool + Send + Sync + 'static,
        back: impl Into<NodeId>,
        exit: impl Into<NodeId>,
        max_iterations: usize,
    ) -> &mut Self {
        let from = from.into();
        self.record_declaration(&from);
        self.edges.insert(
            from,
            WorkflowEdge::Loop { condition: Arc::new(condition), back: back.into(), exit: exit.into(), max_iterations },
        );
        self
    }

    /// Validates the recorded nodes/edges and freezes them into a [`DagWorkflow`].
    pub fn build(self) -> Result<DagWorkflow> {
        let mut warnings = Vec::new();

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!("edge declared from unknown node '{from}'")));
            }
            let referenced: Vec<&NodeId> = match edge {
                WorkflowEdge::Sequential { to } => vec![to],
                WorkflowEdge::Parallel { targets, join } => {
                    let mut r: Vec<&NodeId> = targets.iter().collect();
                    if let Some(j) = join {
                        r.push(j);
                    }
                    r
                }
                WorkflowEdge::Conditional { targets, .. } => targets.iter().collect(),
                WorkflowEdge::Loop { back, exit, .. } => vec![back, exit],
            };
            for target in referenced {
                if !self.nodes.contains_key(target) {
                    return Err(GraphError::Validation(format!(
                        "edge from '{from}' references unknown node '{target}'"
                    )));
                }
            }
        }

        // Cycles are only permitted through an explicit Loop edge: build the
        // subgraph of Sequential/Parallel/Conditional targets (Loop's `back`
        // is excluded — its repetition is the allowed cycle) and reject any
        // cycle found in it.
        let mut acyclic_adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for (from, edge) in &self.edges {
            let targets: Vec<&NodeId> = match edge {
                WorkflowEdge::Sequential { to } => vec![to],
                WorkflowEdge::Parallel { targets, join } => {
                    let mut r: Vec<&NodeId> = targets.iter().collect();
                    if let Some(j) = join {
                        r.push(j);
                    }
                    r
                }
                WorkflowEdge::Conditional { targets, .. } => targets.iter().collect(),
                WorkflowEdge::Loop { exit, .. } => vec![exit],
            };
            acyclic_adjacency.insert(from, targets);
        }
        if let Some(cycle_node) = find_cycle(&acyclic_adjacency) {
            return Err(GraphError::Validation(format!(
                "cycle detected at node '{cycle_node}' outside of an explicit loop edge"
            )));
        }

        let entry_point = match self.entry_point {
            Some(id) => id,
            None => {
                let mut targeted: HashSet<&NodeId> = HashSet::new();
                for edge in self.edges.values() {
                    match edge {
                        WorkflowEdge::Sequential { to } => {
                            targeted.insert(to);
                        }
                        WorkflowEdge::Parallel { targets, join } => {
                            targeted.extend(targets.iter());
                            if let Some(j) = join {
                                targeted.insert(j);
                            }
                        }
                        WorkflowEdge::Conditional { targets, .. } => targeted.extend(targets.iter()),
                        WorkflowEdge::Loop { back, exit, .. } => {
                            targeted.insert(back);
                            targeted.insert(exit);
                        }
                    }
                }
                let roots: Vec<&NodeId> =
                    self.declaration_order.iter().filter(|id| !targeted.contains(id)).collect();
                match roots.len() {
                    0 => {
                        return Err(GraphError::Validation(
                            "workflow has no root node to use as an entry point".to_string(),
                        ));
                    }
                    1 => roots[0].clone(),
                    _ => {
                        warnings.push(format!(
                            "ambiguous entry point among {roots:?}, defaulting to '{}' (first in declaration order)",
                            roots[0]
                        ));
                        roots[0].clone()
                    }
                }
            }
        };

        if !self.nodes.contains_key(&entry_point) {
            return Err(GraphError::Validation(format!("entry point '{entry_point}' is not a declared node")));
        }

        Ok(DagWorkflow { name: self.name, nodes: self.nodes, edges: self.edges, entry_point, warnings })
    }
}

fn find_cycle(adjacency: &HashMap<&NodeId, Vec<&NodeId>>) -> Option<NodeId> {
    #[derive(PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&NodeId, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a NodeId,
        adjacency: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
        marks: &mut HashMap<&'a NodeId, Mark>,
    ) -> Option<NodeId> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => return Some(node.clone()),
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(targets) = adjacency.get(node) {
            for target in targets {
                if let Some(cycle) = visit(target, adjacency, marks) {
                    return Some(cycle);
                }
            }
        }
        marks.insert(node, Mark::Done);
        None
    }

    for node in adjacency.keys() {
        if let Some(cycle) = visit(node, adjacency, &mut marks) {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn passthrough() -> impl Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static {
        |state: Value| Box::pin(async move { Ok(state) })
    }

    #[tokio::test]
    async fn sequential_chain_runs_in_order() {
        let mut builder = DagWorkflow::builder("seq");
        builder.add_node("a", |state: Value| {
            Box::pin(async move {
                let mut obj = state.as_object().cloned().unwrap_or_default();
                obj.insert("a".into(), json!(true));
                Ok(Value::Object(obj))
            })
        });
        builder.add_node("b", |state: Value| {
            Box::pin(async move {
                let mut obj = state.as_object().cloned().unwrap_or_default();
                obj.insert("b".into(), json!(true));
                Ok(Value::Object(obj))
            })
        });
        builder.sequential("a", "b");
        let workflow = builder.build().unwrap();
        assert_eq!(workflow.entry_point, "a");

        let result = workflow.execute(json!({}), &WorkflowHooks::default()).await.unwrap();
        assert_eq!(result, json!({"a": true, "b": true}));
    }

    #[tokio::test]
    async fn loop_runs_until_condition_false() {
        let mut builder = DagWorkflow::builder("loop");
        builder.add_node("start", passthrough());
        builder.add_node("increment", |state: Value| {
            Box::pin(async move {
                let n = state["count"].as_i64().unwrap_or(0);
                Ok(json!({ "count": n + 1 }))
            })
        });
        builder.add_node("done", passthrough());
        builder.loop_edge("start", |state: &Value| state["count"].as_i64().unwrap_or(0) < 5, "increment", "done");
        let workflow = builder.build().unwrap();

        let result = workflow.execute(json!({"count": 0}), &WorkflowHooks::default()).await.unwrap();
        assert_eq!(result["count"], json!(5));
    }

    #[tokio::test]
    async fn loop_exceeding_max_iterations_fails_with_loop_limit_message() {
        let mut builder = DagWorkflow::builder("runaway");
        builder.add_node("start", passthrough());
        builder.add_node("spin", passthrough());
        builder.add_node("done", passthrough());
        builder.loop_edge_with_limit("start", |_state: &Value| true, "spin", "done", 10);
        let workflow = builder.build().unwrap();

        let err = workflow.execute(json!({}), &WorkflowHooks::default()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("loop limit"), "expected 'loop limit' in: {message}");
    }

    #[tokio::test]
    async fn parallel_branches_join_before_continuing() {
        let mut builder = DagWorkflow::builder("fanout");
        builder.add_node("start", passthrough());
        builder.add_node("left", |state: Value| {
            Box::pin(async move {
                let mut obj = state.as_object().cloned().unwrap_or_default();
                obj.insert("left".into(), json!(true));
                Ok(Value::Object(obj))
            })
        });
        builder.add_node("right", |state: Value| {
            Box::pin(async move {
                let mut obj = state.as_object().cloned().unwrap_or_default();
                obj.insert("right".into(), json!(true));
                Ok(Value::Object(obj))
            })
        });
        builder.add_node("join", passthrough());
        builder.parallel("start", vec!["left".to_string(), "right".to_string()], Some("join".to_string()));
        let workflow = builder.build().unwrap();

        let result = workflow.execute(json!({}), &WorkflowHooks::default()).await.unwrap();
        assert_eq!(result["left"], json!(true));
        assert_eq!(result["right"], json!(true));
    }

    #[tokio::test]
    async fn conditional_prunes_unselected_branch() {
        let ran_left = Arc::new(AtomicUsize::new(0));
        let ran_right = Arc::new(AtomicUsize::new(0));
        let (ran_left_clone, ran_right_clone) = (ran_left.clone(), ran_right.clone());

        let mut builder = DagWorkflow::builder("cond");
        builder.add_node("start", passthrough());
        builder.add_node("left", move |state: Value| {
            let ran = ran_left_clone.clone();
            Box::pin(async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(state)
            })
        });
        builder.add_node("right", move |state: Value| {
            let ran = ran_right_clone.clone();
            Box::pin(async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(state)
            })
        });
        builder.conditional(
            "start",
            |_state: &Value| SelectorResult::One("left".to_string()),
            vec!["left".to_string(), "right".to_string()],
        );
        let workflow = builder.build().unwrap();

        workflow.execute(json!({}), &WorkflowHooks::default()).await.unwrap();
        assert_eq!(ran_left.load(Ordering::SeqCst), 1);
        assert_eq!(ran_right.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn build_rejects_unknown_edge_target() {
        let mut builder = DagWorkflow::builder("bad");
        builder.add_node("a", passthrough());
        builder.sequential("a", "missing");
        assert!(builder.build().is_err());
    }

    #[tokio::test]
    async fn build_rejects_cycles_outside_loop_edges() {
        let mut builder = DagWorkflow::builder("cyclic");
        builder.add_node("a", passthrough());
        builder.add_node("b", passthrough());
        builder.sequential("a", "b");
        builder.sequential("b", "a");
        assert!(builder.build().is_err());
    }

    #[tokio::test]
    async fn node_on_error_continue_does_not_terminate_workflow() {
        let mut builder = DagWorkflow::builder("resilient");
        builder.add_node_with(
            "flaky",
            |_state: Value| Box::pin(async move { Err(GraphError::Execution("boom".to_string())) }),
            OnError::Continue,
        );
        builder.add_node("next", |_state: Value| Box::pin(async move { Ok(json!({"reached": true})) }));
        builder.sequential("flaky", "next");
        let workflow = builder.build().unwrap();

        let result = workflow.execute(json!({"initial": true}), &WorkflowHooks::default()).await.unwrap();
        assert_eq!(result["reached"], json!(true));
    }
}
