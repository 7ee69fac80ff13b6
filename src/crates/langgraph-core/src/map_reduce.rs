//! Map-reduce node pattern
//!
//! A library-level node built on top of [`crate::builder::StateGraphBuilder::add_node`]:
//! it pulls a sequence of items out of the node's input state, applies an optional
//! filter and transform, runs a mapper over the remaining items with a configurable
//! concurrency strategy, then folds the per-item outcomes with a reducer.
//!
//! This is distinct from [`crate::send::Send`], which spawns items as separate graph
//! tasks routed through the Pregel scheduler. `map_reduce` runs entirely inside one
//! node invocation — simpler to reason about, and the natural fit when the fan-out
//! doesn't need to re-enter the graph's own node routing.
//!
//! # Example
//!
//! ```rust
//! use langgraph_core::map_reduce::{MapReduceConfig, MapConcurrency, map_reduce_node};
//! use langgraph_core::StateGraph;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MapReduceConfig::new(
//!     |state: &serde_json::Value| {
//!         state["items"].as_array().cloned().unwrap_or_default()
//!     },
//!     |item, _index, _state| {
//!         Box::pin(async move {
//!             let n = item.as_i64().unwrap_or(0);
//!             Ok(json!(n * 2))
//!         })
//!     },
//!     |acc, result| json!(acc.as_i64().unwrap_or(0) + result.output.as_ref().unwrap().as_i64().unwrap_or(0)),
//!     json!(0),
//! )
//! .with_concurrency(MapConcurrency::Batched(2));
//!
//! let mut graph = StateGraph::new();
//! graph.add_node("double_and_sum", map_reduce_node(Arc::new(config)));
//! # Ok(())
//! # }
//! ```

use crate::error::{GraphError, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Per-item mapper: `(item, index, state) -> Result<output, error message>`.
pub type MapperFn = Arc<dyn Fn(Value, usize, Value) -> BoxFuture<std::result::Result<Value, String>> + Send + Sync>;
/// Extracts the sequence of items to map over from the node's input state.
pub type ItemsFn = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;
/// Keeps an item (`true`) or drops it (`false`) before mapping.
pub type FilterFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;
/// Rewrites an item before it reaches the mapper.
pub type TransformFn = Arc<dyn Fn(Value, &Value) -> Value + Send + Sync>;
/// Folds one mapped result into the running accumulator.
pub type ReduceFn = Arc<dyn Fn(Value, &MapItemResult) -> Value + Send + Sync>;
/// Post-processes the final accumulator.
pub type FinalizeFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Fired after each item completes (success or error).
pub type ProgressFn = Arc<dyn Fn(&MapReduceProgress) + Send + Sync>;

/// Bounded-concurrency strategy for running the mapper over items.
///
/// `Sequential` is `Batched(1)`; `Parallel` runs every remaining item at once
/// (bounded only by the item count) — "as-parallel-as-possible" per the node's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapConcurrency {
    Sequential,
    Batched(usize),
    Parallel,
}

impl MapConcurrency {
    fn width(self, item_count: usize) -> usize {
        match self {
            MapConcurrency::Sequential => 1,
            MapConcurrency::Batched(n) => n.max(1),
            MapConcurrency::Parallel => item_count.max(1),
        }
    }
}

/// Outcome of mapping a single item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapItemResult {
    pub index: usize,
    pub item: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl MapItemResult {
    fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Progress notification passed to a [`ProgressFn`].
#[derive(Debug, Clone)]
pub struct MapReduceProgress {
    pub completed: usize,
    pub total: usize,
    pub last: MapItemResult,
}

/// Configuration for one map-reduce node invocation.
#[derive(Clone)]
pub struct MapReduceConfig {
    items: ItemsFn,
    filter: Option<FilterFn>,
    transform: Option<TransformFn>,
    mapper: MapperFn,
    concurrency: MapConcurrency,
    reducer: ReduceFn,
    initial: Value,
    finalize: Option<FinalizeFn>,
    /// Fold only successful results into the reducer (default `true`, per §4.7:
    /// "folds over successful results (or all, if successOnly=false)").
    success_only: bool,
    /// `false` (the default) stops scheduling further work on the first error.
    continue_on_error: bool,
    progress: Option<ProgressFn>,
}

impl MapReduceConfig {
    pub fn new(
        items: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
        mapper: impl Fn(Value, usize, Value) -> BoxFuture<std::result::Result<Value, String>>
            + Send
            + Sync
            + 'static,
        reducer: impl Fn(Value, &MapItemResult) -> Value + Send + Sync + 'static,
        initial: Value,
    ) -> Self {
        Self {
            items: Arc::new(items),
            filter: None,
            transform: None,
            mapper: Arc::new(mapper),
            concurrency: MapConcurrency::Parallel,
            reducer: Arc::new(reducer),
            initial,
            finalize: None,
            success_only: true,
            continue_on_error: false,
            progress: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_transform(mut self, transform: impl Fn(Value, &Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_concurrency(mut self, concurrency: MapConcurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_finalize(mut self, finalize: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.finalize = Some(Arc::new(finalize));
        self
    }

    pub fn with_success_only(mut self, success_only: bool) -> Self {
        self.success_only = success_only;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(&MapReduceProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }
}

/// Summary statistics over a completed map-reduce run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapReduceStats {
    pub successful: usize,
    pub failed: usize,
}

/// Full outcome of [`run_map_reduce`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapReduceOutcome {
    pub reduced: Value,
    pub results: Vec<MapItemResult>,
    pub stats: MapReduceStats,
}

impl MapReduceOutcome {
    /// Serialises to the shape a graph node's output state normally takes.
    pub fn into_value(self) -> Value {
        serde_json::json!({
            "reduced": self.reduced,
            "results": self.results,
            "stats": { "successful": self.stats.successful, "failed": self.stats.failed },
        })
    }
}

/// Runs the configured map-reduce over `state`, honouring §4.7 and invariant 7
/// (§8): when `continue_on_error` is true, `results.len() == items.len()`;
/// otherwise the first error stops further scheduling and `results.len() <= items.len()`.
pub async fn run_map_reduce(config: &MapReduceConfig, state: Value) -> Result<MapReduceOutcome> {
    let raw_items = (config.items)(&state);

    let mut prepared: Vec<Value> = Vec::with_capacity(raw_items.len());
    for item in raw_items {
        if let Some(filter) = &config.filter {
            if !filter(&item, &state) {
                continue;
            }
        }
        let item = match &config.transform {
            Some(transform) => transform(item, &state),
            None => item,
        };
        prepared.push(item);
    }

    let total = prepared.len();
    let width = config.concurrency.width(total);

    let mapper = config.mapper.clone();
    let tasks = prepared.into_iter().enumerate().map(|(index, item)| {
        let mapper = mapper.clone();
        let state = state.clone();
        let item_for_result = item.clone();
        async move {
            let outcome = mapper(item, index, state).await;
            match outcome {
                Ok(output) => MapItemResult { index, item: item_for_result, output: Some(output), error: None },
                Err(err) => MapItemResult { index, item: item_for_result, output: None, error: Some(err) },
            }
        }
    });

    let mut stream = stream::iter(tasks).buffer_unordered(width);
    let mut results: Vec<MapItemResult> = Vec::with_capacity(total);
    while let Some(result) = stream.next().await {
        let failed = !result.is_success();
        if let Some(progress) = &config.progress {
            progress(&MapReduceProgress { completed: results.len() + 1, total, last: result.clone() });
        }
        results.push(result);
        if failed && !config.continue_on_error {
            // Dropping `stream` cancels any still-in-flight mapper futures.
            break;
        }
    }
    drop(stream);

    results.sort_by_key(|r| r.index);

    let successful = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - successful;

    if !config.continue_on_error {
        if let Some(first_error) = results.iter().find(|r| !r.is_success()) {
            return Err(GraphError::Execution(format!(
                "map_reduce item {} failed: {}",
                first_error.index,
                first_error.error.as_deref().unwrap_or("unknown error")
            )));
        }
    }

    let mut acc = config.initial.clone();
    for result in &results {
        if config.success_only && !result.is_success() {
            continue;
        }
        acc = (config.reducer)(acc, result);
    }
    if let Some(finalize) = &config.finalize {
        acc = finalize(acc);
    }

    Ok(MapReduceOutcome {
        reduced: acc,
        results,
        stats: MapReduceStats { successful, failed },
    })
}

/// Wraps [`run_map_reduce`] as a node executor compatible with
/// [`crate::builder::StateGraphBuilder::add_node`].
pub fn map_reduce_node(
    config: Arc<MapReduceConfig>,
) -> impl Fn(Value) -> BoxFuture<Result<Value>> + Send + Sync + 'static {
    move |state: Value| {
        let config = config.clone();
        Box::pin(async move {
            let outcome = run_map_reduce(&config, state).await?;
            Ok(outcome.into_value())
        })
    }
}
