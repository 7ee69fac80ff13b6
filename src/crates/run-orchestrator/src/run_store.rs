//! Persisted run/workflow-run records and filtered queries (component C4).
//!
//! Grounded on `agent_core::memory::InMemoryMemoryStore` (`Arc<RwLock<HashMap<...>>>`
//! plus a `thiserror` error enum), generalised from the thread/entry shape to
//! the run-record shape of §4.4. Checkpoints are stored as opaque blobs keyed
//! by `{run_id, node_id, seq}` per §4.4's persisted-state-layout note; the
//! state snapshot itself is produced and consumed by `langgraph_checkpoint`,
//! this store only owns the blob's lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum RunStoreError {
    #[error("run not found: {0}")]
    NotFound(String),
    #[error("invalid run record: {0}")]
    Validation(String),
}

/// Rejects records with a blank id, since `InMemoryRunStore::get`/`update`/`delete`
/// key everything off `RunRecord::id()`. Uses the same fluent validator the rest
/// of the ambient stack relies on (`tooling::validation`).
fn validate_record(record: &RunRecord) -> Result<()> {
    tooling::validation::Validator::new(record.id().to_string(), "id")
        .not_empty()
        .validate()
        .map_err(|e| RunStoreError::Validation(e.to_string()))?;
    Ok(())
}

pub type Result<T> = std::result::Result<T, RunStoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Pending,
    Scheduled,
    Running,
    Paused,
    Waiting,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

/// A single agent run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub agent_id: String,
    pub thread_id: String,
    pub status: RunStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub usage: Usage,
    pub iterations: u32,
    pub error: Option<String>,
    pub trace: Vec<serde_json::Value>,
    pub tags: Vec<String>,
    pub trigger_id: Option<String>,
    pub parent_run_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A single workflow run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_name: String,
    pub status: WorkflowRunStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub state: serde_json::Value,
    pub current_node: Option<String>,
    pub checkpoint_id: Option<String>,
    pub tags: Vec<String>,
    pub trigger_id: Option<String>,
    pub parent_run_id: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A stored run record: either an agent run or a workflow run. `RunStore`
/// persists both under one filterable namespace since §4.4 queries them with
/// the same filter shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunRecord {
    Agent(Run),
    Workflow(WorkflowRun),
}

impl RunRecord {
    pub fn id(&self) -> &str {
        match self {
            RunRecord::Agent(r) => &r.id,
            RunRecord::Workflow(r) => &r.id,
        }
    }

    fn status_str(&self) -> &'static str {
        match self {
            RunRecord::Agent(r) => match r.status {
                RunStatus::Pending => "pending",
                RunStatus::Running => "running",
                RunStatus::Completed => "completed",
                RunStatus::Failed => "failed",
                RunStatus::Cancelled => "cancelled",
                RunStatus::Timeout => "timeout",
            },
            RunRecord::Workflow(r) => match r.status {
                WorkflowRunStatus::Pending => "pending",
                WorkflowRunStatus::Scheduled => "scheduled",
                WorkflowRunStatus::Running => "running",
                WorkflowRunStatus::Paused => "paused",
                WorkflowRunStatus::Waiting => "waiting",
                WorkflowRunStatus::Completed => "completed",
                WorkflowRunStatus::Failed => "failed",
                WorkflowRunStatus::Cancelled => "cancelled",
                WorkflowRunStatus::Timeout => "timeout",
            },
        }
    }

    fn workflow_name(&self) -> Option<&str> {
        match self {
            RunRecord::Agent(_) => None,
            RunRecord::Workflow(r) => Some(&r.workflow_name),
        }
    }

    fn tags(&self) -> &[String] {
        match self {
            RunRecord::Agent(r) => &r.tags,
            RunRecord::Workflow(r) => &r.tags,
        }
    }

    fn trigger_id(&self) -> Option<&str> {
        match self {
            RunRecord::Agent(r) => r.trigger_id.as_deref(),
            RunRecord::Workflow(r) => r.trigger_id.as_deref(),
        }
    }

    fn parent_run_id(&self) -> Option<&str> {
        match self {
            RunRecord::Agent(r) => r.parent_run_id.as_deref(),
            RunRecord::Workflow(r) => r.parent_run_id.as_deref(),
        }
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RunRecord::Agent(r) => Some(r.started_at),
            RunRecord::Workflow(r) => r.started_at,
        }
    }

    fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RunRecord::Agent(r) => r.completed_at,
            RunRecord::Workflow(r) => r.completed_at,
        }
    }

    fn has_error(&self) -> bool {
        match self {
            RunRecord::Agent(r) => r.error.is_some(),
            RunRecord::Workflow(r) => r.error.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    StartedAt,
    CompletedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// Filter fields for `RunStore::list`/`count` (§4.4).
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Vec<String>,
    pub workflow_name: Option<String>,
    pub tags: Vec<String>,
    pub trigger_id: Option<String>,
    pub parent_run_id: Option<String>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub completed_after: Option<DateTime<Utc>>,
    pub completed_before: Option<DateTime<Utc>>,
    pub has_error: Option<bool>,
    pub order_by: Option<OrderBy>,
    pub order_direction: OrderDirection,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for OrderDirection {
    fn default() -> Self {
        OrderDirection::Descending
    }
}

impl RunFilter {
    fn matches(&self, record: &RunRecord) -> bool {
        if !self.status.is_empty() && !self.status.iter().any(|s| s == record.status_str()) {
            return false;
        }
        if let Some(name) = &self.workflow_name {
            if record.workflow_name() != Some(name.as_str()) {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().all(|t| record.tags().contains(t)) {
            return false;
        }
        if let Some(trigger) = &self.trigger_id {
            if record.trigger_id() != Some(trigger.as_str()) {
                return false;
            }
        }
        if let Some(parent) = &self.parent_run_id {
            if record.parent_run_id() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.started_after {
            if record.started_at().map(|t| t <= after).unwrap_or(true) {
                return false;
            }
        }
        if let Some(before) = self.started_before {
            if record.started_at().map(|t| t >= before).unwrap_or(true) {
                return false;
            }
        }
        if let Some(after) = self.completed_after {
            if record.completed_at().map(|t| t <= after).unwrap_or(true) {
                return false;
            }
        }
        if let Some(before) = self.completed_before {
            if record.completed_at().map(|t| t >= before).unwrap_or(true) {
                return false;
            }
        }
        if let Some(has_error) = self.has_error {
            if record.has_error() != has_error {
                return false;
            }
        }
        true
    }
}

/// Partial update applied by `RunStore::update` (§4.4). `None` fields are
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub status: Option<String>,
    pub output: Option<serde_json::Value>,
    pub state: Option<serde_json::Value>,
    pub current_node: Option<String>,
    pub checkpoint_id: Option<String>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub usage: Option<Usage>,
    pub iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub total: u64,
    pub by_status: HashMap<String, u64>,
    pub error_count: u64,
    pub avg_duration_ms: Option<f64>,
}

/// Opaque checkpoint blob keyed by `{run_id, node_id, seq}` (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointBlob {
    pub run_id: String,
    pub node_id: String,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub blob: Vec<u8>,
}

#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    async fn save(&self, record: RunRecord) -> Result<()>;
    async fn get(&self, id: &str) -> Result<RunRecord>;
    async fn list(&self, filter: &RunFilter) -> Vec<RunRecord>;
    async fn count(&self, filter: &RunFilter) -> u64;
    async fn update(&self, id: &str, patch: RunPatch) -> Result<RunRecord>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn get_stats(&self, workflow_name: Option<&str>) -> RunStats;
    async fn cleanup(&self, older_than_ms: i64) -> u64;

    async fn save_checkpoint(&self, checkpoint: CheckpointBlob);
    async fn latest_checkpoint(&self, run_id: &str) -> Option<CheckpointBlob>;
}

/// Default in-process implementation (§6). Concrete relational/vector
/// backends are out of scope; the core requires only the operation
/// semantics above.
#[derive(Default)]
pub struct InMemoryRunStore {
    records: RwLock<HashMap<String, RunRecord>>,
    checkpoints: RwLock<HashMap<(String, String), Vec<CheckpointBlob>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_order(records: &mut [RunRecord], order_by: Option<OrderBy>, direction: OrderDirection) {
        let Some(order_by) = order_by else { return };
        records.sort_by(|a, b| {
            let key = |r: &RunRecord| match order_by {
                OrderBy::StartedAt => r.started_at(),
                OrderBy::CompletedAt => r.completed_at(),
            };
            let ord = key(a).cmp(&key(b));
            match direction {
                OrderDirection::Ascending => ord,
                OrderDirection::Descending => ord.reverse(),
            }
        });
    }
}

#[async_trait::async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, record: RunRecord) -> Result<()> {
        validate_record(&record)?;
        self.records.write().await.insert(record.id().to_string(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<RunRecord> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RunStoreError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &RunFilter) -> Vec<RunRecord> {
        let records = self.records.read().await;
        let mut matched: Vec<RunRecord> = records.values().filter(|r| filter.matches(r)).cloned().collect();
        Self::apply_order(&mut matched, filter.order_by, filter.order_direction);
        let offset = filter.offset.unwrap_or(0);
        let matched = matched.into_iter().skip(offset);
        match filter.limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        }
    }

    async fn count(&self, filter: &RunFilter) -> u64 {
        self.records.read().await.values().filter(|r| filter.matches(r)).count() as u64
    }

    async fn update(&self, id: &str, patch: RunPatch) -> Result<RunRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| RunStoreError::NotFound(id.to_string()))?;
        match record {
            RunRecord::Agent(run) => {
                if let Some(status) = &patch.status {
                    run.status = parse_run_status(status).unwrap_or(run.status);
                }
                if let Some(output) = patch.output {
                    run.output = Some(output);
                }
                if let Some(error) = patch.error {
                    run.error = Some(error);
                }
                if let Some(completed_at) = patch.completed_at {
                    run.completed_at = Some(completed_at);
                }
                if let Some(usage) = patch.usage {
                    run.usage = usage;
                }
                if let Some(iterations) = patch.iterations {
                    run.iterations = iterations;
                }
            }
            RunRecord::Workflow(wf) => {
                if let Some(status) = &patch.status {
                    wf.status = parse_workflow_status(status).unwrap_or(wf.status);
                }
                if let Some(output) = patch.output {
                    wf.output = Some(output);
                }
                if let Some(state) = patch.state {
                    wf.state = state;
                }
                if let Some(node) = patch.current_node {
                    wf.current_node = Some(node);
                }
                if let Some(checkpoint_id) = patch.checkpoint_id {
                    wf.checkpoint_id = Some(checkpoint_id);
                }
                if let Some(error) = patch.error {
                    wf.error = Some(error);
                }
                if let Some(completed_at) = patch.completed_at {
                    wf.completed_at = Some(completed_at);
                }
            }
        }
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RunStoreError::NotFound(id.to_string()))
    }

    async fn get_stats(&self, workflow_name: Option<&str>) -> RunStats {
        let records = self.records.read().await;
        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut total = 0u64;
        let mut error_count = 0u64;
        let mut durations = Vec::new();
        for record in records.values() {
            if let Some(name) = workflow_name {
                if record.workflow_name() != Some(name) {
                    continue;
                }
            }
            total += 1;
            *by_status.entry(record.status_str().to_string()).or_default() += 1;
            if record.has_error() {
                error_count += 1;
            }
            if let (Some(start), Some(end)) = (record.started_at(), record.completed_at()) {
                durations.push((end - start).num_milliseconds() as f64);
            }
        }
        let avg_duration_ms =
            (!durations.is_empty()).then(|| durations.iter().sum::<f64>() / durations.len() as f64);
        RunStats { total, by_status, error_count, avg_duration_ms }
    }

    async fn cleanup(&self, older_than_ms: i64) -> u64 {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(older_than_ms);
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.completed_at().map(|t| t > cutoff).unwrap_or(true));
        (before - records.len()) as u64
    }

    async fn save_checkpoint(&self, checkpoint: CheckpointBlob) {
        self.checkpoints
            .write()
            .await
            .entry((checkpoint.run_id.clone(), checkpoint.node_id.clone()))
            .or_default()
            .push(checkpoint);
    }

    async fn latest_checkpoint(&self, run_id: &str) -> Option<CheckpointBlob> {
        let checkpoints = self.checkpoints.read().await;
        checkpoints
            .iter()
            .filter(|((rid, _), _)| rid == run_id)
            .flat_map(|(_, blobs)| blobs.iter())
            .max_by_key(|b| b.seq)
            .cloned()
    }
}

fn parse_run_status(s: &str) -> Option<RunStatus> {
    Some(match s {
        "pending" => RunStatus::Pending,
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "cancelled" => RunStatus::Cancelled,
        "timeout" => RunStatus::Timeout,
        _ => return None,
    })
}

fn parse_workflow_status(s: &str) -> Option<WorkflowRunStatus> {
    Some(match s {
        "pending" => WorkflowRunStatus::Pending,
        "scheduled" => WorkflowRunStatus::Scheduled,
        "running" => WorkflowRunStatus::Running,
        "paused" => WorkflowRunStatus::Paused,
        "waiting" => WorkflowRunStatus::Waiting,
        "completed" => WorkflowRunStatus::Completed,
        "failed" => WorkflowRunStatus::Failed,
        "cancelled" => WorkflowRunStatus::Cancelled,
        "timeout" => WorkflowRunStatus::Timeout,
        _ => return None,
    })
}
