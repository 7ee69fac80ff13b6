//! Priority queue, worker pool, and cron-triggered dispatch (component C10,
//! §4.8). A thin wrapper: it orders Run/Workflow requests and hands them to
//! whatever dispatches into C8/C9, it does not run agent turns or DAG nodes
//! itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{error, info, warn};

use crate::executor::retry::{classify_error, ErrorClass, RetryConfig};
use crate::run_store::{RunPatch, RunStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Agent,
    Workflow,
}

/// An item waiting in the priority queue (§4.8).
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub run_id: String,
    pub kind: RunKind,
    pub priority: i32,
    pub scheduled_at: DateTime<Utc>,
    pub attempt: u32,
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.scheduled_at == other.scheduled_at
    }
}
impl Eq for QueuedItem {}

/// Ordered by `{priority desc, scheduledAt asc}` (§4.8); `BinaryHeap` is a
/// max-heap so higher priority and earlier `scheduled_at` sort first.
impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.scheduled_at.cmp(&self.scheduled_at))
    }
}
impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A registered cron job (§4.8): `{expression, workflowName, input, tags}`.
#[derive(Debug, Clone)]
pub struct CronJob {
    pub id: String,
    pub expression: String,
    pub workflow_name: String,
    pub input: serde_json::Value,
    pub tags: Vec<String>,
    pub last_fired_minute: Option<i64>,
}

/// Hands a dequeued item off to whatever actually executes it (C8 for agent
/// runs, C9 for workflow runs). Kept abstract so this crate does not take a
/// hard dependency on the agent/workflow engines' concrete types.
#[async_trait]
pub trait RunDispatcher: Send + Sync {
    async fn dispatch(&self, item: &QueuedItem) -> Result<(), String>;
}

pub struct Scheduler {
    queue: Mutex<BinaryHeap<QueuedItem>>,
    notify: Notify,
    cron_jobs: RwLock<Vec<CronJob>>,
    retry_config: RetryConfig,
    dispatcher: Arc<dyn RunDispatcher>,
    run_store: Arc<dyn RunStore>,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<dyn RunDispatcher>, run_store: Arc<dyn RunStore>, retry_config: RetryConfig) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            cron_jobs: RwLock::new(Vec::new()),
            retry_config,
            dispatcher,
            run_store,
        })
    }

    pub async fn enqueue(&self, item: QueuedItem) {
        self.queue.lock().await.push(item);
        self.notify.notify_one();
    }

    pub async fn register_cron(&self, job: CronJob) {
        self.cron_jobs.write().await.push(job);
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Materialises due cron jobs as queued runs (§4.8). Called once per tick
    /// by `run_cron_loop`; exposed separately so tests can drive it directly
    /// without waiting on a real clock.
    pub async fn tick_cron(&self, at: DateTime<Utc>) {
        let minute_bucket = at.timestamp() / 60;
        let mut jobs = self.cron_jobs.write().await;
        for job in jobs.iter_mut() {
            if job.last_fired_minute == Some(minute_bucket) {
                continue;
            }
            if !cron_matches(&job.expression, at) {
                continue;
            }
            job.last_fired_minute = Some(minute_bucket);
            let run_id = format!("wfrun-{}", uuid::Uuid::new_v4());
            let record = crate::run_store::RunRecord::Workflow(crate::run_store::WorkflowRun {
                id: run_id.clone(),
                workflow_name: job.workflow_name.clone(),
                status: crate::run_store::WorkflowRunStatus::Pending,
                input: job.input.clone(),
                output: None,
                state: serde_json::Value::Null,
                current_node: None,
                checkpoint_id: None,
                tags: job.tags.clone(),
                trigger_id: Some(job.id.clone()),
                parent_run_id: None,
                error: None,
                started_at: None,
                completed_at: None,
            });
            if let Err(e) = self.run_store.save(record).await {
                error!(error = %e, job_id = job.id, "failed to persist cron-triggered run");
                continue;
            }
            self.enqueue(QueuedItem {
                run_id,
                kind: RunKind::Workflow,
                priority: 0,
                scheduled_at: at,
                attempt: 0,
            })
            .await;
        }
    }

    /// Runs the cron tick loop until the returned task is aborted.
    pub fn spawn_cron_loop(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.tick_cron(Utc::now()).await;
            }
        })
    }

    /// Spawns `workers` worker tasks dequeuing and dispatching items.
    pub fn spawn_workers(self: Arc<Self>, workers: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..workers)
            .map(|_| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.worker_loop().await })
            })
            .collect()
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            let item = self.pop_ready().await;
            self.process(item).await;
        }
    }

    async fn pop_ready(&self) -> QueuedItem {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(top) = queue.peek() {
                    if top.scheduled_at <= Utc::now() {
                        return queue.pop().expect("peeked item exists");
                    }
                }
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {}
            }
        }
    }

    async fn process(&self, item: QueuedItem) {
        if self.is_terminal(&item.run_id).await {
            return;
        }

        match self.dispatcher.dispatch(&item).await {
            Ok(()) => {
                info!(run_id = item.run_id, "dispatched run");
            }
            Err(reason) => {
                let class = classify_error(&crate::error::RunOrchestratorError::General(reason.clone()));
                if class == ErrorClass::Permanent || item.attempt >= self.retry_config.max_retries {
                    warn!(run_id = item.run_id, reason, "run failed, not retrying");
                    let _ = self
                        .run_store
                        .update(
                            &item.run_id,
                            RunPatch { status: Some("failed".into()), error: Some(reason), completed_at: Some(Utc::now()), ..Default::default() },
                        )
                        .await;
                    return;
                }
                let delay = self.retry_config.backoff_delay(item.attempt);
                warn!(run_id = item.run_id, attempt = item.attempt, delay_ms = delay.as_millis(), "retrying run after backoff");
                self.enqueue(QueuedItem {
                    scheduled_at: Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64),
                    attempt: item.attempt + 1,
                    ..item
                })
                .await;
            }
        }
    }

    async fn is_terminal(&self, run_id: &str) -> bool {
        match self.run_store.get(run_id).await {
            Ok(record) => matches!(
                record,
                crate::run_store::RunRecord::Agent(r)
                    if matches!(r.status, crate::run_store::RunStatus::Completed | crate::run_store::RunStatus::Cancelled)
            ) || matches!(
                record,
                crate::run_store::RunRecord::Workflow(r)
                    if matches!(r.status, crate::run_store::WorkflowRunStatus::Completed | crate::run_store::WorkflowRunStatus::Cancelled)
            ),
            Err(_) => false,
        }
    }
}

/// Hand-rolled 5-field cron matcher (`minute hour day-of-month month
/// day-of-week`); no crate in the retrieved corpus provides one. Supports
/// `*`, comma lists, ranges, and `*/n` steps.
pub fn cron_matches(expression: &str, at: DateTime<Utc>) -> bool {
    use chrono::{Datelike, Timelike};
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    field_matches(fields[0], at.minute() as i64, 0, 59)
        && field_matches(fields[1], at.hour() as i64, 0, 23)
        && field_matches(fields[2], at.day() as i64, 1, 31)
        && field_matches(fields[3], at.month() as i64, 1, 12)
        && field_matches(fields[4], at.weekday().num_days_from_sunday() as i64, 0, 6)
}

fn field_matches(field: &str, value: i64, min: i64, max: i64) -> bool {
    if field == "*" {
        return true;
    }
    field.split(',').any(|part| part_matches(part, value, min, max))
}

fn part_matches(part: &str, value: i64, min: i64, max: i64) -> bool {
    if let Some((range_or_star, step_str)) = part.split_once('/') {
        let step: i64 = match step_str.parse() {
            Ok(s) if s > 0 => s,
            _ => return false,
        };
        let (lo, hi) = if range_or_star == "*" {
            (min, max)
        } else {
            match parse_range(range_or_star) {
                Some(r) => r,
                None => return false,
            }
        };
        return value >= lo && value <= hi && (value - lo) % step == 0;
    }
    if let Some((lo, hi)) = parse_range(part) {
        return value >= lo && value <= hi;
    }
    part.parse::<i64>().map(|v| v == value).unwrap_or(false)
}

fn parse_range(s: &str) -> Option<(i64, i64)> {
    if let Some((lo, hi)) = s.split_once('-') {
        Some((lo.parse().ok()?, hi.parse().ok()?))
    } else {
        let v: i64 = s.parse().ok()?;
        Some((v, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_store::InMemoryRunStore;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn cron_matches_wildcard_every_minute() {
        assert!(cron_matches("* * * * *", Utc::now()));
    }

    #[test]
    fn cron_matches_step_expression() {
        let at = DateTime::parse_from_rfc3339("2026-07-27T10:10:00Z").unwrap().with_timezone(&Utc);
        assert!(cron_matches("*/5 * * * *", at));
        let at_off = DateTime::parse_from_rfc3339("2026-07-27T10:11:00Z").unwrap().with_timezone(&Utc);
        assert!(!cron_matches("*/5 * * * *", at_off));
    }

    #[test]
    fn cron_matches_explicit_list_and_range() {
        let at = DateTime::parse_from_rfc3339("2026-07-27T09:00:00Z").unwrap().with_timezone(&Utc);
        assert!(cron_matches("0 9 * * 1-5", at));
    }

    #[test]
    fn queued_item_orders_by_priority_then_time() {
        let mut heap = BinaryHeap::new();
        let now = Utc::now();
        heap.push(QueuedItem { run_id: "low".into(), kind: RunKind::Agent, priority: 1, scheduled_at: now, attempt: 0 });
        heap.push(QueuedItem { run_id: "high".into(), kind: RunKind::Agent, priority: 10, scheduled_at: now, attempt: 0 });
        assert_eq!(heap.pop().unwrap().run_id, "high");
        assert_eq!(heap.pop().unwrap().run_id, "low");
    }

    struct FailingDispatcher(AtomicUsize);
    #[async_trait]
    impl RunDispatcher for FailingDispatcher {
        async fn dispatch(&self, _item: &QueuedItem) -> Result<(), String> {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
            Err("401 Unauthorized".into())
        }
    }

    #[tokio::test]
    async fn permanent_error_marks_run_failed_without_retry() {
        let store = Arc::new(InMemoryRunStore::new());
        store
            .save(crate::run_store::RunRecord::Agent(crate::run_store::Run {
                id: "r1".into(),
                agent_id: "a1".into(),
                thread_id: "t1".into(),
                status: crate::run_store::RunStatus::Pending,
                input: serde_json::json!({}),
                output: None,
                usage: Default::default(),
                iterations: 0,
                error: None,
                trace: vec![],
                tags: vec![],
                trigger_id: None,
                parent_run_id: None,
                started_at: Utc::now(),
                completed_at: None,
            }))
            .await
            .unwrap();

        let dispatcher = Arc::new(FailingDispatcher(AtomicUsize::new(0)));
        let scheduler = Scheduler::new(dispatcher.clone(), store.clone(), RetryConfig::default());
        scheduler
            .process(QueuedItem { run_id: "r1".into(), kind: RunKind::Agent, priority: 0, scheduled_at: Utc::now(), attempt: 0 })
            .await;

        assert_eq!(dispatcher.0.load(AtomicOrdering::SeqCst), 1);
        let record = store.get("r1").await.unwrap();
        match record {
            crate::run_store::RunRecord::Agent(r) => assert_eq!(r.status, crate::run_store::RunStatus::Failed),
            _ => panic!("expected agent run"),
        }
    }

    #[tokio::test]
    async fn terminal_runs_are_never_redispatched() {
        let store = Arc::new(InMemoryRunStore::new());
        store
            .save(crate::run_store::RunRecord::Agent(crate::run_store::Run {
                id: "r1".into(),
                agent_id: "a1".into(),
                thread_id: "t1".into(),
                status: crate::run_store::RunStatus::Completed,
                input: serde_json::json!({}),
                output: None,
                usage: Default::default(),
                iterations: 0,
                error: None,
                trace: vec![],
                tags: vec![],
                trigger_id: None,
                parent_run_id: None,
                started_at: Utc::now(),
                completed_at: Some(Utc::now()),
            }))
            .await
            .unwrap();

        let dispatcher = Arc::new(FailingDispatcher(AtomicUsize::new(0)));
        let scheduler = Scheduler::new(dispatcher.clone(), store.clone(), RetryConfig::default());
        scheduler
            .process(QueuedItem { run_id: "r1".into(), kind: RunKind::Agent, priority: 0, scheduled_at: Utc::now(), attempt: 0 })
            .await;

        assert_eq!(dispatcher.0.load(AtomicOrdering::SeqCst), 0);
    }
}
