//! In-process typed pub/sub event bus (component C2).
//!
//! Generalises a single-sink event logger pattern into true multi-subscriber
//! fan-out: each subscriber owns a bounded
//! ring buffer with drop-oldest semantics, so a slow subscriber never blocks
//! the publisher. Delivery order within a channel matches publish order from
//! a single publisher; unsubscribing is idempotent.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Every event the core publishes (§4.1). Fields are kept loose (JSON
/// payloads) because the event bus is a cross-cutting concern that must not
/// import every component's concrete types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    RunStarted { run_id: String, agent_name: String },
    RunStep { run_id: String, iteration: u32 },
    ToolCall { run_id: String, call_id: String, name: String, args: serde_json::Value },
    ToolResult { run_id: String, call_id: String, result: Option<serde_json::Value>, error: Option<String> },
    /// A gated tool call is waiting on a human decision (§4.3 point 1);
    /// resolve it via the run engine's `ApprovalGate`.
    ApprovalRequired { run_id: String, call_id: String, tool: String, args: serde_json::Value },
    TokenDelta { run_id: String, content: String },
    RunCompleted { run_id: String, output: String, input_tokens: u64, output_tokens: u64, cost: f64 },
    RunFailed { run_id: String, error: String },
    RunCancelled { run_id: String },
    WorkflowNodeStarted { workflow_run_id: String, node_id: String },
    WorkflowNodeCompleted { workflow_run_id: String, node_id: String },
    WorkflowApprovalRequested {
        workflow_run_id: String,
        node_id: String,
        kind: String,
        prompt: String,
        options: Vec<String>,
        expires_at: Option<i64>,
    },
    SandboxFallback { requested: String, used: String, reason: String },
    LogEntry { level: String, message: String },
    /// Emitted for a subscriber the instant it starts dropping events; never
    /// itself subject to drop-oldest eviction.
    DropWarning { subscriber: u64, dropped: u64 },
}

impl RuntimeEvent {
    /// A stable channel name used for subscriber filtering, distinct from
    /// the serde tag so callers can group related variants (e.g. all
    /// `tool_*` events) without matching on every variant explicitly.
    pub fn channel(&self) -> &'static str {
        match self {
            RuntimeEvent::RunStarted { .. }
            | RuntimeEvent::RunStep { .. }
            | RuntimeEvent::RunCompleted { .. }
            | RuntimeEvent::RunFailed { .. }
            | RuntimeEvent::RunCancelled { .. } => "run",
            RuntimeEvent::ToolCall { .. } | RuntimeEvent::ToolResult { .. } | RuntimeEvent::ApprovalRequired { .. } => {
                "tool"
            }
            RuntimeEvent::TokenDelta { .. } => "stream",
            RuntimeEvent::WorkflowNodeStarted { .. }
            | RuntimeEvent::WorkflowNodeCompleted { .. }
            | RuntimeEvent::WorkflowApprovalRequested { .. } => "workflow",
            RuntimeEvent::SandboxFallback { .. } => "sandbox",
            RuntimeEvent::LogEntry { .. } => "log",
            RuntimeEvent::DropWarning { .. } => "bus",
        }
    }
}

struct SubscriberInner {
    id: u64,
    capacity: usize,
    buffer: Mutex<VecDeque<RuntimeEvent>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl SubscriberInner {
    /// Push an event, evicting the oldest entry if the buffer is at
    /// capacity. Returns `true` if an eviction occurred on this push.
    fn push(&self, event: RuntimeEvent) -> bool {
        let mut buf = self.buffer.lock();
        let evicted = if buf.len() >= self.capacity {
            buf.pop_front();
            true
        } else {
            false
        };
        buf.push_back(event);
        drop(buf);
        self.notify.notify_one();
        evicted
    }

    /// Push directly, bypassing capacity enforcement. Used only for the
    /// synthetic `DropWarning` event so the warning itself is never dropped.
    fn push_raw(&self, event: RuntimeEvent) {
        self.buffer.lock().push_back(event);
        self.notify.notify_one();
    }
}

/// A handle returned by [`EventBus::subscribe`]. Dropping it does not
/// unsubscribe; call [`EventBus::unsubscribe`] explicitly (idempotent).
pub struct Subscriber {
    inner: Arc<SubscriberInner>,
}

impl Subscriber {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Pop the next event, waiting if the buffer is currently empty.
    pub async fn recv(&self) -> RuntimeEvent {
        loop {
            if let Some(event) = self.inner.buffer.lock().pop_front() {
                return event;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Non-blocking pop; `None` if the buffer is empty.
    pub fn try_recv(&self) -> Option<RuntimeEvent> {
        self.inner.buffer.lock().pop_front()
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

/// Default per-subscriber buffer size before drop-oldest kicks in.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<u64, Arc<SubscriberInner>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscriber {
        self.subscribe_with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Subscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(SubscriberInner {
            id,
            capacity: capacity.max(1),
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });
        self.subscribers.lock().insert(id, inner.clone());
        Subscriber { inner }
    }

    /// Idempotent: unsubscribing an id that is already gone is a no-op.
    pub fn unsubscribe(&self, subscriber: &Subscriber) {
        self.subscribers.lock().remove(&subscriber.inner.id);
    }

    /// Publish never blocks: each subscriber's push is an O(1) buffer
    /// operation guarded by a short-held lock, never an await point.
    pub fn publish(&self, event: RuntimeEvent) {
        let subs: Vec<Arc<SubscriberInner>> = self.subscribers.lock().values().cloned().collect();
        for sub in subs {
            let evicted = sub.push(event.clone());
            if evicted {
                let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                sub.push_raw(RuntimeEvent::DropWarning {
                    subscriber: sub.id,
                    dropped,
                });
                tracing::warn!(subscriber = sub.id, dropped, "event bus subscriber dropping oldest events");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
