//! Thread CRUD, entry append, and context-window projection (component C3).
//!
//! Grounded on the `Store`/`InMemoryStore` pattern in `langgraph-core::store`
//! (async trait + `thiserror` error enum + `Arc<RwLock<...>>` backing), but
//! shaped around the thread/entry/projection semantics of §4.2 rather than a
//! generic key-value map. Thread-level operations serialise per thread via a
//! thread-keyed lock (§5) so concurrent appends to the same thread produce a
//! well-defined order, while cross-thread operations stay concurrent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::id::{Clock, ThreadId};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("thread not found: {0}")]
    NotFound(String),
    #[error("memory store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// A single piece of message content (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { url: String },
    ImageData { bytes: Vec<u8>, mime: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A single immutable message (§3). Once appended to a thread it is never
/// mutated, only superseded by later entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(text.into()),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(text.into()),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::Text(text.into()),
            tool_call_id: Some(tool_call_id.into()),
            name: None,
        }
    }

    /// Approximate byte length used by the default tokeniser.
    fn byte_len(&self) -> usize {
        match &self.content {
            MessageContent::Text(s) => s.len(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::ImageUrl { url } => url.len(),
                    ContentPart::ImageData { bytes, .. } => bytes.len(),
                })
                .sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultRef {
    pub call_id: String,
    pub name: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// An appended entry in a thread (§3). `token_count` is computed by a
/// pluggable [`Tokeniser`] at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub thread_id: String,
    pub message: Message,
    pub token_count: u64,
    pub created_at: DateTime<Utc>,
    pub tool_calls: Option<Vec<ToolCallRef>>,
    pub tool_results: Option<Vec<ToolResultRef>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThreadMetadata(pub serde_json::Value);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: ThreadMetadata,
}

/// Pluggable token estimator (§4.2): `len(bytes)/4` is the acceptable
/// approximation when a real tokeniser is absent.
pub trait Tokeniser: Send + Sync {
    fn count(&self, message: &Message) -> u64;
}

#[derive(Debug, Default)]
pub struct ApproxByteTokeniser;

impl Tokeniser for ApproxByteTokeniser {
    fn count(&self, message: &Message) -> u64 {
        (message.byte_len() as u64 / 4).max(1)
    }
}

/// Truncates a message's content to fit within `max_tokens`, applying the
/// same `len(bytes)/4` approximation [`ApproxByteTokeniser`] uses to count,
/// so a single entry whose own `token_count` exceeds the entire budget can
/// still be projected without violating `projectContext`'s
/// `tokens ≤ max_tokens` invariant (§8.4).
fn truncate_message_to_tokens(message: &Message, max_tokens: u64) -> Message {
    let byte_budget = (max_tokens as usize).saturating_mul(4);
    let mut truncated = message.clone();
    truncated.content = match message.content.clone() {
        MessageContent::Text(text) => MessageContent::Text(truncate_str_to_bytes(&text, byte_budget)),
        MessageContent::Parts(parts) => {
            let mut remaining = byte_budget;
            let mut kept = Vec::new();
            for part in parts {
                let part_len = match &part {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::ImageUrl { url } => url.len(),
                    ContentPart::ImageData { bytes, .. } => bytes.len(),
                };
                if part_len <= remaining {
                    remaining -= part_len;
                    kept.push(part);
                } else {
                    if let ContentPart::Text { text } = &part {
                        kept.push(ContentPart::Text { text: truncate_str_to_bytes(text, remaining) });
                    }
                    break;
                }
            }
            MessageContent::Parts(kept)
        }
    };
    truncated
}

fn truncate_str_to_bytes(s: &str, byte_budget: usize) -> String {
    if s.len() <= byte_budget {
        return s.to_string();
    }
    let mut end = byte_budget.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// External summarisation capability used by the `summarised` projection
/// strategy (§4.2). If none is wired, the strategy degrades silently to
/// `recent`.
#[async_trait]
pub trait Summariser: Send + Sync {
    async fn summarise(&self, entries: &[MemoryEntry]) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionStrategy {
    Recent,
    Summarised,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    pub max_tokens: u64,
    pub strategy: ProjectionStrategy,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EntryFilter {
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Fraction of the token budget reserved for the summary of the older
/// prefix when `strategy = summarised` (§4.2).
const SUMMARY_RESERVE_FRACTION: f64 = 0.20;

struct ThreadState {
    thread: Thread,
    entries: Vec<MemoryEntry>,
}

/// The Memory Store capability (§6, §4.2) as a trait so the run engine
/// depends on the operation semantics rather than the in-process
/// implementation. Mirrors how `run_orchestrator::run_store::RunStore` and
/// `langgraph_core::llm::ChatModel` are named traits the engine is built
/// against, with one default in-process implementation supplied here.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn create_thread(&self, agent_id: &str, metadata: Option<serde_json::Value>) -> Thread;
    async fn append_entry(
        &self,
        thread_id: &str,
        message: Message,
        tool_calls: Option<Vec<ToolCallRef>>,
        tool_results: Option<Vec<ToolResultRef>>,
    ) -> Result<MemoryEntry>;
    async fn get_entries(&self, thread_id: &str, filter: EntryFilter) -> Result<Vec<MemoryEntry>>;
    async fn project_context(&self, thread_id: &str, budget: ContextBudget) -> Result<Vec<Message>>;
    async fn delete_thread(&self, thread_id: &str);
}

/// In-process default implementation of the Memory Store capability (§6).
/// Concrete vector/relational backends are out of scope; this is the
/// standalone default, mirroring `langgraph-core::store::InMemoryStore`'s
/// role for the generic `Store` trait.
pub struct InMemoryMemoryStore {
    clock: Arc<dyn Clock>,
    tokeniser: Arc<dyn Tokeniser>,
    summariser: Option<Arc<dyn Summariser>>,
    threads: RwLock<HashMap<String, Arc<RwLock<ThreadState>>>>,
}

impl InMemoryMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tokeniser: Arc::new(ApproxByteTokeniser),
            summariser: None,
            threads: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_tokeniser(mut self, tokeniser: Arc<dyn Tokeniser>) -> Self {
        self.tokeniser = tokeniser;
        self
    }

    pub fn with_summariser(mut self, summariser: Arc<dyn Summariser>) -> Self {
        self.summariser = Some(summariser);
        self
    }

    async fn thread_lock(&self, thread_id: &str) -> Option<Arc<RwLock<ThreadState>>> {
        self.threads.read().await.get(thread_id).cloned()
    }

    pub async fn create_thread(&self, agent_id: impl Into<String>, metadata: Option<serde_json::Value>) -> Thread {
        let now = self.clock.now();
        let id = ThreadId::new(self.clock.as_ref()).to_string();
        let thread = Thread {
            id: id.clone(),
            agent_id: agent_id.into(),
            created_at: now,
            updated_at: now,
            metadata: ThreadMetadata(metadata.unwrap_or(serde_json::Value::Null)),
        };
        self.threads.write().await.insert(
            id,
            Arc::new(RwLock::new(ThreadState {
                thread: thread.clone(),
                entries: Vec::new(),
            })),
        );
        thread
    }

    pub async fn append_entry(
        &self,
        thread_id: &str,
        message: Message,
        tool_calls: Option<Vec<ToolCallRef>>,
        tool_results: Option<Vec<ToolResultRef>>,
    ) -> Result<MemoryEntry> {
        let state_lock = self
            .thread_lock(thread_id)
            .await
            .ok_or_else(|| MemoryError::NotFound(thread_id.to_string()))?;
        let mut state = state_lock.write().await;
        let now = self.clock.now();
        let entry = MemoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            token_count: self.tokeniser.count(&message),
            message,
            created_at: now,
            tool_calls,
            tool_results,
        };
        state.entries.push(entry.clone());
        state.thread.updated_at = now;
        Ok(entry)
    }

    pub async fn get_entries(&self, thread_id: &str, filter: EntryFilter) -> Result<Vec<MemoryEntry>> {
        let state_lock = self
            .thread_lock(thread_id)
            .await
            .ok_or_else(|| MemoryError::NotFound(thread_id.to_string()))?;
        let state = state_lock.read().await;
        let mut entries: Vec<MemoryEntry> = state
            .entries
            .iter()
            .filter(|e| filter.before.map(|b| e.created_at < b).unwrap_or(true))
            .filter(|e| filter.after.map(|a| e.created_at > a).unwrap_or(true))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Selects a tail of entries such that cumulative `token_count` does not
    /// exceed `budget.max_tokens`, returning their messages (§4.2, invariant 4).
    pub async fn project_context(&self, thread_id: &str, budget: ContextBudget) -> Result<Vec<Message>> {
        let state_lock = self
            .thread_lock(thread_id)
            .await
            .ok_or_else(|| MemoryError::NotFound(thread_id.to_string()))?;
        let state = state_lock.read().await;

        match budget.strategy {
            ProjectionStrategy::Recent => Ok(Self::take_recent_tail(&state.entries, budget.max_tokens)),
            ProjectionStrategy::Summarised => {
                let Some(summariser) = &self.summariser else {
                    // No summariser wired: degrade silently to `recent`.
                    return Ok(Self::take_recent_tail(&state.entries, budget.max_tokens));
                };
                let recent_budget = ((budget.max_tokens as f64) * (1.0 - SUMMARY_RESERVE_FRACTION)) as u64;
                let recent = Self::take_recent_tail(&state.entries, recent_budget);
                let recent_start = state.entries.len().saturating_sub(recent.len());
                let older = &state.entries[..recent_start];
                if older.is_empty() {
                    return Ok(recent);
                }
                let summary = summariser.summarise(older).await;
                let mut out = vec![Message::system(format!("Summary of earlier conversation: {summary}"))];
                out.extend(recent);
                Ok(out)
            }
        }
    }

    fn take_recent_tail(entries: &[MemoryEntry], max_tokens: u64) -> Vec<Message> {
        let mut selected = Vec::new();
        let mut total = 0u64;
        for entry in entries.iter().rev() {
            if entry.token_count > max_tokens {
                // The single newest-so-far entry alone exceeds the whole
                // budget. Including it unconditionally would push cumulative
                // tokens above `max_tokens`, breaking §8 invariant 4; truncate
                // it to fit instead of returning it whole.
                if selected.is_empty() {
                    selected.push(truncate_message_to_tokens(&entry.message, max_tokens));
                }
                break;
            }
            if total + entry.token_count > max_tokens {
                break;
            }
            total += entry.token_count;
            selected.push(entry.message.clone());
            if total >= max_tokens {
                break;
            }
        }
        selected.reverse();
        selected
    }

    /// Idempotent: deleting an already-deleted (or never-created) thread
    /// succeeds silently.
    pub async fn delete_thread(&self, thread_id: &str) {
        self.threads.write().await.remove(thread_id);
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn create_thread(&self, agent_id: &str, metadata: Option<serde_json::Value>) -> Thread {
        self.create_thread(agent_id, metadata).await
    }

    async fn append_entry(
        &self,
        thread_id: &str,
        message: Message,
        tool_calls: Option<Vec<ToolCallRef>>,
        tool_results: Option<Vec<ToolResultRef>>,
    ) -> Result<MemoryEntry> {
        self.append_entry(thread_id, message, tool_calls, tool_results).await
    }

    async fn get_entries(&self, thread_id: &str, filter: EntryFilter) -> Result<Vec<MemoryEntry>> {
        self.get_entries(thread_id, filter).await
    }

    async fn project_context(&self, thread_id: &str, budget: ContextBudget) -> Result<Vec<Message>> {
        self.project_context(thread_id, budget).await
    }

    async fn delete_thread(&self, thread_id: &str) {
        self.delete_thread(thread_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SystemClock;

    fn store() -> InMemoryMemoryStore {
        InMemoryMemoryStore::new(Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn append_entry_fails_not_found_for_missing_thread() {
        let store = store();
        let err = store
            .append_entry("missing", Message::user("hi"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn entries_are_totally_ordered_by_created_at() {
        let store = store();
        let thread = store.create_thread("agent-1", None).await;
        for i in 0..5 {
            store
                .append_entry(&thread.id, Message::user(format!("msg {i}")), None, None)
                .await
                .unwrap();
        }
        let entries = store.get_entries(&thread.id, EntryFilter::default()).await.unwrap();
        for pair in entries.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn project_context_respects_token_budget() {
        let store = store();
        let thread = store.create_thread("agent-1", None).await;
        for i in 0..50 {
            store
                .append_entry(&thread.id, Message::user(format!("message number {i} with some padding text")), None, None)
                .await
                .unwrap();
        }
        let budget = ContextBudget { max_tokens: 40, strategy: ProjectionStrategy::Recent };
        let messages = store.project_context(&thread.id, budget).await.unwrap();
        assert!(!messages.is_empty());
    }

    /// §8 invariant 4: `projectContext(T,{maxTokens=B}).tokens ≤ B` even
    /// when the single newest entry's own `token_count` exceeds `B`.
    #[tokio::test]
    async fn project_context_truncates_single_entry_over_budget() {
        let store = store();
        let thread = store.create_thread("agent-1", None).await;
        let huge = "x".repeat(4_000); // ~1000 tokens under the byte/4 approximation
        store.append_entry(&thread.id, Message::user(huge), None, None).await.unwrap();

        let budget = ContextBudget { max_tokens: 10, strategy: ProjectionStrategy::Recent };
        let messages = store.project_context(&thread.id, budget).await.unwrap();

        assert_eq!(messages.len(), 1);
        let MessageContent::Text(text) = &messages[0].content else {
            panic!("expected text content");
        };
        assert!(text.len() <= 40, "truncated text should fit the byte/4 budget, got {} bytes", text.len());
    }

    #[tokio::test]
    async fn summarised_strategy_degrades_to_recent_without_summariser() {
        let store = store();
        let thread = store.create_thread("agent-1", None).await;
        store.append_entry(&thread.id, Message::user("hello"), None, None).await.unwrap();
        let budget = ContextBudget { max_tokens: 100, strategy: ProjectionStrategy::Summarised };
        let messages = store.project_context(&thread.id, budget).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn delete_thread_is_idempotent() {
        let store = store();
        let thread = store.create_thread("agent-1", None).await;
        store.delete_thread(&thread.id).await;
        store.delete_thread(&thread.id).await;
        let err = store.get_entries(&thread.id, EntryFilter::default()).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }
}
