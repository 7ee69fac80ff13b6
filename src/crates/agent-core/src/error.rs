//! Crate-wide error aggregation (§7).
//!
//! Component-local errors (`MemoryError`, `GraphMemoryError`, ...) are their
//! own small `thiserror` enums; `CoreError` aggregates them at the boundary
//! where callers stop caring which component failed. The run-orchestration
//! layer keeps its own hand-rolled manual-`Display` aggregate error instead,
//! since it predates this crate's components.

use crate::graph_memory::GraphMemoryError;
use crate::memory::MemoryError;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("memory store error: {0}")]
    Memory(#[from] MemoryError),

    #[error("graph memory error: {0}")]
    GraphMemory(#[from] GraphMemoryError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("tool denied: {0}")]
    ToolDenied(String),

    #[error("duplicate tool name: {0}")]
    DuplicateName(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A run-engine turn terminated the run (§4.6): message is the exact
    /// `Run.error` string (`"iteration limit exceeded"`, `"output truncated"`,
    /// `"budget exceeded"`, a provider error, ...), not wrapped further.
    #[error("{0}")]
    RunFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
