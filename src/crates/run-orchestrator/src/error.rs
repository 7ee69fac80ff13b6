//! Crate-wide error type (§7).
//!
//! Kept in a hand-rolled `thiserror`-enum-with-`General`-catch-all
//! style (`OrchestratorError` in the original `orchestrator` crate), since
//! that convention was already established at this layer before the rest of
//! the workspace standardised on per-component enums.

#[derive(Debug, thiserror::Error)]
pub enum RunOrchestratorError {
    /// A referenced run, container, or tool execution does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A sandboxed execution exceeded its configured deadline.
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The sandbox backend itself could not run the request (pull failure,
    /// daemon unreachable, module load failure, ...).
    #[error("sandbox backend error: {0}")]
    Sandbox(String),

    /// The container pool could not satisfy an acquire (pool exhausted and
    /// no idle entry could be evicted).
    #[error("container pool error: {0}")]
    Pool(String),

    /// A scheduler or retry operation failed after exhausting its policy.
    #[error("scheduling error: {0}")]
    Schedule(String),

    /// Invalid run-store filter or malformed cron expression.
    #[error("validation error: {0}")]
    Validation(String),

    /// General catch-all, retained from the original error shape.
    #[error("orchestrator error: {0}")]
    General(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunOrchestratorError>;
