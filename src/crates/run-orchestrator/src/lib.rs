//! Run persistence, sandboxed tool execution, and scheduled dispatch for the
//! agent runtime.
//!
//! This crate owns the components that sit outside a single agent turn:
//! the **Run Store** (C4, persisted run/workflow-run records), the
//! **Sandbox Layer** (C6 executors plus the C7 container pool, with
//! automatic fallback between backends), and the **Scheduler & Manager**
//! (C10, a priority queue and cron-triggered dispatcher sitting in front of
//! the Agent Run Engine in `agent-core` and the Workflow Engine in
//! `langgraph-core`).

pub mod container_pool;
pub mod error;
pub mod executor;
pub mod run_store;
pub mod sandbox;
pub mod scheduler;
pub mod version;

pub use error::{Result, RunOrchestratorError};
pub use container_pool::{AcquireOptions, ContainerPool, LeasedContainer, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_SIZE};
pub use run_store::{
    CheckpointBlob, InMemoryRunStore, OrderBy, OrderDirection, Run, RunFilter, RunPatch, RunRecord, RunStats,
    RunStatus, RunStore, Usage, WorkflowRun, WorkflowRunStatus,
};
pub use sandbox::{
    container::ContainerExecutor, native::NativeExecutor, wasm::WasmExecutor, ExecRequest, ExecResult,
    NetworkConfig, NetworkMode, ResourceCaps, SandboxConfig, SandboxExecutor, SandboxKind, SandboxManager,
};
pub use scheduler::{cron_matches, CronJob, QueuedItem, RunDispatcher, RunKind, Scheduler};
