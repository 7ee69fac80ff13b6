//! # agent-core
//!
//! Opaque identifiers and a pluggable clock (C1), the typed pub/sub event bus
//! (C2), the thread/entry memory store with context-window projection (C3),
//! the graph-memory layer for semantic/traversal queries, the budget and
//! pricing services, the tool-approval gate, the Tool Registry (C5), and the
//! Agent Run Engine (C8) built on top of them: the bounded per-run turn loop
//! that calls a bound `ChatModel`, dispatches tool calls, and persists
//! terminal state through a `RunStore`.
//!
//! This crate has no CLI, no TUI, and no database of its own — a host binary
//! (out of scope here) supplies the concrete `ChatModel`, `RunStore`, and
//! `SandboxExecutor`/`SandboxManager` capabilities this crate's engine and
//! registry are built against.

pub mod approval;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod graph_memory;
pub mod id;
pub mod memory;
pub mod models;
pub mod run_engine;
pub mod services;
pub mod testing;
pub mod version;

pub use error::{CoreError, Result};

pub use id::{Clock, Deadline, FixedClock, NodeId, RunId, SystemClock, ThreadId, ToolCallId, WorkflowRunId};

pub use event_bus::{EventBus, RuntimeEvent, Subscriber};

pub use memory::{
    ContentPart, ContextBudget, EntryFilter, InMemoryMemoryStore, MemoryEntry, MemoryStore, Message, MessageContent,
    MessageRole, ProjectionStrategy, Summariser, Thread, ThreadMetadata, Tokeniser, ToolCallRef, ToolResultRef,
};

pub use graph_memory::{EdgeDirection, EdgeOptions, GraphEdge, GraphNode, InMemoryGraphMemory, NodeOptions};

pub use approval::{
    ApprovalConfig, ApprovalGate, ExecutionDecision, PermissionLevel, SharedApprovalGate, ToolPermissionEnforcer,
    ToolPolicy,
};

pub use config::RuntimeConfig;

pub use models::{default_pricing, Budget, BudgetEnforcement, BudgetType, LlmPricing, RenewalInterval};
pub use services::{BudgetService, BudgetStatus, PricingService};

pub use run_engine::{
    Agent, CancellationHandle, RegistryError, RunEngine, RunLimits, RunRequest, ToolInvocationContext,
    ToolInvocationOutcome, ToolRegistry, ToolSpec, DEFAULT_MAX_ITERATIONS, DEFAULT_TIMEOUT,
};

pub use version::{full_version as version_info, short_version, VersionInfo};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_contains_crate_version() {
        let info = version_info();
        assert!(info.contains(version::VERSION));
    }
}
