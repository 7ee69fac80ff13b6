//! Unified sandbox executor interface with three backends and automatic
//! fallback (component C6, §4.4).

pub mod container;
pub mod manager;
pub mod native;
pub mod wasm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use manager::SandboxManager;

/// Output is capped at this many bytes per stream; excess is truncated, not
/// an error (§4.4).
pub const MAX_OUTPUT_BYTES: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    Native,
    Container,
    Wasm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    None,
    Bridge,
    Host,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceCaps {
    pub memory_bytes: Option<u64>,
    pub cpu_shares: Option<f64>,
    pub pids_limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mode: NetworkMode,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { mode: NetworkMode::None }
    }
}

/// Per-call sandbox configuration (§3). Carried on the `Tool` definition and
/// passed through to `SandboxExecutor::execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub kind: SandboxKind,
    pub image: Option<String>,
    pub wasm_module: Option<String>,
    pub wasm_function: Option<String>,
    pub timeout_ms: u64,
    pub resources: ResourceCaps,
    pub network: NetworkConfig,
    pub mounts: Vec<Mount>,
    pub env: HashMap<String, String>,
    pub user: Option<String>,
    pub workdir: Option<String>,
}

impl SandboxConfig {
    pub fn native(timeout_ms: u64) -> Self {
        Self {
            kind: SandboxKind::Native,
            image: None,
            wasm_module: None,
            wasm_function: None,
            timeout_ms,
            resources: ResourceCaps::default(),
            network: NetworkConfig::default(),
            mounts: Vec::new(),
            env: HashMap::new(),
            user: None,
            workdir: None,
        }
    }

    /// Downgrades `self` to `kind`, dropping fields meaningless to the new
    /// backend while preserving the rest (§4.4 fallback policy).
    fn degraded_to(&self, kind: SandboxKind) -> Self {
        let mut next = self.clone();
        next.kind = kind;
        match kind {
            SandboxKind::Native => {
                next.image = None;
                next.wasm_module = None;
                next.wasm_function = None;
                next.mounts.clear();
            }
            SandboxKind::Container => {
                next.wasm_module = None;
                next.wasm_function = None;
            }
            SandboxKind::Wasm => {
                next.image = None;
            }
        }
        next
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub command: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecResult {
    pub fn truncate_outputs(mut self) -> Self {
        self.stdout.truncate(MAX_OUTPUT_BYTES);
        self.stderr.truncate(MAX_OUTPUT_BYTES);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// The executor contract shared by all three backends (§4.4).
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    fn kind(&self) -> SandboxKind;
    async fn execute(&self, req: &ExecRequest, cfg: &SandboxConfig) -> Result<ExecResult>;
}
