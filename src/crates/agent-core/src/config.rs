//! In-process runtime configuration (§2.1, §6).
//!
//! `RuntimeConfig` carries exactly the recognised option set named in §6,
//! constructed programmatically or via `Default`. There is no file loader
//! here — parsing YAML/TOML from disk is the out-of-scope CLI's job; a
//! consumer that wants that can populate a `RuntimeConfig` however it likes
//! and hand it to this crate: one struct per concern, each with a `Default`
//! impl, with no config-loader/dual-location-file-merge machinery.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl RuntimeConfig {
    /// Field-level sanity checks, since there is no file loader to trust;
    /// called explicitly by embedders after construction.
    pub fn validate(&self) -> Result<(), String> {
        if self.sandbox.pool.max_size == 0 {
            return Err("sandbox.pool.maxSize must be at least 1".into());
        }
        if self.limits.max_turns == 0 {
            return Err("limits.maxTurns must be at least 1".into());
        }
        if self.scheduler.workers == 0 {
            return Err("scheduler.workers must be at least 1".into());
        }
        Ok(())
    }
}

/// `llm.*` fields are carried only as opaque configuration forwarded to a
/// `ChatBackend` implementation this crate does not construct.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub default_provider: Option<String>,
    #[serde(default)]
    pub providers: HashMap<String, LlmProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoryAdapter {
    Memory,
    Redis,
    Postgres,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextStrategy {
    Recent,
    Summarised,
}

impl Default for ContextStrategy {
    fn default() -> Self {
        Self::Recent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBuilderConfig {
    pub max_tokens: u64,
    pub strategy: ContextStrategy,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8_000,
            strategy: ContextStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryConfig {
    #[serde(default)]
    pub adapter: MemoryAdapter,
    #[serde(default)]
    pub context_builder: ContextBuilderConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    Native,
    Container,
    Wasm,
}

impl Default for SandboxKind {
    fn default() -> Self {
        Self::Native
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_millis: Option<u64>,
    pub memory_mb: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self { cpu_millis: None, memory_mb: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxDefaults {
    #[serde(default)]
    pub kind: SandboxKind,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    #[serde(default)]
    pub resources: ResourceLimits,
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for SandboxDefaults {
    fn default() -> Self {
        Self {
            kind: SandboxKind::default(),
            timeout: Duration::from_secs(30),
            resources: ResourceLimits::default(),
            network: false,
            env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxPoolConfig {
    pub max_size: usize,
    #[serde(with = "duration_millis")]
    pub idle_timeout: Duration,
}

impl Default for SandboxPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxConfig {
    #[serde(default)]
    pub defaults: SandboxDefaults,
    #[serde(default)]
    pub pool: SandboxPoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_turns: u32,
    pub max_tokens: u64,
    pub max_cost: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            max_tokens: 200_000,
            max_cost: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub max_queue: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_queue: 1_000,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_fails_validation() {
        let mut config = RuntimeConfig::default();
        config.scheduler.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sandbox_defaults_are_native_no_network() {
        let config = SandboxDefaults::default();
        assert_eq!(config.kind, SandboxKind::Native);
        assert!(!config.network);
    }
}
