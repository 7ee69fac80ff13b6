//! Run input and per-run limits (§3, §4.6).

use crate::config::LimitsConfig;
use crate::memory::ContentPart;
use crate::run_engine::agent::Agent;
use crate::id::ThreadId;

/// One turn's worth of new input appended to `thread_id` before the engine
/// calls the bound `ChatModel`. `agent` is consumed by value since a single
/// `Agent` is typically constructed fresh per call (builder style), not
/// shared across runs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub agent: Agent,
    pub thread_id: ThreadId,
    pub input: Vec<ContentPart>,
}

impl RunRequest {
    pub fn text(agent: Agent, thread_id: ThreadId, text: impl Into<String>) -> Self {
        Self {
            agent,
            thread_id,
            input: vec![ContentPart::Text { text: text.into() }],
        }
    }
}

/// Per-run ceilings enforced in addition to `Agent::max_iterations` and
/// `Agent::timeout` (§4.6, §5). `None` means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLimits {
    pub max_tokens: Option<u64>,
    pub max_cost: Option<f64>,
}

impl RunLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }
}

impl From<&LimitsConfig> for RunLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_tokens: Some(config.max_tokens),
            max_cost: Some(config.max_cost),
        }
    }
}
