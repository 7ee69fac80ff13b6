//! The `Agent` value object (§3, §4.6).
//!
//! Agents are immutable configuration: every `with_*` method consumes `self`
//! and returns a new value rather than mutating in place, matching the
//! clone-with-overrides builder style `ChatRequest` uses in `langgraph-core`.

use std::time::Duration;

use serde_json::Value;

/// Default iteration cap applied when an agent does not override it (§4.6).
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default per-run wall-clock budget (§5).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for a single agent (§3).
///
/// `model` is pricing/bookkeeping metadata, not a parameter forwarded to the
/// bound `ChatModel`: a `ChatModel` implementation is already bound to one
/// provider and model, and `ChatConfig` carries no model field of its own.
/// By convention `model` is `"<provider>:<model>"` (e.g.
/// `"anthropic:claude-3-5-sonnet"`) so the run engine can split it for
/// `PricingService::get_pricing`; an unrecognised or colon-free string still
/// works, it just prices as free (§6's "unknown model is free" behaviour).
#[derive(Debug, Clone)]
pub struct Agent {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<usize>,
    pub max_iterations: u32,
    pub timeout: Duration,
    pub memory_enabled: bool,
    pub response_format: Option<Value>,
}

impl Agent {
    pub fn new(name: impl Into<String>, model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            instructions: instructions.into(),
            tools: Vec::new(),
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout: DEFAULT_TIMEOUT,
            memory_enabled: true,
            response_format: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_memory_enabled(mut self, enabled: bool) -> Self {
        self.memory_enabled = enabled;
        self
    }

    pub fn with_response_format(mut self, schema: Value) -> Self {
        self.response_format = Some(schema);
        self
    }

    /// Splits `model` into `(provider, model)` on the first `:`. Falls back
    /// to using the whole string as both halves when there is no `:`, which
    /// simply misses the pricing table and prices the run as free rather
    /// than failing (`PricingService::get_pricing` never errors).
    pub fn provider_and_model(&self) -> (&str, &str) {
        match self.model.split_once(':') {
            Some((provider, model)) => (provider, model),
            None => (self.model.as_str(), self.model.as_str()),
        }
    }
}
