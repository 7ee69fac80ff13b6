//! Response types returned by a [`ChatModel`](crate::llm::ChatModel) implementation.

use crate::llm_stream::MessageChunkStream;
use crate::messages::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why the model stopped generating (OpenAI/Anthropic-style finish reason,
/// normalised to a closed set so callers can match on it without per-provider
/// string comparisons).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model produced a complete response and stopped naturally.
    Stop,
    /// The model requested one or more tool calls; `message.tool_calls` is set.
    /// Some providers emit the hyphenated `"tool-calls"` spelling instead of
    /// `"tool_calls"`; both normalise to this single variant at the boundary
    /// so the run engine never has to special-case provider spelling.
    #[serde(alias = "tool-calls")]
    ToolCalls,
    /// Generation was cut off by `max_tokens` before completion.
    Length,
    /// The provider's content filter suppressed the response.
    ContentFilter,
    /// Provider-specific reason that doesn't map to the above.
    Other(String),
}

impl FinishReason {
    pub fn is_tool_calls(&self) -> bool {
        matches!(self, FinishReason::ToolCalls)
    }
}

/// Extended reasoning/thinking content for models that support it (OpenAI
/// o1, DeepSeek R1), populated when `ReasoningMode::Separated` or `Extended`
/// is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningContent {
    pub content: String,
    pub token_count: Option<u64>,
}

/// Token usage for a single `chat`/`stream` call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: Option<u64>,
    pub total_tokens: u64,
}

/// A complete response from `ChatModel::chat()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant message, including tool calls when present.
    pub message: Message,

    /// Why generation stopped.
    pub finish_reason: FinishReason,

    /// Token accounting for this call, when the provider reports it.
    pub usage: Option<UsageMetadata>,

    /// Separated reasoning content, when requested and supported.
    pub reasoning: Option<ReasoningContent>,

    /// Provider-specific extras that don't fit the common shape.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A streaming response from `ChatModel::stream()`.
///
/// `stream` yields content chunks as they arrive; `usage` is only known once
/// the stream completes and is filled in by the implementation's final
/// chunk metadata, so callers should treat it as a snapshot taken after
/// fully draining `stream`.
pub struct ChatStreamResponse {
    pub stream: MessageChunkStream,
    pub usage: Option<UsageMetadata>,
}
