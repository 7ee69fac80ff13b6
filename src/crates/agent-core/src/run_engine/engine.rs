//! The Agent Run Engine: the per-run turn loop (component C8, §4.6).
//!
//! Generalises a ReAct-style loop (call model, inspect for tool
//! calls, dispatch, append, repeat) into the explicit state machine of
//! §4.6: bounded by `agent.max_iterations` and `agent.timeout`,
//! racing every backend call against a [`CancellationHandle`], accounting
//! budget/cost through [`BudgetService`]/[`PricingService`], and persisting
//! terminal state through a [`RunStore`] rather than returning a compiled
//! graph the caller has to invoke itself.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use langgraph_core::llm::{ChatConfig, ChatModel, ChatRequest, ChatResponse, FinishReason, ToolDefinition};
use langgraph_core::messages::{Message as LgMessage, MessageContent as LgMessageContent};
use run_orchestrator::{Run, RunPatch, RunRecord, RunStatus, RunStore, Usage};

use crate::config::{ContextBuilderConfig, ContextStrategy};
use crate::error::{CoreError, Result};
use crate::id::{Clock, Deadline, RunId};
use crate::memory::{ContentPart, ContextBudget, Message, MessageContent, MessageRole, MemoryStore, ProjectionStrategy};
use crate::run_engine::cancellation::CancellationHandle;
use crate::run_engine::registry::ToolRegistry;
use crate::run_engine::run::{RunLimits, RunRequest};
use crate::services::PricingService;
use crate::event_bus::{EventBus, RuntimeEvent};

pub struct RunEngine {
    chat_model: Arc<dyn ChatModel>,
    memory: Arc<dyn MemoryStore>,
    registry: Arc<ToolRegistry>,
    run_store: Arc<dyn RunStore>,
    event_bus: Arc<EventBus>,
    pricing: PricingService,
    clock: Arc<dyn Clock>,
    /// `memory.contextBuilder.{maxTokens,strategy}` (§6), kept distinct from
    /// `agent.max_tokens` (the generation/output cap, §3) so a small
    /// generation budget never silently truncates conversation history.
    context_budget: ContextBuilderConfig,
}

impl RunEngine {
    pub fn new(
        chat_model: Arc<dyn ChatModel>,
        memory: Arc<dyn MemoryStore>,
        registry: Arc<ToolRegistry>,
        run_store: Arc<dyn RunStore>,
        event_bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chat_model,
            memory,
            registry,
            run_store,
            event_bus,
            pricing: PricingService::new(),
            clock,
            context_budget: ContextBuilderConfig::default(),
        }
    }

    pub fn with_pricing(mut self, pricing: PricingService) -> Self {
        self.pricing = pricing;
        self
    }

    /// Overrides the context-projection budget from `RuntimeConfig`'s
    /// `memory.contextBuilder` (§6), in place of the `ContextBuilderConfig`
    /// default this engine is constructed with.
    pub fn with_context_budget(mut self, config: ContextBuilderConfig) -> Self {
        self.context_budget = config;
        self
    }

    /// Drives one run to completion (§4.6). Returns the terminal `Run`
    /// record; every terminal state (`completed`/`failed`/`cancelled`/
    /// `timeout`) is also persisted to the `RunStore` before returning, so a
    /// caller that only cares about the side effect can discard the result.
    pub async fn execute(&self, request: RunRequest, limits: RunLimits, cancellation: CancellationHandle) -> Result<Run> {
        self.run_loop(request, limits, cancellation, false).await
    }

    /// Like [`Self::execute`], but calls the bound model's streaming entry
    /// point and publishes `token_delta` events as chunks arrive (§4.6).
    /// The final `run_completed` still carries the full concatenated text.
    pub async fn execute_streaming(
        &self,
        request: RunRequest,
        limits: RunLimits,
        cancellation: CancellationHandle,
    ) -> Result<Run> {
        self.run_loop(request, limits, cancellation, true).await
    }

    async fn run_loop(
        &self,
        request: RunRequest,
        limits: RunLimits,
        cancellation: CancellationHandle,
        streaming: bool,
    ) -> Result<Run> {
        let run_id = RunId::new(self.clock.as_ref());
        let started_at = self.clock.now();
        let deadline = Deadline::after(self.clock.as_ref(), request.agent.timeout);
        let input_text = flatten_parts(&request.input);

        let mut run = Run {
            id: run_id.to_string(),
            agent_id: request.agent.name.clone(),
            thread_id: request.thread_id.to_string(),
            status: RunStatus::Running,
            input: Value::String(input_text.clone()),
            output: None,
            usage: Usage::default(),
            iterations: 0,
            error: None,
            trace: Vec::new(),
            tags: Vec::new(),
            trigger_id: None,
            parent_run_id: None,
            started_at,
            completed_at: None,
        };
        self.persist(&run).await?;
        self.event_bus.publish(RuntimeEvent::RunStarted {
            run_id: run.id.clone(),
            agent_name: request.agent.name.clone(),
        });

        if request.agent.memory_enabled {
            self.memory
                .append_entry(request.thread_id.as_str(), Message::user(input_text.clone()), None, None)
                .await?;
        }

        let (provider, model_name) = request.agent.provider_and_model();
        let provider = provider.to_string();
        let model_name = model_name.to_string();

        let tool_defs = self.tool_definitions(&request.agent.tools).await;

        loop {
            if cancellation.is_cancelled() {
                return self.finish_cancelled(run).await;
            }
            if deadline.is_expired(self.clock.as_ref()) {
                return self.finish_timeout(run).await;
            }
            if run.iterations >= request.agent.max_iterations {
                return self.finish_failed(run, "iteration limit exceeded".to_string()).await;
            }

            self.event_bus.publish(RuntimeEvent::RunStep {
                run_id: run.id.clone(),
                iteration: run.iterations,
            });

            let history = self.conversation_history(&request).await?;
            let chat_request = ChatRequest {
                messages: history,
                config: ChatConfig {
                    temperature: Some(request.agent.temperature),
                    max_tokens: request.agent.max_tokens,
                    top_p: Some(request.agent.top_p),
                    tools: tool_defs.clone(),
                    ..Default::default()
                },
            };

            let response = if streaming {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => return self.finish_cancelled(run).await,
                    result = self.stream_turn(&run.id, chat_request) => result,
                }
            } else {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => return self.finish_cancelled(run).await,
                    result = self.chat_model.chat(chat_request) => result,
                }
            };

            run.iterations += 1;

            let response = match response {
                Ok(response) => response,
                Err(err) => return self.finish_failed(run, err.to_string()).await,
            };

            if let Some(usage) = &response.usage {
                run.usage.input_tokens += usage.input_tokens as u64;
                run.usage.output_tokens += usage.output_tokens as u64;
                let turn_cost = self
                    .pricing
                    .calculate_cost(
                        &provider,
                        &model_name,
                        usage.input_tokens as usize,
                        usage.output_tokens as usize,
                        usage.reasoning_tokens.map(|t| t as usize),
                    )
                    .await;
                run.usage.cost += turn_cost;
            }

            if let Some(max_tokens) = limits.max_tokens {
                if run.usage.input_tokens + run.usage.output_tokens > max_tokens {
                    return self.finish_failed(run, "budget exceeded: token limit reached".to_string()).await;
                }
            }
            if let Some(max_cost) = limits.max_cost {
                if run.usage.cost > max_cost {
                    return self.finish_failed(run, "budget exceeded: cost limit reached".to_string()).await;
                }
            }

            match response.finish_reason {
                FinishReason::Stop => {
                    let output = response.message.text().unwrap_or_default().to_string();
                    if request.agent.memory_enabled {
                        self.memory
                            .append_entry(request.thread_id.as_str(), Message::assistant(output.clone()), None, None)
                            .await?;
                    }
                    return self.finish_completed(run, output).await;
                }
                FinishReason::ToolCalls => {
                    let Some(tool_calls) = response.message.tool_calls.clone() else {
                        let output = response.message.text().unwrap_or_default().to_string();
                        return self.finish_completed(run, output).await;
                    };
                    if request.agent.memory_enabled {
                        let assistant_text = response.message.text().unwrap_or_default().to_string();
                        self.memory
                            .append_entry(
                                request.thread_id.as_str(),
                                Message::assistant(assistant_text),
                                Some(
                                    tool_calls
                                        .iter()
                                        .map(|tc| crate::memory::ToolCallRef {
                                            id: tc.id.clone(),
                                            name: tc.name.clone(),
                                            arguments: tc.args.clone(),
                                        })
                                        .collect(),
                                ),
                                None,
                            )
                            .await?;
                    }

                    for call in &tool_calls {
                        self.event_bus.publish(RuntimeEvent::ToolCall {
                            run_id: run.id.clone(),
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            args: call.args.clone(),
                        });
                        let outcome = self.registry.invoke(&run.id, &request.agent.name, call, &cancellation).await;
                        self.event_bus.publish(RuntimeEvent::ToolResult {
                            run_id: run.id.clone(),
                            call_id: outcome.call_id.clone(),
                            result: outcome.result.clone(),
                            error: outcome.error.clone(),
                        });
                        if request.agent.memory_enabled {
                            let result_text = outcome
                                .result
                                .as_ref()
                                .map(|v| v.to_string())
                                .or_else(|| outcome.error.clone())
                                .unwrap_or_default();
                            self.memory
                                .append_entry(
                                    request.thread_id.as_str(),
                                    Message::tool_result(outcome.call_id.clone(), result_text),
                                    None,
                                    Some(vec![crate::memory::ToolResultRef {
                                        call_id: outcome.call_id,
                                        name: outcome.name,
                                        result: outcome.result,
                                        error: outcome.error,
                                    }]),
                                )
                                .await?;
                        }
                    }
                }
                FinishReason::Length => {
                    return self.finish_failed(run, "output truncated".to_string()).await;
                }
                FinishReason::ContentFilter => {
                    return self.finish_failed(run, "response blocked by content filter".to_string()).await;
                }
                FinishReason::Other(reason) => {
                    return self.finish_failed(run, reason).await;
                }
            }
        }
    }

    /// Drains a streaming turn, publishing `token_delta` for each chunk, and
    /// assembles the result into the same `ChatResponse` shape a non-streaming
    /// call would return so the turn loop above needs no streaming-specific
    /// branch beyond the call itself.
    ///
    /// `MessageChunk` carries no explicit `finish_reason`/`tool_calls` field
    /// (only a generic `metadata` bag, unlike `ChatResponse`) — by convention
    /// the final chunk's `metadata.finish_reason` / `metadata.tool_calls`
    /// carry them when the bound model supports tool calls while streaming;
    /// their absence defaults to `FinishReason::Stop` with no tool calls.
    async fn stream_turn(&self, run_id: &str, request: ChatRequest) -> langgraph_core::error::Result<ChatResponse> {
        use futures::StreamExt;

        let mut stream_response = self.chat_model.stream(request).await?;
        let mut content = String::new();
        let mut finish_reason = FinishReason::Stop;
        let mut tool_calls: Option<Vec<langgraph_core::tool::ToolCall>> = None;

        while let Some(chunk) = stream_response.stream.next().await {
            if !chunk.content.is_empty() {
                self.event_bus.publish(RuntimeEvent::TokenDelta {
                    run_id: run_id.to_string(),
                    content: chunk.content.clone(),
                });
            }
            content.push_str(&chunk.content);
            if chunk.is_final {
                if let Some(metadata) = &chunk.metadata {
                    if let Some(reason) = metadata.get("finish_reason").and_then(|v| v.as_str()) {
                        finish_reason = parse_finish_reason(reason);
                    }
                    if let Some(calls) = metadata.get("tool_calls").and_then(|v| v.as_array()) {
                        tool_calls = Some(
                            calls
                                .iter()
                                .filter_map(|c| serde_json::from_value(c.clone()).ok())
                                .collect(),
                        );
                        if tool_calls.as_ref().is_some_and(|c| !c.is_empty()) {
                            finish_reason = FinishReason::ToolCalls;
                        }
                    }
                }
            }
        }

        let mut message = LgMessage::ai(content);
        message.tool_calls = tool_calls;
        Ok(ChatResponse {
            message,
            finish_reason,
            usage: stream_response.usage,
            reasoning: None,
            metadata: Default::default(),
        })
    }

    async fn tool_definitions(&self, names: &[String]) -> Vec<ToolDefinition> {
        let mut defs = Vec::with_capacity(names.len());
        for name in names {
            if let Some(tool) = self.registry.lookup(name).await {
                defs.push(ToolDefinition::new(tool.name, tool.description).with_parameters(tool.parameters));
            }
        }
        defs
    }

    async fn conversation_history(&self, request: &RunRequest) -> Result<Vec<LgMessage>> {
        let mut messages = vec![LgMessage::system(request.agent.instructions.clone())];
        if request.agent.memory_enabled {
            let budget = ContextBudget {
                max_tokens: self.context_budget.max_tokens,
                strategy: to_projection_strategy(self.context_budget.strategy),
            };
            let projected = self.memory.project_context(request.thread_id.as_str(), budget).await?;
            messages.extend(projected.into_iter().map(to_langgraph_message));
        } else {
            messages.push(LgMessage::human(flatten_parts(&request.input)));
        }
        Ok(messages)
    }

    async fn persist(&self, run: &Run) -> Result<()> {
        self.run_store
            .save(RunRecord::Agent(run.clone()))
            .await
            .map_err(|e| CoreError::Other(anyhow::anyhow!(e)))
    }

    async fn update_terminal(&self, run: &mut Run, status: RunStatus, output: Option<Value>, error: Option<String>) -> Result<()> {
        run.status = status;
        run.output = output.clone();
        run.error = error.clone();
        run.completed_at = Some(Utc::now());
        self.run_store
            .update(
                &run.id,
                RunPatch {
                    status: Some(status_str(status).to_string()),
                    output,
                    error,
                    completed_at: run.completed_at,
                    usage: Some(run.usage),
                    iterations: Some(run.iterations),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| CoreError::Other(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn finish_completed(&self, mut run: Run, output: String) -> Result<Run> {
        self.update_terminal(&mut run, RunStatus::Completed, Some(Value::String(output.clone())), None).await?;
        self.event_bus.publish(RuntimeEvent::RunCompleted {
            run_id: run.id.clone(),
            output,
            input_tokens: run.usage.input_tokens,
            output_tokens: run.usage.output_tokens,
            cost: run.usage.cost,
        });
        Ok(run)
    }

    async fn finish_failed(&self, mut run: Run, error: String) -> Result<Run> {
        self.update_terminal(&mut run, RunStatus::Failed, None, Some(error.clone())).await?;
        self.event_bus.publish(RuntimeEvent::RunFailed { run_id: run.id.clone(), error });
        Ok(run)
    }

    async fn finish_cancelled(&self, mut run: Run) -> Result<Run> {
        self.update_terminal(&mut run, RunStatus::Cancelled, None, None).await?;
        self.event_bus.publish(RuntimeEvent::RunCancelled { run_id: run.id.clone() });
        Ok(run)
    }

    async fn finish_timeout(&self, mut run: Run) -> Result<Run> {
        self.update_terminal(&mut run, RunStatus::Timeout, None, Some("run exceeded its deadline".to_string())).await?;
        self.event_bus.publish(RuntimeEvent::RunFailed {
            run_id: run.id.clone(),
            error: "run exceeded its deadline".to_string(),
        });
        Ok(run)
    }
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "pending",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
        RunStatus::Timeout => "timeout",
    }
}

fn to_projection_strategy(strategy: ContextStrategy) -> ProjectionStrategy {
    match strategy {
        ContextStrategy::Recent => ProjectionStrategy::Recent,
        ContextStrategy::Summarised => ProjectionStrategy::Summarised,
    }
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "tool_calls" | "tool-calls" => FinishReason::ToolCalls,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

fn flatten_parts(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .map(|p| match p {
            ContentPart::Text { text } => text.clone(),
            ContentPart::ImageUrl { url } => format!("[image: {url}]"),
            ContentPart::ImageData { mime, .. } => format!("[image/{mime}]"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Converts a persisted memory-store message into the wire shape the bound
/// `ChatModel` expects. Tool-call/result bookkeeping stays in `MemoryEntry`
/// (not reconstructed here) since `ChatRequest` only needs the role/content
/// half of history to produce the next turn.
fn to_langgraph_message(message: Message) -> LgMessage {
    let content = match message.content {
        MessageContent::Text(text) => LgMessageContent::Text(text),
        MessageContent::Parts(parts) => LgMessageContent::Text(flatten_parts(&parts)),
    };
    match message.role {
        MessageRole::System => LgMessage::system(content),
        MessageRole::User => LgMessage::human(content),
        MessageRole::Assistant => LgMessage::ai(content),
        MessageRole::Tool => LgMessage::tool(content, message.tool_call_id.unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalConfig, ApprovalGate};
    use crate::id::{SystemClock, ThreadId};
    use crate::memory::InMemoryMemoryStore;
    use crate::run_engine::agent::Agent;
    use crate::run_engine::registry::ToolSpec;
    use async_trait::async_trait;
    use langgraph_core::llm::{ChatResponse, ChatStreamResponse, UsageMetadata};
    use run_orchestrator::InMemoryRunStore;

    struct ScriptedModel {
        responses: std::sync::Mutex<Vec<ChatResponse>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self { responses: std::sync::Mutex::new(responses.into_iter().rev().collect()) }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, _request: ChatRequest) -> langgraph_core::error::Result<ChatResponse> {
            Ok(self.responses.lock().unwrap().pop().expect("no more scripted responses"))
        }

        async fn stream(&self, _request: ChatRequest) -> langgraph_core::error::Result<ChatStreamResponse> {
            unimplemented!("not exercised by these tests")
        }

        fn clone_box(&self) -> Box<dyn ChatModel> {
            unimplemented!("not exercised by these tests")
        }
    }

    fn stop_response(text: &str) -> ChatResponse {
        ChatResponse {
            message: LgMessage::ai(text),
            finish_reason: FinishReason::Stop,
            usage: Some(UsageMetadata { input_tokens: 10, output_tokens: 5, reasoning_tokens: None, total_tokens: 15 }),
            reasoning: None,
            metadata: Default::default(),
        }
    }

    fn engine(model: Arc<dyn ChatModel>) -> (RunEngine, Arc<InMemoryRunStore>, Arc<InMemoryMemoryStore>) {
        let bus = Arc::new(EventBus::new());
        let gate = Arc::new(ApprovalGate::new(ApprovalConfig { timeout: std::time::Duration::from_millis(50), default_decision: None }));
        let registry = ToolRegistry::new(bus.clone(), gate);
        let (engine, run_store, memory, _bus) = engine_with_registry(model, registry, bus);
        (engine, run_store, memory)
    }

    fn engine_with_registry(
        model: Arc<dyn ChatModel>,
        registry: ToolRegistry,
        bus: Arc<EventBus>,
    ) -> (RunEngine, Arc<InMemoryRunStore>, Arc<InMemoryMemoryStore>, Arc<EventBus>) {
        let clock = Arc::new(SystemClock);
        let memory = Arc::new(InMemoryMemoryStore::new(clock.clone()));
        let run_store = Arc::new(InMemoryRunStore::new());
        let engine = RunEngine::new(model, memory.clone(), Arc::new(registry), run_store.clone(), bus.clone(), clock);
        (engine, run_store, memory, bus)
    }

    #[tokio::test]
    async fn single_turn_completes_and_persists() {
        let model = Arc::new(ScriptedModel::new(vec![stop_response("hello there")]));
        let (engine, run_store, memory) = engine(model);
        let thread = memory.create_thread("helper", None).await;
        let agent = Agent::new("helper", "anthropic:claude-3-5-sonnet", "Be helpful.");
        let request = RunRequest::text(agent, ThreadId::from(thread.id), "hi");
        let run = engine.execute(request, RunLimits::unbounded(), CancellationHandle::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.output, Some(Value::String("hello there".to_string())));
        assert!(run_store.get(&run.id).await.is_ok());
    }

    #[tokio::test]
    async fn iteration_limit_fails_the_run() {
        let mut responses = Vec::new();
        for _ in 0..5 {
            responses.push(ChatResponse {
                message: LgMessage::ai("still thinking"),
                finish_reason: FinishReason::ToolCalls,
                usage: None,
                reasoning: None,
                metadata: Default::default(),
            });
        }
        let model = Arc::new(ScriptedModel::new(responses));
        let (engine, _run_store, memory) = engine(model);
        let thread = memory.create_thread("helper", None).await;
        let agent = Agent::new("helper", "anthropic:claude-3-5-sonnet", "Be helpful.").with_max_iterations(2);
        let request = RunRequest::text(agent, ThreadId::from(thread.id), "loop forever");
        let run = engine.execute(request, RunLimits::unbounded(), CancellationHandle::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("iteration limit exceeded"));
    }

    #[tokio::test]
    async fn cancellation_before_first_call_short_circuits() {
        let model = Arc::new(ScriptedModel::new(vec![stop_response("unreachable")]));
        let (engine, _run_store, memory) = engine(model);
        let thread = memory.create_thread("helper", None).await;
        let agent = Agent::new("helper", "anthropic:claude-3-5-sonnet", "Be helpful.");
        let request = RunRequest::text(agent, ThreadId::from(thread.id), "hi");
        let cancellation = CancellationHandle::new();
        cancellation.cancel();
        let run = engine.execute(request, RunLimits::unbounded(), cancellation).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    /// S2: two-turn tool use. Turn 1 returns a single `echo` tool call,
    /// turn 2 stops with the tool's result woven into the reply. Checks the
    /// `tool_call`/`tool_result` pairing (callId carried through) and the
    /// four-entry memory shape `[user, assistant-with-tool-calls, tool,
    /// assistant]` (§8 scenario S2).
    #[tokio::test]
    async fn two_turn_tool_use_pairs_call_and_result() {
        let tool_turn = ChatResponse {
            message: LgMessage::ai("").with_tool_calls(vec![langgraph_core::tool::ToolCall {
                id: "c1".to_string(),
                name: "echo".to_string(),
                args: serde_json::json!({"text": "hello"}),
            }]),
            finish_reason: FinishReason::ToolCalls,
            usage: Some(UsageMetadata { input_tokens: 8, output_tokens: 2, reasoning_tokens: None, total_tokens: 10 }),
            reasoning: None,
            metadata: Default::default(),
        };
        let model = Arc::new(ScriptedModel::new(vec![tool_turn, stop_response("Done: hello")]));

        let bus = Arc::new(EventBus::new());
        let gate = Arc::new(ApprovalGate::new(ApprovalConfig { timeout: std::time::Duration::from_millis(50), default_decision: None }));
        let registry = ToolRegistry::new(bus.clone(), gate);
        registry
            .register(ToolSpec::new(
                "echo",
                "Echoes the given text back",
                serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
                Arc::new(|args, _ctx| Box::pin(async move { Ok(args.get("text").cloned().unwrap_or(Value::Null)) })),
            ))
            .await
            .unwrap();

        let subscriber = bus.subscribe();
        let (engine, _run_store, memory, _bus) = engine_with_registry(model, registry, bus);
        let thread = memory.create_thread("helper", None).await;
        let thread_id = ThreadId::from(thread.id.clone());

        let agent = Agent::new("helper", "anthropic:claude-3-5-sonnet", "Be helpful.");
        let request = RunRequest::text(agent, thread_id, "echo hello");
        let run = engine.execute(request, RunLimits::unbounded(), CancellationHandle::new()).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.iterations, 2);
        assert_eq!(run.output, Some(Value::String("Done: hello".to_string())));

        let mut saw_call = false;
        let mut saw_result = false;
        while let Some(event) = subscriber.try_recv() {
            match event {
                RuntimeEvent::ToolCall { call_id, name, .. } => {
                    assert_eq!(call_id, "c1");
                    assert_eq!(name, "echo");
                    saw_call = true;
                }
                RuntimeEvent::ToolResult { call_id, result, error, .. } => {
                    assert_eq!(call_id, "c1");
                    assert_eq!(error, None);
                    assert_eq!(result, Some(Value::String("hello".to_string())));
                    saw_result = true;
                }
                _ => {}
            }
        }
        assert!(saw_call && saw_result);

        let entries = memory.get_entries(&thread.id, Default::default()).await.unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].message.role, MessageRole::User);
        assert_eq!(entries[1].message.role, MessageRole::Assistant);
        assert!(entries[1].tool_calls.as_ref().is_some_and(|c| c.len() == 1));
        assert_eq!(entries[2].message.role, MessageRole::Tool);
        assert_eq!(entries[3].message.role, MessageRole::Assistant);
    }
}
