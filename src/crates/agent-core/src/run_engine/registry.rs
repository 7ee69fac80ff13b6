//! Tool schema validation, dispatch, and approval gating (component C5, §4.3).
//!
//! Generalises `langgraph_core::tool::ToolRegistry` (name → executor map,
//! `execute_tool_call`) with the three things §4.3 needs that the generic
//! graph-node tool system doesn't carry: per-tool `category`/`tags`
//! metadata, an optional `SandboxConfig` routing execution through C6
//! instead of in-process, and a `requires_approval` gate in front of either
//! path. `register` additionally rejects duplicate names (`DuplicateName`)
//! rather than silently overwriting an existing entry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use langgraph_core::tool::ToolCall;
use run_orchestrator::{ExecRequest, SandboxConfig, SandboxManager};

use crate::approval::SharedApprovalGate;
use crate::event_bus::{EventBus, RuntimeEvent};
use crate::run_engine::cancellation::CancellationHandle;

/// Context handed to an in-process tool executor and carried through the
/// sandboxed path for cancellation propagation (§5).
#[derive(Clone)]
pub struct ToolInvocationContext {
    pub agent_id: String,
    pub run_id: String,
    pub cancellation: CancellationHandle,
}

pub type ToolExecuteFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;
pub type ToolExecuteFn = Arc<dyn Fn(Value, ToolInvocationContext) -> ToolExecuteFuture + Send + Sync>;

/// A tool definition (§3). `execute` is ignored when `sandbox` is set — a
/// sandboxed tool is dispatched through C6 using `sandbox_command` (or
/// `[name]` by default) as the argv, never the in-process closure.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub sandbox: Option<SandboxConfig>,
    pub sandbox_command: Option<Vec<String>>,
    pub requires_approval: bool,
    pub execute: ToolExecuteFn,
}

impl ToolSpec {
    /// An in-process tool with no approval gate and no sandbox — the common
    /// case for cheap, trusted tools (lookups, calculators, formatters).
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        execute: ToolExecuteFn,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            category: None,
            tags: Vec::new(),
            sandbox: None,
            sandbox_command: None,
            requires_approval: false,
            execute,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_sandbox_command(mut self, command: Vec<String>) -> Self {
        self.sandbox_command = Some(command);
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Basic structural validation, canonicalising `args` to the object the
    /// tool receives. Full JSON Schema validation is out of scope here
    /// (as in `langgraph_core::tool::Tool::validate_args` without its
    /// `json-validation` feature) — §9 only requires a validation function
    /// returning a canonicalised argument mapping, not a specific validator.
    pub fn validate_args(&self, args: &Value) -> Result<Value, String> {
        if !args.is_object() {
            return Err(format!("arguments for tool '{}' must be an object", self.name));
        }
        if let Some(required) = self.parameters.get("required").and_then(|r| r.as_array()) {
            for field in required {
                let Some(field_name) = field.as_str() else { continue };
                if args.get(field_name).is_none() {
                    return Err(format!(
                        "tool '{}' missing required argument '{field_name}'",
                        self.name
                    ));
                }
            }
        }
        Ok(args.clone())
    }
}

/// Outcome of a single tool dispatch, directly convertible into the
/// `ToolResult{callId, name, result, error?}` shape of §3.
#[derive(Debug, Clone)]
pub struct ToolInvocationOutcome {
    pub call_id: String,
    pub name: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate tool name: {0}")]
    DuplicateName(String),
}

/// Collection of available tools plus the capabilities dispatch needs:
/// an event bus to publish `approval_required`/`tool_call`/`tool_result`
/// on, an approval gate for the human-in-the-loop wait, and (optionally) a
/// sandbox manager for `SandboxConfig`-bearing tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolSpec>>,
    event_bus: Arc<EventBus>,
    approval_gate: SharedApprovalGate,
    sandbox: Option<Arc<SandboxManager>>,
}

impl ToolRegistry {
    pub fn new(event_bus: Arc<EventBus>, approval_gate: SharedApprovalGate) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            event_bus,
            approval_gate,
            sandbox: None,
        }
    }

    pub fn with_sandbox_manager(mut self, manager: Arc<SandboxManager>) -> Self {
        self.sandbox = Some(manager);
        self
    }

    /// Rejects a second registration under the same name (§4.3).
    pub async fn register(&self, tool: ToolSpec) -> Result<(), RegistryError> {
        let mut tools = self.tools.write().await;
        if tools.contains_key(&tool.name) {
            return Err(RegistryError::DuplicateName(tool.name));
        }
        tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    pub async fn lookup(&self, name: &str) -> Option<ToolSpec> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// The full dispatch entry point (§4.3 points 1-3).
    ///
    /// 1. Looks up the tool; unknown names become a `ToolResult.error`
    ///    rather than propagating, reporting "not found" back to the caller.
    /// 2. If `requires_approval`, publishes `approval_required` and waits on
    ///    the shared gate; denial or expiry yields `error = "approval
    ///    denied"`, never a silent skip.
    /// 3. Routes through the sandbox manager when `sandbox` is set,
    ///    otherwise calls `execute` in-process.
    pub async fn invoke(&self, run_id: &str, agent_id: &str, call: &ToolCall, cancellation: &CancellationHandle) -> ToolInvocationOutcome {
        let Some(tool) = self.lookup(&call.name).await else {
            return ToolInvocationOutcome {
                call_id: call.id.clone(),
                name: call.name.clone(),
                result: None,
                error: Some(format!(
                    "Tool '{}' not found. Available tools: {}",
                    call.name,
                    self.tool_names().await.join(", ")
                )),
            };
        };

        let args = match tool.validate_args(&call.args) {
            Ok(args) => args,
            Err(error) => {
                return ToolInvocationOutcome {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    result: None,
                    error: Some(error),
                };
            }
        };

        if tool.requires_approval {
            self.event_bus.publish(RuntimeEvent::ApprovalRequired {
                run_id: run_id.to_string(),
                call_id: call.id.clone(),
                tool: tool.name.clone(),
                args: args.clone(),
            });
            let approved = self.approval_gate.request(call.id.clone()).await;
            if !approved {
                return ToolInvocationOutcome {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    result: None,
                    error: Some("approval denied".to_string()),
                };
            }
        }

        let ctx = ToolInvocationContext {
            agent_id: agent_id.to_string(),
            run_id: run_id.to_string(),
            cancellation: cancellation.clone(),
        };

        match &tool.sandbox {
            Some(sandbox_cfg) => self.invoke_sandboxed(&tool, sandbox_cfg, &args, call).await,
            None => match (tool.execute)(args, ctx).await {
                Ok(result) => ToolInvocationOutcome {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    result: Some(result),
                    error: None,
                },
                Err(error) => ToolInvocationOutcome {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    result: None,
                    error: Some(error),
                },
            },
        }
    }

    async fn invoke_sandboxed(
        &self,
        tool: &ToolSpec,
        sandbox_cfg: &SandboxConfig,
        args: &Value,
        call: &ToolCall,
    ) -> ToolInvocationOutcome {
        let Some(manager) = &self.sandbox else {
            return ToolInvocationOutcome {
                call_id: call.id.clone(),
                name: call.name.clone(),
                result: None,
                error: Some(format!("tool '{}' requires a sandbox but none is configured", tool.name)),
            };
        };

        let command = tool.sandbox_command.clone().unwrap_or_else(|| vec![tool.name.clone()]);
        let req = ExecRequest {
            command,
            stdin: None,
            args: args.clone(),
        };

        match manager.execute(&req, sandbox_cfg).await {
            Ok(exec_result) => {
                let stdout = String::from_utf8_lossy(&exec_result.stdout).to_string();
                if exec_result.exit_code == 0 && !exec_result.timed_out {
                    ToolInvocationOutcome {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        result: Some(Value::String(stdout)),
                        error: None,
                    }
                } else {
                    let stderr = String::from_utf8_lossy(&exec_result.stderr).to_string();
                    let error = if exec_result.timed_out {
                        format!("tool '{}' timed out", tool.name)
                    } else {
                        format!("tool '{}' exited {}: {stderr}", tool.name, exec_result.exit_code)
                    };
                    ToolInvocationOutcome {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        result: None,
                        error: Some(error),
                    }
                }
            }
            Err(err) => ToolInvocationOutcome {
                call_id: call.id.clone(),
                name: call.name.clone(),
                result: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalConfig, ApprovalGate};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::new(
            Arc::new(EventBus::new()),
            Arc::new(ApprovalGate::new(ApprovalConfig {
                timeout: std::time::Duration::from_millis(50),
                default_decision: None,
            })),
        )
    }

    fn echo_tool() -> ToolSpec {
        ToolSpec::new(
            "echo",
            "Echoes the `text` argument back",
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
            Arc::new(|args, _ctx| Box::pin(async move { Ok(args.get("text").cloned().unwrap_or(Value::Null)) })),
        )
    }

    #[tokio::test]
    async fn register_rejects_duplicate_names() {
        let registry = registry();
        registry.register(echo_tool()).await.unwrap();
        let err = registry.register(echo_tool()).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "echo"));
    }

    #[tokio::test]
    async fn invoke_unknown_tool_reports_error_not_panic() {
        let registry = registry();
        let call = ToolCall { id: "c1".into(), name: "missing".into(), args: json!({}) };
        let outcome = registry.invoke("run-1", "agent-1", &call, &CancellationHandle::new()).await;
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn invoke_dispatches_in_process_tool() {
        let registry = registry();
        registry.register(echo_tool()).await.unwrap();
        let call = ToolCall { id: "c1".into(), name: "echo".into(), args: json!({"text": "hello"}) };
        let outcome = registry.invoke("run-1", "agent-1", &call, &CancellationHandle::new()).await;
        assert_eq!(outcome.result, Some(json!("hello")));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn invoke_missing_required_argument_fails_validation() {
        let registry = registry();
        registry.register(echo_tool()).await.unwrap();
        let call = ToolCall { id: "c1".into(), name: "echo".into(), args: json!({}) };
        let outcome = registry.invoke("run-1", "agent-1", &call, &CancellationHandle::new()).await;
        assert!(outcome.error.unwrap().contains("missing required argument"));
    }

    #[tokio::test]
    async fn approval_required_tool_denies_on_timeout_with_no_default() {
        let registry = registry();
        registry.register(echo_tool().requiring_approval()).await.unwrap();
        let call = ToolCall { id: "c1".into(), name: "echo".into(), args: json!({"text": "hi"}) };
        let outcome = registry.invoke("run-1", "agent-1", &call, &CancellationHandle::new()).await;
        assert_eq!(outcome.error.as_deref(), Some("approval denied"));
    }
}
