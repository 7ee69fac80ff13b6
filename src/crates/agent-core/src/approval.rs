//! Tool permission enforcement and human-in-the-loop approval gating
//! (component C5's approval flow, §4.3).
//!
//! Generalises `ToolPermissionEnforcer`'s decision/check logic away from its
//! sqlx-backed permission repository onto an in-process policy map, keeping
//! the `ExecutionDecision` shape and the path/whitelist/blacklist checks
//! verbatim. [`ApprovalGate`] adds the actual wait-for-human-decision half
//! that the original enforcer delegated to a caller.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionLevel {
    Allowed,
    Denied,
    RequiresApproval,
    /// No explicit rule and no default covers this case: treated as deny.
    Restricted,
}

#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    pub level: Option<PermissionLevel>,
    pub path_restrictions: Option<Vec<String>>,
    pub arg_whitelist: Option<Vec<String>>,
    pub arg_blacklist: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionDecision {
    Allow,
    Deny(String),
    RequiresApproval(String),
}

/// Registry of per-tool policies plus the default applied when a tool has
/// none, backed by a plain in-memory map (concrete permission backends are
/// out of scope).
pub struct ToolPermissionEnforcer {
    policies: RwLock<HashMap<String, ToolPolicy>>,
    default_behavior: PermissionLevel,
}

impl ToolPermissionEnforcer {
    pub fn new(default_behavior: PermissionLevel) -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            default_behavior,
        }
    }

    pub async fn set_policy(&self, tool_name: impl Into<String>, policy: ToolPolicy) {
        self.policies.write().await.insert(tool_name.into(), policy);
    }

    pub async fn check_permission(&self, tool_name: &str, args: &Value) -> ExecutionDecision {
        debug!(tool = tool_name, "checking tool permission");
        let policies = self.policies.read().await;
        let Some(policy) = policies.get(tool_name) else {
            return self.apply_default_behavior(tool_name);
        };
        self.evaluate_policy(policy, tool_name, args)
    }

    fn evaluate_policy(&self, policy: &ToolPolicy, tool_name: &str, args: &Value) -> ExecutionDecision {
        match policy.level {
            Some(PermissionLevel::Denied) => {
                return ExecutionDecision::Deny(format!("tool '{tool_name}' is explicitly denied"));
            }
            Some(PermissionLevel::RequiresApproval) => {
                return ExecutionDecision::RequiresApproval(format!(
                    "tool '{tool_name}' requires approval before execution"
                ));
            }
            _ => {}
        }

        if let Some(restrictions) = &policy.path_restrictions {
            if !Self::check_path_restrictions(args, restrictions) {
                return ExecutionDecision::Deny(format!("tool '{tool_name}' violates path restrictions"));
            }
        }
        if let Some(whitelist) = &policy.arg_whitelist {
            if !Self::check_arg_whitelist(args, whitelist) {
                return ExecutionDecision::Deny(format!("tool '{tool_name}' arguments not in whitelist"));
            }
        }
        if let Some(blacklist) = &policy.arg_blacklist {
            if !Self::check_arg_blacklist(args, blacklist) {
                return ExecutionDecision::Deny(format!("tool '{tool_name}' arguments match blacklist"));
            }
        }

        ExecutionDecision::Allow
    }

    fn apply_default_behavior(&self, tool_name: &str) -> ExecutionDecision {
        match self.default_behavior {
            PermissionLevel::Allowed => ExecutionDecision::Allow,
            PermissionLevel::Denied => ExecutionDecision::Deny(format!("tool '{tool_name}' denied by default policy")),
            PermissionLevel::RequiresApproval => {
                ExecutionDecision::RequiresApproval(format!("tool '{tool_name}' requires approval (default policy)"))
            }
            PermissionLevel::Restricted => {
                ExecutionDecision::Deny(format!("tool '{tool_name}' is restricted without an explicit policy"))
            }
        }
    }

    fn check_path_restrictions(args: &Value, patterns: &[String]) -> bool {
        let path_value = args
            .get("path")
            .or_else(|| args.get("file"))
            .or_else(|| args.get("directory"))
            .or_else(|| args.get("source"))
            .or_else(|| args.get("target"));

        let Some(path) = path_value.and_then(|v| v.as_str()) else {
            return true;
        };
        patterns.iter().any(|pattern| path.starts_with(pattern.trim_end_matches("/*")))
    }

    fn check_arg_whitelist(args: &Value, patterns: &[String]) -> bool {
        if patterns.is_empty() {
            return true;
        }
        let args_str = args.to_string();
        patterns.iter().any(|pattern| args_str.contains(pattern))
    }

    fn check_arg_blacklist(args: &Value, patterns: &[String]) -> bool {
        let args_str = args.to_string();
        !patterns.iter().any(|pattern| args_str.contains(pattern))
    }
}

/// Controls the human-approval wait (§4.3, §9 Open Question 2).
///
/// `default_decision: None` means "deny on expiry"; `Some(true/false)`
/// auto-resolves to that outcome instead of denying.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalConfig {
    pub timeout: Duration,
    pub default_decision: Option<bool>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            default_decision: None,
        }
    }
}

/// Tracks in-flight human approval requests by id and lets
/// [`ApprovalGate::resolve`] be called from wherever the decision arrives
/// (dashboard, CLI, test harness) without the gate knowing which.
#[derive(Default)]
pub struct ApprovalGate {
    config: ApprovalConfig,
    pending: RwLock<HashMap<String, oneshot::Sender<bool>>>,
}

impl ApprovalGate {
    pub fn new(config: ApprovalConfig) -> Self {
        Self {
            config,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a pending approval and waits up to `config.timeout` for a
    /// matching [`resolve`] call. On timeout, falls back to
    /// `config.default_decision`, denying if none is configured.
    pub async fn request(&self, approval_id: impl Into<String>) -> bool {
        let approval_id = approval_id.into();
        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(approval_id.clone(), tx);

        match tokio::time::timeout(self.config.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => {
                warn!(approval_id, "approval sender dropped without a decision");
                self.config.default_decision.unwrap_or(false)
            }
            Err(_) => {
                self.pending.write().await.remove(&approval_id);
                warn!(approval_id, "approval request timed out");
                self.config.default_decision.unwrap_or(false)
            }
        }
    }

    /// Resolves a pending approval. Returns `false` if no request with this
    /// id is outstanding (already resolved, timed out, or never requested).
    pub async fn resolve(&self, approval_id: &str, decision: bool) -> bool {
        if let Some(tx) = self.pending.write().await.remove(approval_id) {
            tx.send(decision).is_ok()
        } else {
            false
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

pub type SharedApprovalGate = Arc<ApprovalGate>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn default_deny_when_no_policy_and_default_is_restricted() {
        let enforcer = ToolPermissionEnforcer::new(PermissionLevel::Restricted);
        let decision = enforcer.check_permission("shell_exec", &json!({})).await;
        assert!(matches!(decision, ExecutionDecision::Deny(_)));
    }

    #[tokio::test]
    async fn explicit_allow_policy_overrides_default_deny() {
        let enforcer = ToolPermissionEnforcer::new(PermissionLevel::Restricted);
        enforcer
            .set_policy(
                "read_file",
                ToolPolicy {
                    level: Some(PermissionLevel::Allowed),
                    ..Default::default()
                },
            )
            .await;
        let decision = enforcer.check_permission("read_file", &json!({"path": "/tmp/a"})).await;
        assert_eq!(decision, ExecutionDecision::Allow);
    }

    #[tokio::test]
    async fn path_restrictions_deny_outside_prefix() {
        let enforcer = ToolPermissionEnforcer::new(PermissionLevel::Allowed);
        enforcer
            .set_policy(
                "read_file",
                ToolPolicy {
                    path_restrictions: Some(vec!["/project/*".into()]),
                    ..Default::default()
                },
            )
            .await;
        let denied = enforcer.check_permission("read_file", &json!({"path": "/etc/passwd"})).await;
        assert!(matches!(denied, ExecutionDecision::Deny(_)));
        let allowed = enforcer.check_permission("read_file", &json!({"path": "/project/src/main.rs"})).await;
        assert_eq!(allowed, ExecutionDecision::Allow);
    }

    #[tokio::test]
    async fn arg_blacklist_violation_denies() {
        let enforcer = ToolPermissionEnforcer::new(PermissionLevel::Allowed);
        enforcer
            .set_policy(
                "shell_exec",
                ToolPolicy {
                    arg_blacklist: Some(vec!["rm -rf".into()]),
                    ..Default::default()
                },
            )
            .await;
        let decision = enforcer.check_permission("shell_exec", &json!({"command": "rm -rf /"})).await;
        assert!(matches!(decision, ExecutionDecision::Deny(_)));
    }

    #[tokio::test]
    async fn approval_gate_resolves_before_timeout() {
        let gate = Arc::new(ApprovalGate::new(ApprovalConfig {
            timeout: Duration::from_secs(5),
            default_decision: None,
        }));
        let gate2 = gate.clone();
        let handle = tokio::spawn(async move { gate2.request("req-1").await });
        tokio::task::yield_now().await;
        assert!(gate.resolve("req-1", true).await);
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn approval_gate_denies_on_timeout_with_no_default() {
        let gate = ApprovalGate::new(ApprovalConfig {
            timeout: Duration::from_millis(20),
            default_decision: None,
        });
        let decision = gate.request("req-2").await;
        assert!(!decision);
    }

    #[tokio::test]
    async fn resolve_unknown_id_returns_false() {
        let gate = ApprovalGate::new(ApprovalConfig::default());
        assert!(!gate.resolve("nonexistent", true).await);
    }
}
