//! Fallback policy across the three backends: `wasm → container → native`
//! (§4.4). Native is always available and terminates the chain.

use std::sync::Arc;
use tracing::warn;

use super::{ExecRequest, ExecResult, SandboxConfig, SandboxError, SandboxExecutor, SandboxKind};

fn fallback_of(kind: SandboxKind) -> Option<SandboxKind> {
    match kind {
        SandboxKind::Wasm => Some(SandboxKind::Container),
        SandboxKind::Container => Some(SandboxKind::Native),
        SandboxKind::Native => None,
    }
}

/// A hook invoked on each fallback step, so callers can publish a
/// `RuntimeEvent::SandboxFallback` onto the event bus (§4.4, §8 scenario S5).
pub trait FallbackObserver: Send + Sync {
    fn on_fallback(&self, from: SandboxKind, to: SandboxKind, reason: &str);
}

pub struct NoopObserver;
impl FallbackObserver for NoopObserver {
    fn on_fallback(&self, _from: SandboxKind, _to: SandboxKind, _reason: &str) {}
}

/// Dispatches `execute` to the backend named in `cfg.kind`, falling back
/// through `wasm → container → native` on backend unavailability.
pub struct SandboxManager {
    native: Arc<dyn SandboxExecutor>,
    container: Option<Arc<dyn SandboxExecutor>>,
    wasm: Option<Arc<dyn SandboxExecutor>>,
    observer: Arc<dyn FallbackObserver>,
}

impl SandboxManager {
    pub fn new(native: Arc<dyn SandboxExecutor>) -> Self {
        Self { native, container: None, wasm: None, observer: Arc::new(NoopObserver) }
    }

    pub fn with_container(mut self, executor: Arc<dyn SandboxExecutor>) -> Self {
        self.container = Some(executor);
        self
    }

    pub fn with_wasm(mut self, executor: Arc<dyn SandboxExecutor>) -> Self {
        self.wasm = Some(executor);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FallbackObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn executor_for(&self, kind: SandboxKind) -> Option<Arc<dyn SandboxExecutor>> {
        match kind {
            SandboxKind::Native => Some(self.native.clone()),
            SandboxKind::Container => self.container.clone(),
            SandboxKind::Wasm => self.wasm.clone(),
        }
    }

    pub async fn execute(&self, req: &ExecRequest, cfg: &SandboxConfig) -> super::Result<ExecResult> {
        let mut kind = cfg.kind;
        let mut current_cfg = cfg.clone();

        loop {
            match self.executor_for(kind) {
                Some(executor) => match executor.execute(req, &current_cfg).await {
                    Ok(result) => return Ok(result),
                    Err(SandboxError::Unavailable(reason)) => {
                        let Some(next) = fallback_of(kind) else {
                            return Err(SandboxError::Unavailable(reason));
                        };
                        warn!(from = ?kind, to = ?next, reason, "sandbox backend unavailable, falling back");
                        self.observer.on_fallback(kind, next, &reason);
                        current_cfg = current_cfg.degraded_to(next);
                        kind = next;
                    }
                    Err(other) => return Err(other),
                },
                None => {
                    let Some(next) = fallback_of(kind) else {
                        return Err(SandboxError::Unavailable(format!("no backend registered for {kind:?}")));
                    };
                    let reason = format!("no {kind:?} backend registered");
                    warn!(from = ?kind, to = ?next, reason = %reason, "sandbox backend not configured, falling back");
                    self.observer.on_fallback(kind, next, &reason);
                    current_cfg = current_cfg.degraded_to(next);
                    kind = next;
                }
            }
        }
    }
}
