//! Sandbox fallback scenario (§8, S5): a `wasm` request degrades to
//! `container` or `native` when the requested backend is unavailable,
//! always producing a populated `ExecResult`.

use async_trait::async_trait;
use run_orchestrator::sandbox::manager::FallbackObserver;
use run_orchestrator::{ExecRequest, ExecResult, NativeExecutor, SandboxConfig, SandboxExecutor, SandboxKind, SandboxManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct UnavailableBackend(SandboxKind);

#[async_trait]
impl SandboxExecutor for UnavailableBackend {
    fn kind(&self) -> SandboxKind {
        self.0
    }
    async fn execute(&self, _req: &ExecRequest, _cfg: &SandboxConfig) -> run_orchestrator::sandbox::Result<ExecResult> {
        Err(run_orchestrator::sandbox::SandboxError::Unavailable("no wasm runtime configured".into()))
    }
}

struct CountingObserver(AtomicUsize);
impl FallbackObserver for CountingObserver {
    fn on_fallback(&self, _from: SandboxKind, _to: SandboxKind, _reason: &str) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn wasm_request_falls_back_to_native_and_produces_a_result() {
    let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
    let manager = SandboxManager::new(Arc::new(NativeExecutor))
        .with_wasm(Arc::new(UnavailableBackend(SandboxKind::Wasm)))
        .with_observer(observer.clone());

    let req = ExecRequest { command: vec!["echo".into(), "ok".into()], stdin: None, args: serde_json::json!({}) };
    let mut cfg = SandboxConfig::native(5_000);
    cfg.kind = SandboxKind::Wasm;

    let result = manager.execute(&req, &cfg).await.unwrap();
    assert!(!result.timed_out);
    assert_eq!(result.exit_code, 0);
    // wasm (explicitly unavailable) -> container (not configured) -> native: two hops.
    assert_eq!(observer.0.load(Ordering::SeqCst), 2);
}
