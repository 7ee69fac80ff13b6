//! WASM backend (§4.4): loads a module (local path, registered package name,
//! or HTTPS URL), caches compiled modules LRU-style, and calls a named
//! export with the request serialised as JSON.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wasmtime::{Engine, Instance, Module, Store};
use wasmtime_wasi::{WasiCtx, WasiCtxBuilder};

use super::{ExecRequest, ExecResult, SandboxConfig, SandboxError, SandboxExecutor, SandboxKind};

/// Default compiled-module cache size (§4.4).
pub const DEFAULT_CACHE_SIZE: usize = 10;

/// Resolves a `SandboxConfig::wasm_module` reference to bytes: a local
/// filesystem path, a package registered with `with_package`, or an HTTPS URL.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    async fn load(&self, reference: &str) -> super::Result<Vec<u8>>;
}

pub struct DefaultModuleSource {
    packages: HashMap<String, PathBuf>,
    http: reqwest::Client,
}

impl DefaultModuleSource {
    pub fn new() -> Self {
        Self { packages: HashMap::new(), http: reqwest::Client::new() }
    }

    pub fn with_package(mut self, name: impl Into<String>, path: PathBuf) -> Self {
        self.packages.insert(name.into(), path);
        self
    }
}

impl Default for DefaultModuleSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleSource for DefaultModuleSource {
    async fn load(&self, reference: &str) -> super::Result<Vec<u8>> {
        if reference.starts_with("https://") || reference.starts_with("http://") {
            let bytes = self
                .http
                .get(reference)
                .send()
                .await
                .map_err(|e| SandboxError::Unavailable(e.to_string()))?
                .bytes()
                .await
                .map_err(|e| SandboxError::Unavailable(e.to_string()))?;
            return Ok(bytes.to_vec());
        }
        if let Some(path) = self.packages.get(reference) {
            return tokio::fs::read(path).await.map_err(SandboxError::Io);
        }
        tokio::fs::read(reference).await.map_err(SandboxError::Io)
    }
}

struct CachedModule {
    module: Module,
    last_used: Instant,
}

struct ModuleCache {
    engine: Engine,
    capacity: usize,
    entries: Mutex<HashMap<String, CachedModule>>,
}

impl ModuleCache {
    fn new(engine: Engine, capacity: usize) -> Self {
        Self { engine, capacity, entries: Mutex::new(HashMap::new()) }
    }

    fn get_or_compile(&self, key: &str, bytes: &[u8]) -> super::Result<Module> {
        {
            let mut entries = self.entries.lock();
            if let Some(cached) = entries.get_mut(key) {
                cached.last_used = Instant::now();
                return Ok(cached.module.clone());
            }
        }
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| SandboxError::ExecutionFailed(format!("failed to compile wasm module: {e}")))?;

        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            if let Some(lru_key) = entries.iter().min_by_key(|(_, v)| v.last_used).map(|(k, _)| k.clone()) {
                entries.remove(&lru_key);
            }
        }
        entries.insert(key.to_string(), CachedModule { module: module.clone(), last_used: Instant::now() });
        Ok(module)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

pub struct WasmExecutor {
    cache: Arc<ModuleCache>,
    source: Arc<dyn ModuleSource>,
}

impl WasmExecutor {
    pub fn new(source: Arc<dyn ModuleSource>) -> Self {
        Self::with_cache_size(source, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(source: Arc<dyn ModuleSource>, capacity: usize) -> Self {
        let engine = Engine::default();
        Self { cache: Arc::new(ModuleCache::new(engine, capacity)), source }
    }
}

#[derive(serde::Deserialize)]
struct WasmOutcome {
    stdout: Option<String>,
    stderr: Option<String>,
    #[serde(rename = "exitCode")]
    exit_code: Option<i32>,
}

#[async_trait]
impl SandboxExecutor for WasmExecutor {
    fn kind(&self) -> SandboxKind {
        SandboxKind::Wasm
    }

    async fn execute(&self, req: &ExecRequest, cfg: &SandboxConfig) -> super::Result<ExecResult> {
        let module_ref = cfg
            .wasm_module
            .as_deref()
            .ok_or_else(|| SandboxError::ExecutionFailed("wasm sandbox requires wasm_module".into()))?;
        let function = cfg.wasm_function.as_deref().unwrap_or("run");

        let bytes = self.source.load(module_ref).await?;
        let cache = self.cache.clone();
        let module_ref_owned = module_ref.to_string();
        let function_owned = function.to_string();
        let payload = serde_json::to_vec(&req.args)
            .map_err(|e| SandboxError::ExecutionFailed(format!("failed to serialise request: {e}")))?;

        let started = Instant::now();
        let timeout = Duration::from_millis(cfg.timeout_ms);
        let call = tokio::task::spawn_blocking(move || {
            run_module(&cache, &module_ref_owned, &bytes, &function_owned, &payload)
        });

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(raw))) => Ok(decode_outcome(raw, started.elapsed().as_millis() as u64)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(join_err)) => Err(SandboxError::ExecutionFailed(join_err.to_string())),
            Err(_) => Ok(ExecResult {
                stdout: Vec::new(),
                stderr: Vec::new(),
                exit_code: 124,
                timed_out: true,
                duration_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}

fn run_module(
    cache: &ModuleCache,
    key: &str,
    bytes: &[u8],
    function: &str,
    payload: &[u8],
) -> super::Result<Vec<u8>> {
    let module = cache.get_or_compile(key, bytes)?;
    let wasi: WasiCtx = WasiCtxBuilder::new().build();
    let mut store = Store::new(&cache.engine, wasi);
    let instance = Instance::new(&mut store, &module, &[])
        .map_err(|e| SandboxError::ExecutionFailed(format!("failed to instantiate wasm module: {e}")))?;

    let memory = instance
        .get_memory(&mut store, "memory")
        .ok_or_else(|| SandboxError::ExecutionFailed("module exports no `memory`".into()))?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut store, "alloc")
        .map_err(|e| SandboxError::ExecutionFailed(format!("module exports no `alloc`: {e}")))?;
    let run = instance
        .get_typed_func::<(i32, i32), i32>(&mut store, function)
        .map_err(|e| SandboxError::ExecutionFailed(format!("module exports no `{function}`: {e}")))?;

    let ptr = alloc
        .call(&mut store, payload.len() as i32)
        .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;
    memory
        .write(&mut store, ptr as usize, payload)
        .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;

    let result_ptr = run
        .call(&mut store, (ptr, payload.len() as i32))
        .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;

    // Convention: the export writes a little-endian u32 length at
    // `result_ptr`, followed by that many bytes of result payload.
    let mut len_buf = [0u8; 4];
    memory
        .read(&store, result_ptr as usize, &mut len_buf)
        .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut out = vec![0u8; len];
    memory
        .read(&store, result_ptr as usize + 4, &mut out)
        .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;
    Ok(out)
}

fn decode_outcome(raw: Vec<u8>, duration_ms: u64) -> ExecResult {
    if let Ok(outcome) = serde_json::from_slice::<WasmOutcome>(&raw) {
        return ExecResult {
            stdout: outcome.stdout.unwrap_or_default().into_bytes(),
            stderr: outcome.stderr.unwrap_or_default().into_bytes(),
            exit_code: outcome.exit_code.unwrap_or(0),
            timed_out: false,
            duration_ms,
        }
        .truncate_outputs();
    }
    ExecResult { stdout: raw, stderr: Vec::new(), exit_code: 0, timed_out: false, duration_ms }.truncate_outputs()
}
