//! Container backend (§4.4): leases a container from C7, execs the command
//! inside it, and demultiplexes Docker's stdout/stderr framing.

use async_trait::async_trait;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

use crate::container_pool::{AcquireOptions, ContainerPool};

use super::{ExecRequest, ExecResult, NetworkMode, SandboxConfig, SandboxError, SandboxExecutor, SandboxKind};

pub struct ContainerExecutor {
    pool: Arc<ContainerPool>,
}

impl ContainerExecutor {
    pub fn new(pool: Arc<ContainerPool>) -> Self {
        Self { pool }
    }
}

/// A single frame of Docker's multiplexed exec stream: `{type, zero*3, size:u32 BE, payload}`.
/// `stream_type`: 1 = stdout, 2 = stderr. Exposed for documentation/testing;
/// `bollard`'s `LogOutput` performs this demultiplexing for us at runtime.
pub fn split_frame(buf: &[u8]) -> Option<(u8, usize, &[u8])> {
    if buf.len() < 8 {
        return None;
    }
    let stream_type = buf[0];
    let size = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    if buf.len() < 8 + size {
        return None;
    }
    Some((stream_type, size, &buf[8..8 + size]))
}

#[async_trait]
impl SandboxExecutor for ContainerExecutor {
    fn kind(&self) -> SandboxKind {
        SandboxKind::Container
    }

    async fn execute(&self, req: &ExecRequest, cfg: &SandboxConfig) -> super::Result<ExecResult> {
        let image = cfg
            .image
            .as_deref()
            .ok_or_else(|| SandboxError::ExecutionFailed("container sandbox requires an image".into()))?;

        let network_mode = match cfg.network.mode {
            NetworkMode::None => "none",
            NetworkMode::Bridge => "bridge",
            NetworkMode::Host => "host",
        };
        let opts = AcquireOptions {
            memory_bytes: cfg.resources.memory_bytes,
            nano_cpus: cfg.resources.cpu_shares.map(|cpus| (cpus * 1_000_000_000.0) as u64),
            pids_limit: cfg.resources.pids_limit,
            network_mode: Some(network_mode.to_string()),
        };

        let leased = self
            .pool
            .acquire(image, &opts)
            .await
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;

        let started = Instant::now();
        let exec_future = async {
            let docker = self.pool_docker();
            let exec = docker
                .create_exec(
                    &leased.container_id,
                    CreateExecOptions {
                        attach_stdout: Some(true),
                        attach_stderr: Some(true),
                        cmd: Some(req.command.clone()),
                        env: Some(cfg.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
                        working_dir: cfg.workdir.clone(),
                        user: cfg.user.clone(),
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;

            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            match docker
                .start_exec(&exec.id, None)
                .await
                .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?
            {
                StartExecResults::Attached { mut output, .. } => {
                    while let Some(chunk) = output.next().await {
                        match chunk {
                            Ok(bollard::container::LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                            Ok(bollard::container::LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                            Ok(_) => {}
                            Err(e) => return Err(SandboxError::ExecutionFailed(e.to_string())),
                        }
                    }
                }
                StartExecResults::Detached => {}
            }

            let inspect = docker
                .inspect_exec(&exec.id)
                .await
                .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;
            let exit_code = inspect.exit_code.unwrap_or(0) as i32;
            Ok::<_, SandboxError>((stdout, stderr, exit_code))
        };

        let timeout = std::time::Duration::from_millis(cfg.timeout_ms);
        let result = match tokio::time::timeout(timeout, exec_future).await {
            Ok(Ok((stdout, stderr, exit_code))) => {
                self.pool.release(&leased, false).await;
                ExecResult {
                    stdout,
                    stderr,
                    exit_code,
                    timed_out: false,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Ok(Err(err)) => {
                // Exec-level failure: container is likely still sound, release it.
                self.pool.release(&leased, false).await;
                return Err(err);
            }
            Err(_) => {
                self.pool.release(&leased, false).await;
                ExecResult {
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    exit_code: 124,
                    timed_out: true,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        Ok(result.truncate_outputs())
    }
}

impl ContainerExecutor {
    fn pool_docker(&self) -> Arc<bollard::Docker> {
        self.pool.docker_handle()
    }
}
