//! Native process backend (§4.4). Always available; no resource isolation
//! beyond OS defaults.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, AsyncReadExt};
use tokio::process::Command;

use super::{ExecRequest, ExecResult, SandboxConfig, SandboxError, SandboxExecutor, SandboxKind};

pub struct NativeExecutor;

#[async_trait]
impl SandboxExecutor for NativeExecutor {
    fn kind(&self) -> SandboxKind {
        SandboxKind::Native
    }

    async fn execute(&self, req: &ExecRequest, cfg: &SandboxConfig) -> super::Result<ExecResult> {
        let Some((program, args)) = req.command.split_first() else {
            return Err(SandboxError::ExecutionFailed("empty command".into()));
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&cfg.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workdir) = &cfg.workdir {
            command.current_dir(workdir);
        }

        let started = Instant::now();
        let mut child = command.spawn()?;

        if let Some(stdin_bytes) = &req.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(stdin_bytes).await;
            }
        }
        drop(child.stdin.take());

        let mut stdout = child.stdout.take().expect("piped stdout");
        let mut stderr = child.stderr.take().expect("piped stderr");

        let timeout = Duration::from_millis(cfg.timeout_ms);
        let wait = async {
            let mut out_buf = Vec::new();
            let mut err_buf = Vec::new();
            let (_, _, status) = tokio::join!(
                stdout.read_to_end(&mut out_buf),
                stderr.read_to_end(&mut err_buf),
                child.wait(),
            );
            (out_buf, err_buf, status)
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok((stdout_buf, stderr_buf, status)) => {
                let exit_status = status.map_err(SandboxError::Io)?;
                Ok(ExecResult {
                    stdout: stdout_buf,
                    stderr: stderr_buf,
                    exit_code: exit_status.code().unwrap_or(-1),
                    timed_out: false,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
                .truncate_outputs())
            }
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(ExecResult {
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    exit_code: 124,
                    timed_out: true,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_simple_command() {
        let exec = NativeExecutor;
        let req = ExecRequest {
            command: vec!["echo".into(), "hello".into()],
            stdin: None,
            args: serde_json::json!({}),
        };
        let cfg = SandboxConfig::native(5_000);
        let result = exec.execute(&req, &cfg).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(String::from_utf8_lossy(&result.stdout).contains("hello"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let exec = NativeExecutor;
        let req = ExecRequest {
            command: vec!["sleep".into(), "5".into()],
            stdin: None,
            args: serde_json::json!({}),
        };
        let cfg = SandboxConfig::native(50);
        let result = exec.execute(&req, &cfg).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, 124);
    }

    #[tokio::test]
    async fn empty_command_is_execution_failed() {
        let exec = NativeExecutor;
        let req = ExecRequest { command: vec![], stdin: None, args: serde_json::json!({}) };
        let cfg = SandboxConfig::native(1_000);
        let err = exec.execute(&req, &cfg).await.unwrap_err();
        assert!(matches!(err, SandboxError::ExecutionFailed(_)));
    }
}
