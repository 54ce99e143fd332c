//! Local shell executor: runs commands directly via `tokio::process::Command`.
//! Process spawning and cancellable waiting follow the same shape as
//! `querymt-agent`'s `ShellTool::call`; this version additionally wraps
//! commands the streaming detector classifies with a fixed deadline (§4.A).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::ExecutorError;
use crate::executor::{ExecCtx, ExecResult, Executor};
use crate::streaming::{self, STREAMING_DEADLINE};

#[derive(Debug, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        LocalExecutor
    }

    fn build_command(command: &str, env: &HashMap<String, String>, workdir: Option<&PathBuf>) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-lc", command]);
            cmd
        };
        for (k, v) in env {
            cmd.env(k, v);
        }
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(
        &self,
        ctx: &ExecCtx,
        command: &str,
        env: &HashMap<String, String>,
        workdir: Option<&PathBuf>,
    ) -> Result<ExecResult, ExecutorError> {
        let cmd = Self::build_command(command, env, workdir);
        run_spawned(ctx, command, cmd).await
    }

    async fn close(&self, _ctx: &ExecCtx) -> Result<(), ExecutorError> {
        Ok(())
    }
}

/// Spawn an already-configured command, classify it, and drive it to
/// completion in a cancellable, deadline-bounded way. Shared by
/// [`LocalExecutor`] and `ConfinedExecutor`, whose only difference is how
/// `cmd` was built (the confined variant attaches a `pre_exec` hook before
/// calling this).
pub(crate) async fn run_spawned(
    ctx: &ExecCtx,
    command: &str,
    mut cmd: Command,
) -> Result<ExecResult, ExecutorError> {
    let stream_type = streaming::classify(command);

    let mut child = cmd
            .spawn()
            .map_err(|e| ExecutorError::Spawn(e.to_string()))?;

        // Drive the child to completion in a cancellable, optionally
        // deadline-bounded way. `wait_with_output` can't be used directly
        // because it would move `child` out from under the cancel/timeout
        // branches below.
        let wait_handle = tokio::spawn(async move {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            let mut stdout = child.stdout.take();
            let mut stderr = child.stderr.take();
            let (_, _) = tokio::join!(
                async {
                    if let Some(ref mut s) = stdout {
                        let _ = s.read_to_end(&mut stdout_buf).await;
                    }
                },
                async {
                    if let Some(ref mut s) = stderr {
                        let _ = s.read_to_end(&mut stderr_buf).await;
                    }
                },
            );
            let status = child.wait().await;
            (status, stdout_buf, stderr_buf)
        });

        tokio::pin!(wait_handle);

        let deadline = stream_type
            .map(|_| STREAMING_DEADLINE)
            .or(ctx.deadline);

        let timed_out = if let Some(d) = deadline {
            tokio::select! {
                _ = &mut wait_handle => false,
                _ = ctx.cancel.cancelled() => {
                    wait_handle.abort();
                    return Err(ExecutorError::Closed);
                }
                _ = tokio::time::sleep(d) => true,
            }
        } else {
            tokio::select! {
                _ = &mut wait_handle => false,
                _ = ctx.cancel.cancelled() => {
                    wait_handle.abort();
                    return Err(ExecutorError::Closed);
                }
            }
        };

        if timed_out {
            // The streaming-command case: abort and report whatever the
            // child produced before the deadline as a successful partial
            // result, no error, carrying `stream_type`.
            wait_handle.abort();
            return Ok(ExecResult {
                command: command.to_string(),
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                error: None,
                stream_type,
            });
        }

        let (status, stdout_buf, stderr_buf) = wait_handle
            .await
            .map_err(|e| ExecutorError::Spawn(format!("task join failed: {e}")))?;
        let status = status.map_err(|e| ExecutorError::Spawn(e.to_string()))?;

        Ok(ExecResult {
            command: command.to_string(),
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            exit_code: status.code(),
            error: None,
            stream_type,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_succeeds() {
        let exec = LocalExecutor::new();
        let ctx = ExecCtx::new();
        let result = exec
            .execute(&ctx, "echo hello", &HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello"));
        assert!(result.stream_type.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_result_not_an_error() {
        let exec = LocalExecutor::new();
        let ctx = ExecCtx::new();
        let result = exec
            .execute(&ctx, "exit 3", &HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn classified_command_that_exits_quickly_still_reports_stream_type() {
        let exec = LocalExecutor::new();
        let ctx = ExecCtx::new();
        // Matches the log-tail pattern textually but exits immediately, so
        // this exercises classification without waiting out the deadline.
        let result = exec
            .execute(&ctx, "echo done # tail -f /var/log", &HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(result.stream_type, Some(crate::executor::StreamType::LogTail));
        assert_eq!(result.exit_code, Some(0));
    }
}
