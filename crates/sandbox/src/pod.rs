//! Containerized executor: execs into a long-lived pod via an injected
//! transport. No Kubernetes client crate appears anywhere in the grounding
//! corpus, so the actual pod-provisioning/exec transport is a seam
//! (`PodExecClient`) rather than a concrete `kube`-backed implementation —
//! consistent with this system's own scoping of pod-provisioning details as
//! out of bounds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ExecutorError;
use crate::executor::{ExecCtx, ExecResult, Executor};
use crate::streaming::{self, STREAMING_DEADLINE};

/// What `PodExecutor` needs from a Kubernetes client: create-if-absent exec
/// access to a long-lived pod, and the ability to detect that an existing
/// pod was built from a different image than requested.
#[async_trait]
pub trait PodExecClient: Send + Sync {
    /// Ensure a pod exists for `image`, creating it if absent. Returns an
    /// error if a pod already exists under this identity with a different
    /// image (image-mismatch detection, §4.A).
    async fn ensure_pod(&self, image: &str) -> Result<(), ExecutorError>;

    /// Exec `command` inside the pod, returning raw stdout/stderr/exit code.
    /// `None` for `exit_code` together with no error means the transport
    /// itself was cut off (used by the deadline wrapper below, not raised
    /// by implementations directly).
    async fn exec(
        &self,
        command: &str,
        env: &HashMap<String, String>,
        workdir: Option<&PathBuf>,
    ) -> Result<(String, String, i32), ExecutorError>;

    async fn teardown(&self) -> Result<(), ExecutorError>;
}

pub struct PodExecutor {
    image: String,
    client: Arc<dyn PodExecClient>,
    ensured: Mutex<bool>,
}

impl PodExecutor {
    pub fn new(image: impl Into<String>, client: Arc<dyn PodExecClient>) -> Self {
        PodExecutor {
            image: image.into(),
            client,
            ensured: Mutex::new(false),
        }
    }

    async fn ensure(&self) -> Result<(), ExecutorError> {
        let mut ensured = self.ensured.lock().await;
        if !*ensured {
            self.client.ensure_pod(&self.image).await?;
            *ensured = true;
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for PodExecutor {
    async fn execute(
        &self,
        ctx: &ExecCtx,
        command: &str,
        env: &HashMap<String, String>,
        workdir: Option<&PathBuf>,
    ) -> Result<ExecResult, ExecutorError> {
        self.ensure().await?;

        let stream_type = streaming::classify(command);
        let deadline = stream_type.map(|_| STREAMING_DEADLINE).or(ctx.deadline);

        let exec_future = self.client.exec(command, env, workdir);

        let outcome = if let Some(d) = deadline {
            tokio::select! {
                result = exec_future => Some(result),
                _ = ctx.cancel.cancelled() => return Err(ExecutorError::Closed),
                _ = tokio::time::sleep(d) => None,
            }
        } else {
            tokio::select! {
                result = exec_future => Some(result),
                _ = ctx.cancel.cancelled() => return Err(ExecutorError::Closed),
            }
        };

        match outcome {
            None => Ok(ExecResult {
                command: command.to_string(),
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                error: None,
                stream_type,
            }),
            Some(Ok((stdout, stderr, exit_code))) => Ok(ExecResult {
                command: command.to_string(),
                stdout,
                stderr,
                exit_code: Some(exit_code),
                error: None,
                stream_type,
            }),
            Some(Err(e)) => Err(e),
        }
    }

    async fn close(&self, _ctx: &ExecCtx) -> Result<(), ExecutorError> {
        self.client.teardown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClient {
        image: String,
    }

    #[async_trait]
    impl PodExecClient for FakeClient {
        async fn ensure_pod(&self, image: &str) -> Result<(), ExecutorError> {
            if image != self.image {
                return Err(ExecutorError::Container("image mismatch".into()));
            }
            Ok(())
        }

        async fn exec(
            &self,
            command: &str,
            _env: &HashMap<String, String>,
            _workdir: Option<&PathBuf>,
        ) -> Result<(String, String, i32), ExecutorError> {
            Ok((format!("ran: {command}"), String::new(), 0))
        }

        async fn teardown(&self) -> Result<(), ExecutorError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn execute_creates_pod_once_and_runs_command() {
        let client = Arc::new(FakeClient {
            image: "busybox".into(),
        });
        let exec = PodExecutor::new("busybox", client);
        let ctx = ExecCtx::new();
        let result = exec
            .execute(&ctx, "echo hi", &HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("echo hi"));
    }

    #[tokio::test]
    async fn image_mismatch_surfaces_as_error() {
        let client = Arc::new(FakeClient {
            image: "other-image".into(),
        });
        let exec = PodExecutor::new("busybox", client);
        let ctx = ExecCtx::new();
        let result = exec.execute(&ctx, "echo hi", &HashMap::new(), None).await;
        assert!(result.is_err());
    }
}
