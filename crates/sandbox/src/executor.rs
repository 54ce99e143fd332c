//! The Sandbox Executor contract (§4.A): every variant (local, OS-confined,
//! containerized) implements this trait. A non-zero exit code is a normal
//! result; only executor-internal failures (spawn failure, policy
//! application failure, transport failure to a container) are errors.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecutorError;

/// Cancellation/deadline context threaded through every suspension point,
/// matching §5's "all suspension points carry a context with deadline and
/// cancellation".
#[derive(Clone)]
pub struct ExecCtx {
    pub cancel: tokio_util_cancel::CancellationToken,
    pub deadline: Option<Duration>,
}

impl ExecCtx {
    pub fn new() -> Self {
        ExecCtx {
            cancel: tokio_util_cancel::CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn child(&self) -> Self {
        ExecCtx {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }
}

impl Default for ExecCtx {
    fn default() -> Self {
        Self::new()
    }
}

/// How a completed (or timed-out-but-partial) command result should be
/// reported to the caller: `stream_type` is set only when the
/// streaming-command detector classified the command as indefinitely
/// streaming and it was cut off at the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    LogTail,
    Watch,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub stream_type: Option<StreamType>,
}

impl ExecResult {
    pub fn success(command: impl Into<String>, stdout: String, stderr: String) -> Self {
        ExecResult {
            command: command.into(),
            stdout,
            stderr,
            exit_code: Some(0),
            error: None,
            stream_type: None,
        }
    }
}

/// A sandboxed command executor. Implementations: `LocalExecutor`,
/// `ConfinedExecutor`, `PodExecutor`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        ctx: &ExecCtx,
        command: &str,
        env: &HashMap<String, String>,
        workdir: Option<&PathBuf>,
    ) -> Result<ExecResult, ExecutorError>;

    /// Release any executor-held resources (e.g. a long-lived pod exec
    /// session). Idempotent.
    async fn close(&self, ctx: &ExecCtx) -> Result<(), ExecutorError>;
}

/// Minimal cancellation-token seam so `sandbox` does not need to depend on
/// `tokio-util` solely for `CancellationToken` (the teacher already depends
/// on `tokio-util` via the agent crate for its `compat` feature; this repo
/// keeps the dependency list for `sandbox` itself minimal and implements the
/// same drop/children semantics directly on top of `tokio::sync::Notify`).
mod tokio_util_cancel {
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Clone)]
    pub struct CancellationToken {
        inner: Arc<Inner>,
    }

    struct Inner {
        notify: Notify,
        cancelled: std::sync::atomic::AtomicBool,
    }

    impl CancellationToken {
        pub fn new() -> Self {
            CancellationToken {
                inner: Arc::new(Inner {
                    notify: Notify::new(),
                    cancelled: std::sync::atomic::AtomicBool::new(false),
                }),
            }
        }

        pub fn child_token(&self) -> Self {
            self.clone()
        }

        pub fn cancel(&self) {
            self.inner
                .cancelled
                .store(true, std::sync::atomic::Ordering::SeqCst);
            self.inner.notify.notify_waiters();
        }

        pub fn is_cancelled(&self) -> bool {
            self.inner.cancelled.load(std::sync::atomic::Ordering::SeqCst)
        }

        pub async fn cancelled(&self) {
            if self.is_cancelled() {
                return;
            }
            self.inner.notify.notified().await;
        }
    }
}
