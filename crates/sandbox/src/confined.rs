//! OS-confined executor: wraps [`LocalExecutor`]'s spawn path with a
//! `nono`-backed capability set applied to the child process before exec,
//! narrowed from `querymt-sandbox`'s `SandboxPolicy` (desktop extension-token
//! mode switching is dropped — this variant's capability set is fixed for
//! the lifetime of the executor).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nono::{AccessMode, CapabilitySet, Sandbox};

use crate::error::ExecutorError;
use crate::executor::{ExecCtx, ExecResult, Executor};
use crate::local::LocalExecutor;

/// Filesystem/network capabilities granted to a confined command.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub cwd: PathBuf,
    pub read_only: bool,
    pub allow_network: bool,
}

impl SandboxPolicy {
    pub fn to_capability_set(&self) -> nono::Result<CapabilitySet> {
        let mode = if self.read_only {
            AccessMode::Read
        } else {
            AccessMode::ReadWrite
        };

        let mut caps = CapabilitySet::new()
            .allow_path(&self.cwd, mode)?
            .allow_path("/usr", AccessMode::Read)?
            .allow_path("/bin", AccessMode::Read)?
            .allow_path("/etc", AccessMode::Read)?
            .allow_path("/dev", AccessMode::Read)?
            .allow_path("/tmp", AccessMode::ReadWrite)?;

        if Path::new("/lib").exists() {
            caps = caps.allow_path("/lib", AccessMode::Read)?;
        }
        #[cfg(target_os = "linux")]
        {
            caps = caps
                .allow_path("/proc", AccessMode::Read)?
                .allow_path("/sys", AccessMode::Read)?;
        }
        #[cfg(target_os = "macos")]
        {
            caps = caps
                .allow_path("/private/tmp", AccessMode::ReadWrite)?
                .allow_path("/System", AccessMode::Read)?
                .allow_path("/Library", AccessMode::Read)?;
        }

        if !self.allow_network {
            caps = caps.block_network();
        }

        Ok(caps)
    }
}

pub struct ConfinedExecutor {
    policy: SandboxPolicy,
    inner: LocalExecutor,
}

impl ConfinedExecutor {
    pub fn new(policy: SandboxPolicy) -> Self {
        ConfinedExecutor {
            policy,
            inner: LocalExecutor::new(),
        }
    }
}

#[async_trait]
impl Executor for ConfinedExecutor {
    async fn execute(
        &self,
        ctx: &ExecCtx,
        command: &str,
        env: &HashMap<String, String>,
        workdir: Option<&PathBuf>,
    ) -> Result<ExecResult, ExecutorError> {
        if !Sandbox::is_supported() {
            tracing::warn!(
                "OS sandbox not supported on this platform ({}), running unconfined",
                std::env::consts::OS
            );
            return self.inner.execute(ctx, command, env, workdir).await;
        }

        let caps = self
            .policy
            .to_capability_set()
            .map_err(|e| ExecutorError::Policy(e.to_string()))?;

        // Apply the capability set inside the child before it execs the
        // shell, so the restriction binds the command itself rather than
        // this process. This mirrors Landlock/Seatbelt's inherit-across-exec
        // semantics used by `querymt-sandbox::SandboxPolicy::apply`, scoped
        // here to a single spawned child instead of the whole worker process.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            let mut std_cmd = std::process::Command::new("sh");
            std_cmd.arg("-lc").arg(command);
            for (k, v) in env {
                std_cmd.env(k, v);
            }
            if let Some(dir) = workdir {
                std_cmd.current_dir(dir);
            } else {
                std_cmd.current_dir(&self.policy.cwd);
            }
            unsafe {
                std_cmd.pre_exec(move || {
                    Sandbox::apply(&caps).map_err(|e| {
                        std::io::Error::other(e.to_string())
                    })
                });
            }
            let mut tokio_cmd = tokio::process::Command::from(std_cmd);
            tokio_cmd.stdout(std::process::Stdio::piped());
            tokio_cmd.stderr(std::process::Stdio::piped());
            return crate::local::run_spawned(ctx, command, tokio_cmd).await;
        }

        #[cfg(not(unix))]
        {
            self.inner.execute(ctx, command, env, workdir).await
        }
    }

    async fn close(&self, ctx: &ExecCtx) -> Result<(), ExecutorError> {
        self.inner.close(ctx).await
    }
}
