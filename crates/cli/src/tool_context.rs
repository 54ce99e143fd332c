//! The `ToolContext` implementation the CLI hands to every tool dispatch:
//! the process's own working directory, an optional allowed-directory
//! sandbox, and a fresh [`ExecCtx`] per session.

use std::any::Any;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use kubeagent_agent::ToolContext;
use kubeagent_sandbox::executor::ExecCtx;

pub struct CliToolContext {
    session_id: String,
    cwd: Option<PathBuf>,
    allowed_directories: Vec<PathBuf>,
    exec_ctx: ExecCtx,
}

impl CliToolContext {
    pub fn new(session_id: String, cwd: Option<PathBuf>, allowed_directories: Vec<PathBuf>) -> Self {
        CliToolContext {
            session_id,
            cwd,
            allowed_directories,
            exec_ctx: ExecCtx::new(),
        }
    }
}

#[async_trait]
impl ToolContext for CliToolContext {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    fn exec_ctx(&self) -> &ExecCtx {
        &self.exec_ctx
    }

    fn allowed_directories(&self) -> &[PathBuf] {
        &self.allowed_directories
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
