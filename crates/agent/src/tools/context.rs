//! The tool/context contract (§4.J): `Tool` is what a registered tool
//! implements; `ToolContext` is what the agent loop hands it at call time.
//! Grounded on the teacher's `tools::context::{Tool, ToolContext,
//! ToolError, CapabilityRequirement}`, narrowed to spec.md's exact method
//! set (`run`/`is_interactive`/`check_modifies_resource` replace the
//! teacher's open-ended `call`, which this system does not need since it has
//! no delegation/skills/undo subsystems).

use std::any::Any;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kubeagent_sandbox::executor::ExecCtx;
use serde_json::Value;

use kubeagent_core::chat::FunctionDefinition;

/// Capability requirements a tool may declare; used by callers that want to
/// gate tool registration on what a session actually supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CapabilityRequirement {
    Filesystem,
}

/// Whether a command modifies cluster or filesystem state, as judged by
/// [`Tool::check_modifies_resource`] (§4.J).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifiesResource {
    Yes,
    No,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("session error: {0}")]
    SessionError(String),
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Everything a tool needs from its caller: identity, filesystem scoping,
/// the sandbox cancellation context, and the allowed-directory list the
/// bash tool's path-escape check enforces (§4.J bullet 2).
#[async_trait]
pub trait ToolContext: Send + Sync {
    fn session_id(&self) -> &str;
    fn cwd(&self) -> Option<&Path>;
    fn exec_ctx(&self) -> &ExecCtx;

    /// Directories a tool's filesystem side-effects must stay within. An
    /// empty or absent list disables the check (§4.J bullet 2).
    fn allowed_directories(&self) -> &[PathBuf] {
        &[]
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        let path = Path::new(path);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            self.cwd().map(|cwd| cwd.join(path)).ok_or_else(|| {
                ToolError::InvalidRequest(
                    "cannot resolve relative path: no working directory set".into(),
                )
            })
        }
    }

    fn as_any(&self) -> &dyn Any;

    /// Ask the user a structured multiple-choice question and wait for an
    /// answer. Falls back to stdin/stdout when no richer UI channel is wired
    /// up (CLI mode), matching the teacher's `ToolContext::ask_question`
    /// default.
    async fn ask_question(
        &self,
        question: &str,
        options: &[String],
    ) -> Result<String, ToolError> {
        use std::io::{self, Write};

        println!("\n{question}");
        for (idx, label) in options.iter().enumerate() {
            println!("{}. {label}", idx + 1);
        }
        print!("> ");
        io::stdout().flush().map_err(|e| ToolError::Other(e.into()))?;

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .map_err(|e| ToolError::Other(e.into()))?;
        let input = input.trim();

        if let Ok(idx) = input.parse::<usize>() {
            if idx > 0 && idx <= options.len() {
                return Ok(options[idx - 1].clone());
            }
        }
        Err(ToolError::InvalidRequest("no valid selection made".into()))
    }
}

/// A registered, callable tool (§4.J).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn function_definition(&self) -> FunctionDefinition;

    fn required_capabilities(&self) -> &'static [CapabilityRequirement] {
        &[]
    }

    async fn run(&self, ctx: &dyn ToolContext, args: Value) -> Result<Value, ToolError>;

    /// Whether invoking with `args` would require an interactive terminal
    /// (e.g. `kubectl exec` without `-i`/`-t` stripped, `port-forward`).
    /// Such calls are rejected before dispatch (§4.J bullet 1).
    fn is_interactive(&self, args: &Value) -> bool;

    /// Whether invoking with `args` is known to mutate cluster/filesystem
    /// state.
    fn check_modifies_resource(&self, args: &Value) -> ModifiesResource;
}
