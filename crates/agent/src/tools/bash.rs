//! The bash tool (§4.J "Bash tool specifics"): delegates execution to a
//! `kubeagent_sandbox::Executor`, rejects interactive/port-forwarding
//! `kubectl` subcommands, enforces a path-escape check against
//! `ToolContext::allowed_directories`, and classifies `check_modifies_resource`
//! via a destructive-bash-verb list plus a `kubectl` verb heuristic.
//!
//! Grounded on the teacher's `tools::builtins::shell::ShellTool` for the
//! tool-trait shape and cancellable-execution delegation; the path-sandbox
//! and kubectl-verb checks are new surface this system's spec calls for that
//! the teacher's generic shell tool does not implement (§SPEC_FULL 4.J).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use kubeagent_core::chat::FunctionDefinition;
use kubeagent_sandbox::executor::Executor;

use crate::tools::context::{ModifiesResource, Tool, ToolContext, ToolError};

/// `kubectl` verbs that never mutate cluster state, for
/// `check_modifies_resource` (§SPEC_FULL 4.J).
const KUBECTL_READ_ONLY_VERBS: &[&str] =
    &["get", "describe", "logs", "explain", "api-resources", "top"];

/// `kubectl` verbs that mutate state or require an interactive terminal.
const KUBECTL_MUTATING_VERBS: &[&str] = &[
    "apply",
    "delete",
    "create",
    "replace",
    "patch",
    "scale",
    "rollout",
    "drain",
    "cordon",
    "taint",
    "label",
    "annotate",
    "exec",
    "cp",
    "port-forward",
    "edit",
    "autoscale",
];

/// `kubectl` subcommands that require a live terminal or hold a connection
/// open; rejected outright rather than merely flagged (§4.J bullet 1).
const KUBECTL_INTERACTIVE_VERBS: &[&str] = &["exec", "port-forward", "edit", "attach"];

/// Destructive bash verbs that always count as modifying, independent of any
/// `kubectl` heuristic.
const DESTRUCTIVE_BASH_VERBS: &[&str] = &["rm", "rmdir"];

static REDIRECT_TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:>>|>\||2>>|2>|>|<)\s*([^\s|&;]+)"#).unwrap()
});

static TEE_TARGET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|\s*tee\s+(-a\s+)?([^\s|&;]+)").unwrap());

fn kubectl_verb(command: &str) -> Option<&str> {
    let mut tokens = command.split_whitespace();
    if tokens.next()? != "kubectl" {
        return None;
    }
    tokens.next()
}

fn expand_path(raw: &str, workdir: Option<&Path>) -> PathBuf {
    let expanded = if let Some(rest) = raw.strip_prefix("~/") {
        dirs::home_dir().map(|h| h.join(rest)).unwrap_or_else(|| PathBuf::from(raw))
    } else if let Some(rest) = raw.strip_prefix('$') {
        std::env::var(rest).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(raw))
    } else {
        PathBuf::from(raw)
    };
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        workdir.map(|w| w.join(&expanded)).unwrap_or(expanded)
    };
    normalize_lexically(&joined)
}

/// Collapses `.`/`..` components without touching the filesystem (the path
/// need not exist yet, e.g. a redirect target). `starts_with` compares
/// components literally, so a raw `/work/../secret.txt` would lexically
/// have `/work` as a prefix despite resolving outside it; this must run
/// before any allowed-directory comparison.
fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

fn redirect_targets(command: &str) -> Vec<String> {
    let mut targets = Vec::new();
    for caps in REDIRECT_TARGET.captures_iter(command) {
        targets.push(caps[1].to_string());
    }
    for caps in TEE_TARGET.captures_iter(command) {
        targets.push(caps[2].to_string());
    }
    targets
}

/// True if `path`, resolved against `workdir` and expanded for `~`/env vars,
/// falls outside every directory in `allowed`. An empty `allowed` list
/// disables the check (§4.J bullet 2).
fn escapes_allowed_directories(path: &Path, allowed: &[PathBuf]) -> bool {
    if allowed.is_empty() {
        return false;
    }
    !allowed
        .iter()
        .any(|dir| path.starts_with(normalize_lexically(dir)))
}

pub struct BashTool {
    executor: std::sync::Arc<dyn Executor>,
}

impl BashTool {
    pub fn new(executor: std::sync::Arc<dyn Executor>) -> Self {
        BashTool { executor }
    }

    fn check_path_sandbox(
        &self,
        command: &str,
        workdir: Option<&Path>,
        allowed: &[PathBuf],
    ) -> Result<(), ToolError> {
        if allowed.is_empty() {
            return Ok(());
        }
        for raw in redirect_targets(command) {
            let resolved = expand_path(&raw, workdir);
            if escapes_allowed_directories(&resolved, allowed) {
                return Err(ToolError::PermissionDenied(format!(
                    "access denied: {raw} escapes allowed directories"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command (including kubectl) in the sandboxed executor and return its output."
    }

    fn function_definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameter_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to run."
                    },
                    "workdir": {
                        "type": "string",
                        "description": "Working directory, relative to the session cwd."
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn run(&self, ctx: &dyn ToolContext, args: Value) -> Result<Value, ToolError> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidRequest("command is required".into()))?;

        if self.is_interactive(&args) {
            return Err(ToolError::PermissionDenied(format!(
                "refusing interactive kubectl subcommand in: {command}"
            )));
        }

        let workdir = args
            .get("workdir")
            .and_then(Value::as_str)
            .map(|s| ctx.resolve_path(s))
            .transpose()?
            .or_else(|| ctx.cwd().map(|p| p.to_path_buf()));

        self.check_path_sandbox(command, workdir.as_deref(), ctx.allowed_directories())?;

        let result = self
            .executor
            .execute(ctx.exec_ctx(), command, &HashMap::new(), workdir.as_ref())
            .await
            .map_err(|e| ToolError::ProviderError(e.to_string()))?;

        Ok(json!({
            "command": result.command,
            "stdout": result.stdout,
            "stderr": result.stderr,
            "exit_code": result.exit_code,
            "error": result.error,
            "stream_type": result.stream_type.map(|s| format!("{s:?}")),
        }))
    }

    fn is_interactive(&self, args: &Value) -> bool {
        let Some(command) = args.get("command").and_then(Value::as_str) else {
            return false;
        };
        match kubectl_verb(command) {
            Some(verb) => KUBECTL_INTERACTIVE_VERBS.contains(&verb),
            None => false,
        }
    }

    fn check_modifies_resource(&self, args: &Value) -> ModifiesResource {
        let Some(command) = args.get("command").and_then(Value::as_str) else {
            return ModifiesResource::Unknown;
        };
        let first_word = command.split_whitespace().next().unwrap_or("");
        if DESTRUCTIVE_BASH_VERBS.contains(&first_word)
            || (first_word == "rm" || command.trim_start().starts_with("rm "))
        {
            return ModifiesResource::Yes;
        }
        match kubectl_verb(command) {
            Some(verb) if KUBECTL_READ_ONLY_VERBS.contains(&verb) => ModifiesResource::No,
            Some(verb) if KUBECTL_MUTATING_VERBS.contains(&verb) => ModifiesResource::Yes,
            Some(_) => ModifiesResource::Unknown,
            None => ModifiesResource::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubectl_read_verbs_are_non_modifying() {
        let tool = BashTool::new(std::sync::Arc::new(NoopExecutor));
        let args = json!({"command": "kubectl get pods"});
        assert_eq!(tool.check_modifies_resource(&args), ModifiesResource::No);
    }

    #[test]
    fn kubectl_mutating_verbs_are_modifying() {
        let tool = BashTool::new(std::sync::Arc::new(NoopExecutor));
        let args = json!({"command": "kubectl delete pod foo"});
        assert_eq!(tool.check_modifies_resource(&args), ModifiesResource::Yes);
    }

    #[test]
    fn rm_is_destructive() {
        let tool = BashTool::new(std::sync::Arc::new(NoopExecutor));
        let args = json!({"command": "rm -rf /tmp/x"});
        assert_eq!(tool.check_modifies_resource(&args), ModifiesResource::Yes);
    }

    #[test]
    fn unrelated_commands_are_unknown() {
        let tool = BashTool::new(std::sync::Arc::new(NoopExecutor));
        let args = json!({"command": "ls -la"});
        assert_eq!(tool.check_modifies_resource(&args), ModifiesResource::Unknown);
    }

    #[test]
    fn kubectl_exec_is_interactive() {
        let tool = BashTool::new(std::sync::Arc::new(NoopExecutor));
        let args = json!({"command": "kubectl exec -it pod -- sh"});
        assert!(tool.is_interactive(&args));
    }

    #[test]
    fn path_escape_is_refused() {
        let tool = BashTool::new(std::sync::Arc::new(NoopExecutor));
        let allowed = vec![PathBuf::from("/work")];
        let err = tool
            .check_path_sandbox("echo hi > ../secret.txt", Some(Path::new("/work")), &allowed)
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[test]
    fn path_within_allowed_dir_is_accepted() {
        let tool = BashTool::new(std::sync::Arc::new(NoopExecutor));
        let allowed = vec![PathBuf::from("/work")];
        assert!(tool
            .check_path_sandbox("echo hi > sub/x.txt", Some(Path::new("/work")), &allowed)
            .is_ok());
    }

    #[test]
    fn tee_target_outside_allowed_dir_is_refused() {
        let tool = BashTool::new(std::sync::Arc::new(NoopExecutor));
        let allowed = vec![PathBuf::from("/work")];
        let err = tool
            .check_path_sandbox("echo hi | tee /tmp/out", Some(Path::new("/work")), &allowed)
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    struct NoopExecutor;

    #[async_trait]
    impl Executor for NoopExecutor {
        async fn execute(
            &self,
            _ctx: &kubeagent_sandbox::executor::ExecCtx,
            command: &str,
            _env: &HashMap<String, String>,
            _workdir: Option<&PathBuf>,
        ) -> Result<kubeagent_sandbox::executor::ExecResult, kubeagent_sandbox::error::ExecutorError>
        {
            Ok(kubeagent_sandbox::executor::ExecResult::success(
                command,
                String::new(),
                String::new(),
            ))
        }

        async fn close(
            &self,
            _ctx: &kubeagent_sandbox::executor::ExecCtx,
        ) -> Result<(), kubeagent_sandbox::error::ExecutorError> {
            Ok(())
        }
    }
}
