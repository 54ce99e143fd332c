//! Command-line collaborator (§6 "CLI"): parses `--provider`/`--model`/
//! `--session-backend`/`--listen`, wires the shared session/tool/compression
//! stack into an [`AgentManager`], and hands off to either the line-oriented
//! REPL or the HTTP UI. Grounded on the teacher's `cli::main` (clap-derive
//! args, `setup_logging`/`env_logger::init` before anything else, provider
//! registration before resolving a client).

mod config;
mod http;
mod repl;
mod summarizer;
mod tool_context;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use kubeagent_agent::{
    AgentManager, BashTool, CompressionConfig, CompressionEngine, FilesystemSessionStore,
    InMemorySessionStore, SessionStore, ToolRegistry,
};
use kubeagent_core::error::LLMError;
use kubeagent_core::tokens::DefaultTokenEstimator;
use kubeagent_sandbox::local::LocalExecutor;

use summarizer::ChatSummarizer;
use tool_context::CliToolContext;

/// A session's message history lives entirely in the process and disappears
/// on exit, or on disk under `--session-dir` as `metadata.yaml` + JSONL
/// history per session (§6 "Persisted state").
#[derive(Clone, Copy, Debug, ValueEnum)]
enum SessionBackend {
    Memory,
    Filesystem,
}

/// Default token budget fed to the compression engine when the user hasn't
/// pinned one; most provider context windows in practice exceed this, but
/// it keeps a session usable without per-provider tuning.
const DEFAULT_MAX_TOKENS: usize = 100_000;

#[derive(Parser, Debug)]
#[command(name = "kubeagent", about = "Interactive, tool-using assistant for Kubernetes operators")]
struct Args {
    /// LLM backend name (`anthropic` or `nirmata`).
    #[arg(long)]
    provider: String,

    /// Model id. Falls back to the provider's own env var if omitted.
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    skip_verify_ssl: bool,

    #[arg(long, value_enum, default_value = "memory")]
    session_backend: SessionBackend,

    /// Base directory for the filesystem session backend. Defaults to
    /// `~/.kubeagent/sessions`.
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Bind address to serve the HTTP UI on, e.g. `127.0.0.1:8787`. Without
    /// this flag, runs the stdin/stdout REPL instead.
    #[arg(long)]
    listen: Option<String>,

    /// Name for a newly created session.
    #[arg(long, default_value = "session")]
    session_name: String,
}

fn default_session_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kubeagent")
        .join("sessions")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    kubeagent_provider_anthropic::register();
    kubeagent_provider_nirmata::register();

    let mut client_options = config::resolve_client_options(&args.provider)?;
    client_options.skip_verify_ssl = args.skip_verify_ssl;
    if let Some(model) = &args.model {
        client_options.model = Some(model.clone());
    }
    let model = client_options
        .model
        .clone()
        .ok_or_else(|| LLMError::InvalidRequest("no --model given and no provider default set".into()))?;

    let session_store: Arc<dyn SessionStore> = match args.session_backend {
        SessionBackend::Memory => Arc::new(InMemorySessionStore::new()),
        SessionBackend::Filesystem => {
            let dir = args.session_dir.unwrap_or_else(default_session_dir);
            Arc::new(FilesystemSessionStore::new(dir))
        }
    };

    let mut tool_registry = ToolRegistry::new();
    tool_registry.register(Arc::new(BashTool::new(Arc::new(LocalExecutor::new()))));
    let tool_registry = Arc::new(tool_registry);

    let estimator = Arc::new(DefaultTokenEstimator);

    let provider_name = args.provider.clone();
    let client_factory_options = client_options.clone();
    let client_factory = Arc::new(move |_provider_id: &str| {
        kubeagent_core::registry::new_client(&provider_name, &client_factory_options)
            .map_err(kubeagent_agent::AgentError::from)
    });

    let tool_context_factory = Arc::new(|session: &kubeagent_agent::Session| {
        Arc::new(CliToolContext::new(session.id.clone(), None, Vec::new()))
            as Arc<dyn kubeagent_agent::ToolContext>
    });

    let summarizer_client = kubeagent_core::registry::new_client(&args.provider, &client_options)?;
    let summarizer = Arc::new(ChatSummarizer::new(summarizer_client, model.clone()));
    let compression = Arc::new(CompressionEngine::new(
        CompressionConfig::new(DEFAULT_MAX_TOKENS),
        estimator.clone(),
        summarizer,
    ));

    let manager = Arc::new(AgentManager::new(
        session_store.clone(),
        tool_registry,
        compression,
        estimator,
        client_factory,
        tool_context_factory,
    ));

    let session = session_store
        .create(args.session_name.clone(), args.provider.clone(), model)
        .await?;

    match args.listen {
        Some(addr) => http::serve(addr, manager, session_store).await,
        None => repl::run(manager, session.id).await,
    }
}
