//! Agent Manager (§4.I): the map `session_id -> Agent`, constructing agents
//! lazily from a session's persisted metadata and wiring in the shared
//! provider/tool/compression dependencies. Grounded on the teacher's
//! `agent::session_registry::SessionRegistry`, narrowed from its actor-mesh
//! routing to a plain in-process map since remote/mesh session routing is
//! out of scope here.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use kubeagent_core::client::Client;
use kubeagent_core::tokens::TokenEstimator;

use crate::agent::Agent;
use crate::compression::CompressionEngine;
use crate::error::AgentError;
use crate::store::{Session, SessionStore};
use crate::tools::{ToolContext, ToolRegistry};

/// Builds a [`Client`] for a session's stored `provider_id`. In practice
/// this wraps [`kubeagent_core::registry::new_client`] plus whatever
/// per-provider `ClientOptions` the caller resolved from configuration/env.
pub type ClientFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn Client>, AgentError> + Send + Sync>;

/// Builds the [`ToolContext`] a session's agent hands to every tool call
/// (cwd, allowed directories, sandbox executor).
pub type ToolContextFactory = Arc<dyn Fn(&Session) -> Arc<dyn ToolContext> + Send + Sync>;

type OnAgentCreated = Box<dyn Fn(&Arc<Agent>) + Send + Sync>;

/// Owns every active session's [`Agent`]. `get` constructs and starts one
/// lazily from the [`SessionStore`]; `delete` cancels and drops it. §5's
/// concurrency model: exclusive write / shared read over the map, with
/// `on_agent_created` callbacks fired outside the write lock.
pub struct AgentManager {
    agents: RwLock<HashMap<String, Arc<Agent>>>,
    session_store: Arc<dyn SessionStore>,
    tool_registry: Arc<ToolRegistry>,
    compression: Arc<CompressionEngine>,
    estimator: Arc<dyn TokenEstimator>,
    client_factory: ClientFactory,
    tool_context_factory: ToolContextFactory,
    on_agent_created: RwLock<Vec<OnAgentCreated>>,
}

impl AgentManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        tool_registry: Arc<ToolRegistry>,
        compression: Arc<CompressionEngine>,
        estimator: Arc<dyn TokenEstimator>,
        client_factory: ClientFactory,
        tool_context_factory: ToolContextFactory,
    ) -> Self {
        AgentManager {
            agents: RwLock::new(HashMap::new()),
            session_store,
            tool_registry,
            compression,
            estimator,
            client_factory,
            tool_context_factory,
            on_agent_created: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener fired every time a new [`Agent`] is constructed
    /// (the HTTP UI collaborator surface attaches its event-forwarding
    /// subscriber this way). Must return quickly: it runs synchronously,
    /// just after the manager's write lock over the agent map is released.
    pub fn on_agent_created(&self, callback: impl Fn(&Arc<Agent>) + Send + Sync + 'static) {
        self.on_agent_created.write().push(Box::new(callback));
    }

    /// Returns the existing agent for `session_id`, or constructs one from
    /// the stored session and starts tracking it.
    pub async fn get(&self, session_id: &str) -> Result<Arc<Agent>, AgentError> {
        if let Some(agent) = self.agents.read().get(session_id).cloned() {
            return Ok(agent);
        }

        let session = self.session_store.get(session_id).await?;
        let client = (self.client_factory)(&session.provider_id)?;
        let tool_context = (self.tool_context_factory)(&session);

        let agent = Arc::new(
            Agent::new(
                session.id.clone(),
                session.model_id.clone(),
                client,
                session.chat_store.clone(),
                self.session_store.clone(),
                self.tool_registry.clone(),
                tool_context,
                self.compression.clone(),
                self.estimator.clone(),
            )
            .await?,
        );

        // Two concurrent misses can both construct an agent for the same
        // session; the loser's is discarded in favor of whichever wins the
        // map insert, so callers always converge on one shared instance.
        let agent = {
            let mut agents = self.agents.write();
            agents
                .entry(session_id.to_string())
                .or_insert(agent)
                .clone()
        };

        for callback in self.on_agent_created.read().iter() {
            callback(&agent);
        }

        Ok(agent)
    }

    /// Cancels and drops the agent for `session_id`, if one is running. The
    /// underlying [`Session`]/message history are untouched.
    pub fn delete(&self, session_id: &str) {
        if let Some(agent) = self.agents.write().remove(session_id) {
            agent.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CompressionConfig, Summarizer};
    use crate::store::InMemorySessionStore;
    use async_trait::async_trait;
    use kubeagent_core::chat::{ChatResponse, FunctionDefinition, StreamItem};
    use kubeagent_core::client::Chat;
    use kubeagent_core::error::LLMError;
    use kubeagent_core::message::Message;
    use kubeagent_core::tokens::DefaultTokenEstimator;
    use kubeagent_sandbox::executor::ExecCtx;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubChat;

    #[async_trait]
    impl Chat for StubChat {
        fn set_function_definitions(&mut self, _defs: Vec<FunctionDefinition>) {}
        async fn send(&mut self, _new_messages: Vec<Message>) -> Result<ChatResponse, LLMError> {
            unimplemented!()
        }
        async fn send_streaming(
            &mut self,
            _new_messages: Vec<Message>,
        ) -> Result<futures::stream::BoxStream<'static, Result<StreamItem, LLMError>>, LLMError>
        {
            Ok(Box::pin(futures::stream::iter(vec![Ok(StreamItem::Done)])))
        }
    }

    struct StubClient;

    #[async_trait]
    impl Client for StubClient {
        async fn initialize(
            &self,
            _model: &str,
            _system_prompt: Option<&str>,
            _history: Vec<Message>,
        ) -> Result<Box<dyn Chat>, LLMError> {
            Ok(Box::new(StubChat))
        }
    }

    struct NoopContext;

    #[async_trait]
    impl ToolContext for NoopContext {
        fn session_id(&self) -> &str {
            "s"
        }
        fn cwd(&self) -> Option<&Path> {
            None
        }
        fn exec_ctx(&self) -> &ExecCtx {
            static CTX: std::sync::OnceLock<ExecCtx> = std::sync::OnceLock::new();
            CTX.get_or_init(ExecCtx::new)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    struct StubSummarizer;

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> Result<String, AgentError> {
            Ok("summary".into())
        }
    }

    fn test_manager() -> AgentManager {
        let estimator = Arc::new(DefaultTokenEstimator);
        AgentManager::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(ToolRegistry::new()),
            Arc::new(CompressionEngine::new(
                CompressionConfig::new(100_000),
                estimator.clone(),
                Arc::new(StubSummarizer),
            )),
            estimator,
            Arc::new(|_provider_id: &str| Ok(Arc::new(StubClient) as Arc<dyn Client>)),
            Arc::new(|_session: &Session| Arc::new(NoopContext) as Arc<dyn ToolContext>),
        )
    }

    #[tokio::test]
    async fn get_constructs_and_caches_one_agent_per_session() {
        let manager = test_manager();
        let session = manager
            .session_store
            .create("demo".into(), "stub".into(), "m".into())
            .await
            .unwrap();

        let first = manager.get(&session.id).await.unwrap();
        let second = manager.get(&session.id).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn get_unknown_session_errors() {
        let manager = test_manager();
        let err = manager.get("does-not-exist").await.unwrap_err();
        assert!(matches!(err, AgentError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_the_cached_agent() {
        let manager = test_manager();
        let session = manager
            .session_store
            .create("demo".into(), "stub".into(), "m".into())
            .await
            .unwrap();
        let first = manager.get(&session.id).await.unwrap();
        manager.delete(&session.id);

        let second = manager.get(&session.id).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn on_agent_created_fires_for_new_agents_only() {
        let manager = test_manager();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        manager.on_agent_created(move |_agent| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let session = manager
            .session_store
            .create("demo".into(), "stub".into(), "m".into())
            .await
            .unwrap();
        manager.get(&session.id).await.unwrap();
        manager.get(&session.id).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
