//! The reason-act agent loop (§4.H): a six-state machine driving one
//! provider `Chat` session through user turns, tool dispatch, and
//! compression. Grounded structurally on the teacher's
//! `agent::execution::execute_cycle_state_machine` explicit-state-enum loop,
//! narrowed from the teacher's `ExecutionState` (which adds middleware-driver
//! stages for snapshots, delegation and skills) to spec.md's six states with
//! no intermediate stages, and on `agent::execution::tool_calls` for the
//! per-call dispatch/result wrapping shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use kubeagent_core::chat::{FunctionCall, StreamItem};
use kubeagent_core::client::{Chat, Client};
use kubeagent_core::message::{
    Message, MessagePayload, MessageSource, ToolCallRequest, ToolCallResponse, ToolCallStatus,
};
use kubeagent_core::tokens::TokenEstimator;
use kubeagent_sandbox::executor::ExecCtx;

use crate::compression::CompressionEngine;
use crate::error::AgentError;
use crate::events::{AgentEvent, AgentEventKind};
use crate::store::{ChatMessageStore, SessionStore};
use crate::tools::{Tool, ToolContext, ToolRegistry};

/// Default per-turn cap on successive tool-dispatch iterations (§4.H step 7).
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 25;

/// The agent's six states, matching spec.md's state-transition diagram
/// one-to-one. `idle`/`exited` double as terminal markers for cancel/exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Initializing,
    Running,
    WaitingForInput,
    Done,
    Exited,
}

impl Default for AgentState {
    fn default() -> Self {
        AgentState::Idle
    }
}

/// One active session's agent: a provider chat session, its message store,
/// the shared tool registry and compression engine, and the event channel
/// the UI drains (§4.H "streaming fan-out").
pub struct Agent {
    session_id: String,
    model: Mutex<String>,
    state: Mutex<AgentState>,
    client: Arc<dyn Client>,
    chat: tokio::sync::Mutex<Box<dyn Chat>>,
    chat_store: Arc<dyn ChatMessageStore>,
    session_store: Arc<dyn SessionStore>,
    tool_registry: Arc<ToolRegistry>,
    tool_context: Arc<dyn ToolContext>,
    compression: Arc<CompressionEngine>,
    estimator: Arc<dyn TokenEstimator>,
    max_tool_iterations: usize,
    /// Reset to a fresh token at the start of every turn (§4.H
    /// "Cancellation"): a cancel issued against a finished or not-yet-
    /// started turn must not brick the next one.
    exec_ctx: Mutex<ExecCtx>,
    events_tx: mpsc::UnboundedSender<AgentEvent>,
    events_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
    seq: AtomicU64,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        session_id: String,
        model: String,
        client: Arc<dyn Client>,
        chat_store: Arc<dyn ChatMessageStore>,
        session_store: Arc<dyn SessionStore>,
        tool_registry: Arc<ToolRegistry>,
        tool_context: Arc<dyn ToolContext>,
        compression: Arc<CompressionEngine>,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, AgentError> {
        let history = chat_store.list().await?;
        let mut chat = client.initialize(&model, None, history).await?;
        chat.set_function_definitions(tool_registry.function_definitions());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Agent {
            session_id,
            model: Mutex::new(model),
            state: Mutex::new(AgentState::Idle),
            client,
            chat: tokio::sync::Mutex::new(chat),
            chat_store,
            session_store,
            tool_registry,
            tool_context,
            compression,
            estimator,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            exec_ctx: Mutex::new(ExecCtx::new()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(Some(events_rx)),
            seq: AtomicU64::new(0),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> AgentState {
        *self.state.lock()
    }

    /// Takes ownership of this agent's event stream. Returns `None` if
    /// already taken (only one consumer drains a session's events at a
    /// time; a second UI attaching mid-session gets nothing new).
    pub async fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<AgentEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Cancel the in-flight turn, if any. No further history is appended
    /// after cancel except whatever error/summary record the aborted turn
    /// itself emits (§4.H "Cancellation"). A fresh cancellation token is
    /// minted at the start of the next turn, so cancelling an idle agent is
    /// a harmless no-op rather than a permanent wedge.
    pub fn cancel(&self) {
        self.exec_ctx.lock().cancel.cancel();
        self.set_state(AgentState::Idle);
    }

    pub fn exit(&self) {
        self.exec_ctx.lock().cancel.cancel();
        self.set_state(AgentState::Exited);
    }

    fn is_cancelled(&self) -> bool {
        self.exec_ctx.lock().cancel.is_cancelled()
    }

    fn set_state(&self, new: AgentState) {
        let old = {
            let mut guard = self.state.lock();
            let old = *guard;
            *guard = new;
            old
        };
        if old != new {
            self.emit(AgentEventKind::StateChanged { from: old, to: new });
        }
    }

    fn emit(&self, kind: AgentEventKind) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let event = AgentEvent {
            seq,
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            kind,
        };
        // The UI may have gone away (no receiver taken yet, or dropped); a
        // send failure here is not the turn's problem.
        let _ = self.events_tx.send(event);
    }

    /// Entry point for one line of user input: either a meta-command
    /// (§4.H "Meta-commands") or a full turn through the reason-act loop.
    pub async fn handle_user_input(&self, input: String) -> Result<(), AgentError> {
        if self.state() == AgentState::Exited {
            return Err(AgentError::InvalidTransition(
                "session has exited".to_string(),
            ));
        }

        match input.trim() {
            "clear" => return self.meta_clear().await,
            "exit" => {
                self.exit();
                return Ok(());
            }
            "model" => {
                self.emit(AgentEventKind::TextChunk {
                    text: self.model.lock().clone(),
                });
                return Ok(());
            }
            "models" => {
                let models = self.client.list_models().await?;
                self.emit(AgentEventKind::TextChunk {
                    text: models.join(", "),
                });
                return Ok(());
            }
            "tools" => {
                self.emit(AgentEventKind::TextChunk {
                    text: self.tool_registry.names().join(", "),
                });
                return Ok(());
            }
            "session" => {
                let session = self.session_store.get(&self.session_id).await?;
                self.emit(AgentEventKind::TextChunk {
                    text: format!(
                        "{} ({}/{}), created {}, last modified {}",
                        session.name,
                        session.provider_id,
                        session.model_id,
                        session.created_at,
                        session.last_modified
                    ),
                });
                return Ok(());
            }
            "sessions" => {
                let sessions = self.session_store.list().await?;
                let summary = sessions
                    .iter()
                    .map(|s| format!("{} ({})", s.id, s.name))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.emit(AgentEventKind::TextChunk { text: summary });
                return Ok(());
            }
            _ => {}
        }

        self.run_turn(input).await
    }

    async fn meta_clear(&self) -> Result<(), AgentError> {
        self.chat_store.clear().await?;
        let model = self.model.lock().clone();
        let mut chat = self.chat.lock().await;
        *chat = self.client.initialize(&model, None, Vec::new()).await?;
        chat.set_function_definitions(self.tool_registry.function_definitions());
        Ok(())
    }

    /// The turn algorithm (§4.H steps 1-7).
    async fn run_turn(&self, input: String) -> Result<(), AgentError> {
        let turn_span = tracing::info_span!("turn", session_id = %self.session_id);
        let _enter = turn_span.enter();

        *self.exec_ctx.lock() = ExecCtx::new();
        self.set_state(AgentState::Initializing);

        // Step 1: append the user turn.
        let user_message = Message::text(MessageSource::User, input);
        self.chat_store.append(user_message.clone()).await?;

        // Step 2: compression check, re-initializing the provider chat on a
        // successful compaction.
        let history = self.chat_store.list().await?;
        if self.compression.should_compress(&history) {
            self.emit(AgentEventKind::CompressionStarted);
            match self.compression.compress(&history).await {
                Ok(new_history) => {
                    let summary_tokens = new_history
                        .first()
                        .map(|m| self.estimator.estimate(std::slice::from_ref(m)))
                        .unwrap_or(0);
                    self.chat_store.replace_all(new_history.clone()).await?;
                    let model = self.model.lock().clone();
                    let mut chat = self.chat.lock().await;
                    *chat = self.client.initialize(&model, None, new_history).await?;
                    chat.set_function_definitions(self.tool_registry.function_definitions());
                    drop(chat);
                    self.emit(AgentEventKind::CompressionFinished { summary_tokens });
                }
                Err(e) => {
                    log::warn!("compression failed, continuing with uncompressed history: {e}");
                    self.emit(AgentEventKind::Error {
                        message: format!("compression failed: {e}"),
                    });
                }
            }
        }

        self.set_state(AgentState::Running);

        let mut next_contents = vec![user_message];
        let mut iterations = 0usize;

        loop {
            if self.is_cancelled() {
                self.set_state(AgentState::Idle);
                return Err(AgentError::Cancelled);
            }
            if iterations >= self.max_tool_iterations {
                let message =
                    "maximum tool-dispatch iterations exceeded for this turn".to_string();
                self.emit(AgentEventKind::Error {
                    message: message.clone(),
                });
                self.chat_store
                    .append(Message::new(
                        MessageSource::Agent,
                        MessagePayload::Error { message },
                    ))
                    .await?;
                self.set_state(AgentState::WaitingForInput);
                return Ok(());
            }
            iterations += 1;

            // Step 3/4: stream the next response.
            let (assistant_text, pending_calls) = self.stream_once(next_contents).await?;

            if pending_calls.is_empty() {
                // Step 6: no tool calls, the turn is done.
                if !assistant_text.is_empty() {
                    self.chat_store
                        .append(Message::text(MessageSource::Model, assistant_text))
                        .await?;
                }
                self.set_state(AgentState::WaitingForInput);
                return Ok(());
            }

            // Step 5: dispatch every pending call, then loop back to step 3
            // with the results as the next turn content.
            next_contents = self.dispatch_tool_calls(pending_calls).await?;
        }
    }

    /// Runs one `send_streaming` call to completion, emitting text chunks
    /// and tool-call-request events as they arrive.
    async fn stream_once(
        &self,
        contents: Vec<Message>,
    ) -> Result<(String, Vec<FunctionCall>), AgentError> {
        let mut chat = self.chat.lock().await;
        let mut stream = chat.send_streaming(contents).await?;

        let mut assistant_text = String::new();
        let mut pending_calls = Vec::new();

        while let Some(item) = stream.next().await {
            if self.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            match item? {
                StreamItem::TextDelta(delta) => {
                    self.emit(AgentEventKind::TextChunk {
                        text: delta.clone(),
                    });
                    assistant_text.push_str(&delta);
                }
                StreamItem::FunctionCall(call) => {
                    self.emit(AgentEventKind::ToolCallRequest {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    });
                    pending_calls.push(call);
                }
                StreamItem::Usage(_) => {}
                StreamItem::Done => break,
            }
        }

        Ok((assistant_text, pending_calls))
    }

    /// Step 5a-5b: append request messages, dispatch each call through the
    /// registry, and append response messages. Returns the response messages
    /// as the next turn's content.
    async fn dispatch_tool_calls(
        &self,
        calls: Vec<FunctionCall>,
    ) -> Result<Vec<Message>, AgentError> {
        for call in &calls {
            self.chat_store
                .append(Message::new(
                    MessageSource::Model,
                    MessagePayload::ToolCallRequest(ToolCallRequest {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    }),
                ))
                .await?;
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let (result, status) = match self.tool_registry.find(&call.name) {
                Some(tool) => self.run_one_tool(tool.as_ref(), &call).await,
                None => (
                    serde_json::json!({ "error": format!("unknown tool: {}", call.name) }),
                    ToolCallStatus::Error,
                ),
            };

            self.emit(AgentEventKind::ToolCallResponse {
                id: call.id.clone(),
                result: result.clone(),
                is_error: status == ToolCallStatus::Error,
            });

            let response = Message::new(
                MessageSource::Agent,
                MessagePayload::ToolCallResponse(ToolCallResponse {
                    id: call.id,
                    name: call.name,
                    result,
                    status: Some(status),
                }),
            );
            self.chat_store.append(response.clone()).await?;
            results.push(response);
        }

        Ok(results)
    }

    async fn run_one_tool(
        &self,
        tool: &dyn Tool,
        call: &FunctionCall,
    ) -> (serde_json::Value, ToolCallStatus) {
        match tool
            .run(self.tool_context.as_ref(), call.arguments.clone())
            .await
        {
            Ok(value) => (value, ToolCallStatus::Ok),
            Err(e) => (
                serde_json::json!({ "error": e.to_string() }),
                ToolCallStatus::Error,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CompressionConfig, CompressionEngine, Summarizer};
    use crate::store::InMemoryMessageStore;
    use crate::store::InMemorySessionStore;
    use crate::tools::ToolError;
    use async_trait::async_trait;
    use kubeagent_core::chat::{ChatResponse, FunctionDefinition};
    use kubeagent_core::error::LLMError;
    use kubeagent_core::tokens::DefaultTokenEstimator;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    struct StubChat {
        turns: Arc<Mutex<Vec<StreamItem>>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Chat for StubChat {
        fn set_function_definitions(&mut self, _defs: Vec<FunctionDefinition>) {}

        async fn send(&mut self, _new_messages: Vec<Message>) -> Result<ChatResponse, LLMError> {
            unimplemented!("tests only exercise send_streaming")
        }

        async fn send_streaming(
            &mut self,
            _new_messages: Vec<Message>,
        ) -> Result<futures::stream::BoxStream<'static, Result<StreamItem, LLMError>>, LLMError>
        {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items = self.turns.lock().clone();
            Ok(Box::pin(futures::stream::iter(items.into_iter().map(Ok))))
        }
    }

    struct StubClient {
        turns: Arc<Mutex<Vec<StreamItem>>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Client for StubClient {
        async fn initialize(
            &self,
            _model: &str,
            _system_prompt: Option<&str>,
            _history: Vec<Message>,
        ) -> Result<Box<dyn Chat>, LLMError> {
            Ok(Box::new(StubChat {
                turns: self.turns.clone(),
                calls: self.calls.clone(),
            }))
        }

        async fn list_models(&self) -> Result<Vec<String>, LLMError> {
            Ok(vec!["stub-model".to_string()])
        }
    }

    struct NoopContext;

    #[async_trait]
    impl ToolContext for NoopContext {
        fn session_id(&self) -> &str {
            "test-session"
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

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its arguments"
        }
        fn function_definition(&self) -> FunctionDefinition {
            FunctionDefinition {
                name: "echo".into(),
                description: "echoes its arguments".into(),
                parameter_schema: serde_json::json!({"type": "object"}),
            }
        }
        async fn run(
            &self,
            _ctx: &dyn ToolContext,
            args: serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(args)
        }
        fn is_interactive(&self, _args: &serde_json::Value) -> bool {
            false
        }
        fn check_modifies_resource(
            &self,
            _args: &serde_json::Value,
        ) -> crate::tools::ModifiesResource {
            crate::tools::ModifiesResource::No
        }
    }

    struct StubSummarizer;

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> Result<String, AgentError> {
            Ok("summary".to_string())
        }
    }

    async fn build_agent(
        turns: Vec<StreamItem>,
        max_tokens: usize,
    ) -> (Agent, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = Arc::new(StubClient {
            turns: Arc::new(Mutex::new(turns)),
            calls: calls.clone(),
        });
        let chat_store = Arc::new(InMemoryMessageStore::new());
        let session_store = Arc::new(InMemorySessionStore::new());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let estimator = Arc::new(DefaultTokenEstimator);
        let compression = Arc::new(CompressionEngine::new(
            CompressionConfig::new(max_tokens),
            estimator.clone(),
            Arc::new(StubSummarizer),
        ));

        let agent = Agent::new(
            "test-session".into(),
            "stub-model".into(),
            client,
            chat_store,
            session_store,
            Arc::new(registry),
            Arc::new(NoopContext),
            compression,
            estimator,
        )
        .await
        .unwrap();

        (agent, calls)
    }

    #[tokio::test]
    async fn final_text_transitions_to_waiting_for_input() {
        let (agent, _calls) = build_agent(
            vec![
                StreamItem::TextDelta("hello".into()),
                StreamItem::Done,
            ],
            100_000,
        )
        .await;

        agent.handle_user_input("hi".into()).await.unwrap();
        assert_eq!(agent.state(), AgentState::WaitingForInput);
    }

    #[tokio::test]
    async fn tool_call_round_trips_through_registry() {
        let (agent, calls) = build_agent(
            vec![
                StreamItem::FunctionCall(FunctionCall {
                    id: "call-1".into(),
                    name: "echo".into(),
                    arguments: serde_json::json!({"x": 1}),
                }),
                StreamItem::Done,
            ],
            100_000,
        )
        .await;

        agent.handle_user_input("use the tool".into()).await.unwrap();
        // Every iteration re-sends; this single-call stream never terminates
        // without pending calls, so it runs until the iteration cap.
        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(agent.state(), AgentState::WaitingForInput);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_as_error_status() {
        let (agent, _calls) = build_agent(
            vec![
                StreamItem::FunctionCall(FunctionCall {
                    id: "call-1".into(),
                    name: "does-not-exist".into(),
                    arguments: serde_json::json!({}),
                }),
                StreamItem::TextDelta("done".into()),
                StreamItem::Done,
            ],
            100_000,
        )
        .await;
        let mut rx = agent.take_event_receiver().await.unwrap();
        agent.handle_user_input("go".into()).await.unwrap();

        let mut saw_error_response = false;
        while let Ok(event) = rx.try_recv() {
            if let AgentEventKind::ToolCallResponse { is_error, .. } = event.kind {
                saw_error_response |= is_error;
            }
        }
        assert!(saw_error_response);
    }

    #[tokio::test]
    async fn meta_command_tools_lists_registered_tools() {
        let (agent, _calls) = build_agent(vec![StreamItem::Done], 100_000).await;
        let mut rx = agent.take_event_receiver().await.unwrap();
        agent.handle_user_input("tools".into()).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.kind,
            AgentEventKind::TextChunk { text } if text == "echo"
        ));
    }

    #[tokio::test]
    async fn meta_command_exit_transitions_to_exited() {
        let (agent, _calls) = build_agent(vec![StreamItem::Done], 100_000).await;
        agent.handle_user_input("exit".into()).await.unwrap();
        assert_eq!(agent.state(), AgentState::Exited);

        let err = agent.handle_user_input("hi".into()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn cancel_resets_to_idle_without_blocking_the_next_turn() {
        let (agent, _calls) = build_agent(
            vec![StreamItem::TextDelta("hi".into()), StreamItem::Done],
            100_000,
        )
        .await;
        agent.cancel();
        assert_eq!(agent.state(), AgentState::Idle);

        // A fresh cancellation token is minted per turn, so a cancel issued
        // while idle must not wedge the next turn.
        agent.handle_user_input("hi".into()).await.unwrap();
        assert_eq!(agent.state(), AgentState::WaitingForInput);
    }
}
