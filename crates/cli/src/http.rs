//! Thin REST surface over sessions plus an SSE event stream per session
//! (§6 "HTTP UI (collaborator)"). Grounded on the teacher's
//! `service::main` (axum `Router` + `tower_http::cors::CorsLayer`,
//! `Sse::new(...).keep_alive(KeepAlive::new())` for the streaming
//! endpoint), narrowed to this system's session CRUD instead of a
//! chat-completion proxy.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use kubeagent_agent::{AgentEventKind, AgentManager, AgentState, SessionStore};

#[derive(Clone)]
struct ApiState {
    manager: Arc<AgentManager>,
    session_store: Arc<dyn SessionStore>,
}

#[derive(Serialize)]
struct SessionSummary {
    id: String,
    name: String,
    #[serde(rename = "providerID")]
    provider_id: String,
    #[serde(rename = "modelID")]
    model_id: String,
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    name: String,
    #[serde(rename = "providerID")]
    provider_id: String,
    #[serde(rename = "modelID")]
    model_id: String,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    message: String,
}

pub async fn serve(
    addr: String,
    manager: Arc<AgentManager>,
    session_store: Arc<dyn SessionStore>,
) -> anyhow::Result<()> {
    let state = ApiState {
        manager,
        session_store,
    };

    let app = Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", delete(delete_session))
        .route("/api/sessions/{id}/stream", get(stream_session))
        .route("/api/sessions/{id}/send-message", post(send_message))
        .route("/api/sessions/{id}/choose-option", post(send_message))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("kubeagent HTTP UI listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list_sessions(State(state): State<ApiState>) -> impl IntoResponse {
    match state.session_store.list().await {
        Ok(sessions) => {
            let body: Vec<SessionSummary> = sessions
                .into_iter()
                .map(|s| SessionSummary {
                    id: s.id,
                    name: s.name,
                    provider_id: s.provider_id,
                    model_id: s.model_id,
                })
                .collect();
            Json(body).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn create_session(
    State(state): State<ApiState>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    match state
        .session_store
        .create(req.name, req.provider_id, req.model_id)
        .await
    {
        Ok(session) => (
            StatusCode::CREATED,
            Json(SessionSummary {
                id: session.id,
                name: session.name,
                provider_id: session.provider_id,
                model_id: session.model_id,
            }),
        )
            .into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

async fn delete_session(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    state.manager.delete(&id);
    match state.session_store.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
    }
}

async fn send_message(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let agent = match state.manager.get(&id).await {
        Ok(agent) => agent,
        Err(err) => return (StatusCode::NOT_FOUND, err.to_string()).into_response(),
    };
    match agent.handle_user_input(req.message).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// SSE of `{messages, agentState, sessionId}` snapshots, one per
/// [`AgentEventKind`] that changes visible state. Tool call arguments/
/// results and text chunks are folded into a flat `messages` array rather
/// than replaying the full chat store on every event.
async fn stream_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let agent = state
        .manager
        .get(&id)
        .await
        .map_err(|err| (StatusCode::NOT_FOUND, err.to_string()))?;

    let mut events = agent
        .take_event_receiver()
        .await
        .ok_or((StatusCode::CONFLICT, "session already has a subscriber".to_string()))?;

    struct StreamState {
        events: tokio::sync::mpsc::UnboundedReceiver<kubeagent_agent::AgentEvent>,
        messages: Vec<serde_json::Value>,
        agent_state: AgentState,
        session_id: String,
    }

    let seed = StreamState {
        events,
        messages: Vec::new(),
        agent_state: AgentState::Idle,
        session_id: id,
    };

    let stream = stream::unfold(seed, |mut state| async move {
        let event = state.events.recv().await?;
        match &event.kind {
            AgentEventKind::TextChunk { text } => {
                state.messages.push(json!({"type": "text", "text": text}));
            }
            AgentEventKind::ToolCallRequest { id, name, arguments } => {
                state.messages.push(json!({
                    "type": "tool_call_request", "id": id, "name": name, "arguments": arguments,
                }));
            }
            AgentEventKind::ToolCallResponse { id, result, is_error } => {
                state.messages.push(json!({
                    "type": "tool_call_response", "id": id, "result": result, "isError": is_error,
                }));
            }
            AgentEventKind::Error { message } => {
                state.messages.push(json!({"type": "error", "message": message}));
            }
            AgentEventKind::StateChanged { to, .. } => {
                state.agent_state = *to;
            }
            AgentEventKind::CompressionStarted | AgentEventKind::CompressionFinished { .. } => {}
        }

        let snapshot = json!({
            "sessionId": state.session_id,
            "agentState": state.agent_state,
            "messages": state.messages,
        });
        let sse_event = Event::default()
            .json_data(snapshot)
            .unwrap_or_else(|_| Event::default());
        Some((Ok(sse_event), state))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
