//! The structured event envelope carried on the per-session streaming
//! fan-out channel (§4.H "streaming fan-out"). Grounded on the teacher's
//! `agent::events::{AgentEvent, AgentEventKind}`, narrowed to the events
//! spec.md actually describes: text chunks, tool-call request/response,
//! errors, state transitions and compression notices. The teacher's much
//! larger enum (snapshots, delegation, mesh, skills, rate limiting) is not
//! carried; those back out-of-scope collaborator subsystems.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::AgentState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub seq: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub session_id: String,
    pub kind: AgentEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentEventKind {
    TextChunk {
        text: String,
    },
    ToolCallRequest {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolCallResponse {
        id: String,
        result: Value,
        is_error: bool,
    },
    Error {
        message: String,
    },
    StateChanged {
        from: AgentState,
        to: AgentState,
    },
    CompressionStarted,
    CompressionFinished {
        summary_tokens: usize,
    },
}
