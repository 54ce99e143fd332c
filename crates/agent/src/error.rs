//! Crate-wide error type for session stores, the compression engine, the
//! agent loop and the agent manager. Grounded on the teacher's per-crate
//! `thiserror` enum convention (`session::error::SessionError`,
//! `agent::tools::context::ToolError`).

use thiserror::Error;

use kubeagent_core::error::LLMError;

use crate::tools::ToolError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("provider error: {0}")]
    Provider(#[from] LLMError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("turn cancelled")]
    Cancelled,
}
