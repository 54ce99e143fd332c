//! Crate-wide error type for provider clients and the core data model.

use thiserror::Error;

/// Errors raised by a [`crate::client::Client`]/[`crate::client::Chat`] implementation
/// or by the provider registry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LLMError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider api error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        cause: Option<String>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response schema error: {0}")]
    Schema(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl LLMError {
    /// Whether a retry of the same request is likely to succeed.
    ///
    /// 5xx and transport-level failures are retryable; 4xx responses and
    /// schema/request errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LLMError::Transport(_) => true,
            LLMError::Api { status, .. } => *status >= 500,
            LLMError::InvalidRequest(_)
            | LLMError::Schema(_)
            | LLMError::Json(_)
            | LLMError::UnknownProvider(_)
            | LLMError::Provider(_) => false,
        }
    }
}
