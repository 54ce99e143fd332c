//! The provider-facing trait contract every backend (Anthropic, Nirmata,
//! ...) implements. Grounded on `querymt::chat::ChatProvider`, narrowed to
//! the uniform surface this system's agent loop actually drives.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::chat::{ChatResponse, FunctionDefinition, StreamItem};
use crate::error::LLMError;
use crate::message::Message;

/// Options used to construct a provider client. Each provider interprets
/// the fields it understands (api key, base url, model) and ignores the
/// rest.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub skip_verify_ssl: bool,
}

/// A provider client: the long-lived object a [`crate::registry`] factory
/// returns. Its only job is to mint [`Chat`] sessions.
#[async_trait]
pub trait Client: Send + Sync {
    /// Begin a new chat session bound to `model`, replaying `history` (used
    /// when resuming a persisted session or re-initializing after
    /// compression, per spec §4.G).
    async fn initialize(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        history: Vec<Message>,
    ) -> Result<Box<dyn Chat>, LLMError>;

    /// Model ids this backend exposes, if it has a discovery endpoint.
    /// Defaults to empty: most providers here are configured with a single
    /// fixed model and have nothing to list.
    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        Ok(Vec::new())
    }
}

/// A single provider chat session. Implementations own whatever
/// provider-native history representation they need internally; `messages`
/// passed to `send`/`send_streaming` are the *new* turn content only — the
/// provider is responsible for appending to its own history on success.
#[async_trait]
pub trait Chat: Send + Sync {
    fn set_function_definitions(&mut self, defs: Vec<FunctionDefinition>);

    /// Send `new_messages` and block for the complete response.
    async fn send(&mut self, new_messages: Vec<Message>) -> Result<ChatResponse, LLMError>;

    /// Send `new_messages` and stream back normalized items as they arrive.
    /// The returned stream is exhausted before the provider's internal
    /// history is considered updated.
    async fn send_streaming(
        &mut self,
        new_messages: Vec<Message>,
    ) -> Result<BoxStream<'static, Result<StreamItem, LLMError>>, LLMError>;

    /// Whether an error returned by `send`/`send_streaming` is worth
    /// retrying unchanged.
    fn is_retryable_error(&self, err: &LLMError) -> bool {
        err.is_retryable()
    }
}
