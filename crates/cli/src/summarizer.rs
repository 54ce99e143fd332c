//! The production [`Summarizer`](kubeagent_agent::Summarizer): asks the same
//! backend the session is already talking to for a prose summary of the
//! prefix the compression engine selected. Kept out of `kubeagent-agent`
//! itself so that crate's compression module stays provider-agnostic and
//! testable with a stub.

use std::sync::Arc;

use async_trait::async_trait;

use kubeagent_agent::{AgentError, Summarizer};
use kubeagent_core::client::Client;
use kubeagent_core::message::{Message, MessagePayload, MessageSource};

const SUMMARIZE_SYSTEM_PROMPT: &str = "Summarize the following conversation between a Kubernetes operator and an assistant. Preserve facts, decisions, resource names and open questions; omit pleasantries.";

pub struct ChatSummarizer {
    client: Arc<dyn Client>,
    model: String,
}

impl ChatSummarizer {
    pub fn new(client: Arc<dyn Client>, model: String) -> Self {
        ChatSummarizer { client, model }
    }
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter_map(|m| {
            let line = match &m.payload {
                MessagePayload::Text { text } => text.clone(),
                MessagePayload::ToolCallRequest(req) => {
                    format!("called tool `{}` with {}", req.name, req.arguments)
                }
                MessagePayload::ToolCallResponse(resp) => {
                    format!("tool `{}` returned {}", resp.name, resp.result)
                }
                _ => return None,
            };
            Some(format!("{:?}: {line}", m.source))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String, AgentError> {
        let mut chat = self
            .client
            .initialize(&self.model, Some(SUMMARIZE_SYSTEM_PROMPT), Vec::new())
            .await?;
        let transcript = render_transcript(messages);
        let response = chat
            .send(vec![Message::text(MessageSource::User, transcript)])
            .await?;
        response
            .candidates()
            .first()
            .and_then(|c| c.text())
            .ok_or_else(|| AgentError::Compression("summarizer returned no text".to_string()))
    }
}
