//! The session message model shared by every component that reads or writes
//! conversation history: stores, the compression engine, providers, and the
//! agent loop.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    User,
    Model,
    Agent,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Status of a completed tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Ok,
    Error,
}

/// The result of running a tool, threaded back to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub name: String,
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
}

/// A single option offered in a [`MessagePayload::UserChoiceRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
}

/// Polymorphic message content, internally tagged by a `type` field so each
/// variant round-trips unambiguously even when two variants share a shape
/// (`Text` and `UserInputResponse` are both a bare `{ text }`; without the
/// tag, untagged matching would always resolve a deserialized
/// `UserInputResponse` back to whichever shares its shape and is declared
/// first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Text { text: String },
    ToolCallRequest(ToolCallRequest),
    ToolCallResponse(ToolCallResponse),
    Error { message: String },
    UserInputRequest { prompt: String },
    UserInputResponse { text: String },
    UserChoiceRequest { prompt: String, options: Vec<ChoiceOption> },
    UserChoiceResponse { label: String },
}

/// The discriminant naming a message's payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    ToolCallRequest,
    ToolCallResponse,
    Error,
    UserInputRequest,
    UserInputResponse,
    UserChoiceRequest,
    UserChoiceResponse,
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Text { .. } => MessageType::Text,
            MessagePayload::ToolCallRequest(_) => MessageType::ToolCallRequest,
            MessagePayload::ToolCallResponse(_) => MessageType::ToolCallResponse,
            MessagePayload::Error { .. } => MessageType::Error,
            MessagePayload::UserInputRequest { .. } => MessageType::UserInputRequest,
            MessagePayload::UserInputResponse { .. } => MessageType::UserInputResponse,
            MessagePayload::UserChoiceRequest { .. } => MessageType::UserChoiceRequest,
            MessagePayload::UserChoiceResponse { .. } => MessageType::UserChoiceResponse,
        }
    }
}

/// One entry in a session's ordered history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub source: MessageSource,
    #[serde(flatten)]
    pub payload: MessagePayload,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Cached token estimate, filled in by the caller at append time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_estimate: Option<usize>,
}

impl Message {
    pub fn new(source: MessageSource, payload: MessagePayload) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            source,
            payload,
            created_at: chrono::Utc::now(),
            token_estimate: None,
        }
    }

    pub fn text(source: MessageSource, text: impl Into<String>) -> Self {
        Message::new(source, MessagePayload::Text { text: text.into() })
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// True if this message is a `tool_call_request` still awaiting its
    /// matching `tool_call_response` (the compression engine and the agent
    /// loop both need this to avoid splitting a pair).
    pub fn is_unmatched_tool_request(&self, history: &[Message]) -> bool {
        let MessagePayload::ToolCallRequest(req) = &self.payload else {
            return false;
        };
        !history.iter().any(|m| {
            matches!(&m.payload, MessagePayload::ToolCallResponse(resp) if resp.id == req.id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_message_type_matches_variant() {
        let m = Message::text(MessageSource::User, "hi");
        assert_eq!(m.message_type(), MessageType::Text);
    }

    #[test]
    fn tool_request_roundtrips_through_json() {
        let m = Message::new(
            MessageSource::Model,
            MessagePayload::ToolCallRequest(ToolCallRequest {
                id: "call-1".into(),
                name: "bash".into(),
                arguments: serde_json::json!({"command": "ls"}),
            }),
        );
        let s = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&s).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn user_input_response_does_not_round_trip_as_text() {
        let m = Message::new(
            MessageSource::User,
            MessagePayload::UserInputResponse { text: "yes".into() },
        );
        let s = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&s).unwrap();
        assert_eq!(back.message_type(), MessageType::UserInputResponse);
        assert_eq!(back, m);
    }
}
