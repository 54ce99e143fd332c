//! Translation between the shared `Message` history and the Nirmata proxy's
//! request body (§6's normative `{role, content, tool_calls?,
//! tool_call_id?}` message shape — an OpenAI-style chat-completion body,
//! not a dedicated structured-content payload).

use kubeagent_core::message::{Message, MessagePayload, MessageSource, ToolCallStatus};

use crate::wire::{ChatRequestMessage, RequestToolCall, RequestToolCallFunction};

fn role_for(source: MessageSource) -> &'static str {
    match source {
        MessageSource::User => "user",
        MessageSource::Model | MessageSource::Agent => "assistant",
    }
}

pub fn to_request_messages(messages: &[Message]) -> Vec<ChatRequestMessage> {
    messages.iter().filter_map(to_request_message).collect()
}

fn plain(role: &str, text: String) -> Option<ChatRequestMessage> {
    Some(ChatRequestMessage {
        role: role.to_string(),
        content: Some(text),
        tool_calls: None,
        tool_call_id: None,
    })
}

fn to_request_message(message: &Message) -> Option<ChatRequestMessage> {
    match &message.payload {
        MessagePayload::Text { text } => plain(role_for(message.source), text.clone()),
        MessagePayload::ToolCallRequest(req) => Some(ChatRequestMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![RequestToolCall {
                id: req.id.clone(),
                call_type: "function".to_string(),
                function: RequestToolCallFunction {
                    name: req.name.clone(),
                    arguments: req.arguments.clone(),
                },
            }]),
            tool_call_id: None,
        }),
        MessagePayload::ToolCallResponse(resp) => {
            let status = resp.status.map(|s| match s {
                ToolCallStatus::Ok => "ok",
                ToolCallStatus::Error => "error",
            });
            let content = match status {
                Some(status) => serde_json::json!({ "status": status, "result": resp.result }).to_string(),
                None => resp.result.to_string(),
            };
            Some(ChatRequestMessage {
                role: "tool".to_string(),
                content: Some(content),
                tool_calls: None,
                tool_call_id: Some(resp.id.clone()),
            })
        }
        MessagePayload::Error { message: text } => {
            plain("user", format!("[error] {text}"))
        }
        MessagePayload::UserInputResponse { text } => plain("user", text.clone()),
        MessagePayload::UserChoiceResponse { label } => plain("user", label.clone()),
        MessagePayload::UserInputRequest { .. } | MessagePayload::UserChoiceRequest { .. } => None,
    }
}
