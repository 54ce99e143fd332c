//! Translation between the shared `Message` history and Anthropic's wire
//! message/content-block shape (§4.F "shared translation rules"). Anthropic
//! threads tool calls and their results as content blocks inside ordinary
//! `user`/`assistant` messages rather than via a dedicated tool role.

use kubeagent_core::message::{Message, MessagePayload, MessageSource, ToolCallStatus};

use crate::wire::WireContent;
use crate::wire::WireMessage;

fn role_for(source: MessageSource) -> &'static str {
    match source {
        MessageSource::User => "user",
        MessageSource::Model | MessageSource::Agent => "assistant",
    }
}

/// Build the wire message list for a turn's history. Most core messages map
/// to exactly one wire message; `tool_call_response` always maps to a
/// `user`-role message carrying a `tool_result` block, per Anthropic's
/// convention, regardless of which source recorded the response.
///
/// Anthropic requires messages to alternate `user`/`assistant` roles, but a
/// single turn can record several consecutive tool calls (or several
/// consecutive tool results) as separate core `Message`s. Those are merged
/// here into one wire message per run of same-role messages, each carrying
/// all of that run's content blocks, rather than emitting consecutive
/// same-role messages the API would reject.
pub fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    let mut merged: Vec<WireMessage> = Vec::new();
    for message in messages {
        let Some(wire) = to_wire_message(message) else {
            continue;
        };
        match merged.last_mut() {
            Some(prev) if prev.role == wire.role => prev.content.extend(wire.content),
            _ => merged.push(wire),
        }
    }
    merged
}

fn to_wire_message(message: &Message) -> Option<WireMessage> {
    match &message.payload {
        MessagePayload::Text { text } => Some(WireMessage {
            role: role_for(message.source).to_string(),
            content: vec![WireContent::text(text)],
        }),
        MessagePayload::ToolCallRequest(req) => Some(WireMessage {
            role: "assistant".to_string(),
            content: vec![WireContent::tool_use(
                req.id.clone(),
                req.name.clone(),
                req.arguments.clone(),
            )],
        }),
        MessagePayload::ToolCallResponse(resp) => {
            let mut body = serde_json::to_string(&resp.result).unwrap_or_default();
            if resp.status == Some(ToolCallStatus::Error) {
                body = format!("[error] {body}");
            }
            Some(WireMessage {
                role: "user".to_string(),
                content: vec![WireContent::tool_result(resp.id.clone(), body)],
            })
        }
        MessagePayload::Error { message: text } => Some(WireMessage {
            role: "user".to_string(),
            content: vec![WireContent::text(format!("[error] {text}"))],
        }),
        MessagePayload::UserInputResponse { text } => Some(WireMessage {
            role: "user".to_string(),
            content: vec![WireContent::text(text)],
        }),
        MessagePayload::UserChoiceResponse { label } => Some(WireMessage {
            role: "user".to_string(),
            content: vec![WireContent::text(label)],
        }),
        // Requests for user input/choice are not sent to the model; they are
        // intercepted by the agent loop before reaching the provider.
        MessagePayload::UserInputRequest { .. } | MessagePayload::UserChoiceRequest { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_response_always_becomes_user_role() {
        let msg = Message::new(
            MessageSource::Agent,
            MessagePayload::ToolCallResponse(kubeagent_core::message::ToolCallResponse {
                id: "call-1".into(),
                name: "bash".into(),
                result: serde_json::json!({"ok": true}),
                status: Some(ToolCallStatus::Ok),
            }),
        );
        let wire = to_wire_messages(std::slice::from_ref(&msg));
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
        assert_eq!(wire[0].content[0].block_type, "tool_result");
    }

    #[test]
    fn consecutive_same_role_messages_merge_into_one() {
        let messages = vec![
            Message::new(
                MessageSource::Model,
                MessagePayload::ToolCallRequest(kubeagent_core::message::ToolCallRequest {
                    id: "call-1".into(),
                    name: "bash".into(),
                    arguments: serde_json::json!({"command": "ls"}),
                }),
            ),
            Message::new(
                MessageSource::Model,
                MessagePayload::ToolCallRequest(kubeagent_core::message::ToolCallRequest {
                    id: "call-2".into(),
                    name: "bash".into(),
                    arguments: serde_json::json!({"command": "pwd"}),
                }),
            ),
            Message::new(
                MessageSource::Agent,
                MessagePayload::ToolCallResponse(kubeagent_core::message::ToolCallResponse {
                    id: "call-1".into(),
                    name: "bash".into(),
                    result: serde_json::json!({"ok": true}),
                    status: Some(ToolCallStatus::Ok),
                }),
            ),
            Message::new(
                MessageSource::Agent,
                MessagePayload::ToolCallResponse(kubeagent_core::message::ToolCallResponse {
                    id: "call-2".into(),
                    name: "bash".into(),
                    result: serde_json::json!({"ok": true}),
                    status: Some(ToolCallStatus::Ok),
                }),
            ),
        ];
        let wire = to_wire_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "assistant");
        assert_eq!(wire[0].content.len(), 2);
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[1].content.len(), 2);
    }
}
