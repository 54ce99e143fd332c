//! Wire shapes for the Nirmata-managed LLM proxy (§6): a plain request body
//! plus a line-delimited-JSON event stream keyed by `type`. Field names and
//! nesting here are normative per §6, not this crate's own invention — the
//! proxy rejects anything that doesn't match this exact shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub stream: bool,
}

#[derive(Serialize, Debug)]
pub struct ChatRequestMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<RequestToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct RequestToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: RequestToolCallFunction,
}

#[derive(Serialize, Debug)]
pub struct RequestToolCallFunction {
    pub name: String,
    pub arguments: Value,
}

#[derive(Serialize, Debug)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunctionSchema,
}

#[derive(Serialize, Debug)]
pub struct ToolFunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponseBody {
    pub message: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ResponseToolCall>,
    #[serde(default)]
    pub usage: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Deserialize, Debug)]
pub struct ResponseToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One line of the proxy's streaming JSONL body.
#[derive(Deserialize, Debug)]
pub struct StreamEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// The envelope `ToolStart.data` MUST carry: anything else is a protocol
/// violation surfaced as a visible parse-error chunk, never silently
/// dropped (§6).
#[derive(Deserialize, Debug)]
pub struct ToolStartEnvelope {
    pub tool_call: ToolStartCall,
}

#[derive(Deserialize, Debug)]
pub struct ToolStartCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ToolStartFunction,
}

#[derive(Deserialize, Debug)]
pub struct ToolStartFunction {
    pub name: String,
    /// Per §4.F, arguments may arrive as a JSON object or a JSON-encoded
    /// string; both are accepted here and normalized downstream.
    pub arguments: Value,
}
