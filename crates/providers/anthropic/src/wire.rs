//! Anthropic Messages API wire format: request/response structs and the
//! streaming envelope. Grounded directly on the teacher's `qmt-anthropic`
//! provider (`AnthropicCompleteRequest`, `AnthropicMessage`,
//! `AnthropicStreamResponse`, `AnthropicDelta`), using owned `String` fields
//! rather than the teacher's borrowed request structs since requests here
//! are assembled from owned session history rather than zero-copy callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize, Debug)]
pub struct CompleteRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
}

#[derive(Serialize, Debug)]
pub struct WireTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "input_schema")]
    pub schema: Value,
}

#[derive(Serialize, Debug)]
pub struct WireMessage {
    pub role: String,
    pub content: Vec<WireContent>,
}

/// A single content block. Anthropic threads tool calls/results as content
/// blocks within `user`/`assistant` messages rather than a dedicated role,
/// unlike providers that use a separate tool role.
#[derive(Serialize, Debug)]
pub struct WireContent {
    #[serde(rename = "type")]
    pub block_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "id")]
    pub tool_use_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "name")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "input")]
    pub tool_input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "tool_use_id")]
    pub tool_result_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "content")]
    pub tool_output: Option<String>,
}

impl WireContent {
    pub fn text(text: impl Into<String>) -> Self {
        WireContent {
            block_type: "text",
            text: Some(text.into()),
            tool_use_id: None,
            tool_name: None,
            tool_input: None,
            tool_result_id: None,
            tool_output: None,
        }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        WireContent {
            block_type: "tool_use",
            text: None,
            tool_use_id: Some(id.into()),
            tool_name: Some(name.into()),
            tool_input: Some(input),
            tool_result_id: None,
            tool_output: None,
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        WireContent {
            block_type: "tool_result",
            text: None,
            tool_use_id: None,
            tool_name: None,
            tool_input: None,
            tool_result_id: Some(id.into()),
            tool_output: Some(content.into()),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CompleteResponse {
    pub content: Vec<ResponseContent>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
}

#[derive(Deserialize, Debug)]
pub struct ResponseContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input: Option<Value>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Deserialize, Debug)]
pub struct StreamEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub index: Option<usize>,
    pub content_block: Option<StreamContentBlock>,
    pub delta: Option<StreamDelta>,
    pub usage: Option<ResponseUsage>,
    /// A `content_block_stop` event may carry the tool call's final, complete
    /// `input` object directly, superseding the `input_json_delta` buffer
    /// accumulated for that block.
    #[serde(default)]
    pub input: Option<Value>,
}

#[derive(Deserialize, Debug)]
pub struct StreamContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct StreamDelta {
    #[serde(rename = "type")]
    pub delta_type: Option<String>,
    pub text: Option<String>,
    pub partial_json: Option<String>,
    pub stop_reason: Option<String>,
}
