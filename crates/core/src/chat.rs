//! Provider-agnostic chat/session types: function definitions, function
//! calls, and the per-session `Chat` state every provider mutates.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// JSON-Schema-shaped description of a tool, handed to providers so they can
/// advertise it to the model. Grounded on `querymt::chat::FunctionTool` /
/// `ParametersSchema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
}

/// A tool invocation produced by a model response, before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Reserved argument key used when a provider fails to parse a tool call's
/// raw argument bytes into JSON; the parse failure is surfaced as data
/// instead of being silently dropped.
pub const ARGUMENTS_PARSE_ERROR_KEY: &str = "_parse_error";

pub fn arguments_parse_error(detail: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ ARGUMENTS_PARSE_ERROR_KEY: detail.into() })
}

/// A single piece of a model response: either text or a function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
}

impl Part {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(t) => Some(t.as_str()),
            Part::FunctionCall(_) => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match self {
            Part::FunctionCall(fc) => Some(fc),
            Part::Text(_) => None,
        }
    }
}

/// One candidate response from a model; in practice providers here only
/// ever return a single candidate, but the shape is kept to match the
/// documented `candidates() -> [{ parts() }]` contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    pub parts: Vec<Part>,
}

impl Candidate {
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn text(&self) -> Option<String> {
        let joined: String = self
            .parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts.iter().filter_map(Part::as_function_call).collect()
    }
}

/// A full model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub candidates: Vec<Candidate>,
}

impl ChatResponse {
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

/// Normalized streaming event tags, shared by every provider's streaming
/// state machine (§4.F).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    MessageStart,
    ContentBlockStart {
        index: usize,
        kind: ContentBlockKind,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        usage: Option<Usage>,
    },
    MessageStop,
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentBlockKind {
    Text,
    ToolUse { id: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentDelta {
    TextDelta(String),
    InputJsonDelta(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A streamed event made available to callers of `send_streaming`: either a
/// text delta to display immediately, or a completed function call ready
/// for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamItem {
    TextDelta(String),
    FunctionCall(FunctionCall),
    Usage(Usage),
    Done,
}

/// The chat session's immutable configuration plus its mutable, provider-
/// owned history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub system_prompt: Option<String>,
    pub model: String,
    pub messages: Vec<Message>,
    pub function_definitions: Vec<FunctionDefinition>,
}

impl Chat {
    pub fn new(model: impl Into<String>) -> Self {
        Chat {
            system_prompt: None,
            model: model.into(),
            messages: Vec::new(),
            function_definitions: Vec::new(),
        }
    }
}
