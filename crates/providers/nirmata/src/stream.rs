//! Parser for the Nirmata proxy's line-delimited JSON event stream. Each
//! line is a self-contained JSON object tagged by `type`; unlike
//! Anthropic's SSE framing there is no `data:` prefix to strip, just one
//! event per `\n`-terminated line (lines may still split across HTTP
//! chunks, so partial lines are buffered).

use bytes::Bytes;
use kubeagent_core::chat::StreamItem;
use kubeagent_core::error::LLMError;

use crate::wire::{StreamEvent, ToolStartEnvelope};

pub struct StreamAssembler {
    pending: String,
}

impl StreamAssembler {
    pub fn new() -> Self {
        StreamAssembler {
            pending: String::new(),
        }
    }

    pub fn feed(&mut self, chunk: &Bytes) -> Vec<Result<StreamItem, LLMError>> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut items = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line = self.pending[..pos].trim().to_string();
            self.pending.drain(..=pos);
            if line.is_empty() {
                continue;
            }
            self.handle_line(&line, &mut items);
        }
        items
    }

    fn handle_line(&mut self, line: &str, items: &mut Vec<Result<StreamItem, LLMError>>) {
        let event: StreamEvent = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(e) => {
                items.push(Err(LLMError::Schema(format!(
                    "malformed Nirmata stream line: {e}"
                ))));
                return;
            }
        };
        self.handle_event(event, items);
    }

    fn handle_event(&mut self, event: StreamEvent, items: &mut Vec<Result<StreamItem, LLMError>>) {
        match event.event_type.as_str() {
            "Text" | "InputText" => {
                if let Some(text) = event.data.as_str() {
                    items.push(Ok(StreamItem::TextDelta(text.to_string())));
                } else if let Some(text) = event.data.get("text").and_then(|v| v.as_str()) {
                    items.push(Ok(StreamItem::TextDelta(text.to_string())));
                }
            }
            "ToolStart" => match serde_json::from_value::<ToolStartEnvelope>(event.data) {
                Ok(envelope) => {
                    let call = envelope.tool_call;
                    let arguments = normalize_arguments(call.function.arguments);
                    items.push(Ok(StreamItem::FunctionCall(
                        kubeagent_core::chat::FunctionCall {
                            id: call.id,
                            name: call.function.name,
                            arguments,
                        },
                    )));
                }
                Err(e) => {
                    items.push(Ok(StreamItem::TextDelta(format!(
                        "[Tool parsing error: {e}]"
                    ))));
                }
            },
            "ToolComplete" => {
                // Tool results are fed back through the next turn's request
                // messages, not surfaced as a stream item; the event only
                // confirms server-side receipt.
            }
            "InputChoice" => {
                if let Some(text) = event.data.as_str() {
                    items.push(Ok(StreamItem::TextDelta(text.to_string())));
                }
            }
            "Error" => {
                let message = event
                    .data
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| event.data.to_string());
                items.push(Err(LLMError::Provider(message)));
            }
            other => {
                log::warn!("unknown Nirmata stream event type: {other}");
            }
        }
    }
}

/// `arguments` may arrive as a JSON object or as a JSON-encoded string; both
/// are normalized to an object so downstream tool dispatch always sees one.
fn normalize_arguments(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_event_yields_text_delta() {
        let mut assembler = StreamAssembler::new();
        let line = r#"{"type":"Text","data":"hello"}"#;
        let items = assembler.feed(&Bytes::from(format!("{line}\n")));
        assert_eq!(items.len(), 1);
        match &items[0] {
            Ok(StreamItem::TextDelta(t)) => assert_eq!(t, "hello"),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn tool_start_with_valid_envelope_yields_function_call() {
        let mut assembler = StreamAssembler::new();
        let line = serde_json::json!({
            "type": "ToolStart",
            "data": {
                "tool_call": {
                    "id": "call-1",
                    "type": "function",
                    "function": { "name": "bash", "arguments": {"command": "ls"} }
                }
            }
        })
        .to_string();
        let items = assembler.feed(&Bytes::from(format!("{line}\n")));
        assert_eq!(items.len(), 1);
        match &items[0] {
            Ok(StreamItem::FunctionCall(fc)) => {
                assert_eq!(fc.id, "call-1");
                assert_eq!(fc.name, "bash");
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn tool_start_with_string_arguments_is_normalized() {
        let mut assembler = StreamAssembler::new();
        let line = serde_json::json!({
            "type": "ToolStart",
            "data": {
                "tool_call": {
                    "id": "call-2",
                    "type": "function",
                    "function": { "name": "bash", "arguments": "{\"command\": \"ls\"}" }
                }
            }
        })
        .to_string();
        let items = assembler.feed(&Bytes::from(format!("{line}\n")));
        match &items[0] {
            Ok(StreamItem::FunctionCall(fc)) => {
                assert_eq!(fc.arguments, serde_json::json!({"command": "ls"}));
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn tool_start_with_malformed_envelope_surfaces_parse_error_text() {
        let mut assembler = StreamAssembler::new();
        let line = serde_json::json!({
            "type": "ToolStart",
            "data": { "not_a_tool_call": true }
        })
        .to_string();
        let items = assembler.feed(&Bytes::from(format!("{line}\n")));
        assert_eq!(items.len(), 1);
        match &items[0] {
            Ok(StreamItem::TextDelta(t)) => assert!(t.starts_with("[Tool parsing error:")),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_ignored_without_error() {
        let mut assembler = StreamAssembler::new();
        let line = r#"{"type":"SomethingNew","data":{}}"#;
        let items = assembler.feed(&Bytes::from(format!("{line}\n")));
        assert!(items.is_empty());
    }

    #[test]
    fn split_chunks_are_buffered_until_newline() {
        let mut assembler = StreamAssembler::new();
        let first = assembler.feed(&Bytes::from_static(br#"{"type":"Text","data":"hel"#));
        assert!(first.is_empty());
        let second = assembler.feed(&Bytes::from_static(b"lo\"}\n"));
        assert_eq!(second.len(), 1);
        match &second[0] {
            Ok(StreamItem::TextDelta(t)) => assert_eq!(t, "hello"),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn error_event_yields_err() {
        let mut assembler = StreamAssembler::new();
        let line = r#"{"type":"Error","data":"boom"}"#;
        let items = assembler.feed(&Bytes::from(format!("{line}\n")));
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
