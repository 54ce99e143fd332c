//! SSE parsing and tool-input reassembly for the Anthropic streaming
//! endpoint (§4.F). Grounded on the teacher's `parse_chat_stream_chunk`,
//! generalized from the teacher's flat `StreamChunk` emission into this
//! system's buffer-per-block reassembly with `_parse_error` fallback.

use std::collections::HashMap;

use kubeagent_core::chat::{arguments_parse_error, FunctionCall, StreamItem, Usage};
use kubeagent_core::error::LLMError;

use crate::wire::StreamEnvelope;

/// Incremental SSE line buffer plus per-content-block tool-input assembly
/// state, carried across chunks of one HTTP response body.
#[derive(Default)]
pub struct StreamAssembler {
    /// Bytes received so far that don't yet form a complete line.
    pending: String,
    /// index -> tool_use id, populated on `content_block_start`.
    index_to_id: HashMap<usize, String>,
    /// index -> tool name, populated on `content_block_start`.
    index_to_name: HashMap<usize, String>,
    /// index -> accumulated `input_json_delta` buffer.
    json_buffers: HashMap<usize, String>,
    /// The most recently opened tool-use block, used to attribute an
    /// `input_json_delta` that arrives without an index match (§4.F tie-break).
    last_tool_index: Option<usize>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the HTTP body, returning zero or more normalized
    /// items. A non-SSE/non-JSONL body (no `data: ` lines at all) yields no
    /// items rather than being surfaced as raw text.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamItem, LLMError>> {
        let text = match std::str::from_utf8(bytes) {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };
        self.pending.push_str(text);

        let mut items = Vec::new();
        // Process complete lines only; keep any trailing partial line
        // buffered for the next chunk.
        let mut consumed_to = 0;
        for (i, _) in self.pending.match_indices('\n') {
            let line = &self.pending[consumed_to..i];
            items.extend(self.handle_line(line.trim_end_matches('\r')));
            consumed_to = i + 1;
        }
        self.pending.drain(..consumed_to);
        items
    }

    fn handle_line(&mut self, line: &str) -> Vec<Result<StreamItem, LLMError>> {
        let Some(data) = line.strip_prefix("data: ") else {
            return Vec::new();
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Vec::new();
        }

        let envelope: StreamEnvelope = match serde_json::from_str(data) {
            Ok(e) => e,
            Err(e) => {
                log::error!("failed to parse Anthropic stream event: {e}");
                return vec![Err(LLMError::Schema(format!(
                    "malformed Anthropic stream event: {e}"
                )))];
            }
        };

        self.handle_envelope(envelope)
    }

    fn handle_envelope(&mut self, envelope: StreamEnvelope) -> Vec<Result<StreamItem, LLMError>> {
        match envelope.event_type.as_str() {
            "content_block_start" => {
                if let (Some(index), Some(block)) = (envelope.index, envelope.content_block) {
                    if block.block_type == "tool_use" {
                        let id = block.id.unwrap_or_default();
                        let name = block.name.unwrap_or_default();
                        self.index_to_id.insert(index, id);
                        self.index_to_name.insert(index, name);
                        self.json_buffers.insert(index, String::new());
                        self.last_tool_index = Some(index);
                    }
                }
                Vec::new()
            }
            "content_block_delta" => {
                let Some(delta) = envelope.delta else {
                    return Vec::new();
                };
                if let Some(text) = delta.text {
                    return vec![Ok(StreamItem::TextDelta(text))];
                }
                if let Some(partial_json) = delta.partial_json {
                    // Attribute to the envelope's own index if present;
                    // otherwise fall back to the most recently opened
                    // tool-use block (unattributed-delta tie-break).
                    let index = envelope.index.or(self.last_tool_index);
                    if let Some(index) = index {
                        if !self.json_buffers.contains_key(&index) {
                            log::debug!(
                                "input_json_delta for unseen index {index}, \
                                 attributing to most-recently-opened tool block"
                            );
                            self.json_buffers.insert(index, String::new());
                        }
                        self.json_buffers
                            .entry(index)
                            .or_default()
                            .push_str(&partial_json);
                    }
                }
                Vec::new()
            }
            "content_block_stop" => {
                let Some(index) = envelope.index else {
                    return Vec::new();
                };
                let Some(id) = self.index_to_id.remove(&index) else {
                    // A stopped text block, not a tool-use block: nothing to
                    // emit here (text was already streamed as deltas).
                    return Vec::new();
                };
                let name = self.index_to_name.remove(&index).unwrap_or_default();
                let buffer = self.json_buffers.remove(&index).unwrap_or_default();

                // Precedence: a final `input` object delivered on the stop
                // event itself, then the parsed `input_json_delta`
                // accumulator, then an empty object if neither is usable.
                let arguments = if let Some(input) = envelope.input {
                    input
                } else if buffer.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    match serde_json::from_str::<serde_json::Value>(&buffer) {
                        Ok(v) => v,
                        Err(e) => {
                            log::error!(
                                "failed to parse tool input JSON for call {id}: {e}"
                            );
                            arguments_parse_error(e.to_string())
                        }
                    }
                };

                vec![Ok(StreamItem::FunctionCall(FunctionCall {
                    id,
                    name,
                    arguments,
                }))]
            }
            "message_delta" => {
                let mut items = Vec::new();
                if let Some(usage) = envelope.usage {
                    items.push(Ok(StreamItem::Usage(Usage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    })));
                }
                items
            }
            "message_stop" => vec![Ok(StreamItem::Done)],
            "error" => vec![Err(LLMError::Provider(
                "provider reported a stream error".to_string(),
            ))],
            _ => {
                log::debug!("ignoring unknown Anthropic stream event: {}", envelope.event_type);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(lines: &[&str]) -> Vec<u8> {
        lines
            .iter()
            .map(|l| format!("data: {l}\n"))
            .collect::<String>()
            .into_bytes()
    }

    #[test]
    fn text_deltas_pass_through() {
        let mut asm = StreamAssembler::new();
        let body = sse(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        ]);
        let items = asm.feed(&body);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Ok(StreamItem::TextDelta(ref t)) if t == "hi"));
    }

    #[test]
    fn tool_input_reassembles_across_deltas_and_emits_once_on_stop() {
        let mut asm = StreamAssembler::new();
        let body = sse(&[
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"call-1","name":"bash"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"command\":"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"ls\"}"}}"#,
            r#"{"type":"content_block_stop","index":1}"#,
        ]);
        let items = asm.feed(&body);
        let calls: Vec<_> = items
            .into_iter()
            .filter_map(|r| match r {
                Ok(StreamItem::FunctionCall(fc)) => Some(fc),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call-1");
        assert_eq!(calls[0].arguments, serde_json::json!({"command": "ls"}));
    }

    #[test]
    fn final_input_on_stop_event_wins_over_accumulated_deltas() {
        let mut asm = StreamAssembler::new();
        let body = sse(&[
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"call-1","name":"bash"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"command\":\"st"}}"#,
            r#"{"type":"content_block_stop","index":1,"input":{"command":"ls"}}"#,
        ]);
        let items = asm.feed(&body);
        let call = items
            .into_iter()
            .find_map(|r| match r {
                Ok(StreamItem::FunctionCall(fc)) => Some(fc),
                _ => None,
            })
            .expect("a function call should be emitted");
        assert_eq!(call.arguments, serde_json::json!({"command": "ls"}));
    }

    #[test]
    fn malformed_tool_input_surfaces_parse_error_instead_of_being_dropped() {
        let mut asm = StreamAssembler::new();
        let body = sse(&[
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"call-2","name":"bash"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{not-json"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
        ]);
        let items = asm.feed(&body);
        let call = items.into_iter().find_map(|r| match r {
            Ok(StreamItem::FunctionCall(fc)) => Some(fc),
            _ => None,
        });
        let call = call.expect("a function call should still be emitted");
        assert!(call.arguments.get("_parse_error").is_some());
    }

    #[test]
    fn non_sse_body_yields_no_items() {
        let mut asm = StreamAssembler::new();
        let items = asm.feed(b"not an event stream at all\n");
        assert!(items.is_empty());
    }

    #[test]
    fn done_sentinel_is_ignored_not_emitted() {
        let mut asm = StreamAssembler::new();
        let items = asm.feed(b"data: [DONE]\n");
        assert!(items.is_empty());
    }
}
