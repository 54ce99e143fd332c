//! `Client`/`Chat` implementation talking to Anthropic's `/v1/messages`
//! endpoint, grounded on the teacher's `qmt-anthropic::Anthropic` provider
//! struct and its `chat_request`/`parse_chat` methods, reworked against this
//! system's `Client`/`Chat` trait contract instead of the teacher's
//! extism-plugin `HTTPChatProvider`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use kubeagent_core::chat::{Candidate, ChatResponse, FunctionDefinition, Part, StreamItem};
use kubeagent_core::client::{Chat, Client, ClientOptions};
use kubeagent_core::error::LLMError;
use kubeagent_core::message::{Message, MessagePayload, MessageSource, ToolCallRequest};

use crate::stream::StreamAssembler;
use crate::translate::to_wire_messages;
use crate::wire::{CompleteRequest, CompleteResponse, WireTool, ANTHROPIC_VERSION};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(opts: &ClientOptions) -> Result<Self, LLMError> {
        let api_key = opts
            .api_key
            .clone()
            .ok_or_else(|| LLMError::InvalidRequest("ANTHROPIC_API_KEY is required".into()))?;
        let base_url = opts
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(opts.skip_verify_ssl)
            .build()
            .map_err(|e| LLMError::Transport(e.to_string()))?;

        Ok(AnthropicClient {
            api_key,
            base_url,
            http,
        })
    }
}

#[async_trait]
impl Client for AnthropicClient {
    async fn initialize(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        history: Vec<Message>,
    ) -> Result<Box<dyn Chat>, LLMError> {
        Ok(Box::new(AnthropicChat {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            model: model.to_string(),
            system_prompt: system_prompt.map(str::to_string),
            history: Arc::new(Mutex::new(history)),
            function_definitions: Vec::new(),
        }))
    }
}

pub struct AnthropicChat {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
    model: String,
    system_prompt: Option<String>,
    history: Arc<Mutex<Vec<Message>>>,
    function_definitions: Vec<FunctionDefinition>,
}

impl AnthropicChat {
    fn snapshot_history(&self) -> Vec<Message> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    fn build_request(&self, messages: Vec<Message>, stream: bool) -> CompleteRequest {
        let tools = if self.function_definitions.is_empty() {
            None
        } else {
            Some(
                self.function_definitions
                    .iter()
                    .map(|d| WireTool {
                        name: d.name.clone(),
                        description: d.description.clone(),
                        schema: d.parameter_schema.clone(),
                    })
                    .collect(),
            )
        };

        CompleteRequest {
            model: self.model.clone(),
            messages: to_wire_messages(&messages),
            system: self.system_prompt.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            stream: Some(stream),
            tools,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    async fn api_error_from_response(resp: reqwest::Response) -> LLMError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        LLMError::Api {
            status,
            message: body,
            cause: None,
        }
    }
}

#[async_trait]
impl Chat for AnthropicChat {
    fn set_function_definitions(&mut self, defs: Vec<FunctionDefinition>) {
        self.function_definitions = defs;
    }

    async fn send(&mut self, new_messages: Vec<Message>) -> Result<ChatResponse, LLMError> {
        let mut candidate = self.snapshot_history();
        candidate.extend(new_messages.iter().cloned());

        let request = self.build_request(candidate, false);

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::api_error_from_response(resp).await);
        }

        let body: CompleteResponse = resp
            .json()
            .await
            .map_err(|e| LLMError::Schema(e.to_string()))?;

        let mut parts = Vec::new();
        for block in &body.content {
            match block.content_type.as_str() {
                "text" => {
                    if let Some(text) = &block.text {
                        parts.push(Part::Text(text.clone()));
                    }
                }
                "tool_use" => {
                    parts.push(Part::FunctionCall(kubeagent_core::chat::FunctionCall {
                        id: block.id.clone().unwrap_or_default(),
                        name: block.name.clone().unwrap_or_default(),
                        arguments: block.input.clone().unwrap_or_else(|| serde_json::json!({})),
                    }));
                }
                _ => {}
            }
        }

        // History is appended only on success (§4.F), carrying both the new
        // user turn and the assistant response's text + tool-use blocks.
        let mut guard = self.history.lock().expect("history lock poisoned");
        guard.extend(new_messages);
        for part in &parts {
            match part {
                Part::Text(text) => guard.push(Message::text(MessageSource::Model, text.clone())),
                Part::FunctionCall(fc) => guard.push(Message::new(
                    MessageSource::Model,
                    MessagePayload::ToolCallRequest(ToolCallRequest {
                        id: fc.id.clone(),
                        name: fc.name.clone(),
                        arguments: fc.arguments.clone(),
                    }),
                )),
            }
        }

        Ok(ChatResponse {
            candidates: vec![Candidate { parts }],
        })
    }

    async fn send_streaming(
        &mut self,
        new_messages: Vec<Message>,
    ) -> Result<BoxStream<'static, Result<StreamItem, LLMError>>, LLMError> {
        let mut candidate = self.snapshot_history();
        candidate.extend(new_messages.iter().cloned());

        let request = self.build_request(candidate, true);

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::api_error_from_response(resp).await);
        }

        let byte_stream = resp.bytes_stream();
        let mut assembler = StreamAssembler::new();
        let mut accumulated_text = String::new();
        let mut accumulated_calls: Vec<ToolCallRequest> = Vec::new();

        let history = self.history.clone();
        // `new_messages` is appended to history up front so a caller that
        // drops the stream mid-turn still sees its own prior input recorded;
        // the assistant's reply is appended incrementally as items complete.
        history
            .lock()
            .expect("history lock poisoned")
            .extend(new_messages);

        let items_stream = byte_stream
            .map(move |chunk| {
                let chunk = chunk.map_err(|e| LLMError::Transport(e.to_string()))?;
                Ok::<_, LLMError>(assembler.feed(&chunk))
            })
            .flat_map(|result| match result {
                Ok(items) => stream::iter(items),
                Err(e) => stream::iter(vec![Err(e)]),
            })
            .map(move |item| {
                if let Ok(item) = &item {
                    match item {
                        StreamItem::TextDelta(t) => accumulated_text.push_str(t),
                        StreamItem::FunctionCall(fc) => {
                            accumulated_calls.push(ToolCallRequest {
                                id: fc.id.clone(),
                                name: fc.name.clone(),
                                arguments: fc.arguments.clone(),
                            });
                        }
                        StreamItem::Done => {
                            let mut guard = history.lock().expect("history lock poisoned");
                            if !accumulated_text.is_empty() {
                                guard.push(Message::text(
                                    MessageSource::Model,
                                    accumulated_text.clone(),
                                ));
                            }
                            for call in accumulated_calls.drain(..) {
                                guard.push(Message::new(
                                    MessageSource::Model,
                                    MessagePayload::ToolCallRequest(call),
                                ));
                            }
                        }
                        StreamItem::Usage(_) => {}
                    }
                }
                item
            });

        Ok(items_stream.boxed())
    }
}
