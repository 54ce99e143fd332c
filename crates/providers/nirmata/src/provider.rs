//! `Client`/`Chat` implementation for the Nirmata-managed LLM proxy. The
//! proxy fronts whichever downstream provider an operator's Nirmata instance
//! is configured with; the client here must never pin that choice in the
//! request itself, only the `model` query parameter identifies which model
//! to use.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use kubeagent_core::chat::{Candidate, ChatResponse, FunctionDefinition, Part, StreamItem};
use kubeagent_core::client::{Chat, Client, ClientOptions};
use kubeagent_core::error::LLMError;
use kubeagent_core::message::{Message, MessagePayload, MessageSource, ToolCallRequest};

use crate::stream::StreamAssembler;
use crate::translate::to_request_messages;
use crate::wire::{ChatRequest, ChatRequestMessage, ChatResponseBody, ToolFunctionSchema, ToolSchema};

pub struct NirmataClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl NirmataClient {
    pub fn new(opts: &ClientOptions) -> Result<Self, LLMError> {
        let api_key = opts
            .api_key
            .clone()
            .ok_or_else(|| LLMError::InvalidRequest("NIRMATA_APIKEY is required".into()))?;
        let base_url = opts
            .base_url
            .clone()
            .ok_or_else(|| LLMError::InvalidRequest("NIRMATA_ENDPOINT is required".into()))?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(opts.skip_verify_ssl)
            .build()
            .map_err(|e| LLMError::Transport(e.to_string()))?;

        Ok(NirmataClient {
            api_key,
            base_url,
            http,
        })
    }
}

#[async_trait]
impl Client for NirmataClient {
    async fn initialize(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        history: Vec<Message>,
    ) -> Result<Box<dyn Chat>, LLMError> {
        Ok(Box::new(NirmataChat {
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

pub struct NirmataChat {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
    model: String,
    system_prompt: Option<String>,
    history: Arc<Mutex<Vec<Message>>>,
    function_definitions: Vec<FunctionDefinition>,
}

impl NirmataChat {
    fn snapshot_history(&self) -> Vec<Message> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    fn build_request(&self, messages: Vec<Message>, stream: bool) -> ChatRequest {
        let tools = if self.function_definitions.is_empty() {
            None
        } else {
            Some(
                self.function_definitions
                    .iter()
                    .map(|d| ToolSchema {
                        kind: "function".to_string(),
                        function: ToolFunctionSchema {
                            name: d.name.clone(),
                            description: d.description.clone(),
                            parameters: d.parameter_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };
        let tool_choice = tools.is_some().then(|| "auto".to_string());

        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(system_prompt) = &self.system_prompt {
            wire_messages.push(ChatRequestMessage {
                role: "system".to_string(),
                content: Some(system_prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        wire_messages.extend(to_request_messages(&messages));

        ChatRequest {
            model: self.model.clone(),
            messages: wire_messages,
            tools,
            tool_choice,
            stream,
        }
    }

    /// `chunked` selects SSE-style streaming on the `chunked=true` query
    /// parameter; `model` is the only other parameter ever sent, deliberately
    /// never a downstream-provider name the proxy is responsible for picking.
    fn endpoint(&self, chunked: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model = urlencode(&self.model);
        if chunked {
            format!("{base}/llm-apps/chat?model={model}&chunked=true")
        } else {
            format!("{base}/llm-apps/chat?model={model}")
        }
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

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl Chat for NirmataChat {
    fn set_function_definitions(&mut self, defs: Vec<FunctionDefinition>) {
        self.function_definitions = defs;
    }

    async fn send(&mut self, new_messages: Vec<Message>) -> Result<ChatResponse, LLMError> {
        let mut candidate = self.snapshot_history();
        candidate.extend(new_messages.iter().cloned());

        let request = self.build_request(candidate, false);

        let resp = self
            .http
            .post(self.endpoint(false))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::api_error_from_response(resp).await);
        }

        let body: ChatResponseBody = resp
            .json()
            .await
            .map_err(|e| LLMError::Schema(e.to_string()))?;

        let mut parts = Vec::new();
        if let Some(text) = &body.message {
            parts.push(Part::Text(text.clone()));
        }
        for call in &body.tool_calls {
            parts.push(Part::FunctionCall(kubeagent_core::chat::FunctionCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            }));
        }

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
            .post(self.endpoint(true))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::api_error_from_response(resp).await);
        }

        let byte_stream = resp.bytes_stream();
        let mut assembler = StreamAssembler::new();
        let accumulated_text = Arc::new(Mutex::new(String::new()));
        let accumulated_calls = Arc::new(Mutex::new(Vec::<ToolCallRequest>::new()));

        let history = self.history.clone();
        history
            .lock()
            .expect("history lock poisoned")
            .extend(new_messages);

        let text_sink = accumulated_text.clone();
        let calls_sink = accumulated_calls.clone();

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
                        StreamItem::TextDelta(t) => {
                            text_sink.lock().expect("text lock poisoned").push_str(t)
                        }
                        StreamItem::FunctionCall(fc) => {
                            calls_sink
                                .lock()
                                .expect("calls lock poisoned")
                                .push(ToolCallRequest {
                                    id: fc.id.clone(),
                                    name: fc.name.clone(),
                                    arguments: fc.arguments.clone(),
                                });
                        }
                        StreamItem::Done => {}
                        StreamItem::Usage(_) => {}
                    }
                }
                item
            })
            .chain(stream::once(async move {
                // The proxy's JSONL body has no distinct terminal sentinel;
                // completion is signalled by stream end, so the accumulated
                // turn is flushed into history here.
                let mut guard = history.lock().expect("history lock poisoned");
                let text = accumulated_text.lock().expect("text lock poisoned");
                if !text.is_empty() {
                    guard.push(Message::text(MessageSource::Model, text.clone()));
                }
                drop(text);
                let mut calls = accumulated_calls.lock().expect("calls lock poisoned");
                for call in calls.drain(..) {
                    guard.push(Message::new(
                        MessageSource::Model,
                        MessagePayload::ToolCallRequest(call),
                    ));
                }
                Ok(StreamItem::Done)
            }));

        Ok(items_stream.boxed())
    }
}
