//! Provider-agnostic data model, client contract and registry shared across
//! the kubeagent workspace.

pub mod chat;
pub mod client;
pub mod error;
pub mod message;
pub mod registry;
pub mod tokens;

pub use chat::{Chat as ChatSession, ChatResponse, FunctionCall, FunctionDefinition};
pub use client::{Chat, Client, ClientOptions};
pub use error::LLMError;
pub use message::{Message, MessagePayload, MessageSource, MessageType};
