//! Session/message stores, the compression engine, the tool registry and
//! the reason-act agent loop: everything in spec.md §4.C-§4.J except the
//! Sandbox Executor (`kubeagent-sandbox`) and the provider clients
//! (`kubeagent-provider-*`), which this crate consumes rather than defines.

pub mod agent;
pub mod compression;
pub mod error;
pub mod events;
pub mod manager;
pub mod store;
pub mod tools;

pub use agent::{Agent, AgentState};
pub use compression::{CompressionConfig, CompressionEngine, Summarizer};
pub use error::AgentError;
pub use events::{AgentEvent, AgentEventKind};
pub use manager::{AgentManager, ClientFactory, ToolContextFactory};
pub use store::{
    ChatMessageStore, FilesystemMessageStore, FilesystemSessionStore, InMemoryMessageStore,
    InMemorySessionStore, Session, SessionStore,
};
pub use tools::{BashTool, CapabilityRequirement, ModifiesResource, Tool, ToolContext, ToolError, ToolRegistry};
