//! Tool Registry + built-in tools (§4.J).

pub mod bash;
pub mod context;
pub mod registry;

pub use bash::BashTool;
pub use context::{CapabilityRequirement, ModifiesResource, Tool, ToolContext, ToolError};
pub use registry::ToolRegistry;
