//! Tool Registry (§4.J): name-indexed map of registered tools plus the
//! function-definition set handed to the provider chat. Grounded on the
//! teacher's `tools::registry::ToolRegistry`.

use std::collections::HashMap;
use std::sync::Arc;

use kubeagent_core::chat::FunctionDefinition;

use crate::tools::context::Tool;

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn function_definitions(&self) -> Vec<FunctionDefinition> {
        self.tools.values().map(|t| t.function_definition()).collect()
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::{ModifiesResource, ToolContext, ToolError};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn function_definition(&self) -> FunctionDefinition {
            FunctionDefinition {
                name: "echo".into(),
                description: "echoes input".into(),
                parameter_schema: json!({"type": "object"}),
            }
        }
        async fn run(&self, _ctx: &dyn ToolContext, args: Value) -> Result<Value, ToolError> {
            Ok(args)
        }
        fn is_interactive(&self, _args: &Value) -> bool {
            false
        }
        fn check_modifies_resource(&self, _args: &Value) -> ModifiesResource {
            ModifiesResource::No
        }
    }

    #[test]
    fn register_and_find() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.find("echo").is_some());
        assert_eq!(registry.names(), vec!["echo".to_string()]);
        assert_eq!(registry.function_definitions().len(), 1);
    }

    #[test]
    fn remove_drops_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.remove("echo");
        assert!(registry.find("echo").is_none());
    }
}
