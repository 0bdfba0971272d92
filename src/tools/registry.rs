//! Tool registry for TaskClaw
//!
//! This module provides the `ToolRegistry` struct for managing and executing
//! tools. Arguments are checked against each tool's `required` list before
//! the tool runs.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ToolsConfig;
use crate::error::{Result, TaskClawError};

use super::{Tool, ToolContext, ToolDefinition, ToolOutput};

/// A registry that holds and manages tools.
///
/// Each agent owns its registry; there is no process-wide tool table.
/// A [`ToolsConfig`] policy decides which registered tools are offered to
/// the model and which may run.
///
/// # Example
///
/// ```rust
/// use taskclaw::tools::{EchoTool, ToolContext, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(EchoTool));
///
/// let output = registry
///     .execute("echo", json!({"message": "hello"}), &ToolContext::default())
///     .await
///     .unwrap();
/// assert_eq!(output.output, json!("hello"));
/// # });
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    policy: ToolsConfig,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry governed by `policy`.
    pub fn with_policy(policy: ToolsConfig) -> Self {
        Self {
            tools: HashMap::new(),
            policy,
        }
    }

    /// Replace the exposure policy.
    pub fn set_policy(&mut self, policy: ToolsConfig) {
        self.policy = policy;
    }

    /// Whether `name` is registered and permitted by the policy.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.tools.contains_key(name) && self.policy.permits(name)
    }

    /// Register a new tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool by name.
    ///
    /// # Errors
    ///
    /// * `ToolNotFound` when no tool has that name.
    /// * `Tool` when the policy does not permit the tool.
    /// * `Tool` when the arguments are not an object or miss a required field.
    /// * Whatever the tool itself returns.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| TaskClawError::ToolNotFound(name.to_string()))?;
        if !self.policy.permits(name) {
            warn!(tool = name, "Tool call refused by policy");
            return Err(TaskClawError::Tool(format!(
                "Tool '{}' is not allowed by the tool policy",
                name
            )));
        }

        validate_arguments(name, &tool.parameters(), &args)?;

        let start = Instant::now();
        let result = tool.execute(args, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(output) if output.success => {
                debug!(tool = name, duration_ms, "Tool executed successfully");
            }
            Ok(output) => {
                warn!(
                    tool = name,
                    duration_ms,
                    error = output.error.as_deref().unwrap_or(""),
                    "Tool reported failure"
                );
            }
            Err(e) => {
                warn!(tool = name, duration_ms, error = %e, "Tool execution failed");
            }
        }
        result
    }

    /// Catalogue entries for every permitted tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .iter()
            .filter(|(name, _)| self.policy.permits(name))
            .map(|(_, t)| t.definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Names of all permitted tools, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tools
            .keys()
            .map(String::as_str)
            .filter(|name| self.policy.permits(name))
            .collect();
        names.sort_unstable();
        names
    }

    /// Check whether a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Check `args` against the schema's object type and `required` list.
fn validate_arguments(tool: &str, schema: &Value, args: &Value) -> Result<()> {
    let Some(obj) = args.as_object() else {
        return Err(TaskClawError::Tool(format!(
            "Invalid arguments for tool {}: expected a JSON object",
            tool
        )));
    };

    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    let missing: Vec<&str> = required
        .into_iter()
        .filter(|field| obj.get(*field).map_or(true, Value::is_null))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TaskClawError::Tool(format!(
            "Missing required argument(s) for tool {}: {}",
            tool,
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolSecurity;
    use crate::tools::EchoTool;
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            Err(TaskClawError::Tool("intentional failure".into()))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Box::new(EchoTool));
        assert!(registry.has("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").map(|t| t.name()), Some("echo"));
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_definitions_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));
        registry.register(Box::new(EchoTool));
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo", "fail"]);
        assert_eq!(registry.names(), vec!["echo", "fail"]);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nope", json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskClawError::ToolNotFound(n) if n == "nope"));
    }

    #[tokio::test]
    async fn test_execute_missing_required_argument() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let err = registry
            .execute("echo", json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("message"));
    }

    #[tokio::test]
    async fn test_execute_non_object_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let err = registry
            .execute("echo", json!("hello"), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[tokio::test]
    async fn test_execute_propagates_tool_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));
        let err = registry
            .execute("fail", json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("intentional failure"));
    }

    fn registry_with(policy: ToolsConfig) -> ToolRegistry {
        let mut registry = ToolRegistry::with_policy(policy);
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(FailingTool));
        registry
    }

    #[tokio::test]
    async fn test_allowlist_hides_and_refuses_other_tools() {
        let registry = registry_with(ToolsConfig {
            security: ToolSecurity::Allowlist,
            allow: vec!["echo".to_string()],
        });
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.definitions().len(), 1);
        assert!(registry.is_allowed("echo"));
        assert!(!registry.is_allowed("fail"));
        assert!(registry.has("fail"));

        let err = registry
            .execute("fail", json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not allowed"));
        assert!(registry
            .execute("echo", json!({"message": "ok"}), &ToolContext::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_deny_exposes_nothing() {
        let mut registry = registry_with(ToolsConfig::default());
        assert_eq!(registry.definitions().len(), 2);

        registry.set_policy(ToolsConfig {
            security: ToolSecurity::Deny,
            allow: vec!["echo".to_string()],
        });
        assert!(registry.definitions().is_empty());
        assert!(registry.names().is_empty());
        assert!(registry
            .execute("echo", json!({"message": "ok"}), &ToolContext::default())
            .await
            .is_err());
    }
}
