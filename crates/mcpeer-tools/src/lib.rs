//! # mcpeer-tools
//!
//! Tool execution and MCP integration for mcpeer.
//!
//! ## Core Components
//!
//! - [`ToolImplementation`]: a tool the model can call
//! - [`ToolRegistry`]: concurrent name-to-tool map
//! - [`ToolExecutor`]: resolves a [`ToolCall`] to a tool, parses its arguments and runs it
//! - [`mcp`]: configuration loader, [`mcp::McpClient`], sessions and tool adapters
//!
//! ## Example: executing a custom tool
//!
//! ```rust
//! use mcpeer_tools::{ToolImplementation, ToolExecutor};
//! use mcpeer_common::tools::{Tool, ToolCall};
//! use serde_json::{json, Value};
//! use async_trait::async_trait;
//! use anyhow::Result;
//!
//! struct GreetingTool;
//!
//! #[async_trait]
//! impl ToolImplementation for GreetingTool {
//!     fn get_definition(&self) -> Tool {
//!         Tool::function(
//!             "greet",
//!             "Greet a person by name",
//!             json!({
//!                 "type": "object",
//!                 "properties": {"name": {"type": "string"}},
//!                 "required": ["name"]
//!             }),
//!         )
//!     }
//!
//!     async fn execute(&self, args: &Value) -> Result<String> {
//!         let name = args["name"].as_str().unwrap_or("stranger");
//!         Ok(format!("Hello, {name}!"))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let mut executor = ToolExecutor::new();
//! executor.add_tool(GreetingTool);
//!
//! let call = ToolCall::new("greet", r#"{"name": "Ada"}"#);
//! assert_eq!(executor.execute_tool(&call).await?, "Hello, Ada!");
//! # Ok(())
//! # }
//! ```
//!
//! ## MCP tools
//!
//! ```rust,no_run
//! use mcpeer_tools::mcp::{ExecutorAdapter, McpClient, ToolAdapter};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = McpClient::from_dict(serde_json::json!({
//!     "mcpServers": {
//!         "playwright": {"command": "npx", "args": ["@playwright/mcp@latest"]}
//!     }
//! }))?;
//!
//! let tools = ExecutorAdapter.create_tools(&client, Some("playwright")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! [`ToolRegistry`] uses `DashMap`, so it can be shared between tasks without
//! extra locking.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use mcpeer_common::tools::{FunctionCall, Tool, ToolCall};

pub mod mcp;

/// A tool that a language model can call.
#[async_trait]
pub trait ToolImplementation: Send + Sync {
    /// The function definition offered to the model.
    fn get_definition(&self) -> Tool;

    /// Run the tool with parsed arguments and return the observation text.
    async fn execute(&self, args: &Value) -> Result<String>;
}

/// Thread-safe registry of tools keyed by function name.
pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<dyn ToolImplementation>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
        }
    }

    /// Registers a tool, replacing any tool with the same name.
    pub fn register(&self, tool: Arc<dyn ToolImplementation>) {
        let name = tool.get_definition().function.name;
        self.tools.insert(name, tool);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolImplementation>> {
        self.tools.get(name).map(|r| r.value().clone())
    }

    /// All definitions, sorted by name.
    #[must_use]
    pub fn get_all_definitions(&self) -> Vec<Tool> {
        let mut definitions: Vec<Tool> = self.tools.iter().map(|t| t.get_definition()).collect();
        definitions.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        definitions
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn ToolImplementation>> {
        self.tools.remove(name).map(|(_, tool)| tool)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Executes tool calls against a [`ToolRegistry`].
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
        }
    }

    pub fn add_tool<T: ToolImplementation + 'static>(&mut self, tool: T) {
        self.registry.register(Arc::new(tool));
    }

    pub fn add_tool_arc(&mut self, tool: Arc<dyn ToolImplementation>) {
        self.registry.register(tool);
    }

    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// All tool definitions, sorted by name.
    #[must_use]
    pub fn get_all_tools(&self) -> Vec<Tool> {
        self.registry.get_all_definitions()
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn remove_tool(&mut self, name: &str) -> Option<Arc<dyn ToolImplementation>> {
        self.registry.remove(name)
    }

    /// Execute a tool call.
    ///
    /// # Errors
    /// Returns an error if the tool is not found or if execution fails.
    pub async fn execute_tool(&self, tool_call: &ToolCall) -> Result<String> {
        let function = &tool_call.function;

        let tool = self
            .registry
            .get(&function.name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: '{}'", function.name))?;

        let args = Self::parse_arguments(function);
        tool.execute(&args).await
    }

    /// Parses the JSON argument string of a call.
    ///
    /// Empty arguments become `{}`; text that is not valid JSON is passed on
    /// as a JSON string for the tool to reject.
    #[must_use]
    pub fn parse_arguments(function: &FunctionCall) -> Value {
        let json = function.arguments_json();
        serde_json::from_str(json).unwrap_or_else(|_| Value::String(json.to_string()))
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}
