//! Turning MCP tools into framework tools.
//!
//! A [`ToolAdapter`] connects servers through an [`McpClient`] and wraps each
//! advertised [`ToolDescriptor`] in the tool type of some agent framework.
//! Two adapters ship with the crate:
//!
//! - [`ExecutorAdapter`] produces `Arc<dyn ToolImplementation>` for
//!   [`crate::ToolExecutor`] and the mcpeer agent loop.
//! - [`FunctionAdapter`] produces [`FunctionTool`]s: an OpenAI function
//!   definition plus an async callable, for frameworks that bring their own loop.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use mcpeer_common::tools::Tool;

use super::client::McpClient;
use super::error::McpError;
use super::session::{McpSession, ToolContent, ToolDescriptor, ToolOutput};
use crate::ToolImplementation;

/// Converts MCP tools into a framework's tool type.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// The framework tool produced for each MCP tool.
    type Tool: Send;

    /// Wraps one tool; invocations go to `session`.
    fn adapt(&self, session: Arc<dyn McpSession>, descriptor: ToolDescriptor) -> Self::Tool;

    /// Connects and adapts the tools of one server, or of every configured
    /// server when `server_name` is `None`.
    ///
    /// Tools come out sorted by name within each server, servers in
    /// configuration order. With `None`, servers that fail to connect or
    /// list their tools are skipped.
    ///
    /// # Errors
    /// Returns [`McpError::Connection`] if the named server cannot be
    /// connected or listed.
    async fn create_tools(
        &self,
        client: &McpClient,
        server_name: Option<&str>,
    ) -> Result<Vec<Self::Tool>, McpError> {
        let servers: Vec<String> = match server_name {
            Some(name) => vec![name.to_string()],
            None => client
                .config()
                .server_names()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        };

        let mut tools = Vec::new();
        for name in &servers {
            let listed = match client.connect(name).await {
                Ok(session) => session
                    .list_tools()
                    .await
                    .map(|descriptors| (session, descriptors)),
                Err(e) => Err(e),
            };

            let (session, mut descriptors) = match listed {
                Ok(listed) => listed,
                Err(e) if server_name.is_none() => {
                    log::warn!("Skipping tools of MCP server '{name}': {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            descriptors.sort_by(|a, b| a.name.cmp(&b.name));
            log::debug!("Adapting {} tools from '{name}'", descriptors.len());
            tools.extend(
                descriptors
                    .into_iter()
                    .map(|descriptor| self.adapt(session.clone(), descriptor)),
            );
        }

        Ok(tools)
    }
}

/// Decodes a tool result into the observation text handed to the model.
///
/// Text items are concatenated, text resources inlined, images and blob
/// resources replaced by a short placeholder.
///
/// # Errors
/// Returns [`McpError::ToolExecution`] when the server flagged the result as
/// an error or returned no content.
pub fn decode_tool_output(tool: &str, output: ToolOutput) -> Result<String, McpError> {
    if output.is_error {
        let detail = render_content(&output.content);
        return Err(McpError::tool(
            tool,
            if detail.is_empty() {
                "tool reported an error".to_string()
            } else {
                detail
            },
        ));
    }

    if output.content.is_empty() {
        return Err(McpError::tool(tool, "tool returned no content"));
    }

    Ok(render_content(&output.content))
}

fn render_content(content: &[ToolContent]) -> String {
    content
        .iter()
        .map(|item| match item {
            ToolContent::Text(text)
            | ToolContent::Resource {
                text: Some(text), ..
            } => text.clone(),
            ToolContent::Image { data, mime_type } => {
                format!("[Image: {} bytes, type: {mime_type}]", data.len())
            }
            ToolContent::Resource { uri, text: None } => format!("[Resource: {uri}]"),
        })
        .collect()
}

/// Rewrites `"type": [..]` unions as `anyOf`, recursively.
///
/// Some function-calling frameworks reject type arrays such as
/// `["string", "null"]`.
#[must_use]
pub fn normalize_schema(schema: Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("type", Value::Array(types)) => {
                        let any_of = types.into_iter().map(|t| serde_json::json!({"type": t}));
                        out.insert("anyOf".to_string(), Value::Array(any_of.collect()));
                    }
                    (_, value) => {
                        out.insert(key, normalize_schema(value));
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_schema).collect()),
        other => other,
    }
}

fn describe(descriptor: &ToolDescriptor) -> String {
    descriptor.description.clone().unwrap_or_default()
}

/// Adapter producing [`ToolImplementation`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorAdapter;

impl ToolAdapter for ExecutorAdapter {
    type Tool = Arc<dyn ToolImplementation>;

    fn adapt(&self, session: Arc<dyn McpSession>, descriptor: ToolDescriptor) -> Self::Tool {
        Arc::new(McpTool::new(session, descriptor))
    }
}

/// An MCP tool exposed as a [`ToolImplementation`].
pub struct McpTool {
    server: String,
    descriptor: ToolDescriptor,
    session: Arc<dyn McpSession>,
}

impl McpTool {
    #[must_use]
    pub fn new(session: Arc<dyn McpSession>, descriptor: ToolDescriptor) -> Self {
        Self {
            server: session.server_name().to_string(),
            descriptor,
            session,
        }
    }

    /// Name of the server the tool belongs to.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server
    }

    #[must_use]
    pub const fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Calls the tool and decodes its output.
    ///
    /// # Errors
    /// Returns [`McpError::ToolExecution`] if the call fails or the result is
    /// an error.
    pub async fn call(&self, arguments: Value) -> Result<String, McpError> {
        log::info!(
            "Executing MCP tool '{}' on server '{}'",
            self.descriptor.name,
            self.server
        );
        let output = self
            .session
            .call_tool(&self.descriptor.name, arguments)
            .await?;
        decode_tool_output(&self.descriptor.name, output)
    }
}

#[async_trait]
impl ToolImplementation for McpTool {
    fn get_definition(&self) -> Tool {
        Tool::function(
            &self.descriptor.name,
            describe(&self.descriptor),
            self.descriptor.input_schema.clone(),
        )
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        Ok(self.call(args.clone()).await?)
    }
}

/// Adapter producing [`FunctionTool`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionAdapter {
    /// Rewrite type unions with [`normalize_schema`].
    pub normalize_schema: bool,
}

impl FunctionAdapter {
    #[must_use]
    pub const fn normalized() -> Self {
        Self {
            normalize_schema: true,
        }
    }
}

impl ToolAdapter for FunctionAdapter {
    type Tool = FunctionTool;

    fn adapt(&self, session: Arc<dyn McpSession>, descriptor: ToolDescriptor) -> Self::Tool {
        let parameters = if self.normalize_schema {
            normalize_schema(descriptor.input_schema.clone())
        } else {
            descriptor.input_schema.clone()
        };
        let definition = Tool::function(
            &descriptor.name,
            describe(&descriptor),
            parameters,
        );
        FunctionTool {
            definition,
            tool: McpTool::new(session, descriptor),
        }
    }
}

/// An OpenAI function definition bound to the MCP tool it calls.
pub struct FunctionTool {
    definition: Tool,
    tool: McpTool,
}

impl FunctionTool {
    #[must_use]
    pub const fn definition(&self) -> &Tool {
        &self.definition
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.function.name
    }

    #[must_use]
    pub fn server_name(&self) -> &str {
        self.tool.server_name()
    }

    /// Calls the tool with JSON arguments.
    ///
    /// # Errors
    /// Returns [`McpError::ToolExecution`] if the call fails or the result is
    /// an error.
    pub async fn call(&self, arguments: Value) -> Result<String, McpError> {
        self.tool.call(arguments).await
    }

    /// Calls the tool with arguments as emitted by a model (a JSON string).
    ///
    /// # Errors
    /// Returns [`McpError::ToolExecution`] if the arguments are not valid JSON
    /// or the call fails.
    pub async fn call_json(&self, arguments: &str) -> Result<String, McpError> {
        let arguments = if arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| McpError::tool(self.name(), format!("invalid arguments: {e}")))?
        };
        self.call(arguments).await
    }
}
