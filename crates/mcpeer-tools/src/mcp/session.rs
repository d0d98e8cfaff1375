//! Live connections to MCP servers.
//!
//! [`McpSession`] is the seam between [`super::McpClient`] and the protocol
//! SDK: the client only ever sees sessions produced by a [`Connector`]. The
//! default [`RmcpConnector`] launches stdio servers as child processes or
//! opens streamable HTTP connections using `rmcp`.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParams, CallToolResult, RawContent, ResourceContents},
    service::{RunningService, ServerSink},
    transport::{
        ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess,
        streamable_http_client::StreamableHttpClientTransportConfig,
    },
};
use serde_json::Value;
use tokio::sync::Mutex;

use super::config::{ServerConfig, TransportConfig};
use super::error::McpError;

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema of the tool arguments.
    pub input_schema: Value,
    pub output_schema: Option<Value>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
            output_schema: None,
        }
    }
}

/// One item of a tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolContent {
    Text(String),
    /// Base64 image data.
    Image { data: String, mime_type: String },
    /// An embedded resource; `text` is set for text resources.
    Resource { uri: String, text: Option<String> },
}

/// Result of a tool call as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolOutput {
    /// A successful single-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(text.into())],
            is_error: false,
        }
    }

    /// A single-text result flagged as an error.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(text.into())],
            is_error: true,
        }
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        let content = result
            .content
            .into_iter()
            .filter_map(|item| match item.raw {
                RawContent::Text(text) => Some(ToolContent::Text(text.text)),
                RawContent::Image(image) => Some(ToolContent::Image {
                    data: image.data,
                    mime_type: image.mime_type,
                }),
                RawContent::Resource(resource) => Some(match resource.resource {
                    ResourceContents::TextResourceContents { uri, text, .. } => {
                        ToolContent::Resource {
                            uri,
                            text: Some(text),
                        }
                    }
                    ResourceContents::BlobResourceContents { uri, .. } => {
                        ToolContent::Resource { uri, text: None }
                    }
                }),
                RawContent::ResourceLink(link) => Some(ToolContent::Resource {
                    uri: link.uri,
                    text: None,
                }),
                other => {
                    log::debug!("Ignoring unsupported tool content: {other:?}");
                    None
                }
            })
            .collect();

        Self {
            content,
            is_error: result.is_error.unwrap_or(false),
        }
    }
}

/// A live connection to one MCP server.
///
/// Implementations must allow concurrent calls through a shared reference.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Configured name of the server behind this session.
    fn server_name(&self) -> &str;

    /// Tools the server currently advertises.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError>;

    /// Invokes a tool. `arguments` must be a JSON object or `null`.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, McpError>;

    /// Shuts the connection down; later calls on this session fail.
    async fn close(&self) -> Result<(), McpError>;
}

/// Creates sessions from server configurations.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Launches or contacts the server and completes the MCP handshake.
    async fn connect(&self, server: &ServerConfig) -> Result<Arc<dyn McpSession>, McpError>;
}

/// Connector backed by the `rmcp` SDK.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmcpConnector;

#[async_trait]
impl Connector for RmcpConnector {
    async fn connect(&self, server: &ServerConfig) -> Result<Arc<dyn McpSession>, McpError> {
        log::info!("Connecting to MCP server '{}' ({})", server.name, server.describe());
        let fail = |e: &dyn std::fmt::Display| McpError::connection(&server.name, e);

        let service = match &server.transport {
            TransportConfig::Stdio { command, args, env } => {
                let cmd = tokio::process::Command::new(command).configure(|c| {
                    c.args(args).envs(env);
                    if let Some(cwd) = &server.working_directory {
                        c.current_dir(cwd);
                    }
                });
                let transport = TokioChildProcess::new(cmd).map_err(|e| fail(&e))?;
                ().serve(transport).await.map_err(|e| fail(&e))?
            }
            TransportConfig::Http {
                url,
                headers,
                auth_token,
            } => {
                let mut config = StreamableHttpClientTransportConfig::with_uri(url.as_str());
                if let Some(token) = bearer_token(headers, auth_token.as_deref()) {
                    config = config.auth_header(token);
                }
                for name in headers.keys().filter(|k| !k.eq_ignore_ascii_case("authorization")) {
                    log::warn!(
                        "Header '{name}' for MCP server '{}' is not supported and was ignored",
                        server.name
                    );
                }
                let transport = StreamableHttpClientTransport::from_config(config);
                ().serve(transport).await.map_err(|e| fail(&e))?
            }
        };

        if let Some(info) = service.peer_info() {
            log::info!(
                "Connected to MCP server '{}' - {} {}",
                server.name,
                info.server_info.name,
                info.server_info.version
            );
        }

        Ok(Arc::new(RmcpSession {
            name: server.name.clone(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }))
    }
}

/// The token for the `Authorization` header, from `auth_token` or an explicit
/// `Authorization: Bearer ...` header.
fn bearer_token(
    headers: &std::collections::BTreeMap<String, String>,
    auth_token: Option<&str>,
) -> Option<String> {
    auth_token.map(ToString::to_string).or_else(|| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .map(|(_, v)| v.strip_prefix("Bearer ").unwrap_or(v).to_string())
    })
}

/// Session over an `rmcp` client service.
struct RmcpSession {
    name: String,
    peer: ServerSink,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

#[async_trait]
impl McpSession for RmcpSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .map_err(|e| McpError::connection(&self.name, e))?;

        log::info!("Server '{}' provides {} tools", self.name, tools.len());

        Ok(tools
            .into_iter()
            .map(|tool| {
                log::debug!("  - Tool: {}", tool.name);
                ToolDescriptor {
                    name: tool.name.into_owned(),
                    description: tool.description.map(std::borrow::Cow::into_owned),
                    input_schema: Value::Object((*tool.input_schema).clone()),
                    output_schema: tool.output_schema.map(|s| Value::Object((*s).clone())),
                }
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, McpError> {
        log::debug!("Calling tool '{name}' on server '{}'", self.name);

        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(McpError::tool(
                    name,
                    format!("arguments must be a JSON object, got {other}"),
                ));
            }
        };

        let request = CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments,
            task: None,
        };

        let result = self
            .peer
            .call_tool(request)
            .await
            .map_err(|e| McpError::tool(name, e))?;
        Ok(result.into())
    }

    async fn close(&self) -> Result<(), McpError> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        log::info!("Closing MCP server '{}'", self.name);
        service
            .cancel()
            .await
            .map(|_| ())
            .map_err(|e| McpError::connection(&self.name, e))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::collections::BTreeMap;

    use super::*;
    use rmcp::model::Content;

    #[test]
    fn test_call_result_conversion() {
        let result = CallToolResult::success(vec![
            Content::text("first"),
            Content::image("aGVsbG8=", "image/png"),
        ]);

        let output = ToolOutput::from(result);
        assert!(!output.is_error);
        assert_eq!(
            output.content,
            vec![
                ToolContent::Text("first".into()),
                ToolContent::Image {
                    data: "aGVsbG8=".into(),
                    mime_type: "image/png".into()
                },
            ]
        );
    }

    #[test]
    fn test_error_flag_is_carried() {
        let result = CallToolResult::error(vec![Content::text("boom")]);
        let output = ToolOutput::from(result);
        assert!(output.is_error);
        assert_eq!(output, ToolOutput::error("boom"));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = BTreeMap::new();
        assert_eq!(bearer_token(&headers, None), None);
        assert_eq!(bearer_token(&headers, Some("abc")).as_deref(), Some("abc"));

        headers.insert("Authorization".to_string(), "Bearer xyz".to_string());
        assert_eq!(bearer_token(&headers, None).as_deref(), Some("xyz"));
        assert_eq!(bearer_token(&headers, Some("abc")).as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_missing_command_is_a_connection_error() {
        let server = ServerConfig::stdio("ghost", "/definitely/not/a/real/mcp-binary", ["--x"]);
        let err = RmcpConnector.connect(&server).await.err().unwrap();
        assert!(err.is_connection());
        assert!(err.to_string().contains("ghost"));
    }
}
