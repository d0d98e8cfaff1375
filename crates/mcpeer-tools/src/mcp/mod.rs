//! Model Context Protocol integration.
//!
//! Control flows from [`McpConfig`] (what servers exist) to [`McpClient`]
//! (which of them are connected) to a [`ToolAdapter`] (how their tools look
//! to an agent framework).

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use adapter::{
    ExecutorAdapter, FunctionAdapter, FunctionTool, McpTool, ToolAdapter, decode_tool_output,
    normalize_schema,
};
pub use client::{McpClient, ServerStatus};
pub use config::{McpConfig, McpSettings, ServerConfig, TransportConfig};
pub use error::McpError;
pub use session::{
    Connector, McpSession, RmcpConnector, ToolContent, ToolDescriptor, ToolOutput,
};
