use thiserror::Error;

/// Errors raised while loading MCP configuration, talking to MCP servers, or
/// running their tools.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum McpError {
    /// The configuration is missing, malformed or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A server could not be reached, launched or initialized, or is not connected.
    #[error("Connection to MCP server '{server}' failed: {reason}")]
    Connection {
        /// Configured server name.
        server: String,
        /// What went wrong.
        reason: String,
    },

    /// A tool call failed or reported an error.
    #[error("MCP tool '{tool}' failed: {reason}")]
    ToolExecution {
        /// Tool name.
        tool: String,
        /// What went wrong.
        reason: String,
    },
}

impl McpError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub fn connection(server: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    pub fn tool(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Whether this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Whether this is a tool execution error.
    #[must_use]
    pub const fn is_tool_execution(&self) -> bool {
        matches!(self, Self::ToolExecution { .. })
    }
}
