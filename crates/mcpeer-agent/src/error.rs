use thiserror::Error;

use mcpeer_tools::mcp::McpError;

/// Why an agent run failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    /// No tool survived server scoping and `disallowed_tools`.
    #[error("No usable tools: every MCP server failed to connect or all tools are disallowed")]
    NoTools,

    /// `max_steps` was reached under [`crate::StepLimitPolicy::Error`].
    #[error("Step limit of {steps} reached without a final answer")]
    StepLimitExceeded {
        steps: usize,
        /// Last text the model produced, if any.
        partial: Option<String>,
    },

    /// A tool call failed under [`crate::ToolErrorPolicy::Surface`].
    #[error(transparent)]
    Tool(McpError),

    /// A server needed by the run could not be connected.
    #[error(transparent)]
    Connection(McpError),

    /// The language model call failed.
    #[error("Language model error: {0}")]
    Llm(#[source] anyhow::Error),

    /// The stream consuming the run was dropped.
    #[error("Run cancelled")]
    Cancelled,
}

impl AgentError {
    #[must_use]
    pub const fn is_tool_error(&self) -> bool {
        matches!(self, Self::Tool(_))
    }
}

impl From<McpError> for AgentError {
    fn from(err: McpError) -> Self {
        if err.is_tool_execution() {
            Self::Tool(err)
        } else {
            Self::Connection(err)
        }
    }
}
