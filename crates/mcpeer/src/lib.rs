//! # mcpeer
//!
//! Connect language-model agents to MCP tool servers.
//!
//! Control flows from a configuration (which servers exist and how to launch
//! them) to an [`McpClient`] (which of them are connected) to an adapter (how
//! their tools look to an agent framework) and finally to an [`McpAgent`]
//! that runs a bounded tool-calling loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcpeer::{Config, McpAgent, McpClient, OpenAIClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = Arc::new(McpClient::from_dict(serde_json::json!({
//!     "mcpServers": {
//!         "playwright": {"command": "npx", "args": ["@playwright/mcp@latest"]}
//!     }
//! }))?);
//! let llm = OpenAIClient::new(Config::new("openai", "gpt-4o").with_api_key("sk-..."))?;
//!
//! let agent = McpAgent::builder(llm, client.clone()).max_steps(30).build();
//! let outcome = agent.run("Find the best restaurant in San Francisco", None).await?;
//! println!("{}", outcome.text().unwrap_or_default());
//!
//! client.close_all().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`common`]: messages, tool definitions and LLM request types
//! - [`client`]: the [`LLMClient`] trait and an OpenAI-compatible client
//! - [`tools`]: tool registry and the MCP configuration, client and adapters
//! - [`agent`]: [`McpAgent`], its options, events and errors

pub use mcpeer_agent as agent;
pub use mcpeer_client as client;
pub use mcpeer_common as common;
pub use mcpeer_tools as tools;

pub use mcpeer_agent::{
    AgentBuilder, AgentError, AgentEvent, AgentOptions, AgentStream, McpAgent, RunOutcome,
    ServerManagerFallback, StepLimitPolicy, ToolErrorPolicy,
};
pub use mcpeer_client::{ClientError, LLMClient, OpenAIClient};
pub use mcpeer_common::{Config, Message, MessageRole, RetryConfig, Tool, ToolCall};
pub use mcpeer_tools::mcp::{
    ExecutorAdapter, FunctionAdapter, McpClient, McpConfig, McpError, ServerConfig, ToolAdapter,
    TransportConfig,
};
