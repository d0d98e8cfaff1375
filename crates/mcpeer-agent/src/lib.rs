//! # mcpeer-agent
//!
//! An agent that answers queries using the tools of MCP servers.
//!
//! [`McpAgent`] pairs a language model ([`mcpeer_client::LLMClient`]) with a
//! shared [`McpClient`](mcpeer_tools::mcp::McpClient). Each run loops over
//! model calls and tool invocations until the model answers without tools
//! or `max_steps` is reached.
//!
//! ## Core Components
//!
//! - [`McpAgent`]: `run` for a final outcome, `astream` for live events
//! - [`AgentBuilder`]: fluent configuration
//! - [`AgentOptions`]: step limit, tool filtering, server manager and error policies
//! - [`RunOutcome`] and [`AgentEvent`]: what runs produce
//! - [`AgentError`]: why runs fail
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcpeer_agent::McpAgent;
//! use mcpeer_client::OpenAIClient;
//! use mcpeer_common::Config;
//! use mcpeer_tools::mcp::McpClient;
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
//! let outcome = agent
//!     .run("Find the best restaurant in San Francisco", None)
//!     .await?;
//!
//! match outcome.text() {
//!     Some(text) if outcome.is_completed() => println!("{text}"),
//!     partial => println!("Stopped after {} steps: {partial:?}", outcome.steps()),
//! }
//!
//! client.close_all().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming
//!
//! [`McpAgent::astream`] runs the loop on a spawned task and yields
//! [`AgentEvent`]s through a bounded channel. Dropping the stream cancels
//! the run; a tool call in flight at that moment gets
//! [`AgentOptions::cancel_grace`] to finish.
//!
//! ## Server Manager
//!
//! With [`AgentBuilder::use_server_manager`], the model only sees the tools
//! of the server it used last, plus tools to list and switch servers.

mod agent;
pub mod builder;
mod catalog;
pub mod error;
pub mod events;
pub mod options;
pub mod server_manager;
pub mod stream;
#[cfg(test)]
mod testing;

pub use agent::McpAgent;
pub use builder::AgentBuilder;
pub use error::AgentError;
pub use events::{AgentEvent, RunOutcome};
pub use options::{
    AgentOptions, DEFAULT_SYSTEM_PROMPT, ServerManagerFallback, StepLimitPolicy, ToolErrorPolicy,
};
pub use stream::AgentStream;
