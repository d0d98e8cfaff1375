//! # mcpeer-common
//!
//! Shared types for the mcpeer crates: the messages an agent run exchanges
//! with a language model, tool definitions and calls, and the request,
//! response and configuration types used by LLM clients.
//!
//! ## Example
//!
//! ```
//! use mcpeer_common::{ChatRequest, Config, Message, Tool};
//! use uuid::Uuid;
//!
//! let run_id = Uuid::new_v4();
//! let tool = Tool::function(
//!     "browser_navigate",
//!     "Navigate to a URL",
//!     serde_json::json!({"type": "object", "properties": {"url": {"type": "string"}}}),
//! );
//!
//! let config = Config::new("openai", "gpt-4o");
//! let request = ChatRequest::from((&config, vec![Message::user(run_id, "Open example.com")]))
//!     .with_tools(vec![tool]);
//! assert!(request.has_tools());
//! ```

/// Message and role types.
pub mod chat;
/// Client configuration and request/response types.
pub mod client;
/// Tool definitions and tool calls.
pub mod tools;

pub use chat::{Message, MessageRole};
pub use client::{
    ChatChunk, ChatRequest, ChatResponse, Config, FinishReason, RetryConfig, ToolChoice, Usage,
};
pub use tools::{Function, FunctionCall, Tool, ToolCall, ToolCallDelta};
