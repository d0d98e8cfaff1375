//! Messages exchanged between an agent run and a language model.
//!
//! A run is a short-lived conversation: an optional system prompt, the user
//! query, and then alternating assistant messages (possibly carrying tool
//! calls) and tool messages (carrying observations).
//!
//! # Examples
//!
//! ```
//! use mcpeer_common::chat::{Message, MessageRole};
//! use mcpeer_common::tools::ToolCall;
//! use uuid::Uuid;
//!
//! let run_id = Uuid::new_v4();
//! let call = ToolCall::new("browser_navigate", r#"{"url": "https://example.com"}"#);
//!
//! let assistant = Message::assistant(run_id, "")
//!     .with_tool_calls(vec![call.clone()])
//!     .unwrap();
//! let observation = Message::tool(run_id, "navigated", call.id, "browser_navigate".into()).unwrap();
//!
//! assert_eq!(assistant.role, MessageRole::Assistant);
//! assert_eq!(observation.name.as_deref(), Some("browser_navigate"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::tools::ToolCall;

/// The author of a message.
///
/// Serializes to the lowercase names used by OpenAI-compatible APIs.
///
/// ```
/// use mcpeer_common::chat::MessageRole;
///
/// let json = serde_json::to_string(&MessageRole::Tool).unwrap();
/// assert_eq!(json, "\"tool\"");
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageRole {
    /// Instructions that frame the run.
    #[serde(rename = "system")]
    System,
    /// The query being answered.
    #[serde(rename = "user")]
    User,
    /// Model output, text and/or tool calls.
    #[serde(rename = "assistant")]
    Assistant,
    /// The observation produced by a tool call.
    #[serde(rename = "tool")]
    Tool,
}

/// A single message in a run.
///
/// # Invariants
///
/// - Only assistant messages carry tool calls
/// - Tool messages always have a non-empty `tool_call_id` and `name`
#[derive(Debug, Serialize, Deserialize, Clone, TypedBuilder)]
pub struct Message {
    /// Unique identifier for this message.
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    /// The run (conversation) this message belongs to.
    pub conversation_id: Uuid,

    /// Who produced the message.
    pub role: MessageRole,

    /// Text content. May be empty for assistant messages that only call tools.
    pub content: String,

    /// When the message was created.
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,

    /// Tool calls requested by an assistant message.
    ///
    /// Uses `SmallVec` since models rarely request more than two calls per turn.
    #[builder(default)]
    pub tool_calls: SmallVec<[ToolCall; 2]>,

    /// The tool call a tool message answers.
    #[builder(default)]
    pub tool_call_id: Option<String>,

    /// Function name for tool messages.
    #[builder(default)]
    pub name: Option<String>,
}

impl Message {
    /// Creates a new message with the specified role and content.
    pub fn new(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: SmallVec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Creates a new system message.
    pub fn system(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::System, content)
    }

    /// Creates a new user message.
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::User, content)
    }

    /// Creates a new assistant message.
    pub fn assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::Assistant, content)
    }

    /// Creates a new tool result message.
    ///
    /// # Errors
    ///
    /// Returns an error if `tool_call_id` or `function_name` is empty.
    pub fn tool(
        conversation_id: Uuid,
        content: impl Into<String>,
        tool_call_id: String,
        function_name: String,
    ) -> anyhow::Result<Self> {
        if tool_call_id.is_empty() {
            anyhow::bail!("Tool call ID cannot be empty");
        }
        if function_name.is_empty() {
            anyhow::bail!("Function name cannot be empty for tool messages");
        }
        let mut msg = Self::new(conversation_id, MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id);
        msg.name = Some(function_name);
        Ok(msg)
    }

    /// Sets the tool calls for this message.
    ///
    /// # Errors
    ///
    /// Returns an error if this message is not an assistant message.
    pub fn with_tool_calls(
        mut self,
        tool_calls: impl Into<SmallVec<[ToolCall; 2]>>,
    ) -> anyhow::Result<Self> {
        if self.role != MessageRole::Assistant {
            anyhow::bail!(
                "Tool calls can only be added to assistant messages, found {:?}",
                self.role
            );
        }
        self.tool_calls = tool_calls.into();
        Ok(self)
    }

    /// Whether this message requests any tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_message_creation() {
        let run_id = Uuid::new_v4();
        let msg = Message::user(run_id, "Find me a flat in Barcelona");

        assert_eq!(msg.conversation_id, run_id);
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Find me a flat in Barcelona");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_message_tool_call_validation() {
        let run_id = Uuid::new_v4();
        let tool_call = ToolCall::new("search", r#"{"q": "rust"}"#);

        let user_msg = Message::user(run_id, "What's new in Rust?");
        assert!(user_msg.with_tool_calls(vec![tool_call.clone()]).is_err());

        let assistant_msg = Message::assistant(run_id, "");
        let msg = assistant_msg.with_tool_calls(vec![tool_call]).unwrap();
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn test_tool_message_validation() {
        let run_id = Uuid::new_v4();

        assert!(Message::tool(run_id, "ok", String::new(), "search".to_string()).is_err());
        assert!(Message::tool(run_id, "ok", "call_1".to_string(), String::new()).is_err());

        let msg = Message::tool(run_id, "ok", "call_1".to_string(), "search".to_string()).unwrap();
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");

        let role: MessageRole = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, MessageRole::System);
    }
}
