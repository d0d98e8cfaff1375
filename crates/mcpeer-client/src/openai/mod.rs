//! OpenAI chat completions wire types and client.
//!
//! The types here mirror the JSON of the `/chat/completions` endpoint and
//! work with any OpenAI-compatible server.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use typed_builder::TypedBuilder;

use mcpeer_common::chat::{Message, MessageRole};
use mcpeer_common::client::{ChatRequest, Config, Usage};
use mcpeer_common::tools::{FunctionCall, Tool, ToolCall};

pub mod client;
pub use client::{OpenAIClient, convert_chunk_to_chat_chunk};

/// A single choice from a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// The index of this choice in the response array.
    pub index: u32,
    /// The generated message for this choice.
    pub message: OpenAIMessage,
    /// Why generation stopped for this choice.
    pub finish_reason: Option<String>,
}

/// OpenAI-compatible message format.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct OpenAIMessage {
    /// The role of the message author.
    pub role: MessageRole,
    /// The text content of the message (absent for pure tool calls).
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Function name for tool messages.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls requested by the assistant.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<SmallVec<[OpenAIToolCall; 2]>>,
    /// ID of the tool call this message answers.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for OpenAIMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(OpenAIToolCall::from)
                    .collect(),
            )
        };

        // Tool observations always carry content, even when empty.
        let content = if message.content.is_empty() && message.role != MessageRole::Tool {
            None
        } else {
            Some(message.content.clone())
        };

        Self::builder()
            .role(message.role)
            .content(content)
            .name(message.name.clone())
            .tool_calls(tool_calls)
            .tool_call_id(message.tool_call_id.clone())
            .build()
    }
}

impl OpenAIMessage {
    /// Converts a response message into the common message type.
    ///
    /// Tool call arguments are passed through unvalidated; they are parsed
    /// when the tool is executed.
    #[must_use]
    pub fn into_message(self, conversation_id: uuid::Uuid) -> Message {
        let mut message = Message::new(
            conversation_id,
            self.role,
            self.content.unwrap_or_default(),
        );
        message.tool_calls = self
            .tool_calls
            .map(|calls| calls.into_iter().map(ToolCall::from).collect())
            .unwrap_or_default();
        message.tool_call_id = self.tool_call_id;
        message.name = self.name;
        message
    }
}

/// OpenAI-compatible tool call format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    /// Unique identifier for this tool call.
    pub id: Cow<'static, str>,
    /// Type of the tool call, typically "function".
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub r#type: Cow<'static, str>,
    /// The function to call with its arguments.
    pub function: OpenAIFunction,
}

impl From<&ToolCall> for OpenAIToolCall {
    fn from(tool_call: &ToolCall) -> Self {
        Self {
            id: Cow::Owned(tool_call.id.clone()),
            r#type: Cow::Owned(tool_call.call_type.clone()),
            function: OpenAIFunction {
                name: Cow::Owned(tool_call.function.name.clone()),
                arguments: Cow::Owned(tool_call.function.arguments_json().to_string()),
            },
        }
    }
}

impl From<OpenAIToolCall> for ToolCall {
    fn from(call: OpenAIToolCall) -> Self {
        Self {
            id: call.id.into_owned(),
            function: FunctionCall {
                name: call.function.name.into_owned(),
                arguments: call.function.arguments.into_owned(),
            },
            call_type: call.r#type.into_owned(),
        }
    }
}

const fn default_tool_call_type() -> Cow<'static, str> {
    Cow::Borrowed("function")
}

/// OpenAI-compatible function call format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    /// The name of the function to call.
    pub name: Cow<'static, str>,
    /// The arguments as a JSON-serialized string.
    #[serde(default)]
    pub arguments: Cow<'static, str>,
}

/// Request body for `/chat/completions`.
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct ChatCompletionRequest {
    /// The model identifier to use.
    pub model: String,
    /// The conversation messages in OpenAI format.
    pub messages: Vec<OpenAIMessage>,
    /// Maximum tokens to generate.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Whether to stream the response.
    #[builder(default = Some(false))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tools available for function calling.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Tool selection strategy.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    /// Stream options, e.g. `{"include_usage": true}`.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<serde_json::Value>,
}

impl From<(&ChatRequest, &Config)> for ChatCompletionRequest {
    fn from((request, config): (&ChatRequest, &Config)) -> Self {
        Self::builder()
            .model(
                request
                    .model
                    .clone()
                    .unwrap_or_else(|| config.model.clone()),
            )
            .messages(request.messages.iter().map(OpenAIMessage::from).collect())
            .max_tokens(request.max_tokens)
            .temperature(request.temperature)
            .top_p(request.top_p)
            .stream(Some(request.stream))
            .tools(request.tools.clone())
            .tool_choice(request.tool_choice.clone().map(Into::into))
            .build()
    }
}

/// Response body of a non-streaming completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// Unique identifier for this completion.
    pub id: String,
    /// Unix timestamp of when the completion was created.
    #[serde(default)]
    pub created: u64,
    /// The model that generated this completion.
    pub model: String,
    /// Generated completions.
    pub choices: Vec<ChatChoice>,
    /// Token usage statistics.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// A single choice from a streaming chunk.
#[derive(Debug, Deserialize)]
pub struct ChatStreamChoice {
    /// The index of this choice.
    pub index: u32,
    /// Incremental message delta for this chunk.
    pub delta: OpenAIMessageDelta,
    /// Why generation stopped (only present in the final chunk).
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental changes to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessageDelta {
    /// The role (only present in the first chunk).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Incremental content added in this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<SmallVec<[OpenAIToolCallDelta; 2]>>,
}

/// Incremental changes to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCallDelta {
    /// Index of this tool call in the response.
    pub index: u32,
    /// Unique identifier (only present in the first fragment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Incremental function call data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<OpenAIFunctionDelta>,
}

/// Incremental changes to a function call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunctionDelta {
    /// Function name (only present in the first fragment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument text added in this fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One SSE `data:` payload of a streaming completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    /// Identifier shared by every chunk of the stream.
    pub id: String,
    /// Unix timestamp of when this chunk was created.
    #[serde(default)]
    pub created: u64,
    /// The model generating this stream.
    pub model: String,
    /// Delta choices.
    pub choices: Vec<ChatStreamChoice>,
    /// Token usage (final chunk only, when requested).
    #[serde(default)]
    pub usage: Option<Usage>,
}
