use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::chat::{Message, MessageRole};
use crate::tools::{Tool, ToolCallDelta};

/// Controls how the model selects which tool to call, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ToolChoice {
    /// Let the model decide whether to call a tool and which one.
    #[serde(rename = "auto")]
    Auto,
    /// Disable tool calling for this request.
    #[serde(rename = "none")]
    None,
    /// Require the model to call at least one tool.
    #[serde(rename = "required")]
    Required,
    /// Force the model to call a specific function by name.
    Function {
        /// The name of the function to call
        name: String,
    },
}

impl fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::None => write!(f, "none"),
            Self::Required => write!(f, "required"),
            Self::Function { name } => write!(f, "{name}"),
        }
    }
}

impl From<ToolChoice> for serde_json::Value {
    fn from(tool_choice: ToolChoice) -> Self {
        match tool_choice {
            ToolChoice::Auto => Self::String("auto".to_string()),
            ToolChoice::None => Self::String("none".to_string()),
            ToolChoice::Required => Self::String("required".to_string()),
            ToolChoice::Function { name } => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

/// Indicates why the model stopped generating tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FinishReason {
    /// Generation completed naturally.
    #[serde(rename = "stop")]
    Stop,
    /// Generation hit the token limit.
    #[serde(rename = "length")]
    Length,
    /// The model requested tool calls.
    #[serde(rename = "tool_calls")]
    ToolCalls,
    /// Output was blocked by the content filter.
    #[serde(rename = "content_filter")]
    ContentFilter,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ToolCalls => write!(f, "tool_calls"),
            Self::ContentFilter => write!(f, "content_filter"),
        }
    }
}

impl FromStr for FinishReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "length" => Ok(Self::Length),
            // Older OpenAI-compatible servers still send `function_call`.
            "tool_calls" | "function_call" => Ok(Self::ToolCalls),
            "content_filter" => Ok(Self::ContentFilter),
            _ => anyhow::bail!("Unknown finish reason: {s}"),
        }
    }
}

/// Configuration for exponential backoff retry behavior.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mcpeer_common::client::RetryConfig;
///
/// let config = RetryConfig {
///     max_retries: 5,
///     initial_delay: Duration::from_millis(500),
///     max_delay: Duration::from_secs(60),
///     backoff_multiplier: 2.0,
/// };
/// assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts before failing.
    pub max_retries: usize,
    /// Delay before the first retry attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// The delay before retry number `attempt` (zero-based), capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if delay.is_finite() && delay < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(delay)
        } else {
            self.max_delay
        }
    }
}

/// Token usage statistics for a completion request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the input prompt.
    pub prompt_tokens: u32,
    /// Number of tokens in the generated completion.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// A chat completion request.
///
/// # Examples
///
/// ```
/// use mcpeer_common::{ChatRequest, Config, Message};
/// use uuid::Uuid;
///
/// let config = Config::new("openai", "gpt-4o").with_temperature(0.2);
/// let request = ChatRequest::from((&config, vec![Message::user(Uuid::new_v4(), "hi")]));
/// assert_eq!(request.model.as_deref(), Some("gpt-4o"));
/// assert_eq!(request.temperature, Some(0.2));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The messages to send to the model.
    pub messages: Arc<[Message]>,
    /// The model identifier to use for generation.
    pub model: Option<String>,
    /// Sampling temperature (0.0 to 2.0).
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate in the response.
    pub max_tokens: Option<u32>,
    /// Nucleus sampling threshold (0.0 to 1.0).
    pub top_p: Option<f32>,
    /// Tools available for the model to call.
    pub tools: Option<Vec<Tool>>,
    /// Strategy for tool selection.
    pub tool_choice: Option<ToolChoice>,
    /// Whether to stream the response incrementally.
    pub stream: bool,
}

impl ChatRequest {
    /// Creates a new chat request with the given messages and no parameters.
    pub fn new(messages: impl Into<Arc<[Message]>>) -> Self {
        Self {
            messages: messages.into(),
            model: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            tools: None,
            tool_choice: None,
            stream: false,
        }
    }

    /// Sets the model to use for this request.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the tools offered to the model. An empty list clears them.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }

    /// Sets the tool selection strategy.
    #[must_use]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// Enables or disables streaming.
    #[must_use]
    pub const fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns an error when there are no messages or a sampling parameter is out of range.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.messages.is_empty() {
            anyhow::bail!("Chat request must have at least one message");
        }
        validate_sampling(self.temperature, self.top_p)
    }

    /// Returns whether this request has tools configured.
    #[must_use]
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

impl From<(&Config, Arc<[Message]>)> for ChatRequest {
    fn from((config, messages): (&Config, Arc<[Message]>)) -> Self {
        Self {
            messages,
            model: Some(config.model.clone()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            tools: None,
            tool_choice: None,
            stream: false,
        }
    }
}

impl From<(&Config, Vec<Message>)> for ChatRequest {
    fn from((config, messages): (&Config, Vec<Message>)) -> Self {
        Self::from((config, Arc::<[Message]>::from(messages)))
    }
}

/// A response from a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated message from the model.
    pub message: Message,
    /// The identifier of the model that generated this response.
    pub model: String,
    /// Token usage statistics for this request.
    pub usage: Option<Usage>,
    /// Reason why generation stopped.
    pub finish_reason: Option<FinishReason>,
    /// Timestamp when this response was created.
    pub created_at: DateTime<Utc>,
    /// Identifier assigned by the provider.
    pub response_id: Option<String>,
}

/// A chunk from a streaming chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// The model identifier that generated this chunk.
    pub model: String,
    /// Incremental content added in this chunk.
    pub delta_content: Option<String>,
    /// The role of the message (only present in the first chunk).
    pub delta_role: Option<MessageRole>,
    /// Tool call fragments, merged with [`crate::ToolCall::merge_deltas`].
    pub delta_tool_calls: Option<Vec<ToolCallDelta>>,
    /// Reason why generation stopped (only present in the final chunk).
    pub finish_reason: Option<FinishReason>,
    /// Token usage statistics, when the provider reports them.
    pub usage: Option<Usage>,
    /// Identifier of the response stream.
    pub response_id: Option<String>,
    /// Timestamp when this chunk was created.
    pub created_at: DateTime<Utc>,
}

/// Configuration for an LLM client.
///
/// The `api_key` is a `SecretString`, so it never shows up in `Debug`
/// output or serialized configs.
///
/// # Examples
///
/// ```
/// use mcpeer_common::Config;
///
/// let config = Config::new("openai", "gpt-4o")
///     .with_api_key("sk-...")
///     .with_temperature(0.7)
///     .with_max_tokens(1000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The LLM provider name (e.g., "openai").
    pub provider: String,
    /// The default model identifier to use.
    pub model: String,
    /// Custom base URL for self-hosted or compatible endpoints.
    pub base_url: Option<String>,
    /// API key for authentication.
    #[serde(skip_serializing, default)]
    pub api_key: Option<SecretString>,
    /// Request timeout in seconds.
    pub timeout_seconds: Option<u64>,
    /// Retry behavior for transient failures.
    #[serde(skip)]
    pub retry_config: RetryConfig,
    /// Default sampling temperature (0.0 to 2.0).
    pub temperature: Option<f32>,
    /// Default maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Default nucleus sampling threshold (0.0 to 1.0).
    pub top_p: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            timeout_seconds: None,
            retry_config: RetryConfig::default(),
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with the specified provider and model.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Sets a custom base URL for API requests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the API key for authentication.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into().into()));
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Sets the default sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the default maximum tokens to generate.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the default nucleus sampling threshold.
    #[must_use]
    pub const fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Validates the sampling parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `temperature` is outside 0.0..=2.0 or `top_p` outside 0.0..=1.0.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_sampling(self.temperature, self.top_p)
    }
}

fn validate_sampling(temperature: Option<f32>, top_p: Option<f32>) -> anyhow::Result<()> {
    if let Some(temp) = temperature
        && !(0.0..=2.0).contains(&temp)
    {
        anyhow::bail!("Temperature must be between 0.0 and 2.0, got {temp}");
    }

    if let Some(top_p) = top_p
        && !(0.0..=1.0).contains(&top_p)
    {
        anyhow::bail!("top_p must be between 0.0 and 1.0, got {top_p}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use secrecy::ExposeSecret;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_api_key_is_redacted() {
        let config = Config::new("openai", "gpt-4o").with_api_key("sk-secret");

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));

        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("api_key").is_none());
        assert_eq!(
            config.api_key.as_ref().unwrap().expose_secret(),
            "sk-secret"
        );
    }

    #[test]
    fn test_request_from_config() {
        let config = Config::new("openai", "gpt-4o-mini").with_max_tokens(256);
        let request = ChatRequest::from((&config, vec![Message::user(Uuid::new_v4(), "hi")]))
            .with_tools(Vec::new());

        assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(request.max_tokens, Some(256));
        assert!(!request.has_tools());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_empty_request_is_invalid() {
        let request = ChatRequest::new(Vec::<Message>::new());
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_finish_reason_parsing() {
        assert_eq!("tool_calls".parse::<FinishReason>().unwrap(), FinishReason::ToolCalls);
        assert_eq!("function_call".parse::<FinishReason>().unwrap(), FinishReason::ToolCalls);
        assert!("exploded".parse::<FinishReason>().is_err());
    }

    #[test]
    fn test_tool_choice_to_value() {
        let value: serde_json::Value = ToolChoice::Function {
            name: "search".into(),
        }
        .into();
        assert_eq!(value["function"]["name"], "search");
        assert_eq!(serde_json::Value::from(ToolChoice::Auto), "auto");
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(50), retry.max_delay);
    }
}

#[cfg(test)]
mod proptests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn temperature_validation(temp in -10.0f32..10.0f32) {
            let config = Config::new("openai", "gpt-4o").with_temperature(temp);
            let is_valid = (0.0..=2.0).contains(&temp);
            prop_assert_eq!(config.validate().is_ok(), is_valid);
        }

        #[test]
        fn top_p_validation(top_p in -5.0f32..5.0f32) {
            let config = Config::new("openai", "gpt-4o").with_top_p(top_p);
            let is_valid = (0.0..=1.0).contains(&top_p);
            prop_assert_eq!(config.validate().is_ok(), is_valid);
        }
    }
}
