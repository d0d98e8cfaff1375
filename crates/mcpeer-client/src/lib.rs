//! # mcpeer-client
//!
//! Language model clients for mcpeer agents.
//!
//! The [`LLMClient`] trait is the model handle an agent drives: one call per
//! step, optionally streamed. [`OpenAIClient`] implements it for any
//! OpenAI-compatible chat completions endpoint.
//!
//! ## Example
//!
//! ```no_run
//! use mcpeer_client::{LLMClient, OpenAIClient};
//! use mcpeer_common::{ChatRequest, Config, Message};
//! use uuid::Uuid;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("openai", "gpt-4o")
//!     .with_api_key("your-api-key")
//!     .with_base_url("https://api.openai.com/v1");
//!
//! let client = OpenAIClient::new(config)?;
//!
//! let message = Message::user(Uuid::new_v4(), "Hello, world!");
//! let request = ChatRequest::from((client.config(), vec![message]));
//!
//! let response = client.chat(&request).await?;
//! println!("Response: {}", response.message.content);
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;

use mcpeer_common::{ChatChunk, ChatRequest, ChatResponse, Config};

pub mod error;
pub mod openai;

pub use error::ClientError;
pub use openai::OpenAIClient;

/// A boxed stream of chat chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Retry policy that never reconnects an SSE stream.
///
/// Retries are handled a level up, by whoever drives the conversation.
pub(crate) struct NoRetryPolicy;

impl reqwest_eventsource::retry::RetryPolicy for NoRetryPolicy {
    fn retry(
        &self,
        _error: &reqwest_eventsource::Error,
        _last_retry: Option<(usize, Duration)>,
    ) -> Option<Duration> {
        None
    }

    fn set_reconnection_time(&mut self, _duration: Duration) {}
}

/// Trait for LLM client implementations.
///
/// Implementations must be thread-safe, since an agent may share one client
/// across concurrent runs.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// The configuration used to build this client.
    fn config(&self) -> &Config;

    /// Send a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails validation, the network call fails,
    /// the API returns an error status, or the response cannot be parsed.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and stream the response.
    ///
    /// # Errors
    ///
    /// The default implementation returns [`ClientError::StreamingNotSupported`].
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        let _ = request;
        Err(ClientError::StreamingNotSupported.into())
    }

    /// Whether requests may carry tools.
    fn supports_tools(&self) -> bool;

    /// Whether [`LLMClient::chat_stream`] is implemented.
    fn supports_streaming(&self) -> bool;

    /// Validate a chat request before sending.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no messages, a sampling parameter is out of
    /// range, or the request uses tools or streaming this client doesn't support.
    fn validate_request(&self, request: &ChatRequest) -> Result<()> {
        request
            .validate()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        if !self.supports_tools() && request.has_tools() {
            return Err(ClientError::ToolsNotSupported.into());
        }

        if !self.supports_streaming() && request.stream {
            return Err(ClientError::StreamingNotSupported.into());
        }

        Ok(())
    }
}
