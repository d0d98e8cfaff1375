//! Client for OpenAI-compatible chat completion APIs.
//!
//! Non-streaming requests go through a `reqwest-middleware` stack that
//! honours `Retry-After` and retries transient failures with exponential
//! backoff. Streaming requests use server-sent events without automatic
//! reconnection.
//!
//! API keys are held as `SecretString` and only exposed when building the
//! `Authorization` header.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use log::{debug, error, warn};
use reqwest_eventsource::{Event, EventSource};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_retry_after::RetryAfterMiddleware;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use mcpeer_common::client::{ChatChunk, ChatRequest, ChatResponse, Config};
use mcpeer_common::tools::ToolCallDelta;

use crate::error::{ClientError, ErrorResponse};
use crate::openai::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::{ChatStream, LLMClient, NoRetryPolicy};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible chat completion endpoints.
///
/// Works with OpenAI itself and with compatible servers (vLLM, Ollama,
/// LiteLLM, ...) through [`Config::with_base_url`].
#[derive(Clone)]
pub struct OpenAIClient {
    client: ClientWithMiddleware,
    streaming_client: reqwest::Client,
    api_key: Arc<SecretString>,
    base_url: String,
    config: Arc<Config>,
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

fn timestamp(created: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::try_from(created).unwrap_or(0), 0).unwrap_or_else(Utc::now)
}

/// Convert an OpenAI streaming chunk to the common `ChatChunk`.
#[must_use]
pub fn convert_chunk_to_chat_chunk(chunk: &ChatCompletionChunk) -> ChatChunk {
    let choice = chunk.choices.first();

    let delta_tool_calls = choice
        .and_then(|c| c.delta.tool_calls.as_ref())
        .map(|deltas| {
            deltas
                .iter()
                .map(|delta| ToolCallDelta {
                    index: delta.index,
                    id: delta.id.clone(),
                    name: delta.function.as_ref().and_then(|f| f.name.clone()),
                    arguments: delta.function.as_ref().and_then(|f| f.arguments.clone()),
                })
                .collect()
        });

    ChatChunk {
        model: chunk.model.clone(),
        delta_content: choice.and_then(|c| c.delta.content.clone()),
        delta_role: choice.and_then(|c| c.delta.role),
        delta_tool_calls,
        finish_reason: choice
            .and_then(|c| c.finish_reason.as_ref())
            .and_then(|reason| reason.parse().ok()),
        usage: chunk.usage,
        response_id: Some(chunk.id.clone()),
        created_at: timestamp(chunk.created),
    }
}

impl OpenAIClient {
    /// Create a new client from a configuration.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mcpeer_client::OpenAIClient;
    /// use mcpeer_common::Config;
    ///
    /// let config = Config::new("openai", "gpt-4o")
    ///     .with_api_key("sk-...")
    ///     .with_base_url("https://api.openai.com/v1");
    ///
    /// let client = OpenAIClient::new(config)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing, the base URL does not parse,
    /// or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::ConfigurationError("API key is required".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&base_url).map_err(|e| {
            ClientError::ConfigurationError(format!("Invalid base URL '{base_url}': {e}"))
        })?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                config.retry_config.initial_delay,
                config.retry_config.max_delay,
            )
            .build_with_max_retries(u32::try_from(config.retry_config.max_retries).unwrap_or(u32::MAX));

        // No timeout unless configured; local models can be slow.
        let reqwest_client = match config.timeout_seconds {
            Some(timeout) => reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout))
                .build()?,
            None => reqwest::Client::builder().build()?,
        };

        // RetryAfterMiddleware goes first so Retry-After wins over backoff.
        let client = reqwest_middleware::ClientBuilder::new(reqwest_client.clone())
            .with(RetryAfterMiddleware::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            streaming_client: reqwest_client,
            api_key: Arc::new(api_key),
            base_url,
            config: Arc::new(config),
        })
    }

    /// Set the model to use for chat completions.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn make_request<T: for<'de> Deserialize<'de>, B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.endpoint(endpoint);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(body)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.map_err(|e| {
                warn!("Failed to read error response body: {e}");
                ClientError::NetworkError(e)
            })?;

            let error_message = match serde_json::from_str::<ErrorResponse>(&error_text) {
                Ok(parsed) => parsed.error.message,
                Err(parse_err) => {
                    debug!("Error body is not structured JSON ({parse_err}), using raw text");
                    error_text
                }
            };

            error!("API request failed with status {status}: {error_message}");
            return Err(ClientError::from_status(status, error_message));
        }

        let response_text = response.text().await?;
        debug!("Raw API response: {response_text}");
        Ok(serde_json::from_str(&response_text)?)
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    fn config(&self) -> &Config {
        &self.config
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.validate_request(request)?;

        let mut openai_request = ChatCompletionRequest::from((request, self.config.as_ref()));
        openai_request.stream = Some(false);

        let response: ChatCompletionResponse = self
            .make_request("chat/completions", &openai_request)
            .await?;

        let conversation_id = request
            .messages
            .first()
            .map(|m| m.conversation_id)
            .ok_or_else(|| {
                ClientError::InvalidRequest("Request must contain at least one message".into())
            })?;

        let Some(choice) = response.choices.into_iter().next() else {
            warn!(
                "Received empty choices array from API. Response ID: {}, Model: {}",
                response.id, response.model
            );
            return Err(
                ClientError::InvalidResponse("API returned no choices in response".into()).into(),
            );
        };

        let finish_reason = choice
            .finish_reason
            .as_ref()
            .and_then(|reason| reason.parse().ok());

        Ok(ChatResponse {
            message: choice.message.into_message(conversation_id),
            model: response.model,
            usage: response.usage,
            finish_reason,
            created_at: timestamp(response.created),
            response_id: Some(response.id),
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        self.validate_request(request)?;

        let mut openai_request = ChatCompletionRequest::from((request, self.config.as_ref()));
        openai_request.stream = Some(true);
        openai_request.stream_options = Some(serde_json::json!({ "include_usage": true }));

        // The streaming client has no retry middleware; it would replay a
        // half-consumed SSE body.
        let request_builder = self
            .streaming_client
            .post(self.endpoint("chat/completions"))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&openai_request);

        let mut event_source = EventSource::new(request_builder).map_err(|e| {
            ClientError::ConfigurationError(format!("Failed to create event source: {e}"))
        })?;
        event_source.set_retry_policy(Box::new(NoRetryPolicy));

        let stream = event_source.filter_map(|event| async move {
            match event {
                Ok(Event::Open) => {
                    debug!("Stream connection opened");
                    None
                }
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        debug!("Stream completed with [DONE] marker");
                        return None;
                    }
                    match serde_json::from_str::<ChatCompletionChunk>(&message.data) {
                        Ok(chunk) => Some(Ok(convert_chunk_to_chat_chunk(&chunk))),
                        Err(e) => {
                            warn!("Failed to parse streaming chunk: {e}");
                            debug!("Problematic chunk data: {}", message.data);
                            Some(Err(ClientError::SerializationError(e).into()))
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    debug!("Stream ended");
                    None
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let message = response.text().await.unwrap_or_default();
                    error!("Stream request failed with status {status}: {message}");
                    Some(Err(
                        ClientError::from_status(status.as_u16(), message).into()
                    ))
                }
                Err(e) => {
                    error!("Stream error: {e}");
                    Some(Err(ClientError::EventSourceError(e).into()))
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use futures::TryStreamExt;
    use mcpeer_common::chat::{Message, MessageRole};
    use mcpeer_common::client::{FinishReason, RetryConfig};
    use mcpeer_common::{Tool, ToolCall};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(base_url: &str) -> Config {
        Config::new("openai", "gpt-4o")
            .with_api_key("test-key")
            .with_base_url(base_url)
            .with_retry_config(RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            })
    }

    fn create_test_request() -> ChatRequest {
        ChatRequest::new(vec![Message::user(uuid::Uuid::new_v4(), "Hello")])
    }

    async fn mount_error(server: &MockServer, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "error": { "message": message, "type": "error" }
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let config = Config::new("openai", "gpt-4o");
        let err = OpenAIClient::new(config).unwrap_err();
        assert!(err.to_string().contains("API key is required"));
    }

    #[tokio::test]
    async fn test_successful_chat_completion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-123",
                "object": "chat.completion",
                "created": 1_677_652_288,
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello! How can I help?"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
            })))
            .mount(&mock_server)
            .await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let response = client.chat(&create_test_request()).await.unwrap();

        assert_eq!(response.model, "gpt-4o");
        assert_eq!(response.message.content, "Hello! How can I help?");
        assert_eq!(response.message.role, MessageRole::Assistant);
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.usage.unwrap().total_tokens, 30);
    }

    #[tokio::test]
    async fn test_chat_completion_with_tool_calls() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "tools": [{"type": "function", "function": {"name": "search"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-456",
                "created": 1_677_652_288,
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "search", "arguments": "{\"q\":\"rust\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&mock_server)
            .await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let request = create_test_request().with_tools(vec![Tool::function(
            "search",
            "Search the web",
            serde_json::json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        )]);

        let response = client.chat(&request).await.unwrap();
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));

        let calls: Vec<ToolCall> = response.message.tool_calls.into_vec();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, "{\"q\":\"rust\"}");
    }

    #[tokio::test]
    async fn test_unknown_finish_reason() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-123",
                "created": 1_677_652_288,
                "model": "gpt-4o",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Test response"},
                    "finish_reason": "unknown_reason"
                }]
            })))
            .mount(&mock_server)
            .await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let response = client.chat(&create_test_request()).await.unwrap();
        assert_eq!(response.finish_reason, None);
    }

    #[tokio::test]
    async fn test_authentication_error() {
        let mock_server = MockServer::start().await;
        mount_error(&mock_server, 401, "Invalid API key").await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let err = client.chat(&create_test_request()).await.unwrap_err();

        let client_err = err.downcast_ref::<ClientError>().unwrap();
        assert!(client_err.is_authentication_error());
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[tokio::test]
    async fn test_rate_limit_error() {
        let mock_server = MockServer::start().await;
        mount_error(&mock_server, 429, "Rate limit exceeded").await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let err = client.chat(&create_test_request()).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ClientError>().unwrap(),
            ClientError::RateLimitError { .. }
        ));
    }

    #[tokio::test]
    async fn test_server_error() {
        let mock_server = MockServer::start().await;
        mount_error(&mock_server, 500, "Internal server error").await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let err = client.chat(&create_test_request()).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ClientError>().unwrap(),
            ClientError::ServiceUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_choices_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-123",
                "created": 1_677_652_288,
                "model": "gpt-4o",
                "choices": []
            })))
            .mount(&mock_server)
            .await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let err = client.chat(&create_test_request()).await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_streaming_chat_completion() {
        let mock_server = MockServer::start().await;

        let events = [
            r#"{"id":"s1","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"}}]}"#,
            r#"{"id":"s1","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"lo"}}]}"#,
            r#"{"id":"s1","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"search","arguments":"{\"q\":"}}]}}]}"#,
            r#"{"id":"s1","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ];
        let body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "text/event-stream"),
            )
            .mount(&mock_server)
            .await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let stream = client.chat_stream(&create_test_request()).await.unwrap();
        let chunks: Vec<ChatChunk> = stream.try_collect().await.unwrap();

        assert_eq!(chunks.len(), 4);
        let content: String = chunks
            .iter()
            .filter_map(|c| c.delta_content.as_deref())
            .collect();
        assert_eq!(content, "Hello");

        let deltas: Vec<ToolCallDelta> = chunks
            .iter()
            .filter_map(|c| c.delta_tool_calls.clone())
            .flatten()
            .collect();
        let calls = ToolCall::merge_deltas(&deltas);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, "{\"q\":\"rust\"}");
        assert_eq!(chunks[3].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_streaming_error_status() {
        let mock_server = MockServer::start().await;
        mount_error(&mock_server, 401, "Invalid API key").await;

        let client = OpenAIClient::new(create_test_config(&mock_server.uri())).unwrap();
        let stream = client.chat_stream(&create_test_request()).await.unwrap();
        let err = stream.try_collect::<Vec<_>>().await.unwrap_err();

        assert!(
            err.downcast_ref::<ClientError>()
                .unwrap()
                .is_authentication_error()
        );
    }
}
