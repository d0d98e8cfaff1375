//! Scripted language model for agent tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use mcpeer_client::{ChatStream, LLMClient};
use mcpeer_common::chat::{Message, MessageRole};
use mcpeer_common::client::{ChatChunk, ChatRequest, ChatResponse, Config, FinishReason};
use mcpeer_common::tools::{ToolCall, ToolCallDelta};

/// A text answer.
pub fn answer(text: &str) -> Message {
    Message::assistant(Uuid::nil(), text)
}

/// A reply requesting one tool.
pub fn call(name: &str, arguments: &str) -> Message {
    calls(&[(name, arguments)])
}

/// A reply requesting several tools, in order.
pub fn calls(requested: &[(&str, &str)]) -> Message {
    let tool_calls: Vec<ToolCall> = requested
        .iter()
        .map(|(name, args)| ToolCall::new(*name, *args))
        .collect();
    Message::assistant(Uuid::nil(), "").with_tool_calls(tool_calls).unwrap()
}

/// Replies from a script, recording every request it receives.
pub struct ScriptedLlm {
    config: Config,
    script: Mutex<VecDeque<Message>>,
    repeat: Option<Message>,
    streaming: bool,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            config: Config::new("scripted", "scripted-model"),
            script: Mutex::new(replies.into()),
            repeat: None,
            streaming: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `reply`.
    pub fn repeating(reply: Message) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Tool names offered in request `index`.
    pub fn offered_tools(&self, index: usize) -> Vec<String> {
        self.requests()[index]
            .tools
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.function.name)
            .collect()
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<Message> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.script.lock().unwrap().pop_front();
        let mut reply = reply
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
        // Fresh ids so repeated replies do not reuse tool call ids.
        for call in &mut reply.tool_calls {
            *call = ToolCall::new(call.function.name.clone(), call.function.arguments.clone());
        }
        Ok(reply)
    }
}

#[async_trait]
impl LLMClient for ScriptedLlm {
    fn config(&self) -> &Config {
        &self.config
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let message = self.next_reply(request)?;
        let finish_reason = if message.has_tool_calls() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        Ok(ChatResponse {
            message,
            model: self.config.model.clone(),
            usage: None,
            finish_reason: Some(finish_reason),
            created_at: chrono::Utc::now(),
            response_id: None,
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        let message = self.next_reply(request)?;
        let chunk = |content: Option<String>, deltas: Option<Vec<ToolCallDelta>>| ChatChunk {
            model: "scripted-model".to_string(),
            delta_content: content,
            delta_role: Some(MessageRole::Assistant),
            delta_tool_calls: deltas,
            finish_reason: None,
            usage: None,
            response_id: None,
            created_at: chrono::Utc::now(),
        };

        let mut chunks = Vec::new();
        let text: Vec<char> = message.content.chars().collect();
        let (head, tail) = text.split_at(text.len() / 2);
        for piece in [head, tail] {
            if !piece.is_empty() {
                chunks.push(chunk(Some(piece.iter().collect()), None));
            }
        }
        for (index, call) in message.tool_calls.iter().enumerate() {
            let delta = ToolCallDelta {
                index: u32::try_from(index).unwrap(),
                id: Some(call.id.clone()),
                name: Some(call.function.name.clone()),
                arguments: Some(call.function.arguments.clone()),
            };
            chunks.push(chunk(None, Some(vec![delta])));
        }

        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}
