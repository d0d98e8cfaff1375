use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info};
use tokio::sync::mpsc;
use uuid::Uuid;

use mcpeer_client::{ClientError, LLMClient};
use mcpeer_common::chat::Message;
use mcpeer_common::client::{ChatRequest, ChatResponse, ToolChoice};
use mcpeer_common::tools::{Tool, ToolCall, ToolCallDelta};
use mcpeer_tools::ToolExecutor;
use mcpeer_tools::mcp::{McpClient, McpError};

use crate::builder::AgentBuilder;
use crate::catalog::{CatalogEntry, Scope, ToolCatalog};
use crate::error::AgentError;
use crate::events::{AgentEvent, RunOutcome};
use crate::options::{AgentOptions, StepLimitPolicy, ToolErrorPolicy};
use crate::server_manager::{self, ServerManager};
use crate::stream::{AgentStream, EventSink};

const SERVER_MANAGER_PROMPT: &str = "Tools are grouped by MCP server. Use list_mcp_servers to see the servers \
     and connect_to_mcp_server to switch to the one that fits the task.";

/// An agent answering queries with the tools of MCP servers.
///
/// Each run alternates between asking the model for its next move and
/// running the tools it requests, until the model answers without tools or
/// `max_steps` model calls have been made.
///
/// The agent holds shared handles to its model client and [`McpClient`];
/// cloning it is cheap and clones share both.
pub struct McpAgent<C: LLMClient> {
    llm: Arc<C>,
    client: Arc<McpClient>,
    options: AgentOptions,
}

impl<C: LLMClient> Clone for McpAgent<C> {
    fn clone(&self) -> Self {
        Self {
            llm: self.llm.clone(),
            client: self.client.clone(),
            options: self.options.clone(),
        }
    }
}

impl<C: LLMClient> McpAgent<C> {
    #[must_use]
    pub fn new(llm: Arc<C>, client: Arc<McpClient>, options: AgentOptions) -> Self {
        let mut options = options;
        options.max_steps = options.max_steps.max(1);
        options.stream_buffer = options.stream_buffer.max(1);
        Self {
            llm,
            client,
            options,
        }
    }

    pub fn builder(llm: C, client: Arc<McpClient>) -> AgentBuilder<C> {
        AgentBuilder::new(llm, client)
    }

    #[must_use]
    pub const fn options(&self) -> &AgentOptions {
        &self.options
    }

    #[must_use]
    pub const fn client(&self) -> &Arc<McpClient> {
        &self.client
    }

    #[must_use]
    pub const fn llm(&self) -> &Arc<C> {
        &self.llm
    }

    /// Runs a query to completion.
    ///
    /// `server_name` restricts the run to one server's tools, overriding the
    /// agent's configured server.
    ///
    /// # Errors
    /// - [`AgentError::NoTools`] if no tool is usable.
    /// - [`AgentError::Connection`] if the requested server cannot be connected.
    /// - [`AgentError::Tool`] if a tool fails under [`ToolErrorPolicy::Surface`].
    /// - [`AgentError::StepLimitExceeded`] under [`StepLimitPolicy::Error`].
    /// - [`AgentError::Llm`] if the model call fails.
    pub async fn run(&self, query: &str, server_name: Option<&str>) -> Result<RunOutcome, AgentError> {
        self.drive(query, server_name, &EventSink::Silent).await
    }

    /// Starts a streamed run and returns its events.
    ///
    /// The run executes on a spawned task and waits whenever
    /// `stream_buffer` events are pending. Errors arrive as the last item.
    /// Must be called within a Tokio runtime.
    #[must_use = "dropping the stream cancels the run"]
    pub fn astream(&self, query: impl Into<String>) -> AgentStream
    where
        C: 'static,
    {
        let (tx, rx) = mpsc::channel(self.options.stream_buffer);
        let agent = self.clone();
        let query = query.into();

        tokio::spawn(async move {
            let sink = EventSink::Channel(tx);
            match agent.drive(&query, None, &sink).await {
                Ok(_) => {}
                Err(AgentError::Cancelled) => info!("Streamed run cancelled by its consumer"),
                Err(e) => sink.fail(e).await,
            }
        });

        AgentStream::new(rx)
    }

    async fn drive(
        &self,
        query: &str,
        server_name: Option<&str>,
        sink: &EventSink,
    ) -> Result<RunOutcome, AgentError> {
        let scope = server_name.or(self.options.server_name.as_deref());
        let disallowed = &self.options.disallowed_tools;
        let reserved: &[&str] = if self.options.use_server_manager {
            &server_manager::TOOL_NAMES
        } else {
            &[]
        };
        let catalog = ToolCatalog::load(&self.client, scope, disallowed, reserved).await?;
        let mut manager = self
            .options
            .use_server_manager
            .then(|| ServerManager::new(self.options.server_manager_fallback));
        let manager_tools = if manager.is_some() {
            ServerManager::definitions(disallowed)
        } else {
            Vec::new()
        };

        let conversation_id = Uuid::new_v4();
        let mut system_prompt = self.options.system_prompt.clone();
        if manager.is_some() {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(SERVER_MANAGER_PROMPT);
        }
        let mut messages = vec![
            Message::system(conversation_id, system_prompt),
            Message::user(conversation_id, query),
        ];
        let mut partial: Option<String> = None;
        let max_steps = self.options.max_steps;

        for step in 1..=max_steps {
            let visible = match &manager {
                Some(manager) => catalog.visible(&manager.scope(), manager.active()),
                None => catalog.visible(&Scope::All, None),
            };
            let mut tools: Vec<Tool> = visible.iter().map(|e| e.definition.clone()).collect();
            tools.extend(manager_tools.iter().cloned());

            info!("Executing step ({step}/{max_steps}) with {} tools", tools.len());
            sink.emit(AgentEvent::StepStarted {
                step,
                tools: tools.iter().map(|t| t.function.name.clone()).collect(),
            })
            .await?;

            let request = ChatRequest::from((self.llm.config(), messages.clone()))
                .with_tools(tools)
                .with_tool_choice(ToolChoice::Auto);
            let reply = self.complete(request, conversation_id, step, sink).await?;

            if !reply.content.trim().is_empty() {
                partial = Some(reply.content.clone());
            }
            let tool_calls = reply.tool_calls.clone();
            messages.push(reply);

            if tool_calls.is_empty() {
                let answer = messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                debug!("No tool calls in response, run completed in {step} steps");
                let outcome = RunOutcome::Completed {
                    answer,
                    steps: step,
                };
                sink.emit(AgentEvent::Finished(outcome.clone())).await?;
                return Ok(outcome);
            }

            let mut servers_used = Vec::new();
            for call in &tool_calls {
                let name = call.function.name.as_str();
                let (output, is_error) = match manager.as_mut() {
                    Some(manager) if manager_tools.iter().any(|t| t.function.name == name) => {
                        sink.emit(AgentEvent::ToolCall {
                            step,
                            call: call.clone(),
                            server: None,
                        })
                        .await?;
                        (manager.handle(call, &catalog), false)
                    }
                    _ => match visible.iter().find(|e| e.name() == name) {
                        Some(entry) => {
                            sink.emit(AgentEvent::ToolCall {
                                step,
                                call: call.clone(),
                                server: Some(entry.server.clone()),
                            })
                            .await?;
                            servers_used.push(entry.server.clone());
                            self.invoke(entry, call, sink).await?
                        }
                        None => {
                            sink.emit(AgentEvent::ToolCall {
                                step,
                                call: call.clone(),
                                server: None,
                            })
                            .await?;
                            log::warn!("Model requested unavailable tool '{name}'");
                            (unavailable(name, &visible, &manager_tools), true)
                        }
                    },
                };

                sink.emit(AgentEvent::ToolResult {
                    step,
                    tool: name.to_string(),
                    output: output.clone(),
                    is_error,
                })
                .await?;
                messages.push(
                    Message::tool(conversation_id, output, call.id.clone(), name.to_string())
                        .map_err(AgentError::Llm)?,
                );
            }

            if let Some(manager) = manager.as_mut() {
                manager.observe_step(&servers_used);
            }
        }

        info!("Step limit of {max_steps} reached");
        match self.options.step_limit_policy {
            StepLimitPolicy::ReturnPartial => {
                let outcome = RunOutcome::Aborted {
                    partial,
                    steps: max_steps,
                };
                sink.emit(AgentEvent::Finished(outcome.clone())).await?;
                Ok(outcome)
            }
            StepLimitPolicy::Error => Err(AgentError::StepLimitExceeded {
                steps: max_steps,
                partial,
            }),
        }
    }

    /// Asks the model for its next move.
    async fn complete(
        &self,
        request: ChatRequest,
        conversation_id: Uuid,
        step: usize,
        sink: &EventSink,
    ) -> Result<Message, AgentError> {
        if sink.is_streaming() && self.llm.supports_streaming() {
            return self
                .complete_streaming(request.with_streaming(true), conversation_id, step, sink)
                .await;
        }

        let response = sink.interruptible(self.chat_with_retry(&request)).await??;
        let mut message = response.message;
        message.conversation_id = conversation_id;
        if !message.content.is_empty() {
            sink.emit(AgentEvent::TextDelta {
                step,
                text: message.content.clone(),
            })
            .await?;
        }
        Ok(message)
    }

    async fn complete_streaming(
        &self,
        request: ChatRequest,
        conversation_id: Uuid,
        step: usize,
        sink: &EventSink,
    ) -> Result<Message, AgentError> {
        let mut stream = sink
            .interruptible(self.llm.chat_stream(&request))
            .await?
            .map_err(AgentError::Llm)?;

        let mut content = String::new();
        let mut deltas: Vec<ToolCallDelta> = Vec::new();
        while let Some(chunk) = sink.interruptible(stream.next()).await? {
            let chunk = chunk.map_err(AgentError::Llm)?;
            if let Some(text) = chunk.delta_content.filter(|t| !t.is_empty()) {
                content.push_str(&text);
                sink.emit(AgentEvent::TextDelta { step, text }).await?;
            }
            if let Some(fragments) = chunk.delta_tool_calls {
                debug!("Received {} tool call delta(s)", fragments.len());
                deltas.extend(fragments);
            }
        }

        Message::assistant(conversation_id, content)
            .with_tool_calls(ToolCall::merge_deltas(&deltas))
            .map_err(AgentError::Llm)
    }

    /// Sends a chat request, retrying transient client errors.
    async fn chat_with_retry(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AgentError> {
        let retry = &self.llm.config().retry_config;
        let mut attempt = 0;
        loop {
            match self.llm.chat(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let retryable = e
                        .downcast_ref::<ClientError>()
                        .is_some_and(ClientError::is_retryable);
                    if !retryable || attempt >= retry.max_retries {
                        return Err(AgentError::Llm(e));
                    }
                    let delay = retry.delay_for_attempt(attempt);
                    debug!("Request failed (attempt {}), retrying in {delay:?}: {e}", attempt + 1);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Runs one MCP tool call under the retry and error policies.
    ///
    /// Returns the observation and whether it reports a failure.
    async fn invoke(
        &self,
        entry: &CatalogEntry,
        call: &ToolCall,
        sink: &EventSink,
    ) -> Result<(String, bool), AgentError> {
        let name = entry.name();
        let args = ToolExecutor::parse_arguments(&call.function);
        debug!("Tool Name: {name} (id: {}) on '{}'", call.id, entry.server);
        debug!("Tool Arguments: {args}");

        let mut attempt = 0;
        loop {
            let result = sink
                .tool_call(entry.tool.execute(&args), self.options.cancel_grace)
                .await?;

            let err = match result {
                Ok(output) => {
                    debug!("Tool {name} executed successfully");
                    return Ok((output, false));
                }
                Err(e) => e
                    .downcast::<McpError>()
                    .unwrap_or_else(|e| McpError::tool(name, e)),
            };

            if attempt < self.options.max_tool_retries {
                attempt += 1;
                log::warn!(
                    "Tool '{name}' failed: {err}; retrying ({attempt}/{})",
                    self.options.max_tool_retries
                );
                continue;
            }

            return match self.options.tool_error_policy {
                ToolErrorPolicy::Surface => {
                    log::error!("Tool '{name}' failed: {err}");
                    Err(AgentError::Tool(err))
                }
                ToolErrorPolicy::ReportToModel => {
                    log::warn!("Tool '{name}' failed: {err}; reporting to the model");
                    Ok((format!("Error executing MCP tool: {err}"), true))
                }
            };
        }
    }
}

fn unavailable(name: &str, visible: &[&CatalogEntry], manager_tools: &[Tool]) -> String {
    let names: Vec<&str> = visible
        .iter()
        .map(|e| e.name())
        .chain(manager_tools.iter().map(|t| t.function.name.as_str()))
        .collect();
    format!(
        "Tool '{name}' is not available. Available tools: {}",
        names.join(", ")
    )
}
