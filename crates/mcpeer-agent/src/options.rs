use std::collections::HashSet;
use std::time::Duration;

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant that can use tools to help users.";

/// What happens when a tool call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolErrorPolicy {
    /// End the run with [`crate::AgentError::Tool`].
    #[default]
    Surface,
    /// Hand the error text to the model as the tool's observation and continue.
    ReportToModel,
}

/// What happens when `max_steps` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepLimitPolicy {
    /// Return [`crate::RunOutcome::Aborted`] with the last text seen.
    #[default]
    ReturnPartial,
    /// Fail with [`crate::AgentError::StepLimitExceeded`].
    Error,
}

/// Tool visibility in server manager mode when no single server is implied
/// by the model's last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerManagerFallback {
    /// Offer every server's tools.
    #[default]
    AllTools,
    /// Keep the previously active server; before one is chosen, only the
    /// manager tools are offered.
    KeepActive,
}

/// Agent settings. Build through [`crate::AgentBuilder`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Model selections per run; always at least 1.
    pub max_steps: usize,
    /// Tool names never offered to the model.
    pub disallowed_tools: HashSet<String>,
    /// Restrict visible tools to the server of the model's latest choice.
    pub use_server_manager: bool,
    /// Only use this server's tools (overridden by `run`'s `server_name`).
    pub server_name: Option<String>,
    pub system_prompt: String,
    pub tool_error_policy: ToolErrorPolicy,
    /// Extra attempts for a failing tool call before the error policy applies.
    pub max_tool_retries: u32,
    pub step_limit_policy: StepLimitPolicy,
    pub server_manager_fallback: ServerManagerFallback,
    /// How long an in-flight tool call may keep running after its stream is dropped.
    pub cancel_grace: Duration,
    /// Events buffered by `astream` before the run waits for the consumer.
    pub stream_buffer: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_steps: 5,
            disallowed_tools: HashSet::new(),
            use_server_manager: false,
            server_name: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tool_error_policy: ToolErrorPolicy::default(),
            max_tool_retries: 0,
            step_limit_policy: StepLimitPolicy::default(),
            server_manager_fallback: ServerManagerFallback::default(),
            cancel_grace: Duration::from_secs(5),
            stream_buffer: 32,
        }
    }
}
