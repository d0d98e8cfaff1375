use std::sync::Arc;
use std::time::Duration;

use mcpeer_client::LLMClient;
use mcpeer_tools::mcp::McpClient;

use crate::McpAgent;
use crate::options::{AgentOptions, ServerManagerFallback, StepLimitPolicy, ToolErrorPolicy};

/// Fluent builder for [`McpAgent`].
///
/// # Example
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use mcpeer_agent::{AgentBuilder, ToolErrorPolicy};
/// # use mcpeer_client::OpenAIClient;
/// # use mcpeer_common::Config;
/// # use mcpeer_tools::mcp::McpClient;
/// # fn example() -> anyhow::Result<()> {
/// let llm = OpenAIClient::new(Config::new("openai", "gpt-4o").with_api_key("sk-..."))?;
/// let client = Arc::new(McpClient::from_config_file("browser_mcp.json".as_ref())?);
///
/// let agent = AgentBuilder::new(llm, client)
///     .max_steps(30)
///     .disallow_tool("browser_close")
///     .tool_error_policy(ToolErrorPolicy::ReportToModel)
///     .build();
/// # Ok(())
/// # }
/// ```
pub struct AgentBuilder<C: LLMClient> {
    llm: Arc<C>,
    client: Arc<McpClient>,
    options: AgentOptions,
}

impl<C: LLMClient> AgentBuilder<C> {
    pub fn new(llm: C, client: Arc<McpClient>) -> Self {
        Self::from_shared(Arc::new(llm), client)
    }

    /// Starts from a model client that is already shared.
    pub fn from_shared(llm: Arc<C>, client: Arc<McpClient>) -> Self {
        Self {
            llm,
            client,
            options: AgentOptions::default(),
        }
    }

    /// Replaces every option at once.
    #[must_use]
    pub fn options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    /// Maximum model calls per run. Values below 1 are raised to 1.
    #[must_use]
    pub const fn max_steps(mut self, max_steps: usize) -> Self {
        self.options.max_steps = max_steps;
        self
    }

    /// Never offers the named tool to the model.
    #[must_use]
    pub fn disallow_tool(mut self, name: impl Into<String>) -> Self {
        self.options.disallowed_tools.insert(name.into());
        self
    }

    #[must_use]
    pub fn disallowed_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .disallowed_tools
            .extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub const fn use_server_manager(mut self, enabled: bool) -> Self {
        self.options.use_server_manager = enabled;
        self
    }

    /// Restricts runs to one server's tools.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.options.server_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub const fn tool_error_policy(mut self, policy: ToolErrorPolicy) -> Self {
        self.options.tool_error_policy = policy;
        self
    }

    #[must_use]
    pub const fn max_tool_retries(mut self, retries: u32) -> Self {
        self.options.max_tool_retries = retries;
        self
    }

    #[must_use]
    pub const fn step_limit_policy(mut self, policy: StepLimitPolicy) -> Self {
        self.options.step_limit_policy = policy;
        self
    }

    #[must_use]
    pub const fn server_manager_fallback(mut self, fallback: ServerManagerFallback) -> Self {
        self.options.server_manager_fallback = fallback;
        self
    }

    #[must_use]
    pub const fn cancel_grace(mut self, grace: Duration) -> Self {
        self.options.cancel_grace = grace;
        self
    }

    #[must_use]
    pub const fn stream_buffer(mut self, capacity: usize) -> Self {
        self.options.stream_buffer = capacity;
        self
    }

    pub fn build(self) -> McpAgent<C> {
        McpAgent::new(self.llm, self.client, self.options)
    }
}
