//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use futures::StreamExt;
use log::info;

use mcpeer::tools::ToolExecutor;
use mcpeer::{
    AgentEvent, Config, ExecutorAdapter, McpAgent, McpClient, OpenAIClient, ToolAdapter,
    ToolErrorPolicy,
};

use crate::display;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The query to answer
    pub query: String,

    /// Base URL for the API endpoint
    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub base_url: String,

    /// API key for authentication
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Model to use for chat completion
    #[arg(long, default_value = "gpt-4o")]
    pub model: String,

    /// Restrict the run to one configured server
    #[arg(long)]
    pub server: Option<String>,

    /// Maximum number of model calls
    #[arg(long, default_value_t = 5)]
    pub max_steps: usize,

    /// Only offer the tools of the server used last, plus server switching tools
    #[arg(long)]
    pub use_server_manager: bool,

    /// Never offer or run this tool (repeatable)
    #[arg(long = "disallow", value_name = "TOOL")]
    pub disallowed_tools: Vec<String>,

    /// Print events as the run progresses
    #[arg(long)]
    pub stream: bool,

    /// Report tool failures to the model instead of stopping the run
    #[arg(long)]
    pub report_tool_errors: bool,

    /// Override the system prompt
    #[arg(long)]
    pub system_prompt: Option<String>,
}

/// Connects each server and prints its tools.
pub async fn list_tools(client: &McpClient, server: Option<&str>) -> Result<()> {
    let servers = match server {
        Some(name) => match client.config().server(name) {
            Some(config) => vec![config],
            None => bail!(
                "Unknown server '{name}'. Configured servers: {}",
                client.config().server_names().join(", ")
            ),
        },
        None => client.config().servers().iter().collect(),
    };
    if servers.is_empty() {
        println!("No MCP servers configured");
        return Ok(());
    }

    let mut reachable = 0;
    for config in servers {
        match ExecutorAdapter.create_tools(client, Some(&config.name)).await {
            Ok(tools) => {
                let mut executor = ToolExecutor::new();
                for tool in tools {
                    executor.add_tool_arc(tool);
                }
                display::display_server(config, &executor.get_all_tools());
                reachable += 1;
            }
            Err(e) => display::display_server_error(config, &e),
        }
    }

    if reachable == 0 {
        bail!("No MCP server could be reached");
    }
    Ok(())
}

/// Runs one query through an agent.
pub async fn run(client: Arc<McpClient>, args: RunArgs) -> Result<()> {
    let config = Config::new("openai", &args.model)
        .with_base_url(&args.base_url)
        .with_api_key(&args.api_key);
    let llm = OpenAIClient::new(config)?;

    let mut builder = McpAgent::builder(llm, client)
        .max_steps(args.max_steps)
        .use_server_manager(args.use_server_manager)
        .disallowed_tools(args.disallowed_tools);
    if let Some(server) = args.server {
        builder = builder.server_name(server);
    }
    if let Some(prompt) = args.system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if args.report_tool_errors {
        builder = builder.tool_error_policy(ToolErrorPolicy::ReportToModel);
    }
    let agent = builder.build();

    if args.stream {
        stream(&agent, args.query).await
    } else {
        let outcome = agent.run(&args.query, None).await?;
        display::display_outcome(&outcome, true);
        Ok(())
    }
}

async fn stream(agent: &McpAgent<OpenAIClient>, query: String) -> Result<()> {
    let mut events = agent.astream(query);
    loop {
        let event = tokio::select! {
            event = events.next() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, cancelling the run");
                println!();
                return Ok(());
            }
        };
        let Some(event) = event else {
            return Ok(());
        };

        match event? {
            AgentEvent::StepStarted { step, tools } => display::display_step(step, &tools),
            AgentEvent::TextDelta { text, .. } => display::display_text(&text),
            AgentEvent::ToolCall { call, server, .. } => {
                display::display_tool_call(&call, server.as_deref());
            }
            AgentEvent::ToolResult {
                tool,
                output,
                is_error,
                ..
            } => display::display_tool_result(&tool, &output, is_error),
            AgentEvent::Finished(outcome) => display::display_outcome(&outcome, false),
        }
    }
}
