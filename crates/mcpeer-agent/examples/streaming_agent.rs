use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use log::info;

use mcpeer_agent::{AgentEvent, McpAgent};
use mcpeer_client::OpenAIClient;
use mcpeer_common::client::Config;
use mcpeer_tools::mcp::McpClient;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL for the API endpoint
    #[arg(long, default_value = "http://localhost:8080/v1")]
    base_url: String,

    /// API key for authentication
    #[arg(long, default_value = "dummy")]
    api_key: String,

    /// Model to use for chat completion
    #[arg(long, default_value = "ggml-org/gpt-oss-120b-GGUF")]
    model: String,

    /// MCP configuration file (JSON, YAML or TOML)
    #[arg(long, default_value = "mcp.json")]
    config: PathBuf,

    /// The query to answer
    #[arg(long, default_value = "Which MCP tools can you use?")]
    query: String,

    /// Maximum number of model calls
    #[arg(long, default_value = "10")]
    max_steps: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Streaming MCP Agent Demo");
    info!("========================");
    info!("Base URL: {}", args.base_url);
    info!("Model: {}", args.model);
    info!("MCP config: {}", args.config.display());

    let config = Config::new("openai", &args.model)
        .with_base_url(&args.base_url)
        .with_api_key(&args.api_key);
    let llm = OpenAIClient::new(config)?;
    let client = Arc::new(McpClient::from_config_file(&args.config)?);

    let agent = McpAgent::builder(llm, client.clone())
        .max_steps(args.max_steps)
        .use_server_manager(true)
        .build();

    let start_time = Instant::now();
    let mut events = agent.astream(args.query.clone());
    while let Some(event) = events.next().await {
        match event? {
            AgentEvent::StepStarted { step, tools } => {
                info!("Step {step} with {} tools", tools.len());
            }
            AgentEvent::TextDelta { text, .. } => {
                print!("{text}");
                std::io::stdout().flush()?;
            }
            AgentEvent::ToolCall { call, server, .. } => {
                println!(
                    "\n> {} on {}",
                    call.function.name,
                    server.as_deref().unwrap_or("server manager")
                );
            }
            AgentEvent::ToolResult { output, is_error, .. } => {
                let marker = if is_error { "error" } else { "ok" };
                println!("< [{marker}] {} bytes", output.len());
            }
            AgentEvent::Finished(outcome) => {
                println!();
                info!("Finished after {} steps", outcome.steps());
            }
        }
    }

    client.close_all().await?;
    info!("Total time: {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(())
}
