use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;

use mcpeer::{Config, McpAgent, McpClient, OpenAIClient, RunOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL for the API endpoint
    #[arg(long, default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// API key for authentication
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: String,

    /// Model to use for chat completion
    #[arg(long, default_value = "gpt-4o")]
    model: String,

    /// MCP configuration file (JSON, YAML or TOML)
    #[arg(long, default_value = "mcp.json")]
    config: PathBuf,

    /// Restrict the run to one configured server
    #[arg(long)]
    server: Option<String>,

    /// The query to answer
    #[arg(default_value = "Find the best restaurant in San Francisco")]
    query: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let client = Arc::new(McpClient::from_config_file(&args.config)?);
    info!("Configured servers: {:?}", client.config().server_names());

    let llm = OpenAIClient::new(
        Config::new("openai", &args.model)
            .with_base_url(&args.base_url)
            .with_api_key(&args.api_key),
    )?;
    let agent = McpAgent::builder(llm, client.clone()).max_steps(30).build();

    let outcome = agent.run(&args.query, args.server.as_deref()).await;
    client.close_all().await?;

    match outcome? {
        RunOutcome::Completed { answer, steps } => {
            info!("Answered in {steps} steps");
            println!("{answer}");
        }
        RunOutcome::Aborted { partial, steps } => {
            println!("No final answer after {steps} steps.");
            if let Some(partial) = partial {
                println!("Last reply: {partial}");
            }
        }
    }

    Ok(())
}
