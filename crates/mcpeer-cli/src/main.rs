//! mcpeer CLI
//!
//! Lists the tools of the MCP servers in a configuration file and runs
//! agent queries against them using an OpenAI-compatible endpoint.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mcpeer::McpClient;

mod commands;
mod display;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// MCP configuration file (.json, .yaml, .yml or .toml)
    #[arg(long, short, global = true, default_value = "mcp.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the configured servers and the tools they provide
    Tools {
        /// Only inspect this server
        #[arg(long)]
        server: Option<String>,
    },
    /// Answer a query using the configured servers' tools
    Run(commands::RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let client = McpClient::from_config_file(&cli.config)
        .with_context(|| format!("Failed to load MCP configuration from {}", cli.config.display()))?;
    let client = Arc::new(client);

    let result = match cli.command {
        Command::Tools { server } => commands::list_tools(&client, server.as_deref()).await,
        Command::Run(args) => commands::run(client.clone(), args).await,
    };

    if let Err(e) = client.close_all().await {
        log::warn!("Failed to close MCP servers cleanly: {e}");
    }
    result
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "mcpeer",
            "run",
            "--config",
            "servers.yaml",
            "--api-key",
            "sk-test",
            "--max-steps",
            "12",
            "--disallow",
            "shell",
            "--disallow",
            "delete_file",
            "--use-server-manager",
            "what is new?",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("servers.yaml"));
        let Command::Run(args) = cli.command else {
            unreachable!("parsed the wrong subcommand");
        };
        assert_eq!(args.query, "what is new?");
        assert_eq!(args.max_steps, 12);
        assert_eq!(args.disallowed_tools, vec!["shell", "delete_file"]);
        assert!(args.use_server_manager);
        assert!(!args.stream);
        assert_eq!(args.server, None);
    }

    #[test]
    fn test_parse_tools_with_default_config() {
        let cli = Cli::try_parse_from(["mcpeer", "tools", "--server", "search"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("mcp.json"));
        assert!(matches!(cli.command, Command::Tools { server: Some(ref s) } if s == "search"));
    }
}
