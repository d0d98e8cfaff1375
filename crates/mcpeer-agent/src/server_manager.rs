//! Server manager mode.
//!
//! Instead of every tool of every server, the model sees the tools of one
//! active server plus three management tools to inspect and switch servers.
//! The active server follows the model: after each step it becomes the
//! server whose tools were just used.

use std::collections::HashSet;

use serde_json::json;

use mcpeer_common::tools::{Tool, ToolCall};
use mcpeer_tools::ToolExecutor;

use crate::catalog::{Scope, ToolCatalog};
use crate::options::ServerManagerFallback;

pub const LIST_SERVERS: &str = "list_mcp_servers";
pub const CONNECT_SERVER: &str = "connect_to_mcp_server";
pub const ACTIVE_SERVER: &str = "get_active_mcp_server";

/// Names of the management tools.
pub const TOOL_NAMES: [&str; 3] = [LIST_SERVERS, CONNECT_SERVER, ACTIVE_SERVER];

pub(crate) struct ServerManager {
    active: Option<String>,
    fallback: ServerManagerFallback,
}

impl ServerManager {
    pub const fn new(fallback: ServerManagerFallback) -> Self {
        Self {
            active: None,
            fallback,
        }
    }

    pub fn is_manager_tool(name: &str) -> bool {
        TOOL_NAMES.contains(&name)
    }

    /// Management tools offered to the model, minus `disallowed`.
    pub fn definitions(disallowed: &HashSet<String>) -> Vec<Tool> {
        let all = vec![
            Tool::function(
                LIST_SERVERS,
                "List the available MCP servers and how many tools each provides.",
                json!({"type": "object", "properties": {}}),
            ),
            Tool::function(
                CONNECT_SERVER,
                "Switch to an MCP server, making its tools available.",
                json!({
                    "type": "object",
                    "properties": {
                        "server_name": {
                            "type": "string",
                            "description": "Name of the server to use"
                        }
                    },
                    "required": ["server_name"]
                }),
            ),
            Tool::function(
                ACTIVE_SERVER,
                "Report which MCP server is currently active.",
                json!({"type": "object", "properties": {}}),
            ),
        ];
        all.into_iter()
            .filter(|t| !disallowed.contains(&t.function.name))
            .collect()
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn scope(&self) -> Scope {
        match (&self.active, self.fallback) {
            (Some(server), _) => Scope::Server(server.clone()),
            (None, ServerManagerFallback::AllTools) => Scope::All,
            (None, ServerManagerFallback::KeepActive) => Scope::Nothing,
        }
    }

    /// Runs a management tool and returns its observation.
    pub fn handle(&mut self, call: &ToolCall, catalog: &ToolCatalog) -> String {
        match call.function.name.as_str() {
            LIST_SERVERS => catalog
                .servers()
                .iter()
                .map(|server| {
                    let marker = if self.active() == Some(server.as_str()) { " (active)" } else { "" };
                    format!("- {server}: {} tools{marker}", catalog.tool_count(server))
                })
                .collect::<Vec<_>>()
                .join("\n"),
            CONNECT_SERVER => {
                let args = ToolExecutor::parse_arguments(&call.function);
                let Some(server) = args.get("server_name").and_then(|v| v.as_str()) else {
                    return "Missing required argument 'server_name'".to_string();
                };
                if catalog.servers().iter().any(|s| s == server) {
                    log::info!("Server manager switched to '{server}'");
                    self.active = Some(server.to_string());
                    let tools: Vec<&str> = catalog
                        .visible(&Scope::Server(server.to_string()), None)
                        .into_iter()
                        .map(|e| e.name())
                        .collect();
                    format!(
                        "Connected to MCP server '{server}'. Available tools: {}",
                        tools.join(", ")
                    )
                } else {
                    format!(
                        "MCP server '{server}' is not available. Available servers: {}",
                        catalog.servers().join(", ")
                    )
                }
            }
            _ => self.active().map_or_else(
                || "No MCP server is active".to_string(),
                |server| format!("Active MCP server: {server}"),
            ),
        }
    }

    /// Updates the active server from the servers whose tools ran in a step.
    pub fn observe_step(&mut self, servers_used: &[String]) {
        let mut distinct: Vec<&String> = Vec::new();
        for server in servers_used {
            if !distinct.contains(&server) {
                distinct.push(server);
            }
        }

        match distinct.as_slice() {
            [] => {}
            [only] => self.active = Some((*only).clone()),
            _ => {
                log::debug!("Step used tools from {} servers", distinct.len());
                if self.fallback == ServerManagerFallback::AllTools {
                    self.active = None;
                }
            }
        }
    }
}
