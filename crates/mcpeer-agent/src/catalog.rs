//! Tools available to one run, grouped by server.

use std::collections::HashSet;
use std::sync::Arc;

use mcpeer_common::tools::Tool;
use mcpeer_tools::ToolImplementation;
use mcpeer_tools::mcp::{ExecutorAdapter, McpClient, ToolAdapter};

use crate::error::AgentError;

pub struct CatalogEntry {
    pub server: String,
    pub definition: Tool,
    pub tool: Arc<dyn ToolImplementation>,
}

impl CatalogEntry {
    pub fn name(&self) -> &str {
        &self.definition.function.name
    }
}

/// Which servers' tools are offered at a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Server(String),
    /// Server manager tools only.
    Nothing,
}

pub struct ToolCatalog {
    servers: Vec<String>,
    entries: Vec<CatalogEntry>,
}

impl ToolCatalog {
    /// Connects the servers in scope and collects their tools, minus `disallowed`.
    ///
    /// MCP tools named like one of `reserved` are dropped so the reserved
    /// names stay unique in every request. With a fixed `server`, a
    /// connection failure ends the run; otherwise failing servers are skipped.
    pub async fn load(
        client: &McpClient,
        server: Option<&str>,
        disallowed: &HashSet<String>,
        reserved: &[&str],
    ) -> Result<Self, AgentError> {
        let names: Vec<String> = match server {
            Some(name) => vec![name.to_string()],
            None => client
                .config()
                .server_names()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        };

        let mut servers = Vec::new();
        let mut entries = Vec::new();
        for name in names {
            let tools = match ExecutorAdapter.create_tools(client, Some(&name)).await {
                Ok(tools) => tools,
                Err(e) if server.is_none() => {
                    log::warn!("Skipping MCP server '{name}': {e}");
                    continue;
                }
                Err(e) => return Err(AgentError::Connection(e)),
            };

            for tool in tools {
                let definition = tool.get_definition();
                if disallowed.contains(&definition.function.name) {
                    log::debug!("Tool '{}' is disallowed", definition.function.name);
                    continue;
                }
                if reserved.contains(&definition.function.name.as_str()) {
                    log::warn!(
                        "Ignoring tool '{}' of MCP server '{name}': the name is taken by the server manager",
                        definition.function.name
                    );
                    continue;
                }
                entries.push(CatalogEntry {
                    server: name.clone(),
                    definition,
                    tool,
                });
            }
            servers.push(name);
        }

        if entries.is_empty() {
            return Err(AgentError::NoTools);
        }
        log::info!(
            "Available tools: {:?}",
            entries.iter().map(CatalogEntry::name).collect::<Vec<_>>()
        );

        Ok(Self { servers, entries })
    }

    /// Connected servers in configuration order.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn tool_count(&self, server: &str) -> usize {
        self.entries.iter().filter(|e| e.server == server).count()
    }

    /// Tools offered under `scope`, one per name.
    ///
    /// When two servers expose the same name, `preferred` wins, then the
    /// server listed first in the configuration.
    pub fn visible(&self, scope: &Scope, preferred: Option<&str>) -> Vec<&CatalogEntry> {
        let in_scope = |e: &&CatalogEntry| match scope {
            Scope::All => true,
            Scope::Server(server) => &e.server == server,
            Scope::Nothing => false,
        };

        let mut seen = HashSet::new();
        let mut visible = Vec::new();
        for entry in self.entries.iter().filter(in_scope) {
            if !seen.insert(entry.name()) {
                continue;
            }
            let chosen = preferred
                .and_then(|p| {
                    self.entries
                        .iter()
                        .filter(in_scope)
                        .find(|e| e.name() == entry.name() && e.server == p)
                })
                .unwrap_or(entry);
            visible.push(chosen);
        }
        visible
    }
}
