use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::config::McpConfig;
use super::error::McpError;
use super::session::{Connector, McpSession, RmcpConnector, ToolDescriptor, ToolOutput};

/// Owns an MCP configuration and the sessions opened from it.
///
/// Construction never connects; sessions are created on demand by
/// [`McpClient::connect`] and live until [`McpClient::close`] or
/// [`McpClient::close_all`]. The client is meant to be shared behind an
/// `Arc` by any number of agents.
pub struct McpClient {
    config: McpConfig,
    connector: Arc<dyn Connector>,
    sessions: RwLock<HashMap<String, Arc<dyn McpSession>>>,
    connect_locks: HashMap<String, Mutex<()>>,
}

/// Connection state of a configured server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Connected,
    Disconnected,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("servers", &self.config.server_names())
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// A client that connects through `rmcp`.
    #[must_use]
    pub fn new(config: McpConfig) -> Self {
        Self::with_connector(config, Arc::new(RmcpConnector))
    }

    /// A client that creates sessions with `connector`.
    #[must_use]
    pub fn with_connector(config: McpConfig, connector: Arc<dyn Connector>) -> Self {
        let connect_locks = config
            .server_names()
            .into_iter()
            .map(|name| (name.to_string(), Mutex::new(())))
            .collect();
        Self {
            config,
            connector,
            sessions: RwLock::new(HashMap::new()),
            connect_locks,
        }
    }

    /// Builds a client from a `{"mcpServers": {...}}` value.
    ///
    /// # Errors
    /// Returns [`McpError::Configuration`] if the value is not a valid configuration.
    pub fn from_dict(value: Value) -> Result<Self, McpError> {
        McpConfig::from_value(value).map(Self::new)
    }

    /// Builds a client from a JSON, YAML or TOML configuration file.
    ///
    /// # Errors
    /// Returns [`McpError::Configuration`] if the file cannot be read or parsed.
    pub fn from_config_file(path: &Path) -> Result<Self, McpError> {
        McpConfig::from_file(path).map(Self::new)
    }

    #[must_use]
    pub const fn config(&self) -> &McpConfig {
        &self.config
    }

    /// Returns the session for `server_name`, connecting if needed.
    ///
    /// Concurrent callers for the same server share a single session. A slow
    /// handshake only holds up callers of that server.
    ///
    /// # Errors
    /// Returns [`McpError::Connection`] if the server is not configured or
    /// every connection attempt fails.
    pub async fn connect(&self, server_name: &str) -> Result<Arc<dyn McpSession>, McpError> {
        if let Some(session) = self.session(server_name).await {
            return Ok(session);
        }

        let (server, lock) = self
            .config
            .server(server_name)
            .zip(self.connect_locks.get(server_name))
            .ok_or_else(|| {
                McpError::connection(server_name, "server is not in the configuration")
            })?;

        let _guard = lock.lock().await;
        if let Some(session) = self.session(server_name).await {
            return Ok(session);
        }

        let settings = self.config.settings();
        let mut attempt = 0;
        let session = loop {
            match self.connector.connect(server).await {
                Ok(session) => break session,
                Err(e) if attempt < settings.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Connection to '{server_name}' failed: {e}; retrying ({attempt}/{})",
                        settings.max_retries
                    );
                    tokio::time::sleep(settings.retry_delay()).await;
                }
                Err(e) => {
                    log::error!("Failed to connect to MCP server '{server_name}': {e}");
                    return Err(e);
                }
            }
        };

        self.sessions
            .write()
            .await
            .insert(server_name.to_string(), session.clone());
        Ok(session)
    }

    /// Connects every configured server, skipping the ones that fail.
    ///
    /// Returns the names of the connected servers in configuration order.
    ///
    /// # Errors
    /// Returns [`McpError::Connection`] if servers are configured but none connects.
    pub async fn connect_all(&self) -> Result<Vec<String>, McpError> {
        let mut connected = Vec::new();
        let mut last_error = None;

        for name in self.config.server_names() {
            match self.connect(name).await {
                Ok(_) => connected.push(name.to_string()),
                Err(e) => {
                    log::warn!("Skipping MCP server '{name}': {e}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if connected.is_empty() => Err(McpError::connection(
                "*",
                format!("no MCP server could be connected (last error: {e})"),
            )),
            _ => Ok(connected),
        }
    }

    /// Tools advertised by a connected server.
    ///
    /// # Errors
    /// Returns [`McpError::Connection`] if the server is not connected or the
    /// listing fails.
    pub async fn list_tools(&self, server_name: &str) -> Result<Vec<ToolDescriptor>, McpError> {
        self.connected(server_name).await?.list_tools().await
    }

    /// Calls a tool on a connected server.
    ///
    /// # Errors
    /// Returns [`McpError::Connection`] if the server is not connected and
    /// [`McpError::ToolExecution`] if the call fails.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolOutput, McpError> {
        self.connected(server_name)
            .await?
            .call_tool(tool, arguments)
            .await
    }

    /// Closes one session. Closing a server that is not connected does nothing.
    ///
    /// # Errors
    /// Returns [`McpError::Connection`] if the session fails to shut down.
    pub async fn close(&self, server_name: &str) -> Result<(), McpError> {
        let session = self.sessions.write().await.remove(server_name);
        match session {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }

    /// Closes every session, attempting all of them even if some fail.
    ///
    /// # Errors
    /// Returns the first shutdown error.
    pub async fn close_all(&self) -> Result<(), McpError> {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        let mut first_error = None;
        for (name, session) in sessions {
            log::info!("Shutting down connection to '{name}'");
            if let Err(e) = session.close().await {
                log::warn!("Failed to close MCP server '{name}': {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Names of connected servers, in configuration order.
    pub async fn active_sessions(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        self.config
            .server_names()
            .into_iter()
            .filter(|name| sessions.contains_key(*name))
            .map(ToString::to_string)
            .collect()
    }

    pub async fn is_connected(&self, server_name: &str) -> bool {
        self.sessions.read().await.contains_key(server_name)
    }

    /// Connection state of every configured server, in configuration order.
    pub async fn status(&self) -> Vec<(String, ServerStatus)> {
        let sessions = self.sessions.read().await;
        self.config
            .server_names()
            .into_iter()
            .map(|name| {
                let status = if sessions.contains_key(name) {
                    ServerStatus::Connected
                } else {
                    ServerStatus::Disconnected
                };
                (name.to_string(), status)
            })
            .collect()
    }

    /// The live session for a server, if connected.
    pub async fn session(&self, server_name: &str) -> Option<Arc<dyn McpSession>> {
        self.sessions.read().await.get(server_name).cloned()
    }

    async fn connected(&self, server_name: &str) -> Result<Arc<dyn McpSession>, McpError> {
        self.session(server_name)
            .await
            .ok_or_else(|| McpError::connection(server_name, "server is not connected"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::time::Duration;

    use super::*;
    use crate::mcp::config::{McpSettings, ServerConfig};
    use crate::mcp::testing::{FakeConnector, FakeServer};
    use serde_json::json;

    fn two_server_config() -> McpConfig {
        McpConfig::new(vec![
            ServerConfig::stdio("search", "search-server", ["--stdio"]),
            ServerConfig::stdio("browser", "browser-server", ["--stdio"]),
        ])
        .unwrap()
    }

    fn connector() -> Arc<FakeConnector> {
        Arc::new(
            FakeConnector::new()
                .with_server(FakeServer::new("search").with_text_tool("web_search", "results"))
                .with_server(FakeServer::new("browser").with_text_tool("navigate", "ok")),
        )
    }

    #[tokio::test]
    async fn test_construction_does_not_connect() {
        let connector = connector();
        let client = McpClient::with_connector(two_server_config(), connector.clone());
        assert!(client.active_sessions().await.is_empty());
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let connector = connector();
        let client = McpClient::with_connector(two_server_config(), connector.clone());

        let a = client.connect("search").await.unwrap();
        let b = client.connect("search").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connect_count(), 1);
        assert!(client.is_connected("search").await);
        assert!(!client.is_connected("browser").await);
    }

    #[tokio::test]
    async fn test_concurrent_connects_share_one_session() {
        let connector = Arc::new(
            FakeConnector::new()
                .with_server(FakeServer::new("search").with_text_tool("web_search", "results"))
                .with_connect_delay(Duration::from_millis(20)),
        );
        let client = Arc::new(McpClient::with_connector(two_server_config(), connector.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.connect("search").await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_server_does_not_block_other_servers() {
        let connector = Arc::new(
            FakeConnector::new()
                .with_server(FakeServer::new("search").with_text_tool("web_search", "results"))
                .with_server(FakeServer::new("browser").with_text_tool("navigate", "ok"))
                .with_slow_server("search", Duration::from_secs(30)),
        );
        let client = Arc::new(McpClient::with_connector(two_server_config(), connector.clone()));

        let slow = {
            let client = client.clone();
            tokio::spawn(async move { client.connect("search").await.map(|_| ()) })
        };
        while connector.connect_count() == 0 {
            tokio::task::yield_now().await;
        }

        tokio::time::timeout(Duration::from_secs(2), client.connect("browser"))
            .await
            .expect("browser connect waited on the search handshake")
            .unwrap();
        assert_eq!(client.active_sessions().await, vec!["browser"]);
        assert!(!slow.is_finished());
        slow.abort();
    }

    #[tokio::test]
    async fn test_unknown_server_is_a_connection_error() {
        let client = McpClient::with_connector(two_server_config(), connector());
        let err = client.connect("nope").await.err().unwrap();
        assert!(err.is_connection());

        let err = client.list_tools("search").await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_retries_then_gives_up() {
        let config = two_server_config().with_settings(McpSettings {
            max_retries: 2,
            retry_delay_ms: 1,
        });
        let connector = Arc::new(FakeConnector::new().with_failing_server("search"));
        let client = McpClient::with_connector(config, connector.clone());

        assert!(client.connect("search").await.is_err());
        assert_eq!(connector.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_connect_all_skips_failures() {
        let connector = Arc::new(
            FakeConnector::new()
                .with_server(FakeServer::new("browser").with_text_tool("navigate", "ok"))
                .with_failing_server("search"),
        );
        let client = McpClient::with_connector(two_server_config(), connector);

        assert_eq!(client.connect_all().await.unwrap(), vec!["browser"]);

        let none = McpClient::with_connector(
            two_server_config(),
            Arc::new(FakeConnector::new().with_failing_server("search")),
        );
        assert!(none.connect_all().await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_list_and_call_tools() {
        let client = McpClient::with_connector(two_server_config(), connector());
        client.connect("search").await.unwrap();

        let tools = client.list_tools("search").await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "web_search");

        let output = client
            .call_tool("search", "web_search", json!({"q": "rust"}))
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::text("results"));
    }

    #[tokio::test]
    async fn test_close_and_close_all() {
        let connector = connector();
        let client = McpClient::with_connector(two_server_config(), connector.clone());
        client.connect_all().await.unwrap();
        assert_eq!(client.active_sessions().await, vec!["search", "browser"]);

        client.close("search").await.unwrap();
        client.close("search").await.unwrap();
        assert_eq!(client.active_sessions().await, vec!["browser"]);
        assert_eq!(
            client.status().await,
            vec![
                ("search".to_string(), ServerStatus::Disconnected),
                ("browser".to_string(), ServerStatus::Connected),
            ]
        );

        client.close_all().await.unwrap();
        assert!(client.active_sessions().await.is_empty());
        assert_eq!(connector.close_count(), 2);
    }

    #[test]
    fn test_from_dict_rejects_bad_config() {
        assert!(
            McpClient::from_dict(json!({"nope": {}}))
                .unwrap_err()
                .is_configuration()
        );
        let client = McpClient::from_dict(json!({
            "mcpServers": {"a": {"command": "a"}, "b": {"url": "http://localhost:9/mcp"}}
        }))
        .unwrap();
        assert_eq!(client.config().server_names(), vec!["a", "b"]);
    }
}
