//! In-memory MCP servers for tests.
//!
//! [`FakeConnector`] hands out sessions backed by scripted [`FakeServer`]s,
//! so clients, adapters and agents can be exercised without spawning
//! processes. Enable the `test-util` feature to use it from other crates.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::config::ServerConfig;
use super::error::McpError;
use super::session::{Connector, McpSession, ToolDescriptor, ToolOutput};

type Handler = Arc<dyn Fn(Value) -> Result<ToolOutput, McpError> + Send + Sync>;

/// Call bookkeeping shared by a server and its sessions.
#[derive(Debug, Default)]
pub struct CallStats {
    calls: Mutex<Vec<(String, Value)>>,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl CallStats {
    /// Every call received, in order, as `(tool, arguments)`.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the tools called, in order.
    pub fn called_tools(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    /// Calls started but not yet finished or dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a CallStats);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A scripted MCP server.
#[derive(Clone)]
pub struct FakeServer {
    name: String,
    tools: Vec<(ToolDescriptor, Handler)>,
    call_delay: Option<Duration>,
    stats: Arc<CallStats>,
}

impl FakeServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            call_delay: None,
            stats: Arc::default(),
        }
    }

    /// Adds a tool answered by `handler`.
    #[must_use]
    pub fn with_tool(
        mut self,
        descriptor: ToolDescriptor,
        handler: impl Fn(Value) -> Result<ToolOutput, McpError> + Send + Sync + 'static,
    ) -> Self {
        self.tools.push((descriptor, Arc::new(handler)));
        self
    }

    /// Adds a tool that always answers `text`.
    #[must_use]
    pub fn with_text_tool(self, name: &str, text: &str) -> Self {
        let text = text.to_string();
        self.with_tool(
            ToolDescriptor::new(
                name,
                format!("The {name} tool"),
                json!({"type": "object", "properties": {}}),
            ),
            move |_| Ok(ToolOutput::text(text.clone())),
        )
    }

    /// Makes every call take `delay` before answering.
    #[must_use]
    pub const fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to this server's call statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<CallStats> {
        self.stats.clone()
    }
}

/// Connector serving [`FakeServer`]s by name.
#[derive(Default)]
pub struct FakeConnector {
    servers: HashMap<String, FakeServer>,
    failing: HashSet<String>,
    connect_delay: Option<Duration>,
    slow: HashMap<String, Duration>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_server(mut self, server: FakeServer) -> Self {
        self.servers.insert(server.name.clone(), server);
        self
    }

    /// A server whose connection attempts always fail.
    #[must_use]
    pub fn with_failing_server(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    #[must_use]
    pub const fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// A server whose handshake takes `delay`, overriding the connector-wide delay.
    #[must_use]
    pub fn with_slow_server(mut self, name: &str, delay: Duration) -> Self {
        self.slow.insert(name.to_string(), delay);
        self
    }

    /// Connection attempts made so far, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Sessions closed so far.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, server: &ServerConfig) -> Result<Arc<dyn McpSession>, McpError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.slow.get(&server.name).copied().or(self.connect_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&server.name) {
            return Err(McpError::connection(&server.name, "process exited during handshake"));
        }
        let fake = self
            .servers
            .get(&server.name)
            .ok_or_else(|| McpError::connection(&server.name, "no such fake server"))?;

        Ok(Arc::new(FakeSession {
            server: fake.clone(),
            closed: AtomicBool::new(false),
            closes: self.closes.clone(),
        }))
    }
}

struct FakeSession {
    server: FakeServer,
    closed: AtomicBool,
    closes: Arc<AtomicUsize>,
}

impl FakeSession {
    fn ensure_open(&self) -> Result<(), McpError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(McpError::connection(&self.server.name, "session is closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl McpSession for FakeSession {
    fn server_name(&self) -> &str {
        &self.server.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.ensure_open()?;
        Ok(self.server.tools.iter().map(|(d, _)| d.clone()).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, McpError> {
        self.ensure_open()?;
        let stats = &self.server.stats;
        stats
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), arguments.clone()));

        stats.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(stats);

        if let Some(delay) = self.server.call_delay {
            tokio::time::sleep(delay).await;
        }

        let (_, handler) = self
            .server
            .tools
            .iter()
            .find(|(d, _)| d.name == name)
            .ok_or_else(|| McpError::tool(name, "unknown tool"))?;
        let result = handler(arguments);
        stats.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) -> Result<(), McpError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
