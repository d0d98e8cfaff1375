//! MCP server configuration.
//!
//! A configuration names the MCP servers an application may talk to and
//! says how to reach each one:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "playwright": {
//!       "command": "npx",
//!       "args": ["@playwright/mcp@latest"],
//!       "env": {"DISPLAY": ":1"}
//!     },
//!     "search": {
//!       "url": "https://search.example.com/mcp",
//!       "auth_token": "..."
//!     }
//!   },
//!   "settings": {"max_retries": 2, "retry_delay_ms": 500}
//! }
//! ```
//!
//! Entries with a `command` are launched as child processes speaking MCP
//! over stdio; entries with a `url` use streamable HTTP. Server order is
//! kept as written, and a server name may appear only once.
//!
//! Loading is pure: nothing is spawned or contacted until a server is
//! connected through [`crate::mcp::McpClient`].
//!
//! ## Loading Configuration
//!
//! ```rust
//! use mcpeer_tools::mcp::McpConfig;
//!
//! let config = McpConfig::from_json_str(r#"{
//!     "mcpServers": {
//!         "airbnb": {"command": "npx", "args": ["-y", "@openbnb/mcp-server-airbnb"]}
//!     }
//! }"#)?;
//!
//! assert_eq!(config.server_names(), vec!["airbnb"]);
//! # Ok::<(), mcpeer_tools::mcp::McpError>(())
//! ```
//!
//! [`McpConfig::from_file`] picks JSON, YAML or TOML from the file extension.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use super::error::McpError;

/// Parsed MCP configuration: an ordered list of servers plus settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct McpConfig {
    servers: Vec<ServerConfig>,
    settings: McpSettings,
}

/// One configured MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Unique name; the key under `mcpServers`.
    pub name: String,
    /// How to reach the server.
    pub transport: TransportConfig,
    /// Working directory for stdio servers.
    pub working_directory: Option<PathBuf>,
}

/// How a server is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Spawn a process and speak MCP over its stdin/stdout.
    Stdio {
        /// Program to run.
        command: String,
        /// Program arguments.
        args: Vec<String>,
        /// Extra environment variables for the process.
        env: BTreeMap<String, String>,
    },
    /// Connect to a streamable HTTP endpoint.
    Http {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        headers: BTreeMap<String, String>,
        /// Bearer token sent as `Authorization`.
        auth_token: Option<String>,
    },
}

/// Client-wide connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpSettings {
    /// Extra connection attempts after the first one fails.
    #[serde(default)]
    pub max_retries: u32,
    /// Pause between connection attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl McpSettings {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ServerConfig {
    /// A stdio server.
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Stdio {
                command: command.into(),
                args: args.into_iter().map(Into::into).collect(),
                env: BTreeMap::new(),
            },
            working_directory: None,
        }
    }

    /// A streamable HTTP server.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Http {
                url: url.into(),
                headers: BTreeMap::new(),
                auth_token: None,
            },
            working_directory: None,
        }
    }

    /// Adds an environment variable (stdio servers only).
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportConfig::Stdio { env, .. } = &mut self.transport {
            env.insert(key.into(), value.into());
        }
        self
    }

    /// Short human-readable description of the transport.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.transport {
            TransportConfig::Stdio { command, args, .. } if args.is_empty() => {
                format!("stdio: {command}")
            }
            TransportConfig::Stdio { command, args, .. } => {
                format!("stdio: {command} {}", args.join(" "))
            }
            TransportConfig::Http { url, .. } => format!("http: {url}"),
        }
    }

    fn validate(&self) -> Result<(), McpError> {
        if self.name.trim().is_empty() {
            return Err(McpError::config("server names cannot be empty"));
        }
        match &self.transport {
            TransportConfig::Stdio { command, .. } if command.trim().is_empty() => Err(
                McpError::config(format!("server '{}' has an empty command", self.name)),
            ),
            TransportConfig::Http { url, .. } => url::Url::parse(url).map(|_| ()).map_err(|e| {
                McpError::config(format!("server '{}' has an invalid url '{url}': {e}", self.name))
            }),
            TransportConfig::Stdio { .. } => Ok(()),
        }
    }
}

impl McpConfig {
    /// Builds a configuration from servers, checking names are unique.
    ///
    /// # Errors
    /// Returns [`McpError::Configuration`] on duplicate names or invalid entries.
    pub fn new(servers: Vec<ServerConfig>) -> Result<Self, McpError> {
        let mut seen = HashSet::new();
        for server in &servers {
            server.validate()?;
            if !seen.insert(server.name.as_str()) {
                return Err(McpError::config(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
        }
        Ok(Self {
            servers,
            settings: McpSettings::default(),
        })
    }

    /// Replaces the settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: McpSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Loads a configuration from an in-memory JSON value.
    ///
    /// A `serde_json::Value` has already merged repeated keys, so duplicate
    /// names can only be detected by the text loaders.
    ///
    /// # Errors
    /// Returns [`McpError::Configuration`] if `mcpServers` is missing or an entry is invalid.
    pub fn from_value(value: serde_json::Value) -> Result<Self, McpError> {
        let raw = RawConfig::deserialize(value)
            .map_err(|e| McpError::config(format!("invalid configuration: {e}")))?;
        Self::from_raw(raw)
    }

    /// Loads a configuration from JSON text.
    ///
    /// # Errors
    /// Returns [`McpError::Configuration`] on malformed JSON, duplicate names or invalid entries.
    pub fn from_json_str(text: &str) -> Result<Self, McpError> {
        let raw: RawConfig = serde_json::from_str(text)
            .map_err(|e| McpError::config(format!("invalid JSON configuration: {e}")))?;
        Self::from_raw(raw)
    }

    /// Loads a configuration from YAML text.
    ///
    /// # Errors
    /// Returns [`McpError::Configuration`] on malformed YAML, duplicate names or invalid entries.
    pub fn from_yaml_str(text: &str) -> Result<Self, McpError> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| McpError::config(format!("invalid YAML configuration: {e}")))?;
        Self::from_raw(raw)
    }

    /// Loads a configuration from TOML text.
    ///
    /// # Errors
    /// Returns [`McpError::Configuration`] on malformed TOML, duplicate names or invalid entries.
    pub fn from_toml_str(text: &str) -> Result<Self, McpError> {
        let raw: RawConfig = toml::from_str(text)
            .map_err(|e| McpError::config(format!("invalid TOML configuration: {e}")))?;
        Self::from_raw(raw)
    }

    /// Loads a configuration file, choosing the format from its extension
    /// (`.json`, `.yaml`/`.yml` or `.toml`).
    ///
    /// # Errors
    /// Returns [`McpError::Configuration`] if the file cannot be read, has an
    /// unsupported extension or does not parse.
    pub fn from_file(path: &Path) -> Result<Self, McpError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);

        let parse: fn(&str) -> Result<Self, McpError> = match extension.as_deref() {
            Some("json") => Self::from_json_str,
            Some("yaml" | "yml") => Self::from_yaml_str,
            Some("toml") => Self::from_toml_str,
            _ => {
                return Err(McpError::config(format!(
                    "unsupported config file format '{}'; use .json, .yaml, .yml or .toml",
                    path.display()
                )));
            }
        };

        let contents = std::fs::read_to_string(path)
            .map_err(|e| McpError::config(format!("cannot read '{}': {e}", path.display())))?;
        log::debug!("Loading MCP configuration from '{}'", path.display());
        parse(&contents)
    }

    /// Serializes back to the `mcpServers` JSON shape.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String, McpError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| McpError::config(format!("cannot serialize configuration: {e}")))
    }

    /// Server names in configuration order.
    #[must_use]
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    /// Looks up a server by name.
    #[must_use]
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// All servers in configuration order.
    #[must_use]
    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    #[must_use]
    pub const fn settings(&self) -> &McpSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    fn from_raw(raw: RawConfig) -> Result<Self, McpError> {
        let servers = raw
            .mcp_servers
            .0
            .into_iter()
            .map(|(name, entry)| entry.into_server(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(servers)?.with_settings(raw.settings))
    }
}

/// On-disk shape of a configuration.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "mcpServers")]
    mcp_servers: ServerEntries,
    #[serde(default)]
    settings: McpSettings,
}

/// `mcpServers` entries in document order, rejecting repeated names.
struct ServerEntries(Vec<(String, ServerEntry)>);

impl<'de> Deserialize<'de> for ServerEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ServerEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from server names to server definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut seen = HashSet::new();
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, entry)) = map.next_entry::<String, ServerEntry>()? {
                    if !seen.insert(name.clone()) {
                        return Err(de::Error::custom(format!("duplicate server name '{name}'")));
                    }
                    entries.push((name, entry));
                }
                Ok(ServerEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// On-disk shape of one server.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ServerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    #[serde(default, alias = "authToken", skip_serializing_if = "Option::is_none")]
    auth_token: Option<String>,
    #[serde(default, alias = "cwd", skip_serializing_if = "Option::is_none")]
    working_directory: Option<PathBuf>,
}

impl ServerEntry {
    fn into_server(self, name: String) -> Result<ServerConfig, McpError> {
        let transport = match (self.command, self.url) {
            (Some(command), url) => {
                if url.is_some() {
                    log::warn!("Server '{name}' has both `command` and `url`; using `command`");
                }
                TransportConfig::Stdio {
                    command,
                    args: self.args,
                    env: self.env,
                }
            }
            (None, Some(url)) => TransportConfig::Http {
                url,
                headers: self.headers,
                auth_token: self.auth_token,
            },
            (None, None) => {
                return Err(McpError::config(format!(
                    "server '{name}' needs either a `command` or a `url`"
                )));
            }
        };

        Ok(ServerConfig {
            name,
            transport,
            working_directory: self.working_directory,
        })
    }
}

impl From<&ServerConfig> for ServerEntry {
    fn from(server: &ServerConfig) -> Self {
        let mut entry = Self {
            working_directory: server.working_directory.clone(),
            ..Self::default()
        };
        match &server.transport {
            TransportConfig::Stdio { command, args, env } => {
                entry.command = Some(command.clone());
                entry.args.clone_from(args);
                entry.env.clone_from(env);
            }
            TransportConfig::Http {
                url,
                headers,
                auth_token,
            } => {
                entry.url = Some(url.clone());
                entry.headers.clone_from(headers);
                entry.auth_token.clone_from(auth_token);
            }
        }
        entry
    }
}

impl Serialize for McpConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Servers<'a>(&'a [ServerConfig]);

        impl Serialize for Servers<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for server in self.0 {
                    map.serialize_entry(&server.name, &ServerEntry::from(server))?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("mcpServers", &Servers(&self.servers))?;
        if self.settings != McpSettings::default() {
            map.serialize_entry("settings", &self.settings)?;
        }
        map.end()
    }
}


#[cfg(test)]
mod proptests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;

    fn transport_strategy() -> impl Strategy<Value = TransportConfig> {
        prop_oneof![
            (
                "[a-z][a-z0-9_./-]{0,15}",
                prop::collection::vec("[a-zA-Z0-9@/._-]{1,12}", 0..4),
                prop::collection::btree_map("[A-Z][A-Z0-9_]{0,8}", "[a-z0-9:/]{0,10}", 0..3),
            )
                .prop_map(|(command, args, env)| TransportConfig::Stdio { command, args, env }),
            (
                "[a-z]{1,10}",
                1024u16..65000,
                prop::collection::btree_map("X-[A-Z][a-z]{1,8}", "[a-z0-9]{1,10}", 0..2),
                prop::option::of("[a-zA-Z0-9]{8,16}"),
            )
                .prop_map(|(host, port, headers, auth_token)| TransportConfig::Http {
                    url: format!("http://{host}.example.com:{port}/mcp"),
                    headers,
                    auth_token,
                }),
        ]
    }

    fn config_strategy() -> impl Strategy<Value = McpConfig> {
        (
            prop::collection::hash_set("[a-z][a-z0-9_-]{0,11}", 0..6),
            prop::collection::vec(transport_strategy(), 6),
            0u32..5,
            0u64..5000,
        )
            .prop_map(|(names, transports, max_retries, retry_delay_ms)| {
                let servers = names
                    .into_iter()
                    .zip(transports)
                    .map(|(name, transport)| ServerConfig {
                        name,
                        transport,
                        working_directory: None,
                    })
                    .collect();
                McpConfig::new(servers).unwrap().with_settings(McpSettings {
                    max_retries,
                    retry_delay_ms,
                })
            })
    }

    proptest! {
        #[test]
        fn json_round_trip_preserves_servers_and_order(config in config_strategy()) {
            let text = config.to_json_string().unwrap();
            let parsed = McpConfig::from_json_str(&text).unwrap();
            prop_assert_eq!(parsed, config);
        }

        #[test]
        fn value_round_trip_preserves_servers(config in config_strategy()) {
            let value = serde_json::to_value(&config).unwrap();
            let parsed = McpConfig::from_value(value).unwrap();
            prop_assert_eq!(parsed, config);
        }

        #[test]
        fn yaml_round_trip_preserves_servers(config in config_strategy()) {
            let text = serde_yaml::to_string(&config).unwrap();
            let parsed = McpConfig::from_yaml_str(&text).unwrap();
            prop_assert_eq!(parsed, config);
        }
    }
}
