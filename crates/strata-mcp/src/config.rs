//! MCP server configuration.
//!
//! A server is reached over exactly one of three transports. Transport
//! selection is always explicit; a config that smells like stdio
//! (host `"stdio"`, port 0) but declares an HTTP transport is rejected
//! rather than guessed at.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{McpError, McpResult};

/// Transport type and parameters for one MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transport {
    /// Spawn a child process and speak over stdin/stdout.
    Stdio(StdioParams),
    /// HTTP Server-Sent Events.
    HttpSse(HttpParams),
    /// HTTP streamable transport.
    HttpStreamable(HttpParams),
}

/// Parameters for a stdio server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioParams {
    /// Command to run.
    pub command: String,
    /// Arguments for the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Stream encoding.
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Parameters for an HTTP-based server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpParams {
    /// Host name or address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// URL path.
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/mcp".to_string()
}

impl HttpParams {
    /// Full URL for this endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server name (unique identifier within an owner's registry).
    pub name: String,
    /// Transport and connection parameters.
    pub transport: Transport,
}

impl McpServerConfig {
    /// Create a stdio server config.
    #[must_use]
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: Transport::Stdio(StdioParams {
                command: command.into(),
                args: Vec::new(),
                env: HashMap::new(),
                cwd: None,
                encoding: default_encoding(),
            }),
        }
    }

    /// Create an SSE server config.
    #[must_use]
    pub fn sse(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            transport: Transport::HttpSse(HttpParams {
                host: host.into(),
                port,
                path: default_path(),
            }),
        }
    }

    /// Create a streamable-HTTP server config.
    #[must_use]
    pub fn streamable(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            transport: Transport::HttpStreamable(HttpParams {
                host: host.into(),
                port,
                path: default_path(),
            }),
        }
    }

    /// Add arguments (stdio only; ignored otherwise).
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let Transport::Stdio(ref mut params) = self.transport {
            params.args = args.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Add an environment variable (stdio only; ignored otherwise).
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Transport::Stdio(ref mut params) = self.transport {
            params.env.insert(key.into(), value.into());
        }
        self
    }

    /// Validate the configuration before activation.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty stdio command, or an HTTP config
    /// whose host is `"stdio"` or whose port is 0.
    pub fn validate(&self) -> McpResult<()> {
        match &self.transport {
            Transport::Stdio(params) => {
                if params.command.trim().is_empty() {
                    return Err(McpError::ConfigError(format!(
                        "server '{}': stdio transport requires a command",
                        self.name
                    )));
                }
                Ok(())
            },
            Transport::HttpSse(params) | Transport::HttpStreamable(params) => {
                if params.host == "stdio" || params.port == 0 {
                    return Err(McpError::ConfigError(format!(
                        "server '{}': host '{}' port {} requires transport.type=\"stdio\"",
                        self.name, params.host, params.port
                    )));
                }
                Ok(())
            },
        }
    }
}
