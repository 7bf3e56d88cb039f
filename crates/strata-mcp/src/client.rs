//! MCP client implementation.
//!
//! One client per activated profile, bound to a single server. The
//! connection is established during activation and torn down when the
//! owner switches profiles.

use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParams;
use rmcp::service::{RoleClient, RunningService};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{McpServerConfig, Transport};
use crate::error::{McpError, McpResult};
use crate::types::{McpPromptInfo, McpToolInfo, McpToolResult};

/// Timeout for the activation health check (tool listing).
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// MCP client bound to one server.
pub struct McpClient {
    config: McpServerConfig,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpClient {
    /// Connect to a server and run the tool-list health check.
    ///
    /// The health check doubles as the initial capability snapshot: a
    /// server that cannot enumerate its tools within
    /// [`HEALTH_CHECK_TIMEOUT`] fails activation.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the transport cannot
    /// be established, or the health check times out.
    pub async fn connect(config: McpServerConfig) -> McpResult<(Self, Vec<McpToolInfo>)> {
        config.validate()?;

        let service = match &config.transport {
            Transport::Stdio(params) => {
                let mut cmd = tokio::process::Command::new(&params.command);
                cmd.args(&params.args);
                cmd.envs(&params.env);
                if let Some(cwd) = &params.cwd {
                    cmd.current_dir(cwd);
                }
                let transport = rmcp::transport::TokioChildProcess::new(cmd)?;
                ()
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        server: config.name.clone(),
                        reason: e.to_string(),
                    })?
            },
            Transport::HttpSse(params) => {
                let transport = rmcp::transport::SseClientTransport::start(params.url())
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        server: config.name.clone(),
                        reason: e.to_string(),
                    })?;
                ()
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        server: config.name.clone(),
                        reason: e.to_string(),
                    })?
            },
            Transport::HttpStreamable(params) => {
                let transport =
                    rmcp::transport::StreamableHttpClientTransport::from_uri(params.url());
                ()
                    .serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        server: config.name.clone(),
                        reason: e.to_string(),
                    })?
            },
        };

        let client = Self {
            config,
            service: Mutex::new(Some(service)),
        };

        let tools = client.health_check().await?;
        info!(server = %client.config.name, tool_count = tools.len(), "MCP connection established");
        Ok((client, tools))
    }

    /// Server name this client is bound to.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.config.name
    }

    /// Tool-list health check with the activation timeout.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Timeout`] if the server does not answer in
    /// time, or the underlying protocol error otherwise.
    pub async fn health_check(&self) -> McpResult<Vec<McpToolInfo>> {
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, self.list_tools()).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout {
                server: self.config.name.clone(),
                timeout_secs: HEALTH_CHECK_TIMEOUT.as_secs(),
            }),
        }
    }

    /// List the tools advertised by the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is disconnected or the call fails.
    pub async fn list_tools(&self) -> McpResult<Vec<McpToolInfo>> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(McpError::NotConnected)?;

        let tools = service
            .list_all_tools()
            .await
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        Ok(tools
            .into_iter()
            .map(|t| McpToolInfo {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: Value::Object(t.input_schema.as_ref().clone()),
            })
            .collect())
    }

    /// List the prompts advertised by the server.
    ///
    /// Servers without prompt support yield an empty list rather than
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is disconnected.
    pub async fn list_prompts(&self) -> McpResult<Vec<McpPromptInfo>> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(McpError::NotConnected)?;

        let prompts = match service.list_all_prompts().await {
            Ok(prompts) => prompts,
            Err(e) => {
                debug!(server = %self.config.name, error = %e, "Server has no prompt support");
                return Ok(Vec::new());
            },
        };

        Ok(prompts
            .into_iter()
            .map(|p| McpPromptInfo {
                name: p.name,
                description: p.description,
                arguments: p
                    .arguments
                    .unwrap_or_default()
                    .into_iter()
                    .map(|a| a.name)
                    .collect(),
            })
            .collect())
    }

    /// Call a tool with JSON arguments.
    ///
    /// Non-object argument values are wrapped as `{"value": ...}` so
    /// the server always receives an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is disconnected or the call
    /// fails at the protocol level. A server-side tool failure is a
    /// successful call with `is_error = true`.
    pub async fn call_tool(&self, tool: &str, args: Value) -> McpResult<McpToolResult> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(McpError::NotConnected)?;

        debug!(server = %self.config.name, tool, "Calling MCP tool");

        let arguments = match args {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                Some(map)
            },
        };

        let params = CallToolRequestParams {
            meta: None,
            name: Cow::Owned(tool.to_string()),
            arguments,
            task: None,
        };

        let result = service
            .call_tool(params)
            .await
            .map_err(|e| McpError::ToolFailed {
                tool: tool.to_string(),
                reason: e.to_string(),
            })?;

        let content = result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(McpToolResult {
            content,
            is_error: result.is_error.unwrap_or(false),
            metadata: result.structured_content,
        })
    }

    /// Disconnect from the server.
    ///
    /// Idempotent; a second call is a no-op.
    pub async fn disconnect(&self) {
        let service = self.service.lock().await.take();
        if let Some(service) = service {
            let _ = service.cancel().await;
            info!(server = %self.config.name, "MCP connection closed");
        }
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server", &self.config.name)
            .finish_non_exhaustive()
    }
}
