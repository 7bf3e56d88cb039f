//! MCP-related error types.

use strata_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur with MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Configuration is invalid.
    #[error("invalid MCP configuration: {0}")]
    ConfigError(String),

    /// Connection to the server failed.
    #[error("cannot connect to MCP server {server}: {reason}")]
    ConnectionFailed {
        /// Server name.
        server: String,
        /// Why (credential-free).
        reason: String,
    },

    /// The health check or a call exceeded its timeout.
    #[error("MCP server {server} timed out after {timeout_secs}s")]
    Timeout {
        /// Server name.
        server: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// Not connected.
    #[error("MCP client not connected")]
    NotConnected,

    /// A tool call failed on the server side.
    #[error("tool {tool} failed: {reason}")]
    ToolFailed {
        /// Tool name.
        tool: String,
        /// Server-reported reason.
        reason: String,
    },

    /// Protocol-level failure from the SDK.
    #[error("MCP protocol error: {0}")]
    Protocol(String),

    /// I/O failure spawning or talking to the server.
    #[error("MCP I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl McpError {
    /// Error category, used for retry decisions and HTTP mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError(_) => ErrorKind::Validation,
            Self::Timeout { .. } => ErrorKind::UpstreamTimeout,
            Self::ConnectionFailed { .. } | Self::Io(_) => ErrorKind::UpstreamTransient,
            Self::NotConnected | Self::Protocol(_) => ErrorKind::Internal,
            Self::ToolFailed { .. } => ErrorKind::UpstreamPermanent,
        }
    }
}

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;
