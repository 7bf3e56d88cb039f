//! Strata MCP - Model Context Protocol client layer.
//!
//! This crate provides:
//! - Transport configuration for stdio, SSE, and streamable-HTTP servers
//! - A client wrapper over the official `rmcp` SDK
//! - The 10-second tool-list health check used during profile activation
//! - Tool and prompt metadata consumed by the capability classifier

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{HEALTH_CHECK_TIMEOUT, McpClient};
pub use config::{HttpParams, McpServerConfig, StdioParams, Transport};
pub use error::{McpError, McpResult};
pub use types::{McpPromptInfo, McpToolInfo, McpToolResult};
