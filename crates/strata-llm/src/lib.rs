//! Strata LLM - provider abstraction for the Strata agent.
//!
//! This crate provides:
//! - Message, tool, and usage types shared by the turn pipeline
//! - The [`LlmProvider`] trait with Claude and OpenAI-compatible
//!   implementations
//! - Credential resolution (explicit config → encrypted store →
//!   environment)
//! - Token-usage extraction across the metadata shapes providers emit
//! - Per-model pricing and micro-USD cost calculation

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod claude;
pub mod credentials;
pub mod error;
pub mod factory;
pub mod openai_compat;
pub mod pricing;
pub mod provider;
pub mod types;
pub mod usage;

pub use claude::ClaudeProvider;
pub use credentials::{CredentialSource, ResolvedCredentials, resolve_credentials};
pub use error::{LlmError, LlmResult};
pub use factory::build_provider;
pub use openai_compat::OpenAiCompatProvider;
pub use pricing::ModelPricing;
pub use provider::{LlmProvider, ProviderConfig};
pub use types::{
    ContentPart, LlmResponse, LlmToolDefinition, Message, MessageContent, MessageRole, StopReason,
    ToolCall, ToolCallResult, Usage,
};
pub use usage::extract_usage;
