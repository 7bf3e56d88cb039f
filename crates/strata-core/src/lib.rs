//! Strata Core - Foundation types for the Strata conversational data agent.
//!
//! This crate provides:
//! - Typed identifiers for owners, profiles, sessions, and stores
//! - The error taxonomy shared by every fallible operation
//! - Deterministic character-ratio token estimation
//! - Retry utilities with bounded exponential backoff

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod retry;
pub mod tokens;
pub mod types;

pub use error::{ErrorKind, StrataError, StrataResult};
pub use retry::{RetryConfig, retry};
pub use tokens::TokenEstimator;
pub use types::{
    ClassificationMode, CollectionId, LlmConfigId, McpServerId, OwnerId, ProfileId, ProfileKind,
    SessionId, Tier, TraceId,
};
