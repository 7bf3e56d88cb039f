//! Strata Runtime - the turn execution pipeline.
//!
//! This crate glues the stores and providers into user-facing turns:
//!
//! - Per-owner registries for profiles, LLM configs, and MCP servers
//! - The capability classifier and its per-profile cache
//! - The atomic profile/LLM/MCP context switcher
//! - The conversation executor (ReAct loop with event streaming,
//!   auto-canvas, component payload passthrough, and cooperative
//!   cancellation)
//! - The turn orchestrator that sequences consumption checks, context
//!   assembly, execution, and persistence

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod activation;
pub mod canvas;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod registry;

pub use activation::{ActiveContext, ContextSwitcher, McpToolRunner, ToolRunner};
pub use canvas::{CanvasPayload, FencedBlock, extract_canvas_payloads};
pub use classifier::{ClassificationCache, classify_capabilities, light_classify};
pub use error::{RuntimeError, RuntimeResult};
pub use executor::{ConversationExecutor, ExecutorInputs, ExecutorOutcome};
pub use orchestrator::{TurnOrchestrator, TurnRequest};
pub use registry::{
    Collection, GenieConfig, KnowledgeConfig, LlmConfig, McpServerEntry, Profile, RagConfig,
    Registry, RepositoryType,
};
