//! Strata Context - budgeted context-window assembly.
//!
//! A turn's prompt is assembled from independent modules, each of
//! which declares which profile kinds it applies to, contributes
//! content under a token allocation, and optionally knows how to
//! condense itself when the total overshoots the budget.
//!
//! The assembler allocates the overall budget by normalized module
//! weights, runs every applicable module concurrently, then brings the
//! total under budget: condense the largest condensable contribution
//! first (never below a 64-token floor), and only then drop the
//! lowest-priority condensable contributions. Non-condensable modules
//! (the system prompt) are never dropped.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod assembler;
pub mod module;
pub mod modules;

pub use assembler::{Assembler, AssemblyResult, ModuleOverrides, ModuleSpec};
pub use module::{
    AssemblyContext, ComponentInstruction, ContextModule, Contribution, DocumentExtract,
    ContextRetriever, RetrievedExample, ToolContextInfo,
};
pub use modules::standard_modules;
