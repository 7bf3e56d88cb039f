//! Strata Session - multi-turn conversation state.
//!
//! One JSON file per session under an owner-scoped directory. Writes
//! are atomic (temp file + rename) and serialized by a per-session
//! lock; readers always see a consistent snapshot.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod model;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use model::{
    ChatMessage, ChatRole, Session, SessionCounters, ToolAction, TraceStep, TurnTrace,
};
pub use store::{SessionField, SessionStore};
