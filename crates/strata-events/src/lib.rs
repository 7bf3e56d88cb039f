//! Strata Events - the conversation event stream.
//!
//! Each user turn produces an ordered sequence of structured events
//! consumed by the SSE surface and recorded into the session. Events
//! from a single turn reach the client in emission order; events from
//! concurrent turns interleave freely.
//!
//! Two delivery classes exist:
//!
//! - **Lossless** events (agent lifecycle, LLM steps, tool calls) are
//!   sent with back-pressure: a full channel slows the producer.
//! - **Lossy** events (`status_indicator_update`) are dropped first
//!   when the consumer falls behind.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod channel;
pub mod event;

pub use channel::{DEFAULT_CHANNEL_CAPACITY, EventReceiver, EventSink, turn_channel};
pub use event::{
    ConversationEvent, EventMeta, IndicatorState, IndicatorTarget, ToolOutputSummary,
};
