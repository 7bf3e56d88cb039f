//! Strata Consumption - rate limits, quotas, and turn accounting.
//!
//! Every mutation runs inside a single SQLite transaction keyed by
//! owner, so counters never observe a partial update. Rate and quota
//! checks are snapshot reads (plus lazy window resets). A turn that
//! was admitted before exhausting its quota is still recorded in full;
//! the *next* request is the one that gets rejected.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod model;
pub mod store;

pub use error::{ConsumptionError, ConsumptionResult};
pub use model::{
    ConsumptionLimits, ConsumptionSummary, PeriodArchiveRow, RateDecision, TurnRecord, TurnStatus,
};
pub use store::ConsumptionStore;
