#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Unified configuration system for the Strata agent.
//!
//! A single [`Config`] type covers the data directories, the HTTP
//! surface, the turn pipeline, and default consumption limits.
//!
//! # Usage
//!
//! ```rust,no_run
//! use strata_config::Config;
//!
//! let config = Config::load_default().unwrap();
//! println!("sessions root: {}", config.data.sessions_root.display());
//! ```
//!
//! # Precedence
//!
//! 1. Explicit path passed to [`Config::load`]
//! 2. `~/.strata/config.toml`
//! 3. Built-in defaults
//!
//! This crate has no dependencies on other internal Strata crates;
//! conversion to domain types happens at the integration boundary.

/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::{Config, DataSection, LimitsSection, ServerSection, TurnSection};
pub use validate::validate;
