//! Configuration struct definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level Strata configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Data directory layout.
    #[serde(default)]
    pub data: DataSection,
    /// HTTP surface.
    #[serde(default)]
    pub server: ServerSection,
    /// Turn pipeline tuning.
    #[serde(default)]
    pub turn: TurnSection,
    /// Default consumption limits for new users.
    #[serde(default)]
    pub limits: LimitsSection,
}

/// Where Strata keeps its state on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSection {
    /// Root for per-owner session files.
    #[serde(default = "default_sessions_root")]
    pub sessions_root: PathBuf,
    /// SQLite database for consumption accounting.
    #[serde(default = "default_consumption_db")]
    pub consumption_db: PathBuf,
    /// SQLite database for knowledge graphs.
    #[serde(default = "default_knowledge_db")]
    pub knowledge_db: PathBuf,
    /// Root for per-owner registry files (profiles, LLM configs, servers).
    #[serde(default = "default_registry_root")]
    pub registry_root: PathBuf,
}

fn strata_home() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".strata"),
        |dirs| dirs.home_dir().join(".strata"),
    )
}

fn default_sessions_root() -> PathBuf {
    strata_home().join("sessions")
}

fn default_consumption_db() -> PathBuf {
    strata_home().join("consumption.db")
}

fn default_knowledge_db() -> PathBuf {
    strata_home().join("knowledge.db")
}

fn default_registry_root() -> PathBuf {
    strata_home().join("registry")
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            sessions_root: default_sessions_root(),
            consumption_db: default_consumption_db(),
            knowledge_db: default_knowledge_db(),
            registry_root: default_registry_root(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Event-channel depth before the producer applies back-pressure.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8732
}

fn default_event_buffer() -> usize {
    256
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Turn pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnSection {
    /// Default context budget in tokens, capped by the model window.
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
    /// Tokens held back from the model window for the response.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,
    /// Maximum ReAct iterations per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Per-LLM-call timeout in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    /// MCP health-check timeout in seconds.
    #[serde(default = "default_mcp_timeout_secs")]
    pub mcp_timeout_secs: u64,
}

fn default_context_budget() -> usize {
    24_000
}

fn default_safety_margin() -> usize {
    4_096
}

fn default_max_iterations() -> usize {
    5
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_mcp_timeout_secs() -> u64 {
    10
}

impl Default for TurnSection {
    fn default() -> Self {
        Self {
            context_budget: default_context_budget(),
            safety_margin: default_safety_margin(),
            max_iterations: default_max_iterations(),
            llm_timeout_secs: default_llm_timeout_secs(),
            mcp_timeout_secs: default_mcp_timeout_secs(),
        }
    }
}

/// Default consumption limits assigned to new users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    /// Prompts per hour.
    #[serde(default = "default_prompts_per_hour")]
    pub prompts_per_hour: u32,
    /// Prompts per day.
    #[serde(default = "default_prompts_per_day")]
    pub prompts_per_day: u32,
    /// Monthly input-token quota. `None` means unmetered.
    #[serde(default = "default_input_tokens")]
    pub input_tokens_per_month: Option<u64>,
    /// Monthly output-token quota. `None` means unmetered.
    #[serde(default = "default_output_tokens")]
    pub output_tokens_per_month: Option<u64>,
}

fn default_prompts_per_hour() -> u32 {
    100
}

fn default_prompts_per_day() -> u32 {
    1_000
}

fn default_input_tokens() -> Option<u64> {
    Some(10_000_000)
}

fn default_output_tokens() -> Option<u64> {
    Some(2_000_000)
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            prompts_per_hour: default_prompts_per_hour(),
            prompts_per_day: default_prompts_per_day(),
            input_tokens_per_month: default_input_tokens(),
            output_tokens_per_month: default_output_tokens(),
        }
    }
}
