//! Shared application state.

use std::sync::Arc;

use strata_config::Config;
use strata_consumption::{ConsumptionLimits, ConsumptionStore};
use strata_context::{Assembler, standard_modules};
use strata_kg::KgStore;
use strata_runtime::{ContextSwitcher, Registry, TurnOrchestrator};
use strata_session::SessionStore;

use crate::error::ApiError;

/// Everything the route handlers share.
#[derive(Clone)]
pub struct AppState {
    /// Turn orchestrator.
    pub orchestrator: Arc<TurnOrchestrator>,
    /// Activation state machine.
    pub switcher: Arc<ContextSwitcher>,
    /// Profile / LLM / MCP registry.
    pub registry: Arc<Registry>,
    /// Session store.
    pub sessions: Arc<SessionStore>,
    /// Consumption store.
    pub consumption: Arc<ConsumptionStore>,
    /// Knowledge graph store.
    pub kg: Arc<KgStore>,
    /// Loaded configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire up all stores from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a backing database cannot be opened.
    pub fn from_config(config: Config) -> Result<Self, ApiError> {
        let limits = ConsumptionLimits {
            prompts_per_hour: config.limits.prompts_per_hour,
            prompts_per_day: config.limits.prompts_per_day,
            input_tokens_per_month: config.limits.input_tokens_per_month,
            output_tokens_per_month: config.limits.output_tokens_per_month,
        };

        let registry = Arc::new(Registry::new(&config.data.registry_root));
        let sessions = Arc::new(SessionStore::new(&config.data.sessions_root));
        let consumption = Arc::new(
            ConsumptionStore::new(&config.data.consumption_db, limits)
                .map_err(ApiError::from)?,
        );
        let kg = Arc::new(KgStore::new(&config.data.knowledge_db).map_err(ApiError::from)?);
        let switcher = Arc::new(ContextSwitcher::new(Arc::clone(&registry)));
        let assembler = Arc::new(Assembler::new(standard_modules()));

        let orchestrator = Arc::new(TurnOrchestrator::new(
            Arc::clone(&switcher),
            Arc::clone(&sessions),
            Arc::clone(&consumption),
            Arc::clone(&kg),
            assembler,
            config.turn.clone(),
            config.server.event_buffer,
        ));

        Ok(Self {
            orchestrator,
            switcher,
            registry,
            sessions,
            consumption,
            kg,
            config: Arc::new(config),
        })
    }
}
