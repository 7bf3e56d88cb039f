//! Atomic profile/LLM/MCP activation.
//!
//! `activate` validates the whole (profile, LLM, MCP server) tuple
//! before touching runtime state: the committed state either reflects
//! the fully-validated new tuple or is left exactly as it was. A
//! per-owner lock serializes activations; waiters observe the
//! committed result. Re-activating the already-active profile is a
//! no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use strata_core::OwnerId;
use strata_core::ProfileId;
use strata_llm::{
    LlmProvider, ModelPricing, ProviderConfig, ResolvedCredentials, build_provider,
    resolve_credentials,
};
use strata_mcp::{McpClient, McpResult, McpToolResult};

use crate::classifier::{ClassificationCache, classify_capabilities};
use crate::error::{RuntimeError, RuntimeResult};
use crate::registry::{LlmConfig, Profile, Registry};

/// Executes tools for the conversation loop.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run one tool call.
    async fn run(&self, name: &str, args: &Value) -> McpResult<McpToolResult>;
}

/// [`ToolRunner`] over a connected MCP client.
pub struct McpToolRunner {
    client: Arc<McpClient>,
}

impl McpToolRunner {
    /// Wrap a connected client.
    #[must_use]
    pub fn new(client: Arc<McpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolRunner for McpToolRunner {
    async fn run(&self, name: &str, args: &Value) -> McpResult<McpToolResult> {
        self.client.call_tool(name, args.clone()).await
    }
}

/// The committed runtime state for one owner.
pub struct ActiveContext {
    /// The active profile (with its classification cache populated).
    pub profile: Profile,
    /// LLM handle.
    pub llm: Arc<dyn LlmProvider>,
    /// Pricing for the active model.
    pub pricing: ModelPricing,
    /// Connected MCP client, for tool-enabled profiles.
    pub mcp_client: Option<Arc<McpClient>>,
    /// Tool runner over the MCP client.
    pub tool_runner: Option<Arc<dyn ToolRunner>>,
    /// Classification in effect.
    pub classification: ClassificationCache,
    /// Tools subtracted at runtime (classified minus enabled).
    pub disabled_tools: BTreeSet<String>,
    /// Prompts subtracted at runtime.
    pub disabled_prompts: BTreeSet<String>,
    /// Whether the classification pass was served from cache.
    pub classification_cache_hit: bool,
    /// When the activation committed.
    pub activated_at: DateTime<Utc>,
}

impl std::fmt::Debug for ActiveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveContext")
            .field("profile", &self.profile.tag)
            .field("model", &self.llm.model())
            .field("has_mcp", &self.mcp_client.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds an LLM provider from a config; injectable for tests.
pub type ProviderFactory = dyn Fn(&LlmConfig, &ResolvedCredentials) -> RuntimeResult<Box<dyn LlmProvider>>
    + Send
    + Sync;

/// Owner-scoped activation state machine.
pub struct ContextSwitcher {
    registry: Arc<Registry>,
    active: DashMap<OwnerId, Arc<ActiveContext>>,
    locks: DashMap<OwnerId, Arc<Mutex<()>>>,
    provider_factory: Box<ProviderFactory>,
}

impl ContextSwitcher {
    /// Create a switcher over a registry using the standard provider
    /// factory.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            active: DashMap::new(),
            locks: DashMap::new(),
            provider_factory: Box::new(|config, credentials| {
                let mut provider_config =
                    ProviderConfig::new("", config.model.clone());
                if let Some(url) = &config.base_url {
                    provider_config = provider_config.base_url(url.clone());
                }
                if let Some(window) = config.context_window {
                    provider_config = provider_config.context_window(window);
                }
                build_provider(&config.provider, provider_config, credentials)
                    .map_err(RuntimeError::from)
            }),
        }
    }

    /// Replace the provider factory (tests).
    #[must_use]
    pub fn with_provider_factory(mut self, factory: Box<ProviderFactory>) -> Self {
        self.provider_factory = factory;
        self
    }

    fn lock_for(&self, owner_id: OwnerId) -> Arc<Mutex<()>> {
        self.locks
            .entry(owner_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Currently-active context for an owner.
    #[must_use]
    pub fn current(&self, owner_id: OwnerId) -> Option<Arc<ActiveContext>> {
        self.active.get(&owner_id).map(|entry| Arc::clone(&entry))
    }

    /// Deactivate an owner's context, closing any MCP connection.
    pub async fn deactivate(&self, owner_id: OwnerId) {
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;
        if let Some((_, context)) = self.active.remove(&owner_id)
            && let Some(client) = &context.mcp_client
        {
            client.disconnect().await;
        }
    }

    /// Activate a profile for an owner.
    ///
    /// Validation order: profile → LLM config → credentials →
    /// optional LLM health call → MCP connection + tool-list health
    /// check (tool-enabled only) → classification. Nothing is
    /// committed until every step passes; a failure leaves the
    /// previously-active context untouched.
    ///
    /// # Errors
    ///
    /// Returns categorized errors: `NotFound` for missing objects,
    /// `Auth` (via `Llm`) for credential failures, `UpstreamTimeout`
    /// (via `Mcp`) when the server misses the 10-second health check.
    #[allow(clippy::too_many_lines)]
    pub async fn activate(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        validate_llm: bool,
    ) -> RuntimeResult<Arc<ActiveContext>> {
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        // Idempotent when the requested tuple is already active.
        if let Some(current) = self.active.get(&owner_id)
            && current.profile.id == profile_id
        {
            debug!(owner = %owner_id, profile = %profile_id, "Activation is a no-op");
            return Ok(Arc::clone(&current));
        }

        let mut profile = self
            .registry
            .get_profile(owner_id, profile_id)
            .await?
            .ok_or_else(|| RuntimeError::NotFound {
                what: "profile",
                id: profile_id.to_string(),
            })?;
        profile.check()?;

        let llm_config = self
            .registry
            .get_llm_config(owner_id, profile.llm_config_id)
            .await?
            .ok_or_else(|| RuntimeError::NotFound {
                what: "llm_config",
                id: profile.llm_config_id.to_string(),
            })?;

        let credentials = resolve_credentials(
            &llm_config.provider,
            None,
            llm_config.encrypted_credentials.as_deref(),
        )
        .ok_or_else(|| {
            RuntimeError::Llm(strata_llm::LlmError::ApiKeyNotConfigured {
                provider: llm_config.provider.clone(),
            })
        })?;

        let llm: Arc<dyn LlmProvider> =
            Arc::from((self.provider_factory)(&llm_config, &credentials)?);

        if validate_llm {
            llm.health_check().await.map_err(RuntimeError::from)?;
        }

        // MCP validation only applies to tool-enabled profiles;
        // llm-only and rag-focused activations skip it entirely.
        let mut mcp_client: Option<Arc<McpClient>> = None;
        let mut advertised_tools = Vec::new();
        let mut advertised_prompts = Vec::new();
        if profile.kind.requires_mcp() {
            let server_id = profile.mcp_server_id.ok_or_else(|| {
                RuntimeError::Validation("tool_enabled profile lost its MCP server".into())
            })?;
            let entry = self
                .registry
                .get_mcp_server(owner_id, server_id)
                .await?
                .ok_or_else(|| RuntimeError::NotFound {
                    what: "mcp_server",
                    id: server_id.to_string(),
                })?;

            let (client, tools) = McpClient::connect(entry.config).await?;
            let client = Arc::new(client);
            advertised_prompts = client.list_prompts().await.unwrap_or_default();
            advertised_tools = tools;
            mcp_client = Some(client);
        }

        // Classification: reuse the cache when its mode matches,
        // otherwise run a pass. The first pass auto-enables every
        // discovered capability.
        let mut cache_hit = true;
        let classification = if profile.kind.requires_mcp() {
            let source_profile = self.classification_source(&profile).await?;
            let cached = source_profile
                .cached_classification
                .clone()
                .filter(|c| c.is_valid_for(profile.classification_mode));
            match cached {
                Some(cache) => cache,
                None => {
                    cache_hit = false;
                    let first_classification = profile.cached_classification.is_none();
                    let cache = classify_capabilities(
                        llm.as_ref(),
                        &advertised_tools,
                        &advertised_prompts,
                        profile.classification_mode,
                    )
                    .await;
                    profile = self
                        .registry
                        .set_cached_classification(
                            owner_id,
                            profile.id,
                            cache.clone(),
                            first_classification,
                        )
                        .await
                        .map_err(|e| {
                            // Classification persisted state must not
                            // leak a half-activated context.
                            RuntimeError::Registry(format!("cannot persist classification: {e}"))
                        })?;
                    cache
                },
            }
        } else {
            ClassificationCache::default()
        };

        let all_tools: BTreeSet<String> = classification.tool_names().into_iter().collect();
        let all_prompts: BTreeSet<String> = classification.prompt_names().into_iter().collect();
        let disabled_tools: BTreeSet<String> = all_tools
            .difference(&profile.enabled_tools)
            .cloned()
            .collect();
        let disabled_prompts: BTreeSet<String> = all_prompts
            .difference(&profile.enabled_prompts)
            .cloned()
            .collect();

        let tool_runner: Option<Arc<dyn ToolRunner>> = mcp_client
            .as_ref()
            .map(|client| Arc::new(McpToolRunner::new(Arc::clone(client))) as Arc<dyn ToolRunner>);

        let context = Arc::new(ActiveContext {
            pricing: ModelPricing::for_model(&llm_config.model),
            profile,
            llm,
            mcp_client,
            tool_runner,
            classification,
            disabled_tools,
            disabled_prompts,
            classification_cache_hit: cache_hit,
            activated_at: Utc::now(),
        });

        // Commit: tear down the previous context's MCP connection.
        if let Some(previous) = self.active.insert(owner_id, Arc::clone(&context))
            && let Some(client) = &previous.mcp_client
        {
            client.disconnect().await;
        }

        info!(
            owner = %owner_id,
            profile = %context.profile.tag,
            kind = %context.profile.kind,
            cache_hit,
            "Profile activated"
        );
        Ok(context)
    }

    /// The profile whose classification cache applies: the owner's
    /// `master` profile when inheritance is requested, otherwise the
    /// profile itself.
    async fn classification_source(&self, profile: &Profile) -> RuntimeResult<Profile> {
        if !profile.inherit_classification {
            return Ok(profile.clone());
        }
        let profiles = self.registry.list_profiles(profile.owner_id).await?;
        match profiles.into_iter().find(|p| p.tag == "master") {
            Some(master) => Ok(master),
            None => {
                warn!(profile = %profile.tag, "No master profile to inherit classification from");
                Ok(profile.clone())
            },
        }
    }
}

impl std::fmt::Debug for ContextSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSwitcher")
            .field("active_owners", &self.active.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{LlmConfigId, ProfileKind};
    use strata_llm::{LlmResponse, LlmResult, LlmToolDefinition, Message, StopReason, Usage};

    struct CannedLlm {
        model: String,
        healthy: bool,
    }

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn provider_id(&self) -> &str {
            "canned"
        }
        fn model(&self) -> &str {
            &self.model
        }
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[LlmToolDefinition],
            _system: &str,
        ) -> LlmResult<LlmResponse> {
            if !self.healthy {
                return Err(strata_llm::LlmError::AuthRejected {
                    provider: "canned".into(),
                });
            }
            Ok(LlmResponse {
                message: Message::assistant("pong"),
                has_tool_calls: false,
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }
        fn max_context_length(&self) -> usize {
            100_000
        }
    }

    fn canned_switcher(registry: Arc<Registry>, healthy: bool) -> ContextSwitcher {
        ContextSwitcher::new(registry).with_provider_factory(Box::new(move |config, _creds| {
            Ok(Box::new(CannedLlm {
                model: config.model.clone(),
                healthy,
            }))
        }))
    }

    async fn seeded(owner: OwnerId) -> (tempfile::TempDir, Arc<Registry>, Profile) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::new(dir.path()));
        let config = LlmConfig {
            id: LlmConfigId::new(),
            owner_id: owner,
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            encrypted_credentials: Some("stored-key".into()),
            base_url: None,
            context_window: None,
        };
        registry.upsert_llm_config(config.clone()).await.unwrap();
        let profile = registry
            .create_profile(Profile::new(owner, "analyst", ProfileKind::LlmOnly, config.id))
            .await
            .unwrap();
        (dir, registry, profile)
    }

    #[tokio::test]
    async fn test_llm_only_activation_skips_mcp() {
        let owner = OwnerId::new();
        let (_dir, registry, profile) = seeded(owner).await;
        let switcher = canned_switcher(registry, true);

        let context = switcher.activate(owner, profile.id, true).await.unwrap();
        assert!(context.mcp_client.is_none());
        assert!(context.classification.tools.is_empty());
    }

    #[tokio::test]
    async fn test_activation_idempotent() {
        let owner = OwnerId::new();
        let (_dir, registry, profile) = seeded(owner).await;
        let switcher = canned_switcher(registry, true);

        let first = switcher.activate(owner, profile.id, false).await.unwrap();
        let second = switcher.activate(owner, profile.id, false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let owner = OwnerId::new();
        let (_dir, registry, _profile) = seeded(owner).await;
        let switcher = canned_switcher(registry, true);

        let result = switcher.activate(owner, ProfileId::new(), false).await;
        assert!(matches!(result, Err(RuntimeError::NotFound { .. })));
        assert!(switcher.current(owner).is_none());
    }

    #[tokio::test]
    async fn test_failed_health_check_rolls_back() {
        let owner = OwnerId::new();
        let (_dir, registry, profile) = seeded(owner).await;
        let switcher = canned_switcher(registry, false);

        let result = switcher.activate(owner, profile.id, true).await;
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            strata_core::ErrorKind::Auth
        );
        // No partial activation.
        assert!(switcher.current(owner).is_none());
    }

    #[tokio::test]
    async fn test_deactivate() {
        let owner = OwnerId::new();
        let (_dir, registry, profile) = seeded(owner).await;
        let switcher = canned_switcher(registry, true);

        switcher.activate(owner, profile.id, false).await.unwrap();
        assert!(switcher.current(owner).is_some());
        switcher.deactivate(owner).await;
        assert!(switcher.current(owner).is_none());
    }
}
