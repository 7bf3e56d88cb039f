//! Per-owner registries for profiles, LLM configs, and MCP servers.
//!
//! One JSON file per owner under the registry root, written with the
//! same temp-file + rename discipline as sessions. Mutations for one
//! owner serialize behind a per-owner lock.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use strata_core::{
    ClassificationMode, CollectionId, LlmConfigId, McpServerId, OwnerId, ProfileId, ProfileKind,
};
use strata_mcp::McpServerConfig;

use crate::classifier::ClassificationCache;
use crate::error::{RuntimeError, RuntimeResult};

/// Knowledge-graph settings on a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Whether KG planner enrichment is active.
    pub enabled: bool,
    /// Node cap handed to adaptive extraction.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
}

fn default_max_nodes() -> usize {
    500
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_nodes: default_max_nodes(),
        }
    }
}

/// RAG settings on a profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Whether champion-case retrieval is active.
    pub enabled: bool,
}

/// Genie (coordinator) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenieConfig {
    /// Child profiles this coordinator dispatches to. Stored as ids
    /// and resolved on demand; no profile objects are nested.
    pub children: Vec<ProfileId>,
}

/// A profile: LLM + optional MCP server + policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Profile id.
    pub id: ProfileId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Human tag, unique per owner.
    pub tag: String,
    /// Activation mode.
    pub kind: ProfileKind,
    /// LLM configuration reference.
    pub llm_config_id: LlmConfigId,
    /// MCP server reference; required when `kind` is tool-enabled.
    pub mcp_server_id: Option<McpServerId>,
    /// Classification depth.
    #[serde(default)]
    pub classification_mode: ClassificationMode,
    /// Substitute the owner's master classification instead of running
    /// a pass for this profile.
    #[serde(default)]
    pub inherit_classification: bool,
    /// Cached classification result.
    #[serde(default)]
    pub cached_classification: Option<ClassificationCache>,
    /// Enabled tool names. Disabled tools are subtracted at runtime;
    /// classification always retains the full set.
    #[serde(default)]
    pub enabled_tools: BTreeSet<String>,
    /// Enabled prompt names.
    #[serde(default)]
    pub enabled_prompts: BTreeSet<String>,
    /// Knowledge settings.
    #[serde(default)]
    pub knowledge_config: KnowledgeConfig,
    /// RAG settings.
    #[serde(default)]
    pub rag_config: RagConfig,
    /// Genie settings; only for `kind = genie`.
    #[serde(default)]
    pub genie_config: Option<GenieConfig>,
    /// System prompt.
    #[serde(default)]
    pub system_prompt: String,
    /// Context budget override in tokens.
    #[serde(default)]
    pub context_budget: Option<usize>,
    /// Context module weight overrides by module id.
    #[serde(default)]
    pub module_weights: HashMap<String, f64>,
    /// Context modules disabled for this profile.
    #[serde(default)]
    pub disabled_modules: HashSet<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Create a minimal profile.
    #[must_use]
    pub fn new(
        owner_id: OwnerId,
        tag: impl Into<String>,
        kind: ProfileKind,
        llm_config_id: LlmConfigId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProfileId::new(),
            owner_id,
            tag: tag.into(),
            kind,
            llm_config_id,
            mcp_server_id: None,
            classification_mode: ClassificationMode::default(),
            inherit_classification: false,
            cached_classification: None,
            enabled_tools: BTreeSet::new(),
            enabled_prompts: BTreeSet::new(),
            knowledge_config: KnowledgeConfig::default(),
            rag_config: RagConfig::default(),
            genie_config: None,
            system_prompt: String::new(),
            context_budget: None,
            module_weights: HashMap::new(),
            disabled_modules: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach an MCP server.
    #[must_use]
    pub fn with_mcp_server(mut self, id: McpServerId) -> Self {
        self.mcp_server_id = Some(id);
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Check profile invariants.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a tool-enabled profile with no
    /// MCP server, or a genie profile with no genie config.
    pub fn check(&self) -> RuntimeResult<()> {
        if self.tag.trim().is_empty() {
            return Err(RuntimeError::Validation("profile tag is empty".into()));
        }
        if self.kind.requires_mcp() && self.mcp_server_id.is_none() {
            return Err(RuntimeError::Validation(format!(
                "profile '{}' is tool_enabled but has no MCP server",
                self.tag
            )));
        }
        if self.kind == ProfileKind::Genie && self.genie_config.is_none() {
            return Err(RuntimeError::Validation(format!(
                "profile '{}' is genie but has no genie config",
                self.tag
            )));
        }
        Ok(())
    }
}

/// An LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Config id.
    pub id: LlmConfigId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Provider id ("anthropic", "openai", ...).
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Credentials from the owner's encrypted store. Opaque here;
    /// never logged.
    #[serde(default)]
    pub encrypted_credentials: Option<String>,
    /// Base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Context window override.
    #[serde(default)]
    pub context_window: Option<usize>,
}

/// A registered MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerEntry {
    /// Server id.
    pub id: McpServerId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Transport and connection parameters.
    pub config: McpServerConfig,
}

/// Which repository a RAG collection feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryType {
    /// Champion cases for the planner.
    Planner,
    /// Knowledge entries for grounding.
    Knowledge,
}

/// A RAG collection. The vector store behind it is an external
/// collaborator; only the record lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Collection id.
    pub id: CollectionId,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Display name.
    pub name: String,
    /// Repository this collection feeds.
    pub repository_type: RepositoryType,
    /// MCP server whose results populate the collection, if any.
    #[serde(default)]
    pub mcp_server_id: Option<McpServerId>,
    /// Chunking parameters handed to the ingestion pipeline.
    #[serde(default)]
    pub chunking_config: serde_json::Value,
    /// Embedding model name.
    pub embedding_model: String,
    /// Whether retrieval consults this collection.
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OwnerRegistry {
    #[serde(default)]
    profiles: Vec<Profile>,
    #[serde(default)]
    llm_configs: Vec<LlmConfig>,
    #[serde(default)]
    mcp_servers: Vec<McpServerEntry>,
    #[serde(default)]
    collections: Vec<Collection>,
}

/// File-backed registry of per-owner profiles, LLM configs, and MCP
/// servers.
pub struct Registry {
    root: PathBuf,
    locks: DashMap<OwnerId, Arc<Mutex<()>>>,
}

impl Registry {
    /// Create a registry rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    fn owner_path(&self, owner_id: OwnerId) -> PathBuf {
        self.root
            .join(owner_id.to_string())
            .join("registry.json")
    }

    fn lock_for(&self, owner_id: OwnerId) -> Arc<Mutex<()>> {
        self.locks
            .entry(owner_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_owner(&self, owner_id: OwnerId) -> RuntimeResult<OwnerRegistry> {
        let path = self.owner_path(owner_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| RuntimeError::Registry(format!("corrupt registry: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OwnerRegistry::default()),
            Err(e) => Err(RuntimeError::Registry(e.to_string())),
        }
    }

    async fn save_owner(&self, owner_id: OwnerId, registry: &OwnerRegistry) -> RuntimeResult<()> {
        let path = self.owner_path(owner_id);
        let json = serde_json::to_vec_pretty(registry)
            .map_err(|e| RuntimeError::Registry(e.to_string()))?;
        tokio::task::spawn_blocking(move || {
            let parent = path
                .parent()
                .ok_or_else(|| RuntimeError::Registry("registry path has no parent".into()))?;
            std::fs::create_dir_all(parent).map_err(|e| RuntimeError::Registry(e.to_string()))?;
            let mut temp = tempfile::NamedTempFile::new_in(parent)
                .map_err(|e| RuntimeError::Registry(e.to_string()))?;
            std::io::Write::write_all(&mut temp, &json)
                .map_err(|e| RuntimeError::Registry(e.to_string()))?;
            temp.persist(&path)
                .map_err(|e| RuntimeError::Registry(e.error.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RuntimeError::Registry(format!("write task aborted: {e}")))?
    }

    /// Create a profile, enforcing tag uniqueness and invariants.
    ///
    /// # Errors
    ///
    /// Returns a conflict for a duplicate tag, or validation errors
    /// for broken invariants (missing MCP server, foreign genie
    /// children, unknown LLM config).
    pub async fn create_profile(&self, profile: Profile) -> RuntimeResult<Profile> {
        profile.check()?;
        let owner_id = profile.owner_id;
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut registry = self.load_owner(owner_id).await?;
        if registry.profiles.iter().any(|p| p.tag == profile.tag) {
            return Err(RuntimeError::Conflict(format!(
                "profile tag '{}' already exists",
                profile.tag
            )));
        }
        if !registry
            .llm_configs
            .iter()
            .any(|c| c.id == profile.llm_config_id)
        {
            return Err(RuntimeError::NotFound {
                what: "llm_config",
                id: profile.llm_config_id.to_string(),
            });
        }
        if let Some(server_id) = profile.mcp_server_id
            && !registry.mcp_servers.iter().any(|s| s.id == server_id)
        {
            return Err(RuntimeError::NotFound {
                what: "mcp_server",
                id: server_id.to_string(),
            });
        }
        if let Some(genie) = &profile.genie_config {
            for child in &genie.children {
                if !registry.profiles.iter().any(|p| p.id == *child) {
                    return Err(RuntimeError::Validation(format!(
                        "genie child {child} is not a profile of this owner"
                    )));
                }
            }
        }

        registry.profiles.push(profile.clone());
        self.save_owner(owner_id, &registry).await?;
        debug!(owner = %owner_id, tag = %profile.tag, "Profile created");
        Ok(profile)
    }

    /// Update a profile. Changing the classification mode or MCP
    /// server invalidates the cached classification.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown profile, conflict for a tag
    /// collision, or validation errors for broken invariants.
    pub async fn update_profile(&self, mut profile: Profile) -> RuntimeResult<Profile> {
        profile.check()?;
        let owner_id = profile.owner_id;
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut registry = self.load_owner(owner_id).await?;
        let Some(existing) = registry.profiles.iter_mut().find(|p| p.id == profile.id) else {
            return Err(RuntimeError::NotFound {
                what: "profile",
                id: profile.id.to_string(),
            });
        };

        if existing.classification_mode != profile.classification_mode
            || existing.mcp_server_id != profile.mcp_server_id
        {
            profile.cached_classification = None;
        }

        let tag_taken = registry
            .profiles
            .iter()
            .any(|p| p.id != profile.id && p.tag == profile.tag);
        if tag_taken {
            return Err(RuntimeError::Conflict(format!(
                "profile tag '{}' already exists",
                profile.tag
            )));
        }

        profile.updated_at = Utc::now();
        let Some(slot) = registry.profiles.iter_mut().find(|p| p.id == profile.id) else {
            return Err(RuntimeError::NotFound {
                what: "profile",
                id: profile.id.to_string(),
            });
        };
        *slot = profile.clone();
        self.save_owner(owner_id, &registry).await?;
        Ok(profile)
    }

    /// Delete a profile.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown profile.
    pub async fn delete_profile(&self, owner_id: OwnerId, id: ProfileId) -> RuntimeResult<()> {
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut registry = self.load_owner(owner_id).await?;
        let before = registry.profiles.len();
        registry.profiles.retain(|p| p.id != id);
        if registry.profiles.len() == before {
            return Err(RuntimeError::NotFound {
                what: "profile",
                id: id.to_string(),
            });
        }
        self.save_owner(owner_id, &registry).await
    }

    /// Fetch a profile.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub async fn get_profile(
        &self,
        owner_id: OwnerId,
        id: ProfileId,
    ) -> RuntimeResult<Option<Profile>> {
        Ok(self
            .load_owner(owner_id)
            .await?
            .profiles
            .into_iter()
            .find(|p| p.id == id))
    }

    /// List an owner's profiles.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub async fn list_profiles(&self, owner_id: OwnerId) -> RuntimeResult<Vec<Profile>> {
        Ok(self.load_owner(owner_id).await?.profiles)
    }

    /// Persist a classification result onto a profile.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown profile.
    pub async fn set_cached_classification(
        &self,
        owner_id: OwnerId,
        profile_id: ProfileId,
        cache: ClassificationCache,
        enable_all: bool,
    ) -> RuntimeResult<Profile> {
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut registry = self.load_owner(owner_id).await?;
        let Some(profile) = registry.profiles.iter_mut().find(|p| p.id == profile_id) else {
            return Err(RuntimeError::NotFound {
                what: "profile",
                id: profile_id.to_string(),
            });
        };

        if enable_all {
            profile.enabled_tools = cache.tool_names().into_iter().collect();
            profile.enabled_prompts = cache.prompt_names().into_iter().collect();
        }
        profile.cached_classification = Some(cache);
        profile.updated_at = Utc::now();
        let updated = profile.clone();
        self.save_owner(owner_id, &registry).await?;
        Ok(updated)
    }

    /// Upsert an LLM config.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub async fn upsert_llm_config(&self, config: LlmConfig) -> RuntimeResult<LlmConfig> {
        let owner_id = config.owner_id;
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut registry = self.load_owner(owner_id).await?;
        match registry.llm_configs.iter_mut().find(|c| c.id == config.id) {
            Some(slot) => *slot = config.clone(),
            None => registry.llm_configs.push(config.clone()),
        }
        self.save_owner(owner_id, &registry).await?;
        Ok(config)
    }

    /// Fetch an LLM config.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub async fn get_llm_config(
        &self,
        owner_id: OwnerId,
        id: LlmConfigId,
    ) -> RuntimeResult<Option<LlmConfig>> {
        Ok(self
            .load_owner(owner_id)
            .await?
            .llm_configs
            .into_iter()
            .find(|c| c.id == id))
    }

    /// Upsert an MCP server entry after validating its transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors for bad transports.
    pub async fn upsert_mcp_server(&self, entry: McpServerEntry) -> RuntimeResult<McpServerEntry> {
        entry
            .config
            .validate()
            .map_err(|e| RuntimeError::Validation(e.to_string()))?;
        let owner_id = entry.owner_id;
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut registry = self.load_owner(owner_id).await?;
        match registry.mcp_servers.iter_mut().find(|s| s.id == entry.id) {
            Some(slot) => *slot = entry.clone(),
            None => registry.mcp_servers.push(entry.clone()),
        }
        self.save_owner(owner_id, &registry).await?;
        Ok(entry)
    }

    /// Fetch an MCP server entry.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub async fn get_mcp_server(
        &self,
        owner_id: OwnerId,
        id: McpServerId,
    ) -> RuntimeResult<Option<McpServerEntry>> {
        Ok(self
            .load_owner(owner_id)
            .await?
            .mcp_servers
            .into_iter()
            .find(|s| s.id == id))
    }

    /// Upsert a RAG collection.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub async fn upsert_collection(&self, collection: Collection) -> RuntimeResult<Collection> {
        let owner_id = collection.owner_id;
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut registry = self.load_owner(owner_id).await?;
        match registry.collections.iter_mut().find(|c| c.id == collection.id) {
            Some(slot) => *slot = collection.clone(),
            None => registry.collections.push(collection.clone()),
        }
        self.save_owner(owner_id, &registry).await?;
        Ok(collection)
    }

    /// List an owner's collections, optionally filtered by repository.
    ///
    /// # Errors
    ///
    /// Returns an error on registry I/O failure.
    pub async fn list_collections(
        &self,
        owner_id: OwnerId,
        repository_type: Option<RepositoryType>,
    ) -> RuntimeResult<Vec<Collection>> {
        Ok(self
            .load_owner(owner_id)
            .await?
            .collections
            .into_iter()
            .filter(|c| repository_type.is_none_or(|t| c.repository_type == t))
            .collect())
    }

    /// Delete a collection.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown collection.
    pub async fn delete_collection(
        &self,
        owner_id: OwnerId,
        id: CollectionId,
    ) -> RuntimeResult<()> {
        let lock = self.lock_for(owner_id);
        let _guard = lock.lock().await;

        let mut registry = self.load_owner(owner_id).await?;
        let before = registry.collections.len();
        registry.collections.retain(|c| c.id != id);
        if registry.collections.len() == before {
            return Err(RuntimeError::NotFound {
                what: "collection",
                id: id.to_string(),
            });
        }
        self.save_owner(owner_id, &registry).await
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
