//! LLM provider trait.
//!
//! Defines the interface that all LLM providers must implement.

use async_trait::async_trait;

use crate::error::{LlmError, LlmResult};
use crate::types::{LlmResponse, LlmToolDefinition, Message};

/// LLM provider trait.
///
/// Implementors provide tool-calling completion against one model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider identifier (e.g. `"anthropic"`).
    fn provider_id(&self) -> &str;

    /// Get the model being used.
    fn model(&self) -> &str;

    /// Run one completion with the bound tools.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<LlmResponse>;

    /// Simple text completion (no tools).
    async fn complete_simple(&self, prompt: &str) -> LlmResult<String> {
        let messages = vec![Message::user(prompt)];
        let response = self.complete(&messages, &[], "").await?;
        Ok(response.answer_text().to_string())
    }

    /// Minimal health call used during profile activation.
    async fn health_check(&self) -> LlmResult<()> {
        self.complete_simple("ping").await.map(|_| ())
    }

    /// Get maximum context length in tokens.
    fn max_context_length(&self) -> usize;
}

/// Blanket implementation allowing `Box<dyn LlmProvider>` to be used as
/// a type parameter wherever `P: LlmProvider` is required.
#[async_trait]
impl LlmProvider for Box<dyn LlmProvider> {
    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<LlmResponse> {
        (**self).complete(messages, tools, system).await
    }

    fn max_context_length(&self) -> usize {
        (**self).max_context_length()
    }
}

/// Configuration for LLM providers.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Temperature (0.0 - 1.0).
    pub temperature: f64,
    /// API base URL (for custom endpoints).
    pub base_url: Option<String>,
    /// Context window size override. When set, the provider uses this
    /// instead of its built-in default for the model.
    pub context_window: Option<usize>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("has_api_key", &!self.api_key.is_empty())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("has_base_url", &self.base_url.is_some())
            .field("context_window", &self.context_window)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a new config with API key and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.7,
            base_url: None,
            context_window: None,
        }
    }

    /// Set max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set temperature.
    #[must_use]
    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = temp.clamp(0.0, 1.0);
        self
    }

    /// Set base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set context window size override.
    #[must_use]
    pub fn context_window(mut self, size: usize) -> Self {
        self.context_window = Some(size);
        self
    }

    /// Reject configs without an API key.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ApiKeyNotConfigured`] when the key is empty.
    pub fn require_api_key(&self, provider: &str) -> LlmResult<()> {
        if self.api_key.is_empty() {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: provider.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig::new("sk-secret", "claude-sonnet-4-20250514");
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("has_api_key: true"));
    }

    #[test]
    fn test_temperature_clamped() {
        let config = ProviderConfig::new("k", "m").temperature(3.0);
        assert!((config.temperature - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_require_api_key() {
        let config = ProviderConfig::new("", "m");
        assert!(config.require_api_key("claude").is_err());
    }
}
