//! Provider construction from resolved configuration.

use crate::claude::ClaudeProvider;
use crate::credentials::ResolvedCredentials;
use crate::error::{LlmError, LlmResult};
use crate::openai_compat::OpenAiCompatProvider;
use crate::provider::{LlmProvider, ProviderConfig};

/// Build a provider for `provider_id` with resolved credentials.
///
/// Anthropic models use the native Messages API; every other supported
/// provider speaks the OpenAI-compatible dialect, with the endpoint
/// taken from the config's `base_url`, the resolved credentials, or a
/// provider default.
///
/// # Errors
///
/// Returns an error for unknown providers or an Azure config with no
/// endpoint.
pub fn build_provider(
    provider_id: &str,
    mut config: ProviderConfig,
    credentials: &ResolvedCredentials,
) -> LlmResult<Box<dyn LlmProvider>> {
    if config.api_key.is_empty() {
        config.api_key.clone_from(&credentials.api_key);
    }

    match provider_id {
        "anthropic" | "claude" => Ok(Box::new(ClaudeProvider::new(config))),
        "openai" => Ok(Box::new(OpenAiCompatProvider::new("openai", config))),
        "azure_openai" | "azure" => {
            if config.base_url.is_none() {
                let endpoint = credentials.endpoint.clone().ok_or_else(|| {
                    LlmError::ConfigError("Azure OpenAI requires an endpoint".to_string())
                })?;
                let endpoint = endpoint.trim_end_matches('/').to_string();
                // Deployment-scoped URL when the deployment is known;
                // plain chat-completions otherwise.
                let url = match std::env::var("AZURE_OPENAI_DEPLOYMENT_NAME") {
                    Ok(deployment) if !deployment.is_empty() => {
                        let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
                            .unwrap_or_else(|_| "2024-06-01".to_string());
                        format!(
                            "{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
                        )
                    },
                    _ => format!("{endpoint}/chat/completions"),
                };
                config.base_url = Some(url);
            }
            Ok(Box::new(OpenAiCompatProvider::new("azure_openai", config)))
        },
        "ollama" => {
            if config.base_url.is_none() {
                let host = credentials
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());
                config.base_url = Some(format!("{}/v1/chat/completions", host.trim_end_matches('/')));
            }
            Ok(Box::new(OpenAiCompatProvider::new("ollama", config)))
        },
        "friendli" => {
            if config.base_url.is_none() {
                let endpoint = credentials
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| "https://api.friendli.ai/serverless/v1".to_string());
                config.base_url = Some(format!("{}/chat/completions", endpoint.trim_end_matches('/')));
            }
            Ok(Box::new(OpenAiCompatProvider::new("friendli", config)))
        },
        "google" | "gemini" => {
            if config.base_url.is_none() {
                config.base_url = Some(
                    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                        .to_string(),
                );
            }
            Ok(Box::new(OpenAiCompatProvider::new("google", config)))
        },
        other => Err(LlmError::ConfigError(format!(
            "unsupported provider '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialSource;

    fn creds(key: &str, endpoint: Option<&str>) -> ResolvedCredentials {
        ResolvedCredentials {
            api_key: key.to_string(),
            endpoint: endpoint.map(String::from),
            source: CredentialSource::Explicit,
        }
    }

    #[test]
    fn test_anthropic_provider() {
        let provider = build_provider(
            "anthropic",
            ProviderConfig::new("", "claude-sonnet-4-20250514"),
            &creds("k", None),
        )
        .unwrap();
        assert_eq!(provider.provider_id(), "anthropic");
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let result = build_provider(
            "azure_openai",
            ProviderConfig::new("k", "gpt-4o"),
            &creds("k", None),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_azure_with_endpoint() {
        let provider = build_provider(
            "azure_openai",
            ProviderConfig::new("k", "gpt-4o"),
            &creds("k", Some("https://example.openai.azure.com/deployments/gpt4o")),
        )
        .unwrap();
        assert_eq!(provider.provider_id(), "azure_openai");
    }

    #[test]
    fn test_unknown_provider() {
        let result = build_provider("mystery", ProviderConfig::new("k", "m"), &creds("k", None));
        assert!(result.is_err());
    }

    #[test]
    fn test_ollama_defaults_to_localhost() {
        let provider =
            build_provider("ollama", ProviderConfig::new("", "llama3"), &creds("", None)).unwrap();
        assert_eq!(provider.provider_id(), "ollama");
    }
}
