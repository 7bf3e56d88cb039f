//! Credential resolution for LLM providers.
//!
//! Precedence: explicit config → stored encrypted credentials →
//! environment variables. Resolved values are never logged; the source
//! is recorded so activation errors can say where a key came from
//! without echoing it.

use std::env;

/// Where the resolved credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Supplied inline in the activation request or LLM config.
    Explicit,
    /// Decrypted from the per-owner credential store.
    Stored,
    /// Read from a process environment variable.
    Environment,
}

/// Resolved credentials for one provider.
#[derive(Clone)]
pub struct ResolvedCredentials {
    /// API key or token.
    pub api_key: String,
    /// Optional endpoint override (Azure endpoint, Ollama host, ...).
    pub endpoint: Option<String>,
    /// Where the key came from.
    pub source: CredentialSource,
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("has_api_key", &!self.api_key.is_empty())
            .field("has_endpoint", &self.endpoint.is_some())
            .field("source", &self.source)
            .finish()
    }
}

/// Environment variables tried for each provider, in order.
fn env_keys_for(provider: &str) -> &'static [&'static str] {
    match provider {
        "google" | "gemini" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "anthropic" | "claude" => &["ANTHROPIC_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "azure_openai" | "azure" => &["AZURE_OPENAI_API_KEY"],
        "friendli" => &["FRIENDLI_TOKEN"],
        "bedrock" | "aws" => &["AWS_ACCESS_KEY_ID"],
        _ => &[],
    }
}

/// Endpoint environment variable for providers that need one.
fn env_endpoint_for(provider: &str) -> Option<&'static str> {
    match provider {
        "azure_openai" | "azure" => Some("AZURE_OPENAI_ENDPOINT"),
        "friendli" => Some("FRIENDLI_ENDPOINT_URL"),
        "ollama" => Some("OLLAMA_HOST"),
        _ => None,
    }
}

/// Resolve credentials for a provider.
///
/// `explicit` comes from the activation request or the LLM config
/// itself; `stored` is the decrypted value from the owner's credential
/// store. Either may be absent, in which case the environment is
/// consulted. Ollama needs no key, so an empty key with a resolved
/// host still succeeds for it.
#[must_use]
pub fn resolve_credentials(
    provider: &str,
    explicit: Option<&str>,
    stored: Option<&str>,
) -> Option<ResolvedCredentials> {
    let endpoint = env_endpoint_for(provider).and_then(|var| env::var(var).ok());

    if let Some(key) = explicit.filter(|k| !k.is_empty()) {
        return Some(ResolvedCredentials {
            api_key: key.to_string(),
            endpoint,
            source: CredentialSource::Explicit,
        });
    }

    if let Some(key) = stored.filter(|k| !k.is_empty()) {
        return Some(ResolvedCredentials {
            api_key: key.to_string(),
            endpoint,
            source: CredentialSource::Stored,
        });
    }

    for var in env_keys_for(provider) {
        if let Ok(key) = env::var(var)
            && !key.is_empty()
        {
            return Some(ResolvedCredentials {
                api_key: key,
                endpoint,
                source: CredentialSource::Environment,
            });
        }
    }

    // Ollama is keyless; a host (explicit or env) is all it needs.
    if provider == "ollama" {
        return Some(ResolvedCredentials {
            api_key: String::new(),
            endpoint,
            source: CredentialSource::Environment,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins() {
        let creds = resolve_credentials("anthropic", Some("explicit-key"), Some("stored-key"))
            .expect("explicit key resolves");
        assert_eq!(creds.api_key, "explicit-key");
        assert_eq!(creds.source, CredentialSource::Explicit);
    }

    #[test]
    fn test_stored_beats_environment() {
        let creds =
            resolve_credentials("anthropic", None, Some("stored-key")).expect("stored resolves");
        assert_eq!(creds.api_key, "stored-key");
        assert_eq!(creds.source, CredentialSource::Stored);
    }

    #[test]
    fn test_empty_explicit_is_skipped() {
        let creds =
            resolve_credentials("anthropic", Some(""), Some("stored-key")).expect("falls through");
        assert_eq!(creds.source, CredentialSource::Stored);
    }

    #[test]
    fn test_ollama_is_keyless() {
        let creds = resolve_credentials("ollama", None, None).expect("ollama needs no key");
        assert!(creds.api_key.is_empty());
    }

    #[test]
    fn test_unknown_provider_without_keys() {
        assert!(resolve_credentials("mystery", None, None).is_none());
    }

    #[test]
    fn test_debug_redacts() {
        let creds = resolve_credentials("anthropic", Some("sk-secret"), None).unwrap();
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("sk-secret"));
    }
}
