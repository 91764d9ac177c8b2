// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Model Alias Resolution and Provider Management
//
// Builds one adapter per configured model alias and hands out providers
// that retry with exponential backoff and fall back to a secondary provider.

use crate::domain::config::{EngineConfigManifest, LLMProviderConfig, ModelConfig};
use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

struct AliasEntry {
    provider_name: String,
    adapter: Arc<dyn LLMProvider>,
}

/// Registry for managing LLM providers and resolving model aliases
pub struct ProviderRegistry {
    aliases: HashMap<String, AliasEntry>,
    /// First model of each provider, used when falling back
    defaults: HashMap<String, Arc<dyn LLMProvider>>,
    fallback_provider: Option<String>,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl ProviderRegistry {
    /// Create provider registry from the engine configuration
    pub fn from_config(config: &EngineConfigManifest) -> anyhow::Result<Self> {
        let mut aliases = HashMap::new();
        let mut defaults = HashMap::new();

        info!("Initializing LLM provider registry");

        for provider_config in &config.spec.llm_providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }

            let api_key = match Self::resolve_api_key(&provider_config.api_key) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
                    continue;
                }
            };

            for model_config in &provider_config.models {
                let adapter = match Self::create_adapter(provider_config, model_config, &api_key) {
                    Ok(adapter) => adapter,
                    Err(e) => {
                        warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
                        break;
                    }
                };
                info!(
                    "Mapping alias '{}' -> {} ({})",
                    model_config.alias, model_config.model, provider_config.name
                );
                defaults
                    .entry(provider_config.name.clone())
                    .or_insert_with(|| adapter.clone());
                // First provider to claim an alias keeps it
                aliases.entry(model_config.alias.clone()).or_insert(AliasEntry {
                    provider_name: provider_config.name.clone(),
                    adapter,
                });
            }
        }

        let registry = Self {
            aliases,
            defaults,
            fallback_provider: config.spec.llm_selection.fallback_provider.clone(),
            max_retries: config.spec.llm_selection.max_retries.max(1),
            retry_delay_ms: config.spec.llm_selection.retry_delay_ms,
        };
        if registry.aliases.is_empty() {
            warn!("No LLM providers configured - scoring falls back to keywords and selection to ETFs");
        } else {
            info!(aliases = ?registry.available_aliases(), "LLM provider registry ready");
        }
        Ok(registry)
    }

    fn create_adapter(
        provider: &LLMProviderConfig,
        model: &ModelConfig,
        api_key: &str,
    ) -> anyhow::Result<Arc<dyn LLMProvider>> {
        let adapter: Arc<dyn LLMProvider> = match provider.provider_type.as_str() {
            "ollama" => Arc::new(OllamaAdapter::new(
                provider.endpoint.clone(),
                model.model.clone(),
                model.timeout_secs,
            )),
            // OpenAI-compatible APIs (LM Studio, vLLM, etc.)
            "openai" | "openai-compatible" => Arc::new(OpenAIAdapter::new(
                provider.endpoint.clone(),
                api_key.to_string(),
                model.model.clone(),
                model.timeout_secs,
            )),
            other => anyhow::bail!("Unsupported provider type: {}", other),
        };
        Ok(adapter)
    }

    /// Resolve API key from config (supports "env:VAR_NAME" syntax)
    fn resolve_api_key(key: &Option<String>) -> anyhow::Result<String> {
        match key {
            Some(k) => match k.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name)
                    .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
                None => Ok(k.clone()),
            },
            // Local providers run without auth
            None => Ok(String::new()),
        }
    }

    /// Provider bound to `alias`, with the registry's retry and fallback policy.
    pub fn provider(self: &Arc<Self>, alias: &str) -> Arc<dyn LLMProvider> {
        Arc::new(AliasedProvider {
            registry: self.clone(),
            alias: alias.to_string(),
        })
    }

    /// Generate text using a model alias
    /// Includes retry logic and fallback to secondary provider
    pub async fn generate(
        &self,
        alias: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let entry = self
            .aliases
            .get(alias)
            .ok_or_else(|| LLMError::ModelNotFound(format!("Model alias '{}' not found", alias)))?;

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match entry.adapter.generate(prompt, options).await {
                Ok(response) => {
                    debug!(alias, attempt = attempt + 1, "Generation succeeded");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        alias,
                        "Generation failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    let transient = e.is_transient();
                    last_error = Some(e);
                    if !transient || attempt + 1 == self.max_retries {
                        break;
                    }

                    // Exponential backoff
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        self.retry_delay_ms * 2_u64.pow(attempt),
                    ))
                    .await;
                }
            }
        }

        if let Some(fallback) = self.fallback_for(&entry.provider_name) {
            info!(alias, "Trying fallback provider");
            return fallback.generate(prompt, options).await;
        }

        Err(last_error.unwrap_or_else(|| LLMError::Provider("Unknown error".into())))
    }

    fn fallback_for(&self, primary: &str) -> Option<&Arc<dyn LLMProvider>> {
        let name = self.fallback_provider.as_deref()?;
        if name == primary {
            return None;
        }
        self.defaults.get(name)
    }

    /// Health of the adapter behind each alias. Unknown aliases report `ModelNotFound`.
    pub async fn health_check_aliases(&self, aliases: &[&str]) -> BTreeMap<String, Result<(), LLMError>> {
        let mut results = BTreeMap::new();
        for alias in aliases {
            if results.contains_key(*alias) {
                continue;
            }
            let result = match self.aliases.get(*alias) {
                Some(entry) => {
                    info!("Health checking alias '{}' on provider '{}'", alias, entry.provider_name);
                    entry.adapter.health_check().await
                }
                None => Err(LLMError::ModelNotFound(alias.to_string())),
            };
            results.insert(alias.to_string(), result);
        }
        results
    }

    /// Get list of available model aliases
    pub fn available_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.aliases.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Check if a model alias exists
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }
}

/// A model alias resolved through the registry.
struct AliasedProvider {
    registry: Arc<ProviderRegistry>,
    alias: String,
}

#[async_trait]
impl LLMProvider for AliasedProvider {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        self.registry.generate(&self.alias, prompt, options).await
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        match self.registry.aliases.get(&self.alias) {
            Some(entry) => entry.adapter.health_check().await,
            None => Err(LLMError::ModelNotFound(self.alias.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::LLMSelection;

    fn provider(name: &str, endpoint: String, aliases: &[&str]) -> LLMProviderConfig {
        LLMProviderConfig {
            name: name.to_string(),
            provider_type: "ollama".to_string(),
            endpoint,
            api_key: None,
            enabled: true,
            models: aliases
                .iter()
                .map(|alias| ModelConfig {
                    alias: alias.to_string(),
                    model: format!("{}-model", alias),
                    timeout_secs: 5,
                })
                .collect(),
        }
    }

    #[test]
    fn test_registry_creation() {
        let mut config = EngineConfigManifest::default();
        config.spec.llm_providers = vec![provider(
            "local",
            "http://localhost:11434".to_string(),
            &["scoring", "selection"],
        )];

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.has_alias("scoring"));
        assert!(!registry.has_alias("refinement"));
        assert_eq!(registry.available_aliases(), vec!["scoring", "selection"]);
    }

    #[tokio::test]
    async fn test_health_check_by_alias() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"scoring-model"}]}"#)
            .create_async()
            .await;

        let mut config = EngineConfigManifest::default();
        config.spec.llm_providers = vec![provider("local", server.url(), &["scoring", "selection"])];
        let registry = ProviderRegistry::from_config(&config).unwrap();

        let results = registry
            .health_check_aliases(&["scoring", "selection", "scoring", "profiling"])
            .await;
        assert_eq!(results.len(), 3);
        assert!(results["scoring"].is_ok());
        assert!(matches!(results["selection"], Err(LLMError::ModelNotFound(_))));
        assert!(matches!(results["profiling"], Err(LLMError::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_alias() {
        let registry = Arc::new(ProviderRegistry::from_config(&EngineConfigManifest::default()).unwrap());
        let err = registry
            .provider("nope")
            .generate("hi", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_falls_back_after_retries() {
        let mut primary = mockito::Server::new_async().await;
        let failing = primary
            .mock("POST", "/api/generate")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let mut secondary = mockito::Server::new_async().await;
        secondary
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response":"0.4","done":true}"#)
            .create_async()
            .await;

        let mut config = EngineConfigManifest::default();
        config.spec.llm_providers = vec![
            provider("primary", primary.url(), &["scoring"]),
            provider("backup", secondary.url(), &["backup-scoring"]),
        ];
        config.spec.llm_selection = LLMSelection {
            fallback_provider: Some("backup".to_string()),
            max_retries: 2,
            retry_delay_ms: 1,
        };

        let registry = Arc::new(ProviderRegistry::from_config(&config).unwrap());
        let response = registry
            .provider("scoring")
            .generate("score this", &GenerationOptions::default())
            .await
            .unwrap();

        failing.assert_async().await;
        assert_eq!(response.text, "0.4");
    }
}
