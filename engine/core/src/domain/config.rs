// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Engine Configuration Types
//
// Defines the configuration schema for a SectorFlow engine, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Data locations (state directory, sector catalog, profiles, prices)
// - LLM provider configuration and model aliases per pipeline role
// - Sentiment, allocation, scenario and feedback tuning
// - Observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::feedback::FeedbackConfig;
use super::scenario::ScenarioParams;

pub const API_VERSION: &str = "sectorflow/v1";
pub const KIND: &str = "EngineConfig";
pub const CONFIG_PATH_ENV: &str = "SECTORFLOW_CONFIG_PATH";

/// Unrecoverable configuration problems. The CLI exits with a distinct code on these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Required {what} not found at {path:?}")]
    MissingFile { what: String, path: PathBuf },

    #[error("Failed to read configuration at {path:?}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Required data missing: {0}")]
    MissingData(String),
}

/// Top-level Kubernetes-style engine configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigManifest {
    /// API version (must be "sectorflow/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "EngineConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: EngineConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Engine configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigSpec {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    #[serde(default)]
    pub llm_selection: LLMSelection,

    /// Model alias used by each pipeline role
    #[serde(default)]
    pub models: ModelRoles,

    #[serde(default)]
    pub sentiment: SentimentSettings,

    #[serde(default)]
    pub allocation: AllocationSettings,

    #[serde(default)]
    pub scenarios: ScenarioParams,

    /// Initial feedback settings, used until a learned config is persisted
    #[serde(default)]
    pub feedback: FeedbackConfig,

    #[serde(default)]
    pub learning: LearningSettings,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding snapshots, logs and the decision log
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Sector catalog (YAML or JSON); relative paths resolve against data_dir
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,

    #[serde(default = "default_profiles")]
    pub profiles: PathBuf,

    /// Daily closes per ticker, `{ "TICKER": { "YYYY-MM-DD": close } }`
    #[serde(default = "default_prices")]
    pub prices: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog: default_catalog(),
            profiles: default_profiles(),
            prices: default_prices(),
        }
    }
}

impl DataConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.resolve(&self.catalog)
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.resolve(&self.profiles)
    }

    pub fn prices_path(&self) -> PathBuf {
        self.resolve(&self.prices)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local")
    pub name: String,

    /// Provider type: "ollama", "openai" or "openai-compatible"
    #[serde(rename = "type")]
    pub provider_type: String,

    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alias referenced from `models` (e.g., "selection")
    pub alias: String,

    /// Actual model identifier for the provider API
    pub model: String,

    /// Per-request timeout
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMSelection {
    /// Provider tried once when the primary keeps failing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    /// Attempts per request on the primary provider
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts, doubled each time
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for LLMSelection {
    fn default() -> Self {
        Self {
            fallback_provider: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoles {
    #[serde(default = "default_scoring_alias")]
    pub scoring: String,

    #[serde(default = "default_selection_alias")]
    pub selection: String,

    #[serde(default = "default_refinement_alias")]
    pub refinement: String,

    #[serde(default = "default_refinement_alias")]
    pub profiling: String,
}

impl Default for ModelRoles {
    fn default() -> Self {
        Self {
            scoring: default_scoring_alias(),
            selection: default_selection_alias(),
            refinement: default_refinement_alias(),
            profiling: default_refinement_alias(),
        }
    }
}

impl ModelRoles {
    pub fn aliases(&self) -> [(&'static str, &str); 4] {
        [
            ("scoring", self.scoring.as_str()),
            ("selection", self.selection.as_str()),
            ("refinement", self.refinement.as_str()),
            ("profiling", self.profiling.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSettings {
    /// Score headlines with the model; keyword lexicon only when false
    #[serde(default = "default_true")]
    pub use_model: bool,

    /// Concurrent scoring requests
    #[serde(default = "default_scoring_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_scoring_timeout")]
    pub timeout_secs: u64,

    /// Weight headlines by learned source reliability when aggregating
    #[serde(default)]
    pub weight_by_source: bool,
}

impl Default for SentimentSettings {
    fn default() -> Self {
        Self {
            use_model: true,
            concurrency: default_scoring_concurrency(),
            timeout_secs: default_scoring_timeout(),
            weight_by_source: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Paper capital traded by each scenario
    #[serde(default = "default_capital")]
    pub capital_per_scenario: f64,

    #[serde(default = "default_selection_timeout")]
    pub selection_timeout_secs: u64,

    #[serde(default = "default_refinement_timeout")]
    pub refinement_timeout_secs: u64,

    #[serde(default = "default_refinement_concurrency")]
    pub refinement_concurrency: usize,

    /// Company profiles generated per Phase 2 run at most
    #[serde(default = "default_max_profiles")]
    pub max_profiles_per_run: usize,

    #[serde(default = "default_profile_max_age")]
    pub profile_max_age_days: i64,

    /// Headlines passed to refinement per sector
    #[serde(default = "default_news_limit")]
    pub news_context_limit: usize,

    /// Sectors scoring inside ±this band are skipped in Phase 1
    #[serde(default = "default_neutral_skip")]
    pub neutral_skip_band: f64,

    /// Overrides the built-in selection system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_system_prompt: Option<String>,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            capital_per_scenario: default_capital(),
            selection_timeout_secs: default_selection_timeout(),
            refinement_timeout_secs: default_refinement_timeout(),
            refinement_concurrency: default_refinement_concurrency(),
            max_profiles_per_run: default_max_profiles(),
            profile_max_age_days: default_profile_max_age(),
            news_context_limit: default_news_limit(),
            neutral_skip_band: default_neutral_skip(),
            selection_system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSettings {
    /// Minimum hours between daily learning cycles
    #[serde(default = "default_learning_interval")]
    pub interval_hours: i64,

    /// Track per-sector prompt accuracy
    #[serde(default = "default_true")]
    pub prompt_feedback: bool,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            interval_hours: default_learning_interval(),
            prompt_feedback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_catalog() -> PathBuf {
    PathBuf::from("sectors.yaml")
}

fn default_profiles() -> PathBuf {
    PathBuf::from("company_profiles.json")
}

fn default_prices() -> PathBuf {
    PathBuf::from("prices.json")
}

fn default_model_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    500
}

fn default_scoring_alias() -> String {
    "scoring".to_string()
}

fn default_selection_alias() -> String {
    "selection".to_string()
}

fn default_refinement_alias() -> String {
    "refinement".to_string()
}

fn default_scoring_concurrency() -> usize {
    4
}

fn default_scoring_timeout() -> u64 {
    15
}

fn default_capital() -> f64 {
    50_000.0
}

fn default_selection_timeout() -> u64 {
    60
}

fn default_refinement_timeout() -> u64 {
    90
}

fn default_refinement_concurrency() -> usize {
    2
}

fn default_max_profiles() -> usize {
    5
}

fn default_profile_max_age() -> i64 {
    30
}

fn default_news_limit() -> usize {
    5
}

fn default_neutral_skip() -> f64 {
    0.0
}

fn default_learning_interval() -> i64 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_ollama_provider() -> LLMProviderConfig {
    let model = |alias: &str, model: &str, timeout_secs: u64| ModelConfig {
        alias: alias.to_string(),
        model: model.to_string(),
        timeout_secs,
    };
    LLMProviderConfig {
        name: "ollama-local".to_string(),
        provider_type: "ollama".to_string(),
        endpoint: "http://localhost:11434".to_string(),
        api_key: None,
        enabled: true,
        models: vec![
            model("scoring", "llama3.1:8b", default_scoring_timeout()),
            model("selection", "llama3.2:3b", default_selection_timeout()),
            model("refinement", "llama3.1:8b", default_refinement_timeout()),
        ],
    }
}

impl Default for EngineConfigSpec {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            llm_providers: vec![default_ollama_provider()],
            llm_selection: LLMSelection::default(),
            models: ModelRoles::default(),
            sentiment: SentimentSettings::default(),
            allocation: AllocationSettings::default(),
            scenarios: ScenarioParams::default(),
            feedback: FeedbackConfig::default(),
            learning: LearningSettings::default(),
            observability: None,
        }
    }
}

impl Default for EngineConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "sectorflow".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: EngineConfigSpec::default(),
        }
    }
}

impl EngineConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SECTORFLOW_CONFIG_PATH environment variable
    /// 2. ./sectorflow.yaml (working directory)
    /// 3. ~/.sectorflow/config.yaml (user home)
    /// 4. /etc/sectorflow/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./sectorflow.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sectorflow").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/sectorflow/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigurationError> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SECTORFLOW_DATA_DIR") {
            tracing::info!("Environment override: SECTORFLOW_DATA_DIR={}", dir);
            self.spec.data.data_dir = PathBuf::from(dir);
        }

        if let Ok(url) = std::env::var("SECTORFLOW_OLLAMA_URL") {
            tracing::info!("Environment override: SECTORFLOW_OLLAMA_URL={}", url);
            for provider in self
                .spec
                .llm_providers
                .iter_mut()
                .filter(|p| p.provider_type == "ollama")
            {
                provider.endpoint = url.clone();
            }
        }

        if let Ok(val) = std::env::var("SECTORFLOW_WEIGHT_BY_SOURCE") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => self.spec.sentiment.weight_by_source = true,
                "false" | "0" | "no" | "off" => self.spec.sentiment.weight_by_source = false,
                _ => {
                    tracing::warn!(
                        "Invalid value for SECTORFLOW_WEIGHT_BY_SOURCE: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |msg: String| Err(ConfigurationError::Invalid(msg));

        if self.api_version != API_VERSION {
            return invalid(format!(
                "apiVersion '{}' must be '{}'",
                self.api_version, API_VERSION
            ));
        }

        if self.kind != KIND {
            return invalid(format!("kind '{}' must be '{}'", self.kind, KIND));
        }

        if self.metadata.name.is_empty() {
            return invalid("metadata.name cannot be empty".to_string());
        }

        for provider in &self.spec.llm_providers {
            if provider.name.is_empty() {
                return invalid("LLM provider name cannot be empty".to_string());
            }
            if provider.endpoint.is_empty() {
                return invalid(format!("LLM provider endpoint cannot be empty for: {}", provider.name));
            }
            if provider.models.is_empty() {
                return invalid(format!("LLM provider must have at least one model: {}", provider.name));
            }
            for model in &provider.models {
                if model.alias.is_empty() || model.model.is_empty() {
                    return invalid(format!("Model alias and identifier are required in provider: {}", provider.name));
                }
            }
        }

        if let Some(fallback) = &self.spec.llm_selection.fallback_provider {
            if !self.spec.llm_providers.iter().any(|p| &p.name == fallback) {
                return invalid(format!("Fallback provider '{}' not found in llm_providers", fallback));
            }
        }

        let known = |alias: &str| {
            self.spec
                .llm_providers
                .iter()
                .filter(|p| p.enabled)
                .flat_map(|p| p.models.iter())
                .any(|m| m.alias == alias)
        };
        let needs_model = self.spec.sentiment.use_model;
        for (role, alias) in self.spec.models.aliases() {
            if role == "scoring" && !needs_model {
                continue;
            }
            if !known(alias) {
                return invalid(format!("Model alias '{}' for role '{}' is not provided by any enabled provider", alias, role));
            }
        }

        if self.spec.sentiment.concurrency == 0 || self.spec.allocation.refinement_concurrency == 0 {
            return invalid("Concurrency limits must be at least 1".to_string());
        }

        if self.spec.allocation.capital_per_scenario <= 0.0 {
            return invalid("capital_per_scenario must be positive".to_string());
        }

        let threshold = self.spec.feedback.min_confidence_threshold;
        if !(super::feedback::THRESHOLD_FLOOR..=super::feedback::THRESHOLD_CEILING).contains(&threshold) {
            return invalid(format!("feedback.min_confidence_threshold {} is outside [0.4, 0.9]", threshold));
        }

        Ok(())
    }

    /// Logging level and format, falling back to defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_else(|| LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            })
    }
}
