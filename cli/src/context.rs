// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context
//!
//! Builds the engine's services from a loaded configuration: stores under the
//! data directory, the provider registry and every application service.
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Composition root shared by all commands

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use sectorflow_core::application::allocation_engine::AllocationEngine;
use sectorflow_core::application::feedback_learner::FeedbackLearner;
use sectorflow_core::application::learning_service::LearningService;
use sectorflow_core::application::profile_service::ProfileService;
use sectorflow_core::application::refinement_engine::RefinementEngine;
use sectorflow_core::application::sentiment_service::SentimentService;
use sectorflow_core::application::TwoPhasePipeline;
use sectorflow_core::domain::config::EngineConfigManifest;
use sectorflow_core::domain::news::SentimentScorer;
use sectorflow_core::domain::prompt_feedback::{NoopPromptFeedback, PromptFeedback};
use sectorflow_core::domain::repository::{DecisionRepository, RecordLog, SnapshotStore};
use sectorflow_core::domain::scenario::ScenarioAllocator;
use sectorflow_core::domain::sector::SectorCatalog;
use sectorflow_core::infrastructure::catalog::{load_catalog, validate_catalog};
use sectorflow_core::infrastructure::llm::registry::ProviderRegistry;
use sectorflow_core::infrastructure::news::SnapshotRecentNews;
use sectorflow_core::infrastructure::prices::JsonPriceHistory;
use sectorflow_core::infrastructure::profiles::JsonFileProfileStore;
use sectorflow_core::infrastructure::prompt_feedback::StorePromptFeedback;
use sectorflow_core::infrastructure::repositories::{
    JsonFileDecisionRepository, JsonFileSnapshotStore, JsonlRecordLog,
};
use sectorflow_core::infrastructure::scoring::LlmSentimentScorer;

/// Load and validate the configuration, discovering it when no path is given.
pub fn load_config(config_path: Option<PathBuf>) -> Result<EngineConfigManifest> {
    let config = EngineConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// Every service a command may need, wired against file-backed stores.
pub struct EngineContext {
    pub config: EngineConfigManifest,
    pub catalog: Arc<SectorCatalog>,
    pub sentiment: SentimentService,
    pub learning: LearningService,
    pub feedback: Arc<FeedbackLearner>,
    pub pipeline: TwoPhasePipeline,
}

impl EngineContext {
    pub fn build(config: EngineConfigManifest) -> Result<Self> {
        let spec = &config.spec;
        let catalog_path = spec.data.catalog_path();
        let catalog = load_catalog(&catalog_path)?;
        validate_catalog(&catalog)?;
        let catalog = Arc::new(catalog);
        info!(path = ?catalog_path, sectors = catalog.codes().len(), "Loaded sector catalog");

        let state_dir = spec.data.state_dir();
        debug!(path = ?state_dir, "Using state directory");
        let snapshots: Arc<dyn SnapshotStore> = Arc::new(JsonFileSnapshotStore::new(state_dir.clone()));
        let records: Arc<dyn RecordLog> = Arc::new(JsonlRecordLog::new(state_dir.join("logs")));
        let decisions: Arc<dyn DecisionRepository> =
            Arc::new(JsonFileDecisionRepository::new(state_dir.join("feedback")));
        let profiles = Arc::new(JsonFileProfileStore::new(spec.data.profiles_path()));
        let prices = JsonPriceHistory::load(&spec.data.prices_path()).context("Failed to load price history")?;
        debug!(tickers = prices.tickers(), "Loaded price history");

        let registry = Arc::new(ProviderRegistry::from_config(&config).context("Failed to initialize LLM providers")?);

        let scorer: Option<Arc<dyn SentimentScorer>> = if spec.sentiment.use_model {
            Some(Arc::new(
                LlmSentimentScorer::new(registry.provider(&spec.models.scoring), spec.sentiment.timeout_secs)
                    .with_catalog_prompts(&catalog),
            ))
        } else {
            None
        };
        let sentiment = SentimentService::new(
            catalog.clone(),
            scorer,
            snapshots.clone(),
            records.clone(),
            spec.sentiment.clone(),
        );

        let prompt_feedback: Arc<dyn PromptFeedback> = if spec.learning.prompt_feedback {
            Arc::new(StorePromptFeedback::new(snapshots.clone()))
        } else {
            Arc::new(NoopPromptFeedback)
        };
        let learning = LearningService::new(
            catalog.clone(),
            snapshots.clone(),
            prompt_feedback,
            chrono::Duration::hours(spec.learning.interval_hours),
        );

        let allocation = &spec.allocation;
        let selection = Arc::new(
            AllocationEngine::new(
                catalog.clone(),
                registry.provider(&spec.models.selection),
                allocation.selection_timeout_secs,
            )
            .with_base_prompt(allocation.selection_system_prompt.clone()),
        );
        let refinement = Arc::new(RefinementEngine::new(
            catalog.clone(),
            registry.provider(&spec.models.refinement),
            profiles.clone(),
            Arc::new(SnapshotRecentNews::new(snapshots.clone())),
            allocation.news_context_limit,
            allocation.refinement_timeout_secs,
        ));
        let profile_service = Arc::new(ProfileService::new(
            catalog.clone(),
            registry.provider(&spec.models.profiling),
            profiles,
            allocation.max_profiles_per_run,
            allocation.profile_max_age_days,
            allocation.refinement_timeout_secs,
        ));
        let feedback = Arc::new(FeedbackLearner::new(
            decisions,
            snapshots.clone(),
            Arc::new(prices),
            spec.feedback.clone(),
        ));

        let pipeline = TwoPhasePipeline::new(
            ScenarioAllocator::new(catalog.codes(), spec.scenarios.clone()),
            selection,
            refinement,
            feedback.clone(),
            snapshots,
            records,
            allocation.clone(),
        )
        .with_profiles(profile_service);

        Ok(Self {
            config,
            catalog,
            sentiment,
            learning,
            feedback,
            pipeline,
        })
    }
}

/// Load the configuration and build the engine context in one step.
pub fn bootstrap(config_path: Option<PathBuf>) -> Result<EngineContext> {
    EngineContext::build(load_config(config_path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sectorflow_core::domain::config::ConfigurationError;
    use sectorflow_core::domain::sector::{RawHeadline, SectorCode};
    use sectorflow_core::infrastructure::news::StaticNewsSource;

    const CATALOG: &str = r#"
sectors:
  - code: XLK
    name: Technology
    keywords: [chip, software]
    assets:
      - { ticker: NVDA, name: NVIDIA }
  - code: XLE
    name: Energy
    keywords: [oil, crude]
    assets:
      - { ticker: XOM, name: Exxon Mobil }
"#;

    fn keyword_config(data_dir: &std::path::Path) -> EngineConfigManifest {
        let mut config = EngineConfigManifest::default();
        config.spec.data.data_dir = data_dir.to_path_buf();
        config.spec.sentiment.use_model = false;
        config
    }

    #[tokio::test]
    async fn test_context_runs_keyword_harvest_against_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sectors.yaml"), CATALOG).unwrap();

        let ctx = EngineContext::build(keyword_config(dir.path())).unwrap();
        let news = StaticNewsSource::new(vec![
            RawHeadline::new("Chip stocks surge on record demand", "wire"),
            RawHeadline::new("Oil slumps as crude inventories rise", "wire"),
        ]);
        let (snapshot, report) = ctx.sentiment.harvest(&news).await.unwrap();

        assert_eq!(report.keyword_scored, 2);
        assert!(snapshot.score_of(&SectorCode::new("XLK")) > 0.0);
        assert!(dir.path().join("state").join("sentiment").join("latest.json").exists());
        assert!(ctx.sentiment.latest().await.unwrap().is_some());
    }

    #[test]
    fn test_missing_catalog_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = match EngineContext::build(keyword_config(dir.path())) {
            Ok(_) => panic!("catalog is missing"),
            Err(e) => e,
        };
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::MissingFile { .. })
        ));
    }
}
