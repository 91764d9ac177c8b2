// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the two-phase allocation pipeline
//!
//! Drives harvest, Phase 1, profile generation, Phase 2 and the confidence
//! gate end to end against a scripted generation backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use sectorflow_core::application::allocation_engine::AllocationEngine;
use sectorflow_core::application::feedback_learner::FeedbackLearner;
use sectorflow_core::application::profile_service::ProfileService;
use sectorflow_core::application::refinement_engine::RefinementEngine;
use sectorflow_core::application::sentiment_service::SentimentService;
use sectorflow_core::application::TwoPhasePipeline;
use sectorflow_core::domain::allocation::SelectionSource;
use sectorflow_core::domain::config::{AllocationSettings, ConfigurationError, SentimentSettings};
use sectorflow_core::domain::feedback::FeedbackConfig;
use sectorflow_core::domain::llm::{
    FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage,
};
use sectorflow_core::domain::refinement::{AppliedAction, RefinementProvenance};
use sectorflow_core::domain::repository::{streams, DecisionRepository, RecordLog};
use sectorflow_core::domain::scenario::{Scenario, ScenarioAllocator, ScenarioParams};
use sectorflow_core::domain::sector::{Asset, RawHeadline, SectorCatalog, SectorCode, SectorDefinition};
use sectorflow_core::infrastructure::news::{SnapshotRecentNews, StaticNewsSource};
use sectorflow_core::infrastructure::prices::JsonPriceHistory;
use sectorflow_core::infrastructure::profiles::InMemoryProfileStore;
use sectorflow_core::infrastructure::repositories::{
    InMemoryDecisionRepository, InMemoryRecordLog, InMemorySnapshotStore,
};

/// Answers by recognizing which stage sent the prompt.
struct StageScripted {
    prompts: Mutex<Vec<String>>,
}

impl StageScripted {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn count(&self, needle: &str) -> usize {
        self.prompts.lock().iter().filter(|p| p.contains(needle)).count()
    }

    fn reply(prompt: &str) -> String {
        if prompt.contains("Generate a company profile") {
            return r#"{"summary": "Large cap leader", "market_position": "Top 3", "volatility": "medium", "risks": ["regulation"], "catalysts": ["buybacks"]}"#.to_string();
        }
        if prompt.contains("portfolio strategist") {
            if prompt.contains("**Sector:** XLK") {
                return r#"{"action": "adjust", "reasoning": "Rotate toward software", "new_allocation": {"NVDA": 30, "MSFT": 70}, "confidence": 0.75}"#.to_string();
            }
            return r#"{"action": "adjust", "reasoning": "Tilt to integrated majors", "new_allocation": {"XOM": 80, "CVX": 20}, "confidence": 0.55}"#.to_string();
        }
        if prompt.contains("Sector: XLK") {
            return r#"{"selected_assets": [{"ticker": "NVDA", "weight": 0.6}, {"ticker": "MSFT", "weight": 0.4}], "rationale": "AI demand", "risk_level": "high"}"#.to_string();
        }
        r#"{"selected_assets": [{"ticker": "XOM", "weight": 0.5}, {"ticker": "CVX", "weight": 0.5}], "rationale": "Balanced", "risk_level": "medium"}"#.to_string()
    }
}

#[async_trait]
impl LLMProvider for StageScripted {
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(GenerationResponse {
            text: Self::reply(prompt),
            usage: TokenUsage::default(),
            provider: "scripted".to_string(),
            model: "scripted".to_string(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

fn catalog() -> Arc<SectorCatalog> {
    let sector = |code: &str, keywords: &[&str], tickers: &[&str]| SectorDefinition {
        code: SectorCode::from(code),
        name: code.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        benchmark: None,
        assets: tickers
            .iter()
            .map(|t| Asset {
                ticker: t.to_string(),
                name: t.to_string(),
                focus: String::new(),
            })
            .collect(),
        selection_prompt: None,
        scoring_prompt: None,
    };
    Arc::new(SectorCatalog::new(vec![
        sector("XLK", &["chip", "software"], &["NVDA", "MSFT"]),
        sector("XLE", &["oil", "crude"], &["XOM", "CVX"]),
    ]))
}

struct Harness {
    provider: Arc<StageScripted>,
    snapshots: Arc<InMemorySnapshotStore>,
    records: Arc<InMemoryRecordLog>,
    decisions: Arc<InMemoryDecisionRepository>,
    pipeline: TwoPhasePipeline,
}

fn harness(with_profiles: bool) -> Harness {
    let catalog = catalog();
    let provider = StageScripted::new();
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let records = Arc::new(InMemoryRecordLog::new());
    let decisions = Arc::new(InMemoryDecisionRepository::new());
    let profiles = Arc::new(InMemoryProfileStore::new());

    let selection = Arc::new(AllocationEngine::new(catalog.clone(), provider.clone(), 5));
    let refinement = Arc::new(RefinementEngine::new(
        catalog.clone(),
        provider.clone(),
        profiles.clone(),
        Arc::new(SnapshotRecentNews::new(snapshots.clone())),
        5,
        5,
    ));
    let feedback = Arc::new(FeedbackLearner::new(
        decisions.clone(),
        snapshots.clone(),
        Arc::new(JsonPriceHistory::new(BTreeMap::new())),
        FeedbackConfig::default(),
    ));

    let mut pipeline = TwoPhasePipeline::new(
        ScenarioAllocator::new(catalog.codes(), ScenarioParams::default()),
        selection,
        refinement,
        feedback,
        snapshots.clone(),
        records.clone(),
        AllocationSettings::default(),
    );
    if with_profiles {
        pipeline = pipeline.with_profiles(Arc::new(ProfileService::new(
            catalog,
            provider.clone(),
            profiles,
            5,
            30,
            5,
        )));
    }

    Harness {
        provider,
        snapshots,
        records,
        decisions,
        pipeline,
    }
}

async fn seed_sentiment(h: &Harness) {
    let service = SentimentService::new(
        catalog(),
        None,
        h.snapshots.clone(),
        h.records.clone(),
        SentimentSettings {
            use_model: false,
            ..SentimentSettings::default()
        },
    );
    let news = StaticNewsSource::new(vec![
        RawHeadline::new("Chip makers rally on strong demand", "wire"),
        RawHeadline::new("Oil prices drop as crude stockpiles rise", "wire"),
    ]);
    service.harvest(&news).await.unwrap();
}

#[tokio::test]
async fn test_two_phase_run_gates_adjustments() {
    let h = harness(true);
    seed_sentiment(&h).await;

    let (phase1, result, phase2) = h.pipeline.run(Scenario::Benchmark).await.unwrap();

    assert_eq!(phase1.sectors, 2);
    assert_eq!(phase1.structured, 2);
    assert_eq!(phase2.profiles.fetched.len(), 4);
    assert_eq!(phase2.adjusted, 1);
    assert_eq!(phase2.kept_low_conf, 1);
    assert_eq!(phase2.threshold, 0.6);

    let xlk = result
        .decisions
        .iter()
        .find(|d| d.sector == SectorCode::from("XLK"))
        .unwrap();
    assert_eq!(xlk.allocation().get("MSFT"), Some(70.0));
    assert!(xlk.rationale.starts_with("[Refined]"));
    assert!((xlk.budget - 25_000.0).abs() < 0.01);
    assert!(xlk.is_normalized());

    let xle = result
        .decisions
        .iter()
        .find(|d| d.sector == SectorCode::from("XLE"))
        .unwrap();
    assert_eq!(xle.allocation().get("XOM"), Some(50.0));

    let logged = h.decisions.find_all().await.unwrap();
    assert_eq!(logged.len(), 2);
    assert!(logged.iter().all(|d| !d.evaluated));
    assert!(logged.iter().any(|d| d.action == AppliedAction::KeepLowConf));

    // Refinement saw the harvested headlines as sector news
    let prompts = h.provider.prompts.lock().clone();
    assert!(prompts
        .iter()
        .any(|p| p.contains("**Sector:** XLK") && p.contains("- Chip makers rally on strong demand")));

    let runs = h.records.read_all(streams::RUN_LOG).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1]["phase"], "phase2");
    assert_eq!(runs[1]["adjustments"], 1);

    let stored = h.pipeline.final_allocation(Scenario::Benchmark).await.unwrap().unwrap();
    assert_eq!(stored.generated_at, result.generated_at);
    assert_eq!(stored.refinements.len(), 2);
}

#[tokio::test]
async fn test_phase2_without_profiles_keeps_phase1() {
    let h = harness(false);
    seed_sentiment(&h).await;

    h.pipeline.run_phase1(Scenario::Momentum).await.unwrap();
    let (result, report) = h.pipeline.run_phase2(Scenario::Momentum).await.unwrap();

    assert_eq!(report.kept, 2);
    assert_eq!(report.adjusted, 0);
    assert!(result
        .refinements
        .iter()
        .all(|r| r.refinement.provenance == RefinementProvenance::MissingContext));
    assert_eq!(h.provider.count("portfolio strategist"), 0);
}

#[tokio::test]
async fn test_index_only_scenario_skips_selection() {
    let h = harness(false);
    seed_sentiment(&h).await;

    let (run, report) = h.pipeline.run_phase1(Scenario::SpyOnly).await.unwrap();
    assert_eq!(report.fallbacks, 1);
    assert_eq!(run.decisions.len(), 1);
    assert_eq!(run.decisions[0].source, SelectionSource::EtfFallback);
    assert_eq!(run.decisions[0].allocation().get("SPY"), Some(100.0));
    assert_eq!(h.provider.count("Select best assets"), 0);
}

#[tokio::test]
async fn test_missing_inputs_are_configuration_errors() {
    let h = harness(true);

    let err = h.pipeline.run_phase1(Scenario::Benchmark).await.unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());

    let err = h.pipeline.run_phase2(Scenario::Benchmark).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::MissingData(_))
    ));
}
