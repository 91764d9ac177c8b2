// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the daily learning cycle on file-backed snapshots
//!
//! Harvested sentiment is judged against realized sector moves; the learned
//! multipliers then feed scenario weighting.

use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

use sectorflow_core::application::learning_service::{LearningOutcome, LearningService};
use sectorflow_core::application::sentiment_service::SentimentService;
use sectorflow_core::domain::config::SentimentSettings;
use sectorflow_core::domain::learning::{MULTIPLIER_MAX, MULTIPLIER_MIN};
use sectorflow_core::domain::prompt_feedback::{PromptFeedback, UNDERPERFORMING_MIN_PREDICTIONS};
use sectorflow_core::domain::scenario::{Scenario, ScenarioAllocator, ScenarioParams};
use sectorflow_core::domain::sector::{RawHeadline, SectorCatalog, SectorCode, SectorDefinition};
use sectorflow_core::infrastructure::news::StaticNewsSource;
use sectorflow_core::infrastructure::prompt_feedback::StorePromptFeedback;
use sectorflow_core::infrastructure::repositories::{JsonFileSnapshotStore, JsonlRecordLog};

fn catalog() -> Arc<SectorCatalog> {
    let sector = |code: &str, keywords: &[&str]| SectorDefinition {
        code: SectorCode::from(code),
        name: code.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        benchmark: None,
        assets: vec![],
        selection_prompt: None,
        scoring_prompt: None,
    };
    Arc::new(SectorCatalog::new(vec![
        sector("XLK", &["chip"]),
        sector("XLE", &["oil"]),
        sector("XLU", &["utility"]),
    ]))
}

struct Fixture {
    _dir: TempDir,
    learning: LearningService,
    feedback: Arc<StorePromptFeedback>,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let snapshots = Arc::new(JsonFileSnapshotStore::new(dir.path().join("state")));
    let records = Arc::new(JsonlRecordLog::new(dir.path().join("logs")));

    let sentiment = SentimentService::new(
        catalog(),
        None,
        snapshots.clone(),
        records,
        SentimentSettings {
            use_model: false,
            ..SentimentSettings::default()
        },
    );
    // XLK +0.3 (rally, strong), XLE 0.0 (drop, rise)
    let news = StaticNewsSource::new(vec![
        RawHeadline::new("Chip makers rally on strong demand", "wire"),
        RawHeadline::new("Oil prices drop as stockpiles rise", "desk"),
    ]);
    sentiment.harvest(&news).await.unwrap();

    let feedback = Arc::new(StorePromptFeedback::new(snapshots.clone()));
    let learning = LearningService::new(catalog(), snapshots, feedback.clone(), Duration::hours(24));
    Fixture {
        _dir: dir,
        learning,
        feedback,
    }
}

fn outcomes() -> BTreeMap<SectorCode, f64> {
    BTreeMap::from([(SectorCode::from("XLK"), 2.0), (SectorCode::from("XLE"), -3.0)])
}

#[tokio::test]
async fn test_daily_cycle_adjusts_multipliers_once_per_interval() {
    let f = fixture().await;
    let now = Utc::now();

    let LearningOutcome::Learned(event) = f.learning.daily_learn(&outcomes(), now, false).await.unwrap() else {
        panic!("first cycle should run");
    };
    assert_eq!(event.total, 2);
    assert_eq!(event.correct, 1);

    let model = f.learning.model().await.unwrap();
    assert!((model.multiplier(&SectorCode::from("XLK")) - 1.02).abs() < 1e-9);
    assert!((model.multiplier(&SectorCode::from("XLE")) - 0.98).abs() < 1e-9);
    assert_eq!(model.multiplier(&SectorCode::from("XLU")), 1.0);

    let again = f
        .learning
        .daily_learn(&outcomes(), now + Duration::hours(3), false)
        .await
        .unwrap();
    assert!(matches!(again, LearningOutcome::NotDue { .. }));

    let forced = f
        .learning
        .daily_learn(&outcomes(), now + Duration::hours(3), true)
        .await
        .unwrap();
    assert!(matches!(forced, LearningOutcome::Learned(_)));
}

#[tokio::test]
async fn test_repeated_cycles_respect_bounds_and_flag_prompts() {
    let f = fixture().await;
    let start = Utc::now();
    for day in 0..60 {
        f.learning
            .daily_learn(&outcomes(), start + Duration::days(day), false)
            .await
            .unwrap();
    }

    let model = f.learning.model().await.unwrap();
    for sector in ["XLK", "XLE"] {
        let m = model.multiplier(&SectorCode::from(sector));
        assert!((MULTIPLIER_MIN..=MULTIPLIER_MAX).contains(&m), "{} multiplier {}", sector, m);
    }
    assert!(model.multiplier(&SectorCode::from("XLK")) > 1.5);

    // XLE has been wrong every day
    let flagged = f
        .feedback
        .underperforming(50.0, UNDERPERFORMING_MIN_PREDICTIONS)
        .await
        .unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].0, SectorCode::from("XLE"));
    assert!(model
        .history
        .back()
        .unwrap()
        .prompts_flagged
        .contains(&SectorCode::from("XLE")));

    // Learned multipliers feed scenario weighting without breaking its invariants
    let allocator = ScenarioAllocator::new(catalog().codes(), ScenarioParams::default());
    let scores = BTreeMap::from([(SectorCode::from("XLK"), 0.8), (SectorCode::from("XLE"), -0.6)]);
    for scenario in Scenario::ALL {
        let weights = allocator.weights_with_model(scenario, &scores, &model);
        let total: f64 = weights.values().sum();
        assert!((total - 100.0).abs() < 0.01, "{} sums to {}", scenario, total);
        assert!(weights.values().all(|w| *w >= 0.0));
    }
}
