// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the decision feedback loop on file-backed stores
//!
//! Decisions are logged, evaluated once their maturation window has passed,
//! and drive the confidence threshold, all through the JSON-file adapters.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

use sectorflow_core::application::feedback_learner::{EvaluationOutcome, FeedbackLearner};
use sectorflow_core::domain::allocation::{Allocation, DecisionId};
use sectorflow_core::domain::feedback::{FeedbackConfig, ThresholdChange, THRESHOLD_CEILING};
use sectorflow_core::domain::refinement::{
    apply_gate, AppliedAction, RefinementAction, RefinementDecision, RefinementSubject,
};
use sectorflow_core::domain::repository::DecisionRepository;
use sectorflow_core::domain::scenario::Scenario;
use sectorflow_core::domain::sector::SectorCode;
use sectorflow_core::infrastructure::prices::JsonPriceHistory;
use sectorflow_core::infrastructure::repositories::{JsonFileDecisionRepository, JsonFileSnapshotStore};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn logged_at() -> DateTime<Utc> {
    day(2).and_hms_opt(20, 30, 0).unwrap().and_utc()
}

/// XLE loses 4%, XOM gains 1%, CVX loses 6% over the window.
fn prices() -> Arc<JsonPriceHistory> {
    let closes = |start: f64, end: f64| BTreeMap::from([(day(2), start), (day(4), (start + end) / 2.0), (day(5), end)]);
    Arc::new(JsonPriceHistory::new(BTreeMap::from([
        ("XLE".to_string(), closes(100.0, 96.0)),
        ("XOM".to_string(), closes(100.0, 101.0)),
        ("CVX".to_string(), closes(50.0, 47.0)),
    ])))
}

/// An adjustment from the sector ETF into CVX, which underperforms.
fn losing_adjustment(confidence: f64) -> RefinementDecision {
    RefinementDecision::proposed(
        RefinementSubject {
            allocation_id: DecisionId::new(),
            sector: SectorCode::from("XLE"),
            scenario: Scenario::Contrarian,
            sentiment: -0.35,
            original_allocation: Allocation::whole("XOM"),
        },
        RefinementAction::Adjust,
        confidence,
        Allocation::whole("CVX"),
        "Rotate into CVX",
    )
}

fn file_learner(dir: &TempDir) -> (FeedbackLearner, Arc<JsonFileDecisionRepository>) {
    let decisions = Arc::new(JsonFileDecisionRepository::new(dir.path().join("feedback")));
    let learner = FeedbackLearner::new(
        decisions.clone(),
        Arc::new(JsonFileSnapshotStore::new(dir.path().join("state"))),
        prices(),
        FeedbackConfig::default(),
    );
    (learner, decisions)
}

#[tokio::test]
async fn test_losing_adjustments_raise_threshold() {
    let dir = TempDir::new().unwrap();
    let (learner, _) = file_learner(&dir);

    for confidence in [0.65, 0.7, 0.8, 0.9, 0.95] {
        let decision = losing_adjustment(confidence);
        let gate = apply_gate(&decision, 0.6);
        assert_eq!(gate.action, AppliedAction::Adjust);
        learner.log_decision(&decision, &gate, logged_at()).await.unwrap();
    }

    let now = logged_at() + Duration::days(4);
    let summary = learner.run_evaluations(now).await.unwrap();
    assert_eq!(summary.evaluated, 5);
    assert_eq!(summary.errors, 0);

    let stats = learner.performance_stats().await.unwrap();
    let adjust = stats.action(AppliedAction::Adjust);
    assert_eq!(adjust.count, 5);
    assert_eq!(adjust.outperformed, 0);
    // XOM +1%, CVX -6%
    assert!((adjust.mean_delta() + 7.0).abs() < 1e-9);

    let change = learner.learn_from_evaluations(now).await.unwrap();
    assert!(matches!(change, ThresholdChange::Raised { .. }));
    assert!((learner.threshold().await.unwrap() - 0.65).abs() < 1e-9);

    // The learned threshold survives a fresh learner on the same directory
    let (reopened, _) = file_learner(&dir);
    assert!((reopened.threshold().await.unwrap() - 0.65).abs() < 1e-9);
}

#[tokio::test]
async fn test_evaluation_happens_once_across_learners() {
    let dir = TempDir::new().unwrap();
    let (first, decisions) = file_learner(&dir);
    let decision = losing_adjustment(0.8);
    let record = first
        .log_decision(&decision, &apply_gate(&decision, 0.6), logged_at())
        .await
        .unwrap();

    let now = logged_at() + Duration::days(4);
    let (second, _) = file_learner(&dir);
    let outcomes = [
        first.evaluate_decision(&record, now).await.unwrap(),
        second.evaluate_decision(&record, now).await.unwrap(),
    ];
    let evaluated = outcomes
        .iter()
        .filter(|o| matches!(o, EvaluationOutcome::Evaluated(_)))
        .count();
    assert_eq!(evaluated, 1);
    assert_eq!(decisions.evaluations().await.unwrap().len(), 1);
    assert!(decisions.find_all().await.unwrap()[0].evaluated);
}

#[tokio::test]
async fn test_threshold_never_exceeds_ceiling() {
    let dir = TempDir::new().unwrap();
    let decisions = Arc::new(JsonFileDecisionRepository::new(dir.path().join("feedback")));
    let learner = FeedbackLearner::new(
        decisions,
        Arc::new(JsonFileSnapshotStore::new(dir.path().join("state"))),
        prices(),
        FeedbackConfig {
            min_confidence_threshold: 0.88,
            ..FeedbackConfig::default()
        },
    );
    for _ in 0..5 {
        let decision = losing_adjustment(0.95);
        learner
            .log_decision(&decision, &apply_gate(&decision, 0.88), logged_at())
            .await
            .unwrap();
    }
    let now = logged_at() + Duration::days(4);
    learner.run_evaluations(now).await.unwrap();

    for _ in 0..3 {
        learner.learn_from_evaluations(now).await.unwrap();
    }
    assert_eq!(learner.threshold().await.unwrap(), THRESHOLD_CEILING);
}
