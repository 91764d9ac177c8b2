// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Feedback Learner
//!
//! Logs every gated Phase 2 decision, evaluates matured decisions against
//! realized returns, and moves the confidence threshold from the outcome of
//! applied adjustments.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Closes the loop between refinement confidence and results

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::allocation::DecisionId;
use crate::domain::feedback::{
    adapt_threshold, DecisionRecord, EvaluationRecord, FeedbackConfig, PerformanceStats, ThresholdChange,
};
use crate::domain::market::PriceHistory;
use crate::domain::refinement::{AppliedAction, GateOutcome, RefinementDecision};
use crate::domain::repository::{keys, load_snapshot, update_snapshot, DecisionRepository, SnapshotStore};

/// Result of evaluating one decision.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Evaluated(EvaluationRecord),
    /// Price data for the window is not available yet; the decision stays pending
    AwaitingPrices,
    AlreadyEvaluated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub evaluated: usize,
    pub awaiting_prices: usize,
    pub already_evaluated: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackStatus {
    pub config: FeedbackConfig,
    pub decisions: usize,
    pub pending: usize,
    pub evaluations: usize,
    pub stats: PerformanceStats,
}

pub struct FeedbackLearner {
    decisions: Arc<dyn DecisionRepository>,
    snapshots: Arc<dyn SnapshotStore>,
    prices: Arc<dyn PriceHistory>,
    initial: FeedbackConfig,
}

impl FeedbackLearner {
    pub fn new(
        decisions: Arc<dyn DecisionRepository>,
        snapshots: Arc<dyn SnapshotStore>,
        prices: Arc<dyn PriceHistory>,
        initial: FeedbackConfig,
    ) -> Self {
        Self {
            decisions,
            snapshots,
            prices,
            initial: initial.clamped(),
        }
    }

    /// Stored feedback config, or the configured initial one.
    pub async fn config(&self) -> Result<FeedbackConfig> {
        let stored = load_snapshot::<FeedbackConfig>(self.snapshots.as_ref(), keys::FEEDBACK_CONFIG)
            .await
            .context("Failed to load feedback config")?;
        Ok(stored
            .map(|v| v.value.clamped())
            .unwrap_or_else(|| self.initial.clone()))
    }

    /// Current confidence threshold for the refinement gate.
    pub async fn threshold(&self) -> Result<f64> {
        Ok(self.config().await?.min_confidence_threshold)
    }

    pub async fn log_decision(
        &self,
        decision: &RefinementDecision,
        gate: &GateOutcome,
        now: DateTime<Utc>,
    ) -> Result<DecisionRecord> {
        let record = DecisionRecord {
            id: DecisionId::new(),
            allocation_id: decision.allocation_id,
            logged_at: now,
            date: now.date_naive(),
            sector: decision.sector.clone(),
            scenario: decision.scenario,
            sentiment: decision.sentiment,
            action: gate.action,
            confidence: decision.confidence,
            original_allocation: decision.original_allocation.clone(),
            final_allocation: gate.final_allocation.clone(),
            reasoning: decision.reasoning.clone(),
            evaluated: false,
        };
        self.decisions
            .append(&record)
            .await
            .with_context(|| format!("Failed to log decision for {}", decision.sector))?;
        debug!(sector = %record.sector, action = %record.action, id = %record.id, "Decision logged");
        Ok(record)
    }

    /// Unevaluated decisions past their maturation window.
    pub async fn pending(&self, now: DateTime<Utc>) -> Result<Vec<DecisionRecord>> {
        let days = self.config().await?.evaluation_days;
        let cutoff = now - chrono::Duration::days(i64::from(days));
        Ok(self.decisions.find_pending(cutoff).await?)
    }

    pub async fn evaluate_decision(&self, record: &DecisionRecord, now: DateTime<Utc>) -> Result<EvaluationOutcome> {
        if record.evaluated {
            return Ok(EvaluationOutcome::AlreadyEvaluated);
        }
        let days = self.config().await?.evaluation_days;
        let start = record.date;
        let end = record.window_end(days);

        let original = self.prices.return_over(&record.original_allocation, start, end).await?;
        let final_return = self.prices.return_over(&record.final_allocation, start, end).await?;
        let (Some(original), Some(final_return)) = (original, final_return) else {
            debug!(id = %record.id, sector = %record.sector, "No price data for window, leaving pending");
            return Ok(EvaluationOutcome::AwaitingPrices);
        };

        let evaluation = EvaluationRecord::new(record, original, final_return, days, now);
        if !self.decisions.record_evaluation(&evaluation).await? {
            return Ok(EvaluationOutcome::AlreadyEvaluated);
        }
        info!(
            sector = %record.sector,
            action = %record.action,
            delta = evaluation.delta,
            outperformed = evaluation.outperformed,
            "Decision evaluated"
        );
        Ok(EvaluationOutcome::Evaluated(evaluation))
    }

    /// Evaluate every pending decision; per-decision failures are counted, not fatal.
    pub async fn run_evaluations(&self, now: DateTime<Utc>) -> Result<EvaluationSummary> {
        let mut summary = EvaluationSummary::default();
        for record in self.pending(now).await? {
            match self.evaluate_decision(&record, now).await {
                Ok(EvaluationOutcome::Evaluated(_)) => summary.evaluated += 1,
                Ok(EvaluationOutcome::AwaitingPrices) => summary.awaiting_prices += 1,
                Ok(EvaluationOutcome::AlreadyEvaluated) => summary.already_evaluated += 1,
                Err(e) => {
                    warn!(id = %record.id, sector = %record.sector, "Evaluation failed: {:#}", e);
                    summary.errors += 1;
                }
            }
        }
        info!(
            evaluated = summary.evaluated,
            awaiting_prices = summary.awaiting_prices,
            errors = summary.errors,
            "Evaluation pass complete"
        );
        Ok(summary)
    }

    pub async fn performance_stats(&self) -> Result<PerformanceStats> {
        let evaluations = self.decisions.evaluations().await?;
        Ok(PerformanceStats::from_evaluations(&evaluations))
    }

    /// Move the threshold from the record of applied adjustments.
    pub async fn learn_from_evaluations(&self, now: DateTime<Utc>) -> Result<ThresholdChange> {
        let adjust = self.performance_stats().await?.action(AppliedAction::Adjust);
        let current = self.config().await?;
        let change = adapt_threshold(&current, &adjust);
        if !matches!(change, ThresholdChange::Lowered { .. } | ThresholdChange::Raised { .. }) {
            info!(?change, "Confidence threshold unchanged");
            return Ok(change);
        }

        let initial = self.initial.clone();
        let (_, change) = update_snapshot(
            self.snapshots.as_ref(),
            keys::FEEDBACK_CONFIG,
            move || initial.clone(),
            |config: &mut FeedbackConfig| {
                let change = adapt_threshold(config, &adjust);
                config.min_confidence_threshold = change.new_threshold(config.min_confidence_threshold);
                config.version += 1;
                config.last_updated = Some(now);
                change
            },
        )
        .await
        .context("Failed to store feedback config")?;

        info!(?change, "Confidence threshold updated");
        Ok(change)
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<FeedbackStatus> {
        let config = self.config().await?;
        let decisions = self.decisions.find_all().await?;
        let evaluations = self.decisions.evaluations().await?;
        let pending = decisions
            .iter()
            .filter(|d| d.is_pending(now, config.evaluation_days))
            .count();
        Ok(FeedbackStatus {
            decisions: decisions.len(),
            pending,
            evaluations: evaluations.len(),
            stats: PerformanceStats::from_evaluations(&evaluations),
            config,
        })
    }

    /// Drop the decision log and restore the initial feedback config.
    pub async fn reset(&self) -> Result<()> {
        self.decisions.clear().await.context("Failed to clear decision log")?;
        self.snapshots
            .delete(keys::FEEDBACK_CONFIG)
            .await
            .context("Failed to reset feedback config")?;
        warn!("Feedback state reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::Allocation;
    use crate::domain::refinement::{apply_gate, RefinementAction, RefinementSubject};
    use crate::domain::scenario::Scenario;
    use crate::domain::sector::SectorCode;
    use crate::infrastructure::prices::JsonPriceHistory;
    use crate::infrastructure::repositories::{InMemoryDecisionRepository, InMemorySnapshotStore};
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;

    fn prices() -> Arc<JsonPriceHistory> {
        let day = |d: u32| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();
        let closes = |start: f64, end: f64| BTreeMap::from([(day(2), start), (day(5), end)]);
        Arc::new(JsonPriceHistory::new(BTreeMap::from([
            ("NVDA".to_string(), closes(100.0, 110.0)),
            ("MSFT".to_string(), closes(100.0, 99.0)),
        ])))
    }

    fn learner() -> FeedbackLearner {
        FeedbackLearner::new(
            Arc::new(InMemoryDecisionRepository::new()),
            Arc::new(InMemorySnapshotStore::new()),
            prices(),
            FeedbackConfig::default(),
        )
    }

    fn refinement(confidence: f64) -> RefinementDecision {
        let original: Allocation = [("NVDA".to_string(), 50.0), ("MSFT".to_string(), 50.0)]
            .into_iter()
            .collect();
        let adjusted: Allocation = [("NVDA".to_string(), 80.0), ("MSFT".to_string(), 20.0)]
            .into_iter()
            .collect();
        RefinementDecision::proposed(
            RefinementSubject {
                allocation_id: DecisionId::new(),
                sector: SectorCode::from("XLK"),
                scenario: Scenario::Momentum,
                sentiment: 0.5,
                original_allocation: original,
            },
            RefinementAction::Adjust,
            confidence,
            adjusted,
            "lean into NVDA",
        )
    }

    fn logged_at() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent() {
        let learner = learner();
        let decision = refinement(0.8);
        let gate = apply_gate(&decision, 0.6);
        let record = learner.log_decision(&decision, &gate, logged_at()).await.unwrap();

        let now = logged_at() + Duration::days(4);
        assert_eq!(learner.pending(now).await.unwrap().len(), 1);
        assert!(learner.pending(logged_at() + Duration::days(1)).await.unwrap().is_empty());

        let outcome = learner.evaluate_decision(&record, now).await.unwrap();
        let EvaluationOutcome::Evaluated(evaluation) = outcome else {
            panic!("expected an evaluation, got {:?}", outcome);
        };
        // original: (10 - 1) / 2 = 4.5%, final: 0.8 * 10 + 0.2 * -1 = 7.8%
        assert!((evaluation.original_return - 4.5).abs() < 1e-9);
        assert!((evaluation.final_return - 7.8).abs() < 1e-9);
        assert!(evaluation.outperformed);

        // A stale copy of the record must not produce a second evaluation
        let again = learner.evaluate_decision(&record, now).await.unwrap();
        assert_eq!(again, EvaluationOutcome::AlreadyEvaluated);
        assert_eq!(learner.performance_stats().await.unwrap().total(), 1);
        assert!(learner.pending(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_prices_leave_decision_pending() {
        let learner = FeedbackLearner::new(
            Arc::new(InMemoryDecisionRepository::new()),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(JsonPriceHistory::new(BTreeMap::new())),
            FeedbackConfig::default(),
        );
        let decision = refinement(0.8);
        learner
            .log_decision(&decision, &apply_gate(&decision, 0.6), logged_at())
            .await
            .unwrap();

        let now = logged_at() + Duration::days(4);
        let summary = learner.run_evaluations(now).await.unwrap();
        assert_eq!(summary.awaiting_prices, 1);
        assert_eq!(summary.evaluated, 0);
        assert_eq!(learner.pending(now).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_lowers_after_winning_adjustments() {
        let learner = learner();
        for _ in 0..5 {
            let decision = refinement(0.8);
            learner
                .log_decision(&decision, &apply_gate(&decision, 0.6), logged_at())
                .await
                .unwrap();
        }
        let now = logged_at() + Duration::days(4);
        assert_eq!(learner.run_evaluations(now).await.unwrap().evaluated, 5);

        let change = learner.learn_from_evaluations(now).await.unwrap();
        assert!(matches!(change, ThresholdChange::Lowered { .. }));
        let config = learner.config().await.unwrap();
        assert!((config.min_confidence_threshold - 0.55).abs() < 1e-9);
        assert_eq!(config.version, 2);
        assert_eq!(config.last_updated, Some(now));

        learner.reset().await.unwrap();
        let status = learner.status(now).await.unwrap();
        assert_eq!(status.decisions, 0);
        assert_eq!(status.config.min_confidence_threshold, 0.6);
    }

    #[tokio::test]
    async fn test_insufficient_data_keeps_threshold() {
        let learner = learner();
        let change = learner.learn_from_evaluations(Utc::now()).await.unwrap();
        assert_eq!(change, ThresholdChange::InsufficientData { have: 0, need: 5 });
        assert_eq!(learner.threshold().await.unwrap(), 0.6);
    }
}
