// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Feedback
//!
//! Decision log records, their realized-return evaluations, and the threshold
//! adaptation rule that closes the loop on Phase 2.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Feedback-loop aggregates and pure learning rules

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::allocation::{Allocation, DecisionId};
use super::refinement::AppliedAction;
use super::scenario::Scenario;
use super::sector::SectorCode;

pub const THRESHOLD_FLOOR: f64 = 0.4;
pub const THRESHOLD_CEILING: f64 = 0.9;

/// Win rate above which adjustments are trusted more.
const TRUST_WIN_RATE: f64 = 0.6;
/// Win rate below which adjustments are trusted less.
const DISTRUST_WIN_RATE: f64 = 0.4;
/// Mean delta (percentage points) below which adjustments are trusted less.
const DISTRUST_MEAN_DELTA: f64 = -0.5;

/// Persisted feedback settings. The threshold is the learned quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_threshold")]
    pub min_confidence_threshold: f64,

    /// Maturation window before a decision can be evaluated
    #[serde(default = "default_evaluation_days")]
    pub evaluation_days: u32,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_min_evaluations")]
    pub min_evaluations_for_learning: usize,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_threshold() -> f64 {
    0.6
}

fn default_evaluation_days() -> u32 {
    3
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_min_evaluations() -> usize {
    5
}

fn default_version() -> u32 {
    1
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            min_confidence_threshold: default_threshold(),
            evaluation_days: default_evaluation_days(),
            learning_rate: default_learning_rate(),
            min_evaluations_for_learning: default_min_evaluations(),
            version: default_version(),
            last_updated: None,
        }
    }
}

impl FeedbackConfig {
    /// Pull a hand-edited or legacy threshold back inside its bounds.
    pub fn clamped(mut self) -> Self {
        self.min_confidence_threshold = self
            .min_confidence_threshold
            .clamp(THRESHOLD_FLOOR, THRESHOLD_CEILING);
        self
    }
}

/// One gated Phase 2 decision, as written to the decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: DecisionId,
    /// Phase 1 decision this record descends from
    pub allocation_id: DecisionId,
    pub logged_at: DateTime<Utc>,
    pub date: NaiveDate,
    pub sector: SectorCode,
    pub scenario: Scenario,
    pub sentiment: f64,
    pub action: AppliedAction,
    pub confidence: f64,
    pub original_allocation: Allocation,
    pub final_allocation: Allocation,
    pub reasoning: String,
    #[serde(default)]
    pub evaluated: bool,
}

impl DecisionRecord {
    /// End of the maturation window that starts on the decision date.
    pub fn window_end(&self, evaluation_days: u32) -> NaiveDate {
        self.date + chrono::Duration::days(i64::from(evaluation_days))
    }

    /// True when the decision is unevaluated and older than the maturation window.
    pub fn is_pending(&self, now: DateTime<Utc>, evaluation_days: u32) -> bool {
        !self.evaluated && self.logged_at < now - chrono::Duration::days(i64::from(evaluation_days))
    }
}

/// Realized outcome of one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub decision_id: DecisionId,
    pub decision_logged_at: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
    pub sector: SectorCode,
    pub action: AppliedAction,
    pub confidence: f64,
    /// Percent return of the Phase 1 allocation over the window
    pub original_return: f64,
    /// Percent return of the allocation actually held
    pub final_return: f64,
    pub delta: f64,
    pub outperformed: bool,
    pub days_evaluated: u32,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

impl EvaluationRecord {
    pub fn new(
        decision: &DecisionRecord,
        original_return: f64,
        final_return: f64,
        days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            decision_id: decision.id,
            decision_logged_at: decision.logged_at,
            evaluated_at: now,
            sector: decision.sector.clone(),
            action: decision.action,
            confidence: decision.confidence,
            original_return: round3(original_return),
            final_return: round3(final_return),
            delta: round3(final_return - original_return),
            outperformed: final_return > original_return,
            days_evaluated: days,
        }
    }
}

/// Win/loss tally for one group of evaluations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionStats {
    pub count: usize,
    pub outperformed: usize,
    pub total_delta: f64,
}

impl ActionStats {
    fn add(&mut self, evaluation: &EvaluationRecord) {
        self.count += 1;
        self.total_delta += evaluation.delta;
        if evaluation.outperformed {
            self.outperformed += 1;
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.outperformed as f64 / self.count as f64
        }
    }

    pub fn mean_delta(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_delta / self.count as f64
        }
    }
}

/// Evaluation statistics grouped by applied action and confidence decile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub by_action: BTreeMap<AppliedAction, ActionStats>,
    /// Keyed by the lower edge of the decile in percent: 0, 10, ..., 100
    pub by_confidence: BTreeMap<u8, ActionStats>,
}

impl PerformanceStats {
    pub fn from_evaluations<'a>(evaluations: impl IntoIterator<Item = &'a EvaluationRecord>) -> Self {
        let mut stats = Self::default();
        for evaluation in evaluations {
            stats.by_action.entry(evaluation.action).or_default().add(evaluation);
            stats
                .by_confidence
                .entry(confidence_bucket(evaluation.confidence))
                .or_default()
                .add(evaluation);
        }
        stats
    }

    pub fn action(&self, action: AppliedAction) -> ActionStats {
        self.by_action.get(&action).cloned().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.by_action.values().map(|s| s.count).sum()
    }
}

fn confidence_bucket(confidence: f64) -> u8 {
    ((confidence.clamp(0.0, 1.0) * 10.0).floor() as u8) * 10
}

/// Outcome of one threshold learning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdChange {
    InsufficientData { have: usize, need: usize },
    Lowered { from: f64, to: f64 },
    Raised { from: f64, to: f64 },
    Unchanged { threshold: f64 },
}

impl ThresholdChange {
    pub fn new_threshold(&self, current: f64) -> f64 {
        match self {
            ThresholdChange::Lowered { to, .. } | ThresholdChange::Raised { to, .. } => *to,
            _ => current,
        }
    }
}

/// Decide how the confidence threshold moves given the `adjust` statistics.
pub fn adapt_threshold(config: &FeedbackConfig, adjust: &ActionStats) -> ThresholdChange {
    let current = config.min_confidence_threshold;
    if adjust.count < config.min_evaluations_for_learning {
        return ThresholdChange::InsufficientData {
            have: adjust.count,
            need: config.min_evaluations_for_learning,
        };
    }

    let win_rate = adjust.win_rate();
    let mean_delta = adjust.mean_delta();

    if win_rate > TRUST_WIN_RATE && mean_delta > 0.0 {
        let to = (current - config.learning_rate).max(THRESHOLD_FLOOR);
        ThresholdChange::Lowered { from: current, to }
    } else if win_rate < DISTRUST_WIN_RATE || mean_delta < DISTRUST_MEAN_DELTA {
        let to = (current + config.learning_rate).min(THRESHOLD_CEILING);
        ThresholdChange::Raised { from: current, to }
    } else {
        ThresholdChange::Unchanged { threshold: current }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(action: AppliedAction, confidence: f64, delta: f64) -> EvaluationRecord {
        EvaluationRecord {
            decision_id: DecisionId::new(),
            decision_logged_at: Utc::now(),
            evaluated_at: Utc::now(),
            sector: SectorCode::from("XLK"),
            action,
            confidence,
            original_return: 0.0,
            final_return: delta,
            delta,
            outperformed: delta > 0.0,
            days_evaluated: 3,
        }
    }

    fn stats(wins: usize, losses: usize, win_delta: f64, loss_delta: f64) -> ActionStats {
        let evals: Vec<EvaluationRecord> = (0..wins)
            .map(|_| evaluation(AppliedAction::Adjust, 0.7, win_delta))
            .chain((0..losses).map(|_| evaluation(AppliedAction::Adjust, 0.7, loss_delta)))
            .collect();
        PerformanceStats::from_evaluations(&evals).action(AppliedAction::Adjust)
    }

    #[test]
    fn test_insufficient_data_keeps_threshold() {
        let change = adapt_threshold(&FeedbackConfig::default(), &stats(3, 1, 1.0, -1.0));
        assert_eq!(change, ThresholdChange::InsufficientData { have: 4, need: 5 });
    }

    #[test]
    fn test_winning_adjustments_lower_threshold() {
        let change = adapt_threshold(&FeedbackConfig::default(), &stats(4, 1, 1.0, -0.5));
        match change {
            ThresholdChange::Lowered { from, to } => {
                assert_eq!(from, 0.6);
                assert!((to - 0.55).abs() < 1e-9);
            }
            other => panic!("expected lowered, got {:?}", other),
        }
    }

    #[test]
    fn test_losing_adjustments_raise_threshold() {
        let change = adapt_threshold(&FeedbackConfig::default(), &stats(1, 4, 0.2, -0.4));
        assert!(matches!(change, ThresholdChange::Raised { .. }));
        assert!((change.new_threshold(0.6) - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_middling_adjustments_leave_threshold() {
        // win rate 0.5, mean delta slightly positive
        let change = adapt_threshold(&FeedbackConfig::default(), &stats(3, 3, 0.5, -0.4));
        assert_eq!(change, ThresholdChange::Unchanged { threshold: 0.6 });
    }

    #[test]
    fn test_threshold_never_leaves_bounds() {
        let mut config = FeedbackConfig::default();
        for _ in 0..50 {
            let change = adapt_threshold(&config, &stats(9, 1, 1.0, -0.1));
            config.min_confidence_threshold = change.new_threshold(config.min_confidence_threshold);
        }
        assert!((config.min_confidence_threshold - THRESHOLD_FLOOR).abs() < 1e-9);

        for _ in 0..50 {
            let change = adapt_threshold(&config, &stats(1, 9, 0.1, -2.0));
            config.min_confidence_threshold = change.new_threshold(config.min_confidence_threshold);
        }
        assert!((config.min_confidence_threshold - THRESHOLD_CEILING).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_buckets() {
        let evals = vec![
            evaluation(AppliedAction::Adjust, 0.65, 1.0),
            evaluation(AppliedAction::Adjust, 0.61, -1.0),
            evaluation(AppliedAction::KeepLowConf, 0.3, 0.2),
            evaluation(AppliedAction::Keep, 1.0, 0.0),
        ];
        let stats = PerformanceStats::from_evaluations(&evals);
        assert_eq!(stats.by_confidence[&60].count, 2);
        assert_eq!(stats.by_confidence[&30].count, 1);
        assert_eq!(stats.by_confidence[&100].count, 1);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.action(AppliedAction::Adjust).win_rate(), 0.5);
    }

    #[test]
    fn test_pending_requires_maturation() {
        let now = Utc::now();
        let mut record = DecisionRecord {
            id: DecisionId::new(),
            allocation_id: DecisionId::new(),
            logged_at: now - chrono::Duration::days(4),
            date: (now - chrono::Duration::days(4)).date_naive(),
            sector: SectorCode::from("XLK"),
            scenario: Scenario::Momentum,
            sentiment: 0.3,
            action: AppliedAction::Adjust,
            confidence: 0.7,
            original_allocation: Allocation::whole("XLK"),
            final_allocation: Allocation::whole("NVDA"),
            reasoning: String::new(),
            evaluated: false,
        };
        assert!(record.is_pending(now, 3));
        assert!(!record.is_pending(now, 5));
        record.evaluated = true;
        assert!(!record.is_pending(now, 3));
    }
}
