// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Feedback
//!
//! Optional capability that tracks how well each sector's scoring prompt calls
//! the market, so weak prompts can be flagged for revision.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Capability interface with a no-op default

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::repository::RepositoryError;
use super::sector::SectorCode;

/// Accuracy below which a sector's prompt is flagged, in percent.
pub const UNDERPERFORMING_ACCURACY_PCT: f64 = 50.0;
/// Predictions needed before a sector can be flagged.
pub const UNDERPERFORMING_MIN_PREDICTIONS: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptPerformance {
    pub correct: u64,
    pub total: u64,
}

impl PromptPerformance {
    pub fn accuracy_pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64 * 100.0
        }
    }
}

/// Per-sector prompt tallies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptLedger {
    pub sectors: BTreeMap<SectorCode, PromptPerformance>,
}

impl PromptLedger {
    pub fn record(&mut self, sector: &SectorCode, correct: bool) {
        let entry = self.sectors.entry(sector.clone()).or_default();
        entry.total += 1;
        if correct {
            entry.correct += 1;
        }
    }

    /// Sectors under `threshold_pct` accuracy with at least `min_predictions`, worst first.
    pub fn underperforming(&self, threshold_pct: f64, min_predictions: u64) -> Vec<(SectorCode, f64)> {
        let mut flagged: Vec<(SectorCode, f64)> = self
            .sectors
            .iter()
            .filter(|(_, p)| p.total >= min_predictions && p.accuracy_pct() < threshold_pct)
            .map(|(s, p)| (s.clone(), p.accuracy_pct()))
            .collect();
        flagged.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        flagged
    }
}

/// Receives per-sector prediction outcomes from the learning cycle.
#[async_trait]
pub trait PromptFeedback: Send + Sync {
    /// Record the day's outcomes and return the sectors now flagged.
    async fn record_outcomes(
        &self,
        outcomes: &BTreeMap<SectorCode, bool>,
    ) -> Result<Vec<SectorCode>, RepositoryError>;

    /// Sectors below `threshold_pct` accuracy with at least `min_predictions`.
    async fn underperforming(
        &self,
        threshold_pct: f64,
        min_predictions: u64,
    ) -> Result<Vec<(SectorCode, f64)>, RepositoryError>;
}

/// Used when prompt tracking is disabled.
pub struct NoopPromptFeedback;

#[async_trait]
impl PromptFeedback for NoopPromptFeedback {
    async fn record_outcomes(
        &self,
        _outcomes: &BTreeMap<SectorCode, bool>,
    ) -> Result<Vec<SectorCode>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn underperforming(
        &self,
        _threshold_pct: f64,
        _min_predictions: u64,
    ) -> Result<Vec<(SectorCode, f64)>, RepositoryError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_only_with_enough_predictions() {
        let mut ledger = PromptLedger::default();
        let xlk = SectorCode::from("XLK");
        let xle = SectorCode::from("XLE");
        for i in 0..10 {
            ledger.record(&xlk, i < 3);
        }
        for _ in 0..5 {
            ledger.record(&xle, false);
        }
        let flagged = ledger.underperforming(UNDERPERFORMING_ACCURACY_PCT, UNDERPERFORMING_MIN_PREDICTIONS);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0, xlk);
        assert!((flagged[0].1 - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_noop_flags_nothing() {
        let outcomes = BTreeMap::from([(SectorCode::from("XLK"), false)]);
        assert!(NoopPromptFeedback.record_outcomes(&outcomes).await.unwrap().is_empty());
    }
}
