// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Allocation
//!
//! Phase 1 decision types: the assets picked inside a sector, and the
//! ticker-to-percent allocation exchanged with Phase 2 and the decision log.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Asset-level allocation value objects and their invariants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::scenario::Scenario;
use super::sector::SectorCode;

/// Scores beyond this band read as a directional call in prompts.
pub const CLASSIFICATION_BAND: f64 = 0.3;

/// Tolerance used when checking that weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecisionId(pub Uuid);

impl DecisionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directional reading of a sector score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentClass {
    Bullish,
    Bearish,
    Neutral,
}

impl SentimentClass {
    pub fn from_score(score: f64) -> Self {
        if score > CLASSIFICATION_BAND {
            SentimentClass::Bullish
        } else if score < -CLASSIFICATION_BAND {
            SentimentClass::Bearish
        } else {
            SentimentClass::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentClass::Bullish => "BULLISH",
            SentimentClass::Bearish => "BEARISH",
            SentimentClass::Neutral => "NEUTRAL",
        }
    }
}

/// Ticker-to-percent map. Percentages sum to roughly 100 when non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allocation(BTreeMap<String, f64>);

impl Allocation {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Single-instrument allocation.
    pub fn whole(ticker: impl Into<String>) -> Self {
        Self(BTreeMap::from([(ticker.into(), 100.0)]))
    }

    pub fn insert(&mut self, ticker: impl Into<String>, pct: f64) {
        *self.0.entry(ticker.into().to_uppercase()).or_insert(0.0) += pct;
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.0.get(ticker).copied()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Weights as fractions of the total, ignoring non-positive entries.
    pub fn fractions(&self) -> BTreeMap<String, f64> {
        let total: f64 = self.0.values().filter(|v| **v > 0.0).sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        self.0
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(k, v)| (k.clone(), v / total))
            .collect()
    }

    /// Tickers whose weight moved by more than `threshold` points.
    pub fn changes(&self, other: &Allocation, threshold: f64) -> Vec<(String, f64, f64)> {
        let mut tickers: Vec<&String> = self.0.keys().chain(other.0.keys()).collect();
        tickers.sort();
        tickers.dedup();
        tickers
            .into_iter()
            .filter_map(|t| {
                let before = self.get(t).unwrap_or(0.0);
                let after = other.get(t).unwrap_or(0.0);
                ((after - before).abs() > threshold).then(|| (t.clone(), before, after))
            })
            .collect()
    }
}

impl FromIterator<(String, f64)> for Allocation {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut allocation = Allocation::new();
        for (ticker, pct) in iter {
            allocation.insert(ticker, pct);
        }
        allocation
    }
}

/// One asset chosen inside a sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAsset {
    pub ticker: String,
    /// Fraction of the sector budget, in [0, 1]
    pub weight: f64,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// How a Phase 1 selection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    /// Parsed from the structured response
    Structured,
    /// Recovered from tickers mentioned in free text
    TickerExtraction,
    /// Whole budget placed in the sector benchmark
    EtfFallback,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Merge duplicates and rescale weights to sum to one, then price against `budget`.
///
/// Non-finite or negative weights count as zero. When every weight is zero the
/// assets share the budget equally. Returns an empty vector for empty input.
pub fn normalize_assets(assets: Vec<SelectedAsset>, budget: f64) -> Vec<SelectedAsset> {
    let mut merged: Vec<SelectedAsset> = Vec::new();
    for mut asset in assets {
        asset.ticker = asset.ticker.trim().to_uppercase();
        if !asset.weight.is_finite() || asset.weight < 0.0 {
            asset.weight = 0.0;
        }
        match merged.iter_mut().find(|m| m.ticker == asset.ticker) {
            Some(existing) => {
                existing.weight += asset.weight;
                if existing.reason.is_none() {
                    existing.reason = asset.reason;
                }
            }
            None => merged.push(asset),
        }
    }
    if merged.is_empty() {
        return merged;
    }

    let total: f64 = merged.iter().map(|a| a.weight).sum();
    let equal = 1.0 / merged.len() as f64;
    for asset in &mut merged {
        asset.weight = if total > 0.0 { asset.weight / total } else { equal };
        asset.amount = round2(asset.weight * budget);
    }
    merged
}

/// Phase 1 output for one sector of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDecision {
    pub id: DecisionId,
    pub sector: SectorCode,
    pub sentiment: f64,
    pub scenario: Scenario,
    pub budget: f64,
    pub selected_assets: Vec<SelectedAsset>,
    pub rationale: String,
    #[serde(default = "default_risk_level")]
    pub risk_level: String,
    pub source: SelectionSource,
    pub decided_at: DateTime<Utc>,
}

fn default_risk_level() -> String {
    "medium".to_string()
}

impl AllocationDecision {
    /// Whole-budget allocation to the sector benchmark.
    pub fn etf_fallback(
        sector: SectorCode,
        benchmark: impl Into<String>,
        sentiment: f64,
        scenario: Scenario,
        budget: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: DecisionId::new(),
            sector,
            sentiment,
            scenario,
            budget,
            selected_assets: vec![SelectedAsset {
                ticker: benchmark.into().to_uppercase(),
                weight: 1.0,
                amount: round2(budget),
                reason: None,
            }],
            rationale: reason.into(),
            risk_level: default_risk_level(),
            source: SelectionSource::EtfFallback,
            decided_at: Utc::now(),
        }
    }

    /// Selected weights as percentages, rounded to one decimal.
    pub fn allocation(&self) -> Allocation {
        self.selected_assets
            .iter()
            .map(|a| (a.ticker.clone(), (a.weight * 1000.0).round() / 10.0))
            .collect()
    }

    pub fn weight_sum(&self) -> f64 {
        self.selected_assets.iter().map(|a| a.weight).sum()
    }

    pub fn is_normalized(&self) -> bool {
        (self.weight_sum() - 1.0).abs() < WEIGHT_TOLERANCE
    }

    /// Replace the selection with a refined allocation, keeping the budget.
    ///
    /// The budget is re-derived from the current amounts so rounding in earlier
    /// steps does not drift the sector total.
    pub fn apply_allocation(&mut self, allocation: &Allocation, note: &str) {
        let budget: f64 = self.selected_assets.iter().map(|a| a.amount).sum();
        let assets = allocation
            .fractions()
            .into_iter()
            .map(|(ticker, weight)| SelectedAsset {
                ticker,
                weight,
                amount: 0.0,
                reason: Some(note.to_string()),
            })
            .collect();
        self.selected_assets = normalize_assets(assets, budget);
        self.budget = budget;
        self.rationale = format!("[Refined] {}", self.rationale);
    }
}
