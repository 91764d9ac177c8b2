// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Learning
//!
//! The self-tuning sensitivity model: one multiplier per sector that grows when
//! sentiment called the day's move correctly and shrinks when it did not, plus a
//! reliability weight per news source.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregate root for learned trust in sentiment signals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::sector::{SectorCode, SentimentSnapshot};

pub const MULTIPLIER_MIN: f64 = 0.5;
pub const MULTIPLIER_MAX: f64 = 2.0;
const CORRECT_FACTOR: f64 = 1.02;
const INCORRECT_FACTOR: f64 = 0.98;

/// Predicted scores at or inside this band count as a neutral call.
pub const NEUTRAL_PREDICTION_BAND: f64 = 0.1;
/// Realized moves (percent) at or inside this band confirm a neutral call.
pub const NEUTRAL_OUTCOME_BAND: f64 = 1.0;

pub const HISTORY_CAPACITY: usize = 90;
const SOURCE_MIN_SAMPLES: u32 = 3;
const SOURCE_DECAY: f64 = 0.9;
const MAX_SOURCE_UPDATES: usize = 10;

/// Learned trust in one sector's sentiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRecord {
    pub sentiment_multiplier: f64,
    pub correct_predictions: u64,
    pub total_predictions: u64,
}

impl Default for SensitivityRecord {
    fn default() -> Self {
        Self {
            sentiment_multiplier: 1.0,
            correct_predictions: 0,
            total_predictions: 0,
        }
    }
}

impl SensitivityRecord {
    pub fn accuracy(&self) -> Option<f64> {
        (self.total_predictions > 0)
            .then(|| self.correct_predictions as f64 / self.total_predictions as f64)
    }

    fn record(&mut self, correct: bool) {
        self.total_predictions += 1;
        let factor = if correct {
            self.correct_predictions += 1;
            CORRECT_FACTOR
        } else {
            INCORRECT_FACTOR
        };
        self.sentiment_multiplier =
            (self.sentiment_multiplier * factor).clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
    }
}

/// How a single sector prediction turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    BullishCorrect,
    BearishCorrect,
    NeutralCorrect,
    Wrong,
}

impl PredictionOutcome {
    /// Judge a sentiment prediction against the realized percent move.
    pub fn judge(predicted: f64, actual: f64) -> Self {
        if predicted > NEUTRAL_PREDICTION_BAND && actual > 0.0 {
            PredictionOutcome::BullishCorrect
        } else if predicted < -NEUTRAL_PREDICTION_BAND && actual < 0.0 {
            PredictionOutcome::BearishCorrect
        } else if predicted.abs() <= NEUTRAL_PREDICTION_BAND && actual.abs() <= NEUTRAL_OUTCOME_BAND {
            PredictionOutcome::NeutralCorrect
        } else {
            PredictionOutcome::Wrong
        }
    }

    pub fn is_correct(self) -> bool {
        !matches!(self, PredictionOutcome::Wrong)
    }
}

/// Per-headline correctness used for source reliability.
///
/// Looser than [`PredictionOutcome::judge`]: any same-signed pair counts, and a
/// near-zero headline is right when the sector barely moved.
pub fn headline_agrees(sentiment: f64, actual: f64) -> bool {
    (sentiment > 0.0 && actual > 0.0)
        || (sentiment < 0.0 && actual < 0.0)
        || (sentiment.abs() < 0.1 && actual.abs() < 0.5)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierChange {
    pub outcome: PredictionOutcome,
    pub old: f64,
    pub new: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceUpdate {
    pub correct: u32,
    pub total: u32,
    pub reliability: f64,
    pub weight: f64,
}

/// Record of one daily learning cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub date: DateTime<Utc>,
    pub predictions: BTreeMap<SectorCode, f64>,
    pub outcomes: BTreeMap<SectorCode, f64>,
    pub sector_updates: BTreeMap<SectorCode, MultiplierChange>,
    pub source_updates: BTreeMap<String, SourceUpdate>,
    pub correct: usize,
    pub total: usize,
    #[serde(default)]
    pub prompts_flagged: Vec<SectorCode>,
    /// Accuracy over every prediction judged so far, this cycle included
    #[serde(default)]
    pub lifetime_accuracy: Option<f64>,
}

impl LearningEvent {
    pub fn accuracy(&self) -> Option<f64> {
        (self.total > 0).then(|| self.correct as f64 / self.total as f64)
    }
}

/// The persisted learning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningModel {
    #[serde(default)]
    pub sector_sensitivity: BTreeMap<SectorCode, SensitivityRecord>,
    #[serde(default)]
    pub source_weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub history: VecDeque<LearningEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_learning: Option<DateTime<Utc>>,
}

impl Default for LearningModel {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl LearningModel {
    /// Fresh model with a neutral record for each tracked sector.
    pub fn new(sectors: impl IntoIterator<Item = SectorCode>) -> Self {
        Self {
            sector_sensitivity: sectors
                .into_iter()
                .map(|s| (s, SensitivityRecord::default()))
                .collect(),
            source_weights: BTreeMap::new(),
            history: VecDeque::new(),
            last_learning: None,
        }
    }

    pub fn multiplier(&self, sector: &SectorCode) -> f64 {
        self.sector_sensitivity
            .get(sector)
            .map(|r| r.sentiment_multiplier)
            .unwrap_or(1.0)
    }

    pub fn source_weight(&self, source: &str) -> f64 {
        self.source_weights.get(source).copied().unwrap_or(1.0)
    }

    /// Judge one prediction and fold it into the sector's record.
    pub fn update(&mut self, sector: &SectorCode, predicted: f64, actual: f64) -> SensitivityRecord {
        let outcome = PredictionOutcome::judge(predicted, actual);
        let record = self.sector_sensitivity.entry(sector.clone()).or_default();
        record.record(outcome.is_correct());
        record.clone()
    }

    /// Fold per-source correctness of one cycle into the source weights.
    ///
    /// Only the ten busiest sources are considered and a source needs at least
    /// three judged headlines before its weight moves.
    pub fn update_sources(
        &mut self,
        snapshot: &SentimentSnapshot,
        outcomes: &BTreeMap<SectorCode, f64>,
    ) -> BTreeMap<String, SourceUpdate> {
        let mut tallies: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
        for headline in &snapshot.headlines {
            for sector in &headline.sectors {
                let Some(actual) = outcomes.get(sector) else {
                    continue;
                };
                let tally = tallies.entry(headline.source.as_str()).or_insert((0, 0));
                tally.1 += 1;
                if headline_agrees(headline.sentiment, *actual) {
                    tally.0 += 1;
                }
            }
        }

        let mut busiest: Vec<(&str, (u32, u32))> = tallies.into_iter().collect();
        busiest.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then(a.0.cmp(b.0)));

        let mut updates = BTreeMap::new();
        for (source, (correct, total)) in busiest.into_iter().take(MAX_SOURCE_UPDATES) {
            if total < SOURCE_MIN_SAMPLES {
                continue;
            }
            let reliability = correct as f64 / total as f64;
            let old = self.source_weight(source);
            let weight = old * SOURCE_DECAY + reliability * (1.0 - SOURCE_DECAY);
            self.source_weights.insert(source.to_string(), weight);
            updates.insert(
                source.to_string(),
                SourceUpdate {
                    correct,
                    total,
                    reliability,
                    weight,
                },
            );
        }
        updates
    }

    /// Run one full learning cycle against the realized sector moves.
    ///
    /// Sectors without an outcome are skipped. The resulting event is appended to
    /// the bounded history and returned.
    pub fn learn(
        &mut self,
        snapshot: &SentimentSnapshot,
        outcomes: &BTreeMap<SectorCode, f64>,
        now: DateTime<Utc>,
    ) -> LearningEvent {
        let mut event = LearningEvent {
            date: now,
            predictions: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            sector_updates: BTreeMap::new(),
            source_updates: BTreeMap::new(),
            correct: 0,
            total: 0,
            prompts_flagged: Vec::new(),
            lifetime_accuracy: None,
        };

        for (sector, sentiment) in &snapshot.sectors {
            let Some(actual) = outcomes.get(sector).copied() else {
                continue;
            };
            let predicted = sentiment.score;
            let old = self.multiplier(sector);
            let outcome = PredictionOutcome::judge(predicted, actual);
            let record = self.update(sector, predicted, actual);

            event.predictions.insert(sector.clone(), predicted);
            event.outcomes.insert(sector.clone(), actual);
            event.sector_updates.insert(
                sector.clone(),
                MultiplierChange {
                    outcome,
                    old,
                    new: record.sentiment_multiplier,
                },
            );
            event.total += 1;
            if outcome.is_correct() {
                event.correct += 1;
            }
        }

        event.source_updates = self.update_sources(snapshot, outcomes);
        event.lifetime_accuracy = self.overall_accuracy();
        self.last_learning = Some(now);
        self.push_history(event.clone());
        event
    }

    /// Append to the history ring buffer, evicting the oldest entries.
    pub fn push_history(&mut self, event: LearningEvent) {
        self.history.push_back(event);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }

    /// Accuracy over every prediction the model has judged.
    pub fn overall_accuracy(&self) -> Option<f64> {
        let (correct, total) = self
            .sector_sensitivity
            .values()
            .fold((0u64, 0u64), |(c, t), r| (c + r.correct_predictions, t + r.total_predictions));
        (total > 0).then(|| correct as f64 / total as f64)
    }
}
