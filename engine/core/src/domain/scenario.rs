// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scenario
//!
//! Competing allocation strategies and the formulas that turn sector sentiment
//! into sector weights.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure sector-weight computation per scenario

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::learning::LearningModel;
use super::sector::SectorCode;

/// A named allocation strategy. Each scenario trades its own paper capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Benchmark,
    Momentum,
    Aggressive,
    Defensive,
    Contrarian,
    SpyOnly,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Benchmark,
        Scenario::Momentum,
        Scenario::Aggressive,
        Scenario::Defensive,
        Scenario::Contrarian,
        Scenario::SpyOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Benchmark => "benchmark",
            Scenario::Momentum => "momentum",
            Scenario::Aggressive => "aggressive",
            Scenario::Defensive => "defensive",
            Scenario::Contrarian => "contrarian",
            Scenario::SpyOnly => "spy_only",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Benchmark => "Equal weight across all sectors, no rebalancing based on sentiment",
            Scenario::Momentum => "Overweight sectors with positive sentiment, underweight negative",
            Scenario::Aggressive => "Concentrate in the top bullish sectors, minimal weight elsewhere",
            Scenario::Defensive => "Base in stable sectors, only move on strong signals",
            Scenario::Contrarian => "Buy sectors with negative sentiment, trim on positive",
            Scenario::SpyOnly => "Simple S&P 500 buy-and-hold benchmark",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown scenario: '{0}'")]
pub struct UnknownScenario(pub String);

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Scenario::ALL
            .iter()
            .copied()
            .find(|scenario| scenario.as_str() == normalized)
            .ok_or_else(|| UnknownScenario(s.to_string()))
    }
}

/// Tunable constants of the scenario formulas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    /// Percentage points of weight per unit of sentiment (momentum/contrarian)
    #[serde(default = "default_tilt_factor")]
    pub tilt_factor: f64,

    #[serde(default = "default_tilt_floor")]
    pub tilt_floor: f64,

    #[serde(default = "default_tilt_cap")]
    pub tilt_cap: f64,

    #[serde(default = "default_aggressive_top_n")]
    pub aggressive_top_n: usize,

    #[serde(default = "default_aggressive_top_weight")]
    pub aggressive_top_weight: f64,

    #[serde(default = "default_aggressive_rest_weight")]
    pub aggressive_rest_weight: f64,

    /// Sectors treated as defensive; everything else is cyclical
    #[serde(default = "default_defensive_sectors")]
    pub defensive_sectors: Vec<SectorCode>,

    #[serde(default = "default_defensive_base")]
    pub defensive_base: f64,

    #[serde(default = "default_cyclical_base")]
    pub cyclical_base: f64,

    #[serde(default = "default_defensive_nudge")]
    pub defensive_nudge: f64,

    /// Score above which a sector gets the upward nudge
    #[serde(default = "default_defensive_bull_trigger")]
    pub defensive_bull_trigger: f64,

    /// Score below which a sector gets the downward nudge
    #[serde(default = "default_defensive_bear_trigger")]
    pub defensive_bear_trigger: f64,

    #[serde(default = "default_defensive_min")]
    pub defensive_min: f64,

    /// Instrument held by the spy_only scenario
    #[serde(default = "default_index_ticker")]
    pub index_ticker: String,
}

fn default_tilt_factor() -> f64 {
    50.0
}

fn default_tilt_floor() -> f64 {
    2.0
}

fn default_tilt_cap() -> f64 {
    20.0
}

fn default_aggressive_top_n() -> usize {
    3
}

fn default_aggressive_top_weight() -> f64 {
    30.0
}

fn default_aggressive_rest_weight() -> f64 {
    1.0
}

fn default_defensive_sectors() -> Vec<SectorCode> {
    ["XLU", "XLP", "XLV", "XLRE", "XLF"]
        .into_iter()
        .map(SectorCode::from)
        .collect()
}

fn default_defensive_base() -> f64 {
    15.0
}

fn default_cyclical_base() -> f64 {
    3.0
}

fn default_defensive_nudge() -> f64 {
    5.0
}

fn default_defensive_bull_trigger() -> f64 {
    0.4
}

fn default_defensive_bear_trigger() -> f64 {
    -0.3
}

fn default_defensive_min() -> f64 {
    1.0
}

fn default_index_ticker() -> String {
    "SPY".to_string()
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            tilt_factor: default_tilt_factor(),
            tilt_floor: default_tilt_floor(),
            tilt_cap: default_tilt_cap(),
            aggressive_top_n: default_aggressive_top_n(),
            aggressive_top_weight: default_aggressive_top_weight(),
            aggressive_rest_weight: default_aggressive_rest_weight(),
            defensive_sectors: default_defensive_sectors(),
            defensive_base: default_defensive_base(),
            cyclical_base: default_cyclical_base(),
            defensive_nudge: default_defensive_nudge(),
            defensive_bull_trigger: default_defensive_bull_trigger(),
            defensive_bear_trigger: default_defensive_bear_trigger(),
            defensive_min: default_defensive_min(),
            index_ticker: default_index_ticker(),
        }
    }
}

/// Sector weights in percent, summing to 100.
pub type SectorWeights = BTreeMap<SectorCode, f64>;

/// Maps a scenario and sector scores to sector weights over the tracked sectors.
#[derive(Debug, Clone)]
pub struct ScenarioAllocator {
    sectors: Vec<SectorCode>,
    params: ScenarioParams,
}

impl ScenarioAllocator {
    pub fn new(sectors: Vec<SectorCode>, params: ScenarioParams) -> Self {
        Self { sectors, params }
    }

    pub fn sectors(&self) -> &[SectorCode] {
        &self.sectors
    }

    pub fn params(&self) -> &ScenarioParams {
        &self.params
    }

    /// Sector weights for `scenario`. Sectors missing from `scores` count as 0.
    pub fn weights(&self, scenario: Scenario, scores: &BTreeMap<SectorCode, f64>) -> SectorWeights {
        if scenario == Scenario::SpyOnly {
            return BTreeMap::from([(SectorCode::from(self.params.index_ticker.as_str()), 100.0)]);
        }
        if self.sectors.is_empty() {
            return BTreeMap::new();
        }

        let score = |sector: &SectorCode| scores.get(sector).copied().unwrap_or(0.0);
        let base = 100.0 / self.sectors.len() as f64;
        let p = &self.params;

        let raw: SectorWeights = match scenario {
            Scenario::Benchmark => self.sectors.iter().map(|s| (s.clone(), base)).collect(),
            Scenario::Momentum => self
                .sectors
                .iter()
                .map(|s| {
                    let w = (base + score(s) * p.tilt_factor).clamp(p.tilt_floor, p.tilt_cap);
                    (s.clone(), w)
                })
                .collect(),
            Scenario::Contrarian => self
                .sectors
                .iter()
                .map(|s| {
                    let w = (base - score(s) * p.tilt_factor).clamp(p.tilt_floor, p.tilt_cap);
                    (s.clone(), w)
                })
                .collect(),
            Scenario::Aggressive => {
                let mut ranked: Vec<&SectorCode> = self.sectors.iter().collect();
                // Ties resolve by sector code so the result never depends on input order.
                ranked.sort_by(|a, b| score(b).total_cmp(&score(a)).then(a.cmp(b)));
                ranked
                    .iter()
                    .enumerate()
                    .map(|(rank, s)| {
                        let w = if rank < p.aggressive_top_n {
                            p.aggressive_top_weight
                        } else {
                            p.aggressive_rest_weight
                        };
                        ((*s).clone(), w)
                    })
                    .collect()
            }
            Scenario::Defensive => self
                .sectors
                .iter()
                .map(|s| {
                    let base = if p.defensive_sectors.contains(s) {
                        p.defensive_base
                    } else {
                        p.cyclical_base
                    };
                    let value = score(s);
                    let w = if value > p.defensive_bull_trigger {
                        base + p.defensive_nudge
                    } else if value < p.defensive_bear_trigger {
                        (base - p.defensive_nudge).max(p.defensive_min)
                    } else {
                        base
                    };
                    (s.clone(), w)
                })
                .collect(),
            Scenario::SpyOnly => BTreeMap::new(),
        };

        normalize(raw)
    }

    /// Like [`weights`](Self::weights), with each score scaled by the sector's
    /// learned sensitivity multiplier and clamped back to [-1, 1].
    pub fn weights_with_model(
        &self,
        scenario: Scenario,
        scores: &BTreeMap<SectorCode, f64>,
        model: &LearningModel,
    ) -> SectorWeights {
        let adjusted: BTreeMap<SectorCode, f64> = scores
            .iter()
            .map(|(sector, score)| {
                let scaled = (score * model.multiplier(sector)).clamp(-1.0, 1.0);
                (sector.clone(), scaled)
            })
            .collect();
        self.weights(scenario, &adjusted)
    }
}

/// Rescale non-negative weights so they sum to 100.
pub fn normalize(weights: SectorWeights) -> SectorWeights {
    let total: f64 = weights.values().map(|w| w.max(0.0)).sum();
    if total <= 0.0 {
        return weights.into_keys().map(|k| (k, 0.0)).collect();
    }
    weights
        .into_iter()
        .map(|(k, w)| (k, w.max(0.0) / total * 100.0))
        .collect()
}
