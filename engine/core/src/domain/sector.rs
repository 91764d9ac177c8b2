// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sector
//!
//! Sector identity, headline and sector-level sentiment value objects, and the
//! sector catalog that lists the tradable candidates of each sector.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Shared vocabulary for every stage of the decision pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Score above which a sector is flagged as a buy.
pub const BUY_THRESHOLD: f64 = 0.25;
/// Score below which a sector is flagged as a sell.
pub const SELL_THRESHOLD: f64 = -0.25;

/// Sector code, e.g. `XLK` or `CRYPTO`. Always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct SectorCode(String);

impl SectorCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    /// Bucket for headlines that match no sector keywords.
    pub fn general() -> Self {
        Self("GENERAL".to_string())
    }

    pub fn is_general(&self) -> bool {
        self.0 == "GENERAL"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SectorCode> for String {
    fn from(code: SectorCode) -> Self {
        code.0
    }
}

impl From<&str> for SectorCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SectorCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Where a headline score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreProvenance {
    /// Scored by the text-generation backend
    Model,
    /// Scored by the deterministic keyword lexicon (fallback path)
    Keyword,
}

/// A headline as it arrives from a news source, before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHeadline {
    pub title: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl RawHeadline {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            published_at: None,
        }
    }

    /// Key used to collapse near-identical titles syndicated across feeds.
    pub fn dedup_key(&self) -> String {
        self.title.to_lowercase().chars().take(50).collect()
    }
}

/// A scored headline. Immutable once produced by the sentiment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub sentiment: f64,
    #[serde(default)]
    pub sectors: Vec<SectorCode>,
    pub provenance: ScoreProvenance,
}

impl Headline {
    pub fn scored(raw: RawHeadline, sentiment: f64, provenance: ScoreProvenance) -> Self {
        Self {
            title: raw.title,
            source: raw.source,
            published_at: raw.published_at,
            sentiment: sentiment.clamp(-1.0, 1.0),
            sectors: Vec::new(),
            provenance,
        }
    }

    pub fn with_sectors(mut self, sectors: Vec<SectorCode>) -> Self {
        self.sectors = sectors;
        self
    }
}

/// Coarse trading signal derived from a sector score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

impl Signal {
    pub fn from_score(score: f64) -> Self {
        if score > BUY_THRESHOLD {
            Signal::Buy
        } else if score < SELL_THRESHOLD {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Signal::Buy => "BUY",
            Signal::Hold => "HOLD",
            Signal::Sell => "SELL",
        };
        f.write_str(label)
    }
}

/// Aggregated sentiment for one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorSentiment {
    pub sector: SectorCode,
    /// Mean member score, rounded to 3 decimals
    pub score: f64,
    pub count: usize,
    pub signal: Signal,
    #[serde(default)]
    pub model_scored: usize,
    #[serde(default)]
    pub keyword_scored: usize,
    #[serde(default)]
    pub top_positive: Vec<String>,
    #[serde(default)]
    pub top_negative: Vec<String>,
}

impl SectorSentiment {
    /// True when at least one member score came from the keyword fallback.
    pub fn has_fallback_scores(&self) -> bool {
        self.keyword_scored > 0
    }
}

/// Output of one harvest cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub generated_at: DateTime<Utc>,
    pub sectors: BTreeMap<SectorCode, SectorSentiment>,
    #[serde(default)]
    pub headlines: Vec<Headline>,
}

impl SentimentSnapshot {
    /// Sector scores keyed by sector, the shape consumed by the allocator.
    pub fn scores(&self) -> BTreeMap<SectorCode, f64> {
        self.sectors
            .iter()
            .map(|(code, s)| (code.clone(), s.score))
            .collect()
    }

    pub fn score_of(&self, sector: &SectorCode) -> f64 {
        self.sectors.get(sector).map(|s| s.score).unwrap_or(0.0)
    }

    /// Sectors ranked by score, highest first, limited to those above `floor`.
    pub fn bullish(&self, floor: f64, limit: usize) -> Vec<&SectorSentiment> {
        let mut ranked: Vec<&SectorSentiment> =
            self.sectors.values().filter(|s| s.score > floor).collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.sector.cmp(&b.sector)));
        ranked.truncate(limit);
        ranked
    }

    /// Sectors ranked by score, lowest first, limited to those below `ceiling`.
    pub fn bearish(&self, ceiling: f64, limit: usize) -> Vec<&SectorSentiment> {
        let mut ranked: Vec<&SectorSentiment> =
            self.sectors.values().filter(|s| s.score < ceiling).collect();
        ranked.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.sector.cmp(&b.sector)));
        ranked.truncate(limit);
        ranked
    }

    /// Most recent headlines tagged with `sector`, newest first when timestamps exist.
    pub fn headlines_for(&self, sector: &SectorCode, limit: usize) -> Vec<&Headline> {
        let mut matching: Vec<&Headline> = self
            .headlines
            .iter()
            .filter(|h| h.sectors.contains(sector))
            .collect();
        matching.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        matching.truncate(limit);
        matching
    }
}

/// A tradable instrument offered as a candidate within a sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub ticker: String,
    pub name: String,
    /// Short focus tag shown to the selection model, e.g. "cloud" or "semis"
    #[serde(default)]
    pub focus: String,
}

/// Static description of one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorDefinition {
    pub code: SectorCode,
    pub name: String,
    /// Lower-case keywords used to tag headlines
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Instrument used when selection fails; defaults to the sector code itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Extra guidance appended to the selection system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_prompt: Option<String>,
    /// Replaces the generic headline scoring system prompt for this sector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_prompt: Option<String>,
}

impl SectorDefinition {
    pub fn benchmark_ticker(&self) -> String {
        self.benchmark
            .clone()
            .unwrap_or_else(|| self.code.as_str().to_string())
    }

    pub fn has_ticker(&self, ticker: &str) -> bool {
        self.assets.iter().any(|a| a.ticker.eq_ignore_ascii_case(ticker))
    }
}

/// Catalog of tracked sectors and their candidate assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorCatalog {
    pub sectors: Vec<SectorDefinition>,
}

impl SectorCatalog {
    pub fn new(sectors: Vec<SectorDefinition>) -> Self {
        Self { sectors }
    }

    pub fn get(&self, code: &SectorCode) -> Option<&SectorDefinition> {
        self.sectors.iter().find(|s| &s.code == code)
    }

    /// Tracked sector codes in catalog order.
    pub fn codes(&self) -> Vec<SectorCode> {
        self.sectors.iter().map(|s| s.code.clone()).collect()
    }

    pub fn candidates(&self, code: &SectorCode) -> &[Asset] {
        self.get(code).map(|s| s.assets.as_slice()).unwrap_or(&[])
    }

    /// Keyword map consumed by headline classification.
    pub fn keyword_map(&self) -> BTreeMap<SectorCode, Vec<String>> {
        self.sectors
            .iter()
            .filter(|s| !s.keywords.is_empty())
            .map(|s| {
                let keywords = s.keywords.iter().map(|k| k.to_lowercase()).collect();
                (s.code.clone(), keywords)
            })
            .collect()
    }

    /// Benchmark instrument for `code`; the code itself when the sector is unknown.
    pub fn benchmark_for(&self, code: &SectorCode) -> String {
        self.get(code)
            .map(SectorDefinition::benchmark_ticker)
            .unwrap_or_else(|| code.as_str().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }
}
