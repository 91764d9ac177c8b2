// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Market
//!
//! Company profiles and realized price history, the two kinds of market context
//! the pipeline reads but does not own.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Ports for company context and realized returns

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::allocation::Allocation;

/// Qualitative description of one company, used as Phase 2 context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub ticker: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub business_model: String,
    #[serde(default)]
    pub key_products: Vec<String>,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub market_position: String,
    /// Free-form volatility label, e.g. "high"
    #[serde(default)]
    pub volatility: String,
    #[serde(default, alias = "sentiment_keywords")]
    pub sentiment_factors: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub catalysts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl CompanyProfile {
    /// A profile is stale when it was never stamped or is older than `max_age`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match self.updated {
            Some(updated) => now - updated > max_age,
            None => true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("Market data unavailable: {0}")]
    Unavailable(String),

    #[error("Market data malformed: {0}")]
    Malformed(String),
}

/// Read/write access to stored company profiles.
#[async_trait]
pub trait CompanyProfileStore: Send + Sync {
    async fn get(&self, ticker: &str) -> Result<Option<CompanyProfile>, MarketDataError>;

    async fn put(&self, profile: CompanyProfile) -> Result<(), MarketDataError>;

    /// Tickers from `tickers` with no profile, and those whose profile is stale.
    async fn coverage(
        &self,
        tickers: &[String],
        now: DateTime<Utc>,
        max_age: chrono::Duration,
    ) -> Result<ProfileCoverage, MarketDataError> {
        let mut coverage = ProfileCoverage::default();
        for ticker in tickers {
            match self.get(ticker).await? {
                None => coverage.missing.push(ticker.clone()),
                Some(profile) if profile.is_stale(now, max_age) => {
                    coverage.outdated.push(ticker.clone())
                }
                Some(_) => coverage.fresh.push(ticker.clone()),
            }
        }
        Ok(coverage)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileCoverage {
    pub fresh: Vec<String>,
    pub outdated: Vec<String>,
    pub missing: Vec<String>,
}

impl ProfileCoverage {
    pub fn total(&self) -> usize {
        self.fresh.len() + self.outdated.len() + self.missing.len()
    }

    /// Share of tickers with a usable profile, stale or not.
    pub fn ratio(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.fresh.len() + self.outdated.len()) as f64 / self.total() as f64
        }
    }

    /// Missing tickers first, then outdated ones.
    pub fn needing_fetch(&self) -> impl Iterator<Item = &String> {
        self.missing.iter().chain(self.outdated.iter())
    }
}

/// Realized price movements.
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Fractional change of `ticker` between the first close on or after `start`
    /// and the last close on or before `end`. `None` when data is missing.
    async fn price_change(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<f64>, MarketDataError>;

    /// Weighted percent return of `allocation` over the window.
    ///
    /// Weights are renormalized over tickers that have data; `None` when no
    /// ticker has data.
    async fn return_over(
        &self,
        allocation: &Allocation,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<f64>, MarketDataError> {
        let mut weighted = 0.0;
        let mut covered = 0.0;
        for (ticker, weight) in allocation.fractions() {
            if let Some(change) = self.price_change(&ticker, start, end).await? {
                weighted += change * weight;
                covered += weight;
            }
        }
        Ok((covered > 0.0).then(|| weighted / covered * 100.0))
    }
}
