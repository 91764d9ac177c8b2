// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! News
//!
//! Ports for headline intake, per-headline scoring, and recent-news lookup.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Boundaries between the pipeline and news collaborators

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::llm::LLMError;
use super::sector::{Headline, RawHeadline, ScoreProvenance, SectorCode};

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Scoring backend failed: {0}")]
    Backend(#[from] LLMError),

    #[error("Scoring timed out after {0}s")]
    Timeout(u64),

    #[error("Unusable score response: {0}")]
    Unparseable(String),
}

/// Scores one headline on [-1, 1].
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, text: &str, sector: Option<&SectorCode>) -> Result<f64, ScoringError>;

    /// Provenance stamped on headlines this scorer produced.
    fn provenance(&self) -> ScoreProvenance;
}

#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    #[error("News source unavailable: {0}")]
    Unavailable(String),
}

/// A finite, restartable sequence of raw headlines.
pub trait NewsSource: Send + Sync {
    /// Start a fresh pass over the source's current headlines.
    fn headlines(&self) -> BoxStream<'_, Result<RawHeadline, NewsError>>;
}

/// Latest scored headlines per sector, used as Phase 2 context.
#[async_trait]
pub trait RecentNews: Send + Sync {
    async fn recent(&self, sector: &SectorCode, limit: usize) -> Vec<Headline>;
}
