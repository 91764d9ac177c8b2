// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sentiment Service
//!
//! One harvest cycle: read a news source, collapse syndicated duplicates,
//! tag sectors, score headlines through a bounded pool with per-item keyword
//! fallback, aggregate per sector and persist the snapshot.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates headline intake and sector aggregation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::config::{ConfigurationError, SentimentSettings};
use crate::domain::learning::LearningModel;
use crate::domain::news::{NewsSource, ScoringError, SentimentScorer};
use crate::domain::repository::{keys, load_snapshot, save_snapshot, streams, RecordLog, SnapshotStore};
use crate::domain::sector::{
    Headline, RawHeadline, ScoreProvenance, SectorCatalog, SectorCode, SentimentSnapshot,
};
use crate::domain::sentiment::{aggregate, aggregate_weighted, classify_sectors, keyword_score};

/// Counts from one harvest cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestReport {
    pub received: usize,
    pub duplicates: usize,
    pub source_errors: usize,
    pub model_scored: usize,
    pub keyword_scored: usize,
    pub sectors: usize,
}

/// Compact per-cycle record kept in the sentiment history stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentHistoryEntry {
    pub generated_at: DateTime<Utc>,
    pub headlines: usize,
    pub scores: BTreeMap<SectorCode, f64>,
}

pub struct SentimentService {
    catalog: Arc<SectorCatalog>,
    /// `None` scores everything with the keyword lexicon
    scorer: Option<Arc<dyn SentimentScorer>>,
    snapshots: Arc<dyn SnapshotStore>,
    records: Arc<dyn RecordLog>,
    settings: SentimentSettings,
}

impl SentimentService {
    pub fn new(
        catalog: Arc<SectorCatalog>,
        scorer: Option<Arc<dyn SentimentScorer>>,
        snapshots: Arc<dyn SnapshotStore>,
        records: Arc<dyn RecordLog>,
        settings: SentimentSettings,
    ) -> Self {
        Self {
            catalog,
            scorer,
            snapshots,
            records,
            settings,
        }
    }

    pub async fn harvest(&self, source: &dyn NewsSource) -> Result<(SentimentSnapshot, HarvestReport)> {
        let mut report = HarvestReport::default();
        let raw = self.collect(source, &mut report).await;
        info!(
            received = report.received,
            duplicates = report.duplicates,
            "Collected headlines"
        );
        if raw.is_empty() {
            // Leave the previous snapshot in place rather than publishing all-zero scores
            return Err(ConfigurationError::MissingData("news source yielded no headlines".to_string()).into());
        }

        let keyword_map = self.catalog.keyword_map();
        let tagged: Vec<(RawHeadline, Vec<SectorCode>)> = raw
            .into_iter()
            .map(|h| {
                let sectors = classify_sectors(&h.title, &keyword_map);
                (h, sectors)
            })
            .collect();

        let headlines = self.score_all(tagged).await;
        for headline in &headlines {
            match headline.provenance {
                ScoreProvenance::Model => report.model_scored += 1,
                ScoreProvenance::Keyword => report.keyword_scored += 1,
            }
        }

        let sectors = if self.settings.weight_by_source {
            let model = load_snapshot::<LearningModel>(self.snapshots.as_ref(), keys::LEARNING_MODEL)
                .await
                .context("Failed to load learning model for source weights")?
                .map(|v| v.value)
                .unwrap_or_default();
            aggregate_weighted(&headlines, &keyword_map, &model.source_weights)
        } else {
            aggregate(&headlines, &keyword_map)
        };
        report.sectors = sectors.len();

        let snapshot = SentimentSnapshot {
            generated_at: Utc::now(),
            sectors,
            headlines,
        };

        save_snapshot(self.snapshots.as_ref(), keys::LATEST_SENTIMENT, &snapshot)
            .await
            .context("Failed to persist latest sentiment")?;

        let entry = SentimentHistoryEntry {
            generated_at: snapshot.generated_at,
            headlines: snapshot.headlines.len(),
            scores: snapshot.scores(),
        };
        self.records
            .append(streams::SENTIMENT_HISTORY, serde_json::to_value(&entry)?)
            .await
            .context("Failed to append sentiment history")?;

        info!(
            sectors = report.sectors,
            model_scored = report.model_scored,
            keyword_scored = report.keyword_scored,
            "Sentiment harvest complete"
        );
        Ok((snapshot, report))
    }

    pub async fn latest(&self) -> Result<Option<SentimentSnapshot>> {
        Ok(
            load_snapshot::<SentimentSnapshot>(self.snapshots.as_ref(), keys::LATEST_SENTIMENT)
                .await?
                .map(|v| v.value),
        )
    }

    async fn collect(&self, source: &dyn NewsSource, report: &mut HarvestReport) -> Vec<RawHeadline> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        let mut items = source.headlines();
        while let Some(item) = items.next().await {
            match item {
                Ok(headline) => {
                    report.received += 1;
                    if headline.title.trim().is_empty() {
                        continue;
                    }
                    if seen.insert(headline.dedup_key()) {
                        unique.push(headline);
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(e) => {
                    report.source_errors += 1;
                    warn!("Skipping news item: {}", e);
                }
            }
        }
        unique
    }

    /// Score every headline; results keep input order.
    async fn score_all(&self, tagged: Vec<(RawHeadline, Vec<SectorCode>)>) -> Vec<Headline> {
        let total = tagged.len();
        let mut slots: Vec<Option<Headline>> = vec![None; total];
        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let concurrency = self.settings.concurrency.max(1);
        let use_model = self.settings.use_model;

        let mut scored = stream::iter(tagged.into_iter().enumerate())
            .map(|(index, (raw, sectors))| async move {
                let primary = sectors.iter().find(|s| !s.is_general()).cloned();
                let result = match (&self.scorer, use_model) {
                    (Some(scorer), true) => {
                        match tokio::time::timeout(timeout, scorer.score(&raw.title, primary.as_ref())).await {
                            Ok(result) => result.map(|score| (score, scorer.provenance())),
                            Err(_) => Err(ScoringError::Timeout(timeout.as_secs())),
                        }
                    }
                    _ => Ok((keyword_score(&raw.title), ScoreProvenance::Keyword)),
                };
                let (score, provenance) = match result {
                    Ok(scored) => scored,
                    Err(e) => {
                        warn!(title = %raw.title, "Scoring failed, using keyword fallback: {}", e);
                        (keyword_score(&raw.title), ScoreProvenance::Keyword)
                    }
                };
                debug!(index, score, "Scored headline");
                (index, Headline::scored(raw, score, provenance).with_sectors(sectors))
            })
            .buffer_unordered(concurrency);

        while let Some((index, headline)) = scored.next().await {
            slots[index] = Some(headline);
        }
        slots.into_iter().flatten().collect()
    }
}
