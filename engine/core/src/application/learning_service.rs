// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Learning Service
//!
//! Daily learning cycle: judges the latest sector sentiment against realized
//! sector moves, updates sensitivity multipliers and source weights, and
//! reports per-sector correctness to the prompt feedback capability.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Interval-gated read-modify-write of the learning model

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::config::ConfigurationError;
use crate::domain::learning::{LearningEvent, LearningModel, PredictionOutcome};
use crate::domain::prompt_feedback::PromptFeedback;
use crate::domain::repository::{keys, load_snapshot, save_snapshot, update_snapshot, SnapshotStore};
use crate::domain::schedule::{should_run, JobRun};
use crate::domain::sector::{SectorCatalog, SectorCode, SentimentSnapshot};

pub const DAILY_LEARNING_JOB: &str = "daily_learning";

#[derive(Debug, Clone)]
pub enum LearningOutcome {
    Learned(LearningEvent),
    /// The interval has not elapsed since the last cycle.
    NotDue {
        last_run: DateTime<Utc>,
        next_due: DateTime<Utc>,
    },
}

pub struct LearningService {
    catalog: Arc<SectorCatalog>,
    snapshots: Arc<dyn SnapshotStore>,
    prompt_feedback: Arc<dyn PromptFeedback>,
    interval: Duration,
}

impl LearningService {
    pub fn new(
        catalog: Arc<SectorCatalog>,
        snapshots: Arc<dyn SnapshotStore>,
        prompt_feedback: Arc<dyn PromptFeedback>,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            snapshots,
            prompt_feedback,
            interval,
        }
    }

    /// Stored model, or a neutral one for the catalog's sectors.
    pub async fn model(&self) -> Result<LearningModel> {
        Ok(
            load_snapshot::<LearningModel>(self.snapshots.as_ref(), keys::LEARNING_MODEL)
                .await
                .context("Failed to load learning model")?
                .map(|v| v.value)
                .unwrap_or_else(|| LearningModel::new(self.catalog.codes())),
        )
    }

    async fn last_run(&self) -> Result<Option<DateTime<Utc>>> {
        let job = load_snapshot::<JobRun>(self.snapshots.as_ref(), &keys::schedule(DAILY_LEARNING_JOB)).await?;
        match job {
            Some(job) => Ok(Some(job.value.last_run)),
            None => Ok(self.model().await?.last_learning),
        }
    }

    /// Run the daily cycle against `outcomes` (sector percent moves).
    ///
    /// Skipped when the last cycle is younger than the interval unless `force` is set.
    pub async fn daily_learn(
        &self,
        outcomes: &BTreeMap<SectorCode, f64>,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<LearningOutcome> {
        let last_run = self.last_run().await?;
        if !force && !should_run(now, last_run, self.interval) {
            if let Some(last_run) = last_run {
                info!(%last_run, "Daily learning not due yet");
                return Ok(LearningOutcome::NotDue {
                    last_run,
                    next_due: last_run + self.interval,
                });
            }
        }

        let snapshot = load_snapshot::<SentimentSnapshot>(self.snapshots.as_ref(), keys::LATEST_SENTIMENT)
            .await?
            .map(|v| v.value)
            .ok_or_else(|| ConfigurationError::MissingData("no sentiment snapshot to learn from".to_string()))?;

        let correctness: BTreeMap<SectorCode, bool> = snapshot
            .sectors
            .iter()
            .filter_map(|(sector, s)| {
                outcomes
                    .get(sector)
                    .map(|actual| (sector.clone(), PredictionOutcome::judge(s.score, *actual).is_correct()))
            })
            .collect();

        let flagged = match self.prompt_feedback.record_outcomes(&correctness).await {
            Ok(flagged) => flagged,
            Err(e) => {
                warn!("Prompt feedback unavailable: {}", e);
                Vec::new()
            }
        };

        let codes = self.catalog.codes();
        let (_, event) = update_snapshot(
            self.snapshots.as_ref(),
            keys::LEARNING_MODEL,
            || LearningModel::new(codes.clone()),
            |model: &mut LearningModel| {
                let mut event = model.learn(&snapshot, outcomes, now);
                event.prompts_flagged = flagged.clone();
                if let Some(last) = model.history.back_mut() {
                    last.prompts_flagged = flagged.clone();
                }
                event
            },
        )
        .await
        .context("Failed to update learning model")?;

        save_snapshot(
            self.snapshots.as_ref(),
            &keys::schedule(DAILY_LEARNING_JOB),
            &JobRun {
                job: DAILY_LEARNING_JOB.to_string(),
                last_run: now,
            },
        )
        .await?;

        info!(
            correct = event.correct,
            total = event.total,
            sources = event.source_updates.len(),
            flagged = event.prompts_flagged.len(),
            lifetime_accuracy = ?event.lifetime_accuracy,
            "Daily learning complete"
        );
        Ok(LearningOutcome::Learned(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prompt_feedback::NoopPromptFeedback;
    use crate::domain::sector::{SectorDefinition, SectorSentiment, Signal};
    use crate::infrastructure::prompt_feedback::StorePromptFeedback;
    use crate::infrastructure::repositories::InMemorySnapshotStore;

    fn catalog() -> Arc<SectorCatalog> {
        Arc::new(SectorCatalog::new(
            ["XLK", "XLE"]
                .iter()
                .map(|code| SectorDefinition {
                    code: SectorCode::from(*code),
                    name: code.to_string(),
                    keywords: vec![],
                    benchmark: None,
                    assets: vec![],
                    selection_prompt: None,
                    scoring_prompt: None,
                })
                .collect(),
        ))
    }

    async fn store_with_sentiment(scores: &[(&str, f64)]) -> Arc<InMemorySnapshotStore> {
        let store = Arc::new(InMemorySnapshotStore::new());
        let snapshot = SentimentSnapshot {
            generated_at: Utc::now(),
            sectors: scores
                .iter()
                .map(|(code, score)| {
                    let code = SectorCode::from(*code);
                    (
                        code.clone(),
                        SectorSentiment {
                            sector: code,
                            score: *score,
                            count: 3,
                            signal: Signal::from_score(*score),
                            model_scored: 3,
                            keyword_scored: 0,
                            top_positive: vec![],
                            top_negative: vec![],
                        },
                    )
                })
                .collect(),
            headlines: vec![],
        };
        save_snapshot(store.as_ref(), keys::LATEST_SENTIMENT, &snapshot).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_daily_learn_updates_multipliers_once_per_interval() {
        let store = store_with_sentiment(&[("XLK", 0.5), ("XLE", 0.4)]).await;
        let service = LearningService::new(catalog(), store, Arc::new(NoopPromptFeedback), Duration::days(1));
        let outcomes = BTreeMap::from([(SectorCode::from("XLK"), 1.5), (SectorCode::from("XLE"), -2.0)]);
        let now = Utc::now();

        let LearningOutcome::Learned(event) = service.daily_learn(&outcomes, now, false).await.unwrap() else {
            panic!("first cycle must run");
        };
        assert_eq!((event.correct, event.total), (1, 2));
        assert_eq!(event.lifetime_accuracy, Some(0.5));

        let model = service.model().await.unwrap();
        assert!((model.multiplier(&SectorCode::from("XLK")) - 1.02).abs() < 1e-9);
        assert!((model.multiplier(&SectorCode::from("XLE")) - 0.98).abs() < 1e-9);
        assert_eq!(model.history.len(), 1);

        let again = service
            .daily_learn(&outcomes, now + Duration::hours(3), false)
            .await
            .unwrap();
        assert!(matches!(again, LearningOutcome::NotDue { .. }));

        let forced = service
            .daily_learn(&outcomes, now + Duration::hours(3), true)
            .await
            .unwrap();
        let LearningOutcome::Learned(forced) = forced else {
            panic!("forced cycle must run");
        };
        // Same outcomes again: one more right, one more wrong
        assert_eq!(forced.lifetime_accuracy, Some(0.5));
        assert_eq!(service.model().await.unwrap().history.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_sentiment_is_configuration_error() {
        let service = LearningService::new(
            catalog(),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(NoopPromptFeedback),
            Duration::days(1),
        );
        let err = service
            .daily_learn(&BTreeMap::new(), Utc::now(), false)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }

    #[tokio::test]
    async fn test_prompt_flags_land_in_history() {
        let store = store_with_sentiment(&[("XLK", 0.5)]).await;
        let feedback = Arc::new(StorePromptFeedback::new(store.clone()));
        let service = LearningService::new(catalog(), store, feedback, Duration::days(1));
        let wrong = BTreeMap::from([(SectorCode::from("XLK"), -3.0)]);

        let mut now = Utc::now();
        let mut last = None;
        for _ in 0..10 {
            last = Some(service.daily_learn(&wrong, now, false).await.unwrap());
            now += Duration::days(1);
        }
        let Some(LearningOutcome::Learned(event)) = last else {
            panic!("tenth cycle must run");
        };
        assert_eq!(event.prompts_flagged, vec![SectorCode::from("XLK")]);
        let model = service.model().await.unwrap();
        assert_eq!(model.history.back().unwrap().prompts_flagged, vec![SectorCode::from("XLK")]);
        // Ten misses in a row: 0.98^10, clamped well above the floor
        assert!(model.multiplier(&SectorCode::from("XLK")) < 0.85);
    }
}
