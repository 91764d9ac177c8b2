// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Two-Phase Pipeline
//!
//! Orchestrates one scenario run: Phase 1 turns the latest sector sentiment
//! into per-sector selections, Phase 2 refines them with company context,
//! gates adjustments on the learned confidence threshold, and logs every
//! decision for later evaluation.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Scenario run orchestration and persistence of its results

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::allocation_engine::AllocationEngine;
use crate::application::feedback_learner::FeedbackLearner;
use crate::application::profile_service::{ProfileRefresh, ProfileService};
use crate::application::refinement_engine::RefinementEngine;
use crate::domain::allocation::{AllocationDecision, SelectionSource};
use crate::domain::config::{AllocationSettings, ConfigurationError};
use crate::domain::learning::LearningModel;
use crate::domain::refinement::{apply_gate, AppliedAction, RefinementDecision};
use crate::domain::repository::{keys, load_snapshot, save_snapshot, streams, RecordLog, SnapshotStore};
use crate::domain::scenario::{Scenario, ScenarioAllocator, SectorWeights};
use crate::domain::sector::{SectorCode, SentimentSnapshot};

/// Persisted Phase 1 output for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase1Run {
    pub scenario: Scenario,
    pub generated_at: DateTime<Utc>,
    /// Sentiment snapshot the run was computed from
    pub sentiment_at: DateTime<Utc>,
    pub weights: SectorWeights,
    pub decisions: Vec<AllocationDecision>,
}

/// Refinement and gate result for one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRefinement {
    pub refinement: RefinementDecision,
    pub applied: AppliedAction,
}

/// Persisted final allocation for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAllocation {
    pub scenario: Scenario,
    pub generated_at: DateTime<Utc>,
    pub threshold: f64,
    pub decisions: Vec<AllocationDecision>,
    pub refinements: Vec<SectorRefinement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Phase1Report {
    pub sectors: usize,
    pub structured: usize,
    pub extracted: usize,
    pub fallbacks: usize,
    /// Sectors inside the neutral band, left unallocated
    pub skipped: Vec<SectorCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Phase2Report {
    pub refined: usize,
    pub adjusted: usize,
    pub kept: usize,
    pub kept_low_conf: usize,
    pub threshold: f64,
    pub profiles: ProfileRefresh,
    pub log_failures: usize,
}

pub struct TwoPhasePipeline {
    allocator: ScenarioAllocator,
    selection: Arc<AllocationEngine>,
    refinement: Arc<RefinementEngine>,
    feedback: Arc<FeedbackLearner>,
    profiles: Option<Arc<ProfileService>>,
    snapshots: Arc<dyn SnapshotStore>,
    records: Arc<dyn RecordLog>,
    settings: AllocationSettings,
}

impl TwoPhasePipeline {
    pub fn new(
        allocator: ScenarioAllocator,
        selection: Arc<AllocationEngine>,
        refinement: Arc<RefinementEngine>,
        feedback: Arc<FeedbackLearner>,
        snapshots: Arc<dyn SnapshotStore>,
        records: Arc<dyn RecordLog>,
        settings: AllocationSettings,
    ) -> Self {
        Self {
            allocator,
            selection,
            refinement,
            feedback,
            profiles: None,
            snapshots,
            records,
            settings,
        }
    }

    /// Generate missing company profiles before each Phase 2.
    pub fn with_profiles(mut self, profiles: Arc<ProfileService>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    async fn latest_sentiment(&self) -> Result<SentimentSnapshot> {
        load_snapshot::<SentimentSnapshot>(self.snapshots.as_ref(), keys::LATEST_SENTIMENT)
            .await
            .context("Failed to load latest sentiment")?
            .map(|v| v.value)
            .ok_or_else(|| {
                ConfigurationError::MissingData("no sentiment snapshot; run a harvest first".to_string()).into()
            })
    }

    async fn learning_model(&self) -> Result<LearningModel> {
        Ok(
            load_snapshot::<LearningModel>(self.snapshots.as_ref(), keys::LEARNING_MODEL)
                .await
                .context("Failed to load learning model")?
                .map(|v| v.value)
                .unwrap_or_else(|| LearningModel::new(self.allocator.sectors().iter().cloned())),
        )
    }

    /// Sector weights for `scenario` from the latest sentiment and learned multipliers.
    pub async fn weights(&self, scenario: Scenario) -> Result<SectorWeights> {
        let sentiment = self.latest_sentiment().await?;
        let model = self.learning_model().await?;
        Ok(self
            .allocator
            .weights_with_model(scenario, &sentiment.scores(), &model))
    }

    async fn log_run(&self, phase: &str, scenario: Scenario, details: serde_json::Value) {
        let mut entry = json!({
            "timestamp": Utc::now(),
            "phase": phase,
            "scenario": scenario,
        });
        if let (Some(entry), serde_json::Value::Object(details)) = (entry.as_object_mut(), details) {
            entry.extend(details);
        }
        if let Err(e) = self.records.append(streams::RUN_LOG, entry).await {
            warn!(phase, %scenario, "Failed to append run log: {}", e);
        }
    }

    pub async fn run_phase1(&self, scenario: Scenario) -> Result<(Phase1Run, Phase1Report)> {
        let sentiment = self.latest_sentiment().await?;
        let model = self.learning_model().await?;
        let weights = self
            .allocator
            .weights_with_model(scenario, &sentiment.scores(), &model);
        let capital = self.settings.capital_per_scenario;
        let band = self.settings.neutral_skip_band;

        let mut report = Phase1Report::default();
        let mut work = Vec::new();
        for (sector, weight) in &weights {
            let score = sentiment.score_of(sector);
            if band > 0.0 && score.abs() < band && scenario != Scenario::SpyOnly {
                report.skipped.push(sector.clone());
                continue;
            }
            work.push((sector.clone(), score, weight / 100.0 * capital));
        }

        let index_ticker = self.allocator.params().index_ticker.clone();
        let concurrency = self.settings.refinement_concurrency.max(1);
        let decisions: Vec<AllocationDecision> = stream::iter(work)
            .map(|(sector, score, budget)| {
                let index_ticker = index_ticker.clone();
                async move {
                    if scenario == Scenario::SpyOnly {
                        AllocationDecision::etf_fallback(
                            sector,
                            index_ticker,
                            score,
                            scenario,
                            budget,
                            "Index-only scenario",
                        )
                    } else {
                        self.selection.select_or_fallback(&sector, score, scenario, budget).await
                    }
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        for decision in &decisions {
            match decision.source {
                SelectionSource::Structured => report.structured += 1,
                SelectionSource::TickerExtraction => report.extracted += 1,
                SelectionSource::EtfFallback => report.fallbacks += 1,
            }
        }
        report.sectors = decisions.len();

        let run = Phase1Run {
            scenario,
            generated_at: Utc::now(),
            sentiment_at: sentiment.generated_at,
            weights,
            decisions,
        };
        save_snapshot(self.snapshots.as_ref(), &keys::phase1(scenario), &run)
            .await
            .context("Failed to persist Phase 1 allocations")?;

        self.log_run(
            "phase1",
            scenario,
            json!({
                "sectors_processed": report.sectors,
                "fallbacks": report.fallbacks,
                "skipped": report.skipped.len(),
            }),
        )
        .await;
        info!(
            %scenario,
            sectors = report.sectors,
            fallbacks = report.fallbacks,
            "Phase 1 complete"
        );
        Ok((run, report))
    }

    pub async fn run_phase2(&self, scenario: Scenario) -> Result<(FinalAllocation, Phase2Report)> {
        let phase1 = load_snapshot::<Phase1Run>(self.snapshots.as_ref(), &keys::phase1(scenario))
            .await
            .context("Failed to load Phase 1 allocations")?
            .map(|v| v.value)
            .ok_or_else(|| ConfigurationError::MissingData(format!("no Phase 1 allocations for {}", scenario)))?;

        let mut report = Phase2Report::default();
        let now = Utc::now();

        if let Some(profiles) = &self.profiles {
            let mut seen = BTreeSet::new();
            let tickers: Vec<(String, SectorCode)> = phase1
                .decisions
                .iter()
                .flat_map(|d| d.selected_assets.iter().map(move |a| (a.ticker.clone(), d.sector.clone())))
                .filter(|(ticker, _)| seen.insert(ticker.clone()))
                .collect();
            report.profiles = match profiles.refresh(&tickers, now).await {
                Ok(refresh) => refresh,
                Err(e) => {
                    warn!(%scenario, "Profile refresh failed: {:#}", e);
                    ProfileRefresh::default()
                }
            };
        }

        let concurrency = self.settings.refinement_concurrency.max(1);
        let refinements: Vec<RefinementDecision> = stream::iter(phase1.decisions.iter())
            .map(|decision| self.refinement.refine(decision))
            .buffered(concurrency)
            .collect()
            .await;

        let threshold = self.feedback.threshold().await?;
        report.threshold = threshold;

        let mut decisions = phase1.decisions.clone();
        let mut gated = Vec::with_capacity(refinements.len());
        for (decision, refinement) in decisions.iter_mut().zip(refinements) {
            let gate = apply_gate(&refinement, threshold);
            if let Err(e) = self.feedback.log_decision(&refinement, &gate, now).await {
                warn!(sector = %refinement.sector, "{:#}", e);
                report.log_failures += 1;
            }
            match gate.action {
                AppliedAction::Adjust => {
                    decision.apply_allocation(&gate.final_allocation, &refinement.reasoning);
                    report.adjusted += 1;
                }
                AppliedAction::Keep => report.kept += 1,
                AppliedAction::KeepLowConf => {
                    info!(
                        sector = %refinement.sector,
                        confidence = refinement.confidence,
                        threshold,
                        "Adjustment below confidence threshold, keeping Phase 1"
                    );
                    report.kept_low_conf += 1;
                }
            }
            gated.push(SectorRefinement {
                refinement,
                applied: gate.action,
            });
        }
        report.refined = gated.len();

        let result = FinalAllocation {
            scenario,
            generated_at: now,
            threshold,
            decisions,
            refinements: gated,
        };
        save_snapshot(self.snapshots.as_ref(), &keys::final_allocation(scenario), &result)
            .await
            .context("Failed to persist final allocations")?;

        self.log_run(
            "phase2",
            scenario,
            json!({
                "sectors_refined": report.refined,
                "adjustments": report.adjusted,
                "kept_low_conf": report.kept_low_conf,
                "profiles_fetched": report.profiles.fetched.len(),
            }),
        )
        .await;
        info!(
            %scenario,
            adjusted = report.adjusted,
            kept = report.kept,
            kept_low_conf = report.kept_low_conf,
            "Phase 2 complete"
        );
        Ok((result, report))
    }

    /// Phase 1 then Phase 2.
    pub async fn run(&self, scenario: Scenario) -> Result<(Phase1Report, FinalAllocation, Phase2Report)> {
        let (_, phase1) = self.run_phase1(scenario).await?;
        let (result, phase2) = self.run_phase2(scenario).await?;
        Ok((phase1, result, phase2))
    }

    /// Last persisted final allocation for `scenario`.
    pub async fn final_allocation(&self, scenario: Scenario) -> Result<Option<FinalAllocation>> {
        Ok(
            load_snapshot::<FinalAllocation>(self.snapshots.as_ref(), &keys::final_allocation(scenario))
                .await?
                .map(|v| v.value),
        )
    }
}
