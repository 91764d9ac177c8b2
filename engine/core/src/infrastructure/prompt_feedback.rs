// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Persisted Prompt Feedback
//
// Keeps the per-sector prompt ledger in the snapshot store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::prompt_feedback::{
    PromptFeedback, PromptLedger, UNDERPERFORMING_ACCURACY_PCT, UNDERPERFORMING_MIN_PREDICTIONS,
};
use crate::domain::repository::{keys, load_snapshot, update_snapshot, RepositoryError, SnapshotStore};
use crate::domain::sector::SectorCode;

pub struct StorePromptFeedback {
    store: Arc<dyn SnapshotStore>,
}

impl StorePromptFeedback {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PromptFeedback for StorePromptFeedback {
    async fn record_outcomes(
        &self,
        outcomes: &BTreeMap<SectorCode, bool>,
    ) -> Result<Vec<SectorCode>, RepositoryError> {
        let (ledger, _) = update_snapshot(
            self.store.as_ref(),
            keys::PROMPT_PERFORMANCE,
            PromptLedger::default,
            |ledger: &mut PromptLedger| {
                for (sector, correct) in outcomes {
                    ledger.record(sector, *correct);
                }
            },
        )
        .await?;

        let flagged: Vec<SectorCode> = ledger
            .underperforming(UNDERPERFORMING_ACCURACY_PCT, UNDERPERFORMING_MIN_PREDICTIONS)
            .into_iter()
            .filter(|(sector, _)| outcomes.contains_key(sector))
            .map(|(sector, accuracy)| {
                tracing::warn!(sector = %sector, accuracy, "Scoring prompt underperforming");
                sector
            })
            .collect();
        Ok(flagged)
    }

    async fn underperforming(
        &self,
        threshold_pct: f64,
        min_predictions: u64,
    ) -> Result<Vec<(SectorCode, f64)>, RepositoryError> {
        let ledger = load_snapshot::<PromptLedger>(self.store.as_ref(), keys::PROMPT_PERFORMANCE)
            .await?
            .map(|v| v.value)
            .unwrap_or_default();
        Ok(ledger.underperforming(threshold_pct, min_predictions))
    }
}
