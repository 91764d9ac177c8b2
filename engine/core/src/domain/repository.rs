// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository
//!
//! Persistence contracts: versioned latest-value snapshots, append-only record
//! logs, and the decision log whose evaluation flag flips exactly once.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Storage-agnostic persistence ports

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::feedback::{DecisionRecord, EvaluationRecord};

/// Well-known snapshot keys.
pub mod keys {
    use crate::domain::scenario::Scenario;

    pub const LATEST_SENTIMENT: &str = "sentiment/latest";
    pub const LEARNING_MODEL: &str = "learning/model";
    pub const FEEDBACK_CONFIG: &str = "feedback/config";
    pub const PROMPT_PERFORMANCE: &str = "learning/prompt_performance";

    pub fn phase1(scenario: Scenario) -> String {
        format!("phase1/{}", scenario)
    }

    pub fn final_allocation(scenario: Scenario) -> String {
        format!("final/{}", scenario)
    }

    pub fn schedule(job: &str) -> String {
        format!("schedule/{}", job)
    }
}

/// Well-known record log streams.
pub mod streams {
    pub const SENTIMENT_HISTORY: &str = "sentiment_history";
    pub const RUN_LOG: &str = "run_log";
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Version conflict on '{key}': expected {expected:?}, found {found:?}")]
    Conflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("Store is locked: {0}")]
    Locked(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// A stored value and the version it was written at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub value: T,
}

/// Latest-value store with optimistic versioning.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Versioned<serde_json::Value>>, RepositoryError>;

    /// Write `value` if the stored version equals `expected_version`
    /// (`None` meaning "absent"). Returns the new version.
    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64, RepositoryError>;

    async fn delete(&self, key: &str) -> Result<(), RepositoryError>;
}

/// Append-only log of JSON records, one stream per name.
#[async_trait]
pub trait RecordLog: Send + Sync {
    async fn append(&self, stream: &str, record: serde_json::Value) -> Result<(), RepositoryError>;

    async fn read_all(&self, stream: &str) -> Result<Vec<serde_json::Value>, RepositoryError>;
}

/// Log of gated Phase 2 decisions and their evaluations.
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn append(&self, record: &DecisionRecord) -> Result<(), RepositoryError>;

    async fn find_all(&self) -> Result<Vec<DecisionRecord>, RepositoryError>;

    /// Unevaluated decisions logged before `cutoff`.
    async fn find_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<DecisionRecord>, RepositoryError> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|d| !d.evaluated && d.logged_at < cutoff)
            .collect())
    }

    /// Mark the decision evaluated and store its evaluation as one step.
    ///
    /// Returns `false` without writing anything when the decision was already
    /// evaluated or has an evaluation on record.
    async fn record_evaluation(&self, evaluation: &EvaluationRecord) -> Result<bool, RepositoryError>;

    async fn evaluations(&self) -> Result<Vec<EvaluationRecord>, RepositoryError>;

    /// Drop every decision and evaluation.
    async fn clear(&self) -> Result<(), RepositoryError>;
}

/// Typed read of a snapshot.
pub async fn load_snapshot<T: DeserializeOwned>(
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<Option<Versioned<T>>, RepositoryError> {
    match store.get(key).await? {
        Some(stored) => Ok(Some(Versioned {
            version: stored.version,
            updated_at: stored.updated_at,
            value: serde_json::from_value(stored.value)?,
        })),
        None => Ok(None),
    }
}

/// Unconditional typed write; last writer wins.
pub async fn save_snapshot<T: Serialize + Sync>(
    store: &dyn SnapshotStore,
    key: &str,
    value: &T,
) -> Result<u64, RepositoryError> {
    let current = store.get(key).await?.map(|s| s.version);
    store.put(key, serde_json::to_value(value)?, current).await
}

const UPDATE_ATTEMPTS: usize = 3;

/// Read-modify-write of a snapshot under optimistic versioning.
///
/// `apply` runs against the stored value (or `init()` when absent) and may run
/// again if another writer got in between; after a bounded number of conflicts
/// the last conflict is returned.
pub async fn update_snapshot<T, R, F, I>(
    store: &dyn SnapshotStore,
    key: &str,
    init: I,
    mut apply: F,
) -> Result<(T, R), RepositoryError>
where
    T: Serialize + DeserializeOwned + Send,
    R: Send,
    I: Fn() -> T + Send,
    F: FnMut(&mut T) -> R + Send,
{
    let mut last_error = None;
    for _ in 0..UPDATE_ATTEMPTS {
        let (mut value, version) = match load_snapshot::<T>(store, key).await? {
            Some(stored) => (stored.value, Some(stored.version)),
            None => (init(), None),
        };
        let result = apply(&mut value);
        match store.put(key, serde_json::to_value(&value)?, version).await {
            Ok(_) => return Ok((value, result)),
            Err(err @ RepositoryError::Conflict { .. }) => {
                tracing::warn!(key, "Snapshot write conflict, retrying: {}", err);
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error.unwrap_or_else(|| RepositoryError::Locked(key.to_string())))
}
