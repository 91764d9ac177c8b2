// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the persistence ports defined in
//! `domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist snapshots, record logs and the decision log
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## JSON File Repositories
//!
//! Durable implementations under the engine's data directory:
//! - **JsonFileSnapshotStore** - one versioned JSON document per key
//! - **JsonlRecordLog** - one JSON Lines file per stream
//! - **JsonFileDecisionRepository** - decisions and evaluations under a lock file
//!
//! ## In-Memory Repositories
//!
//! Lightweight implementations for tests and dry runs.

pub mod json_file;

pub use json_file::{JsonFileDecisionRepository, JsonFileSnapshotStore, JsonlRecordLog};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::feedback::{DecisionRecord, EvaluationRecord};
use crate::domain::repository::{
    DecisionRepository, RecordLog, RepositoryError, SnapshotStore, Versioned,
};

#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    entries: Arc<RwLock<HashMap<String, Versioned<serde_json::Value>>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned<serde_json::Value>>, RepositoryError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.write();
        let found = entries.get(key).map(|v| v.version);
        if found != expected_version {
            return Err(RepositoryError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }
        let version = found.unwrap_or(0) + 1;
        entries.insert(
            key.to_string(),
            Versioned {
                version,
                updated_at: Utc::now(),
                value,
            },
        );
        Ok(version)
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRecordLog {
    streams: Arc<RwLock<HashMap<String, Vec<serde_json::Value>>>>,
}

impl InMemoryRecordLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordLog for InMemoryRecordLog {
    async fn append(&self, stream: &str, record: serde_json::Value) -> Result<(), RepositoryError> {
        self.streams
            .write()
            .entry(stream.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn read_all(&self, stream: &str) -> Result<Vec<serde_json::Value>, RepositoryError> {
        Ok(self.streams.read().get(stream).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct DecisionLog {
    decisions: Vec<DecisionRecord>,
    evaluations: Vec<EvaluationRecord>,
}

#[derive(Clone, Default)]
pub struct InMemoryDecisionRepository {
    log: Arc<RwLock<DecisionLog>>,
}

impl InMemoryDecisionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionRepository for InMemoryDecisionRepository {
    async fn append(&self, record: &DecisionRecord) -> Result<(), RepositoryError> {
        self.log.write().decisions.push(record.clone());
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<DecisionRecord>, RepositoryError> {
        Ok(self.log.read().decisions.clone())
    }

    async fn record_evaluation(&self, evaluation: &EvaluationRecord) -> Result<bool, RepositoryError> {
        let mut log = self.log.write();
        if log
            .evaluations
            .iter()
            .any(|e| e.decision_id == evaluation.decision_id)
        {
            return Ok(false);
        }
        let decision = log
            .decisions
            .iter_mut()
            .find(|d| d.id == evaluation.decision_id)
            .ok_or_else(|| RepositoryError::NotFound(evaluation.decision_id.to_string()))?;
        if decision.evaluated {
            return Ok(false);
        }
        decision.evaluated = true;
        log.evaluations.push(evaluation.clone());
        Ok(true)
    }

    async fn evaluations(&self) -> Result<Vec<EvaluationRecord>, RepositoryError> {
        Ok(self.log.read().evaluations.clone())
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        let mut log = self.log.write();
        log.decisions.clear();
        log.evaluations.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_versioning() {
        let store = InMemorySnapshotStore::new();
        assert_eq!(store.put("learning/model", json!({"a": 1}), None).await.unwrap(), 1);
        assert_eq!(store.put("learning/model", json!({"a": 2}), Some(1)).await.unwrap(), 2);

        let err = store.put("learning/model", json!({"a": 3}), Some(1)).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Conflict { expected: Some(1), found: Some(2), .. }
        ));

        let stored = store.get("learning/model").await.unwrap().unwrap();
        assert_eq!(stored.value, json!({"a": 2}));
    }

    #[tokio::test]
    async fn test_record_log_streams_are_separate() {
        let log = InMemoryRecordLog::new();
        log.append("run_log", json!(1)).await.unwrap();
        log.append("run_log", json!(2)).await.unwrap();
        log.append("sentiment_history", json!(3)).await.unwrap();
        assert_eq!(log.read_all("run_log").await.unwrap(), vec![json!(1), json!(2)]);
        assert!(log.read_all("missing").await.unwrap().is_empty());
    }
}
