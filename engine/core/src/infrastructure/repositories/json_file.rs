// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON File Repositories
//!
//! File-backed snapshot store, record log and decision log. Every
//! read-modify-write holds an exclusive lock file next to the data, and
//! rewrites go through a temp file plus rename.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Durable local persistence without a database

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::feedback::{DecisionRecord, EvaluationRecord};
use crate::domain::repository::{
    DecisionRepository, RecordLog, RepositoryError, SnapshotStore, Versioned,
};

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY: Duration = Duration::from_millis(20);
/// Holders keep a lock for milliseconds; anything older belongs to a dead process.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

/// Written into the lock file so a crashed holder can be recognised.
#[derive(Debug, Serialize, Deserialize)]
struct LockOwner {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Exclusive lock held by creating `<path>` and released on drop.
///
/// A lock left behind by a killed process is broken once it is older than
/// [`STALE_LOCK_AFTER`].
pub(crate) struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub(crate) async fn acquire(path: PathBuf) -> Result<Self, RepositoryError> {
        Self::acquire_with(path, STALE_LOCK_AFTER).await
    }

    pub(crate) async fn acquire_with(path: PathBuf, stale_after: Duration) -> Result<Self, RepositoryError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        for _ in 0..LOCK_ATTEMPTS {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let owner = LockOwner {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    let lock = Self { path };
                    file.write_all(&serde_json::to_vec(&owner)?).await?;
                    file.flush().await?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !break_if_stale(&path, stale_after).await {
                        tokio::time::sleep(LOCK_RETRY).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepositoryError::Locked(path.display().to_string()))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to release lock {:?}: {}", self.path, e);
        }
    }
}

/// Age of a lock file from its owner record, or its mtime when the record is
/// missing or unreadable. `None` when the file is already gone.
async fn lock_age(path: &Path) -> Option<Duration> {
    let content = tokio::fs::read(path).await.ok()?;
    if let Ok(owner) = serde_json::from_slice::<LockOwner>(&content) {
        return Some((Utc::now() - owner.acquired_at).to_std().unwrap_or(Duration::ZERO));
    }
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(modified.elapsed().unwrap_or(Duration::ZERO))
}

/// Remove the lock at `path` if its holder is presumed dead. Returns true when
/// the caller should retry immediately.
async fn break_if_stale(path: &Path, stale_after: Duration) -> bool {
    match lock_age(path).await {
        None => true,
        Some(age) if age > stale_after => {
            // Move it aside first so two waiters cannot both delete a fresh lock.
            let mut aside = path.as_os_str().to_owned();
            aside.push(format!(".stale-{}", std::process::id()));
            let aside = PathBuf::from(aside);
            if tokio::fs::rename(path, &aside).await.is_err() {
                return true;
            }
            match lock_age(&aside).await {
                Some(age) if age <= stale_after => {
                    // Another waiter re-created it in between; put it back.
                    let _ = tokio::fs::rename(&aside, path).await;
                    false
                }
                _ => {
                    warn!(lock = ?path, age_secs = age.as_secs(), "Breaking stale lock");
                    let _ = tokio::fs::remove_file(&aside).await;
                    true
                }
            }
        }
        Some(_) => false,
    }
}

pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RepositoryError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, RepositoryError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, RepositoryError> {
    let Some(content) = read_optional(path).await? else {
        return Ok(Vec::new());
    };
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(RepositoryError::from))
        .collect()
}

async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

async fn rewrite_lines<T: Serialize>(path: &Path, values: &[T]) -> Result<(), RepositoryError> {
    let mut bytes = Vec::new();
    for value in values {
        serde_json::to_writer(&mut bytes, value)?;
        bytes.push(b'\n');
    }
    write_atomic(path, &bytes).await
}

/// Keys and stream names map to relative paths; only plain segments are allowed.
fn relative_path(name: &str, extension: &str) -> Result<PathBuf, RepositoryError> {
    let valid = !name.is_empty()
        && name.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        });
    if !valid {
        return Err(RepositoryError::Io(format!("invalid storage key '{}'", name)));
    }
    Ok(PathBuf::from(format!("{}.{}", name, extension)))
}

/// One `<key>.json` document per snapshot, holding the versioned envelope.
#[derive(Clone)]
pub struct JsonFileSnapshotStore {
    root: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> Result<PathBuf, RepositoryError> {
        Ok(self.root.join(relative_path(key, "json")?))
    }

    async fn read(&self, path: &Path) -> Result<Option<Versioned<serde_json::Value>>, RepositoryError> {
        match read_optional(path).await? {
            Some(content) => Ok(Some(serde_json::from_str(&content)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned<serde_json::Value>>, RepositoryError> {
        self.read(&self.path(key)?).await
    }

    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        let path = self.path(key)?;
        let _lock = FileLock::acquire(lock_path(&path)).await?;

        let found = self.read(&path).await?.map(|v| v.version);
        if found != expected_version {
            return Err(RepositoryError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }

        let version = found.unwrap_or(0) + 1;
        let envelope = Versioned {
            version,
            updated_at: Utc::now(),
            value,
        };
        write_atomic(&path, &serde_json::to_vec_pretty(&envelope)?).await?;
        debug!(key, version, "Snapshot written");
        Ok(version)
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        let path = self.path(key)?;
        let _lock = FileLock::acquire(lock_path(&path)).await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// One `<stream>.jsonl` file per stream.
#[derive(Clone)]
pub struct JsonlRecordLog {
    root: PathBuf,
}

impl JsonlRecordLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, stream: &str) -> Result<PathBuf, RepositoryError> {
        Ok(self.root.join(relative_path(stream, "jsonl")?))
    }
}

#[async_trait]
impl RecordLog for JsonlRecordLog {
    async fn append(&self, stream: &str, record: serde_json::Value) -> Result<(), RepositoryError> {
        let path = self.path(stream)?;
        let _lock = FileLock::acquire(lock_path(&path)).await?;
        append_line(&path, &record).await
    }

    async fn read_all(&self, stream: &str) -> Result<Vec<serde_json::Value>, RepositoryError> {
        read_lines(&self.path(stream)?).await
    }
}

/// Decision log in `decisions.jsonl` plus `evaluations.jsonl`, sharing one lock.
#[derive(Clone)]
pub struct JsonFileDecisionRepository {
    decisions: PathBuf,
    evaluations: PathBuf,
    lock: PathBuf,
}

impl JsonFileDecisionRepository {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            decisions: root.join("decisions.jsonl"),
            evaluations: root.join("evaluations.jsonl"),
            lock: root.join("decisions.lock"),
        }
    }
}

#[async_trait]
impl DecisionRepository for JsonFileDecisionRepository {
    async fn append(&self, record: &DecisionRecord) -> Result<(), RepositoryError> {
        let _lock = FileLock::acquire(self.lock.clone()).await?;
        append_line(&self.decisions, record).await
    }

    async fn find_all(&self) -> Result<Vec<DecisionRecord>, RepositoryError> {
        read_lines(&self.decisions).await
    }

    async fn record_evaluation(&self, evaluation: &EvaluationRecord) -> Result<bool, RepositoryError> {
        let _lock = FileLock::acquire(self.lock.clone()).await?;

        let evaluations: Vec<EvaluationRecord> = read_lines(&self.evaluations).await?;
        if evaluations.iter().any(|e| e.decision_id == evaluation.decision_id) {
            return Ok(false);
        }

        let mut decisions: Vec<DecisionRecord> = read_lines(&self.decisions).await?;
        let decision = decisions
            .iter_mut()
            .find(|d| d.id == evaluation.decision_id)
            .ok_or_else(|| RepositoryError::NotFound(evaluation.decision_id.to_string()))?;
        if decision.evaluated {
            return Ok(false);
        }
        decision.evaluated = true;

        // Evaluation first: a crash before the rewrite still reads as evaluated.
        append_line(&self.evaluations, evaluation).await?;
        rewrite_lines(&self.decisions, &decisions).await?;
        Ok(true)
    }

    async fn evaluations(&self) -> Result<Vec<EvaluationRecord>, RepositoryError> {
        read_lines(&self.evaluations).await
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        let _lock = FileLock::acquire(self.lock.clone()).await?;
        rewrite_lines::<DecisionRecord>(&self.decisions, &[]).await?;
        rewrite_lines::<EvaluationRecord>(&self.evaluations, &[]).await
    }
}
