// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// News Adapters
//
// Headline files (JSON array or JSON Lines) as a NewsSource, a fixed list
// for tests, and recent-news lookup over the latest sentiment snapshot.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::news::{NewsError, NewsSource, RecentNews};
use crate::domain::repository::{keys, load_snapshot, SnapshotStore};
use crate::domain::sector::{Headline, RawHeadline, SectorCode, SentimentSnapshot};

/// Headlines read from a file on every pass.
pub struct HeadlineFileSource {
    path: PathBuf,
}

impl HeadlineFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(path: PathBuf) -> Result<Vec<RawHeadline>, NewsError> {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| NewsError::Unavailable(format!("{:?}: {}", path, e)))?;
        parse_headlines(&content).map_err(|e| NewsError::Unavailable(format!("{:?}: {}", path, e)))
    }
}

/// Parse a JSON array of headlines, or one headline object per line.
pub fn parse_headlines(content: &str) -> Result<Vec<RawHeadline>, serde_json::Error> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content);
    }
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}

impl NewsSource for HeadlineFileSource {
    fn headlines(&self) -> BoxStream<'_, Result<RawHeadline, NewsError>> {
        stream::once(Self::read(self.path.clone()))
            .flat_map(|result| match result {
                Ok(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
                Err(e) => stream::iter(vec![Err(e)]).boxed(),
            })
            .boxed()
    }
}

/// A fixed, in-memory list of headlines.
#[derive(Clone, Default)]
pub struct StaticNewsSource {
    headlines: Vec<RawHeadline>,
}

impl StaticNewsSource {
    pub fn new(headlines: Vec<RawHeadline>) -> Self {
        Self { headlines }
    }
}

impl NewsSource for StaticNewsSource {
    fn headlines(&self) -> BoxStream<'_, Result<RawHeadline, NewsError>> {
        stream::iter(self.headlines.iter().cloned().map(Ok)).boxed()
    }
}

/// Recent headlines taken from the stored latest sentiment snapshot.
pub struct SnapshotRecentNews {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotRecentNews {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecentNews for SnapshotRecentNews {
    async fn recent(&self, sector: &SectorCode, limit: usize) -> Vec<Headline> {
        match load_snapshot::<SentimentSnapshot>(self.store.as_ref(), keys::LATEST_SENTIMENT).await {
            Ok(Some(snapshot)) => snapshot
                .value
                .headlines_for(sector, limit)
                .into_iter()
                .cloned()
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(sector = %sector, "Recent news unavailable: {}", e);
                Vec::new()
            }
        }
    }
}
