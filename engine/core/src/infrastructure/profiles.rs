// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Company Profile Stores
//
// JSON-file store keyed by ticker, plus an in-memory store for tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::market::{CompanyProfile, CompanyProfileStore, MarketDataError};
use crate::infrastructure::repositories::json_file::{lock_path, read_optional, write_atomic, FileLock};

type ProfileMap = BTreeMap<String, CompanyProfile>;

/// Profiles persisted as one JSON object `{ "TICKER": profile }`.
pub struct JsonFileProfileStore {
    path: PathBuf,
}

impl JsonFileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<ProfileMap, MarketDataError> {
        let content = read_optional(&self.path)
            .await
            .map_err(|e| MarketDataError::Unavailable(e.to_string()))?;
        match content {
            Some(content) => serde_json::from_str(&content)
                .map_err(|e| MarketDataError::Malformed(format!("{:?}: {}", self.path, e))),
            None => Ok(ProfileMap::new()),
        }
    }
}

#[async_trait]
impl CompanyProfileStore for JsonFileProfileStore {
    async fn get(&self, ticker: &str) -> Result<Option<CompanyProfile>, MarketDataError> {
        Ok(self.load().await?.remove(&ticker.to_uppercase()))
    }

    async fn put(&self, mut profile: CompanyProfile) -> Result<(), MarketDataError> {
        let unavailable = |e: crate::domain::repository::RepositoryError| {
            MarketDataError::Unavailable(e.to_string())
        };
        let _lock = FileLock::acquire(lock_path(&self.path)).await.map_err(unavailable)?;

        profile.ticker = profile.ticker.to_uppercase();
        let mut profiles = self.load().await?;
        profiles.insert(profile.ticker.clone(), profile);
        let bytes = serde_json::to_vec_pretty(&profiles)
            .map_err(|e| MarketDataError::Malformed(e.to_string()))?;
        write_atomic(&self.path, &bytes).await.map_err(unavailable)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProfileStore {
    profiles: Arc<RwLock<ProfileMap>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = CompanyProfile>) -> Self {
        let store = Self::new();
        {
            let mut map = store.profiles.write();
            for profile in profiles {
                map.insert(profile.ticker.to_uppercase(), profile);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

#[async_trait]
impl CompanyProfileStore for InMemoryProfileStore {
    async fn get(&self, ticker: &str) -> Result<Option<CompanyProfile>, MarketDataError> {
        Ok(self.profiles.read().get(&ticker.to_uppercase()).cloned())
    }

    async fn put(&self, profile: CompanyProfile) -> Result<(), MarketDataError> {
        self.profiles
            .write()
            .insert(profile.ticker.to_uppercase(), profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn profile(ticker: &str, age_days: i64) -> CompanyProfile {
        CompanyProfile {
            ticker: ticker.to_string(),
            company_name: format!("{} Corp", ticker),
            risks: vec!["competition".to_string()],
            updated: Some(Utc::now() - Duration::days(age_days)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_json_store_persists_profiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("company_profiles.json");
        let store = JsonFileProfileStore::new(&path);

        assert!(store.get("NVDA").await.unwrap().is_none());
        store.put(profile("nvda", 1)).await.unwrap();
        store.put(profile("MSFT", 1)).await.unwrap();

        let reopened = JsonFileProfileStore::new(&path);
        let nvda = reopened.get("nvda").await.unwrap().unwrap();
        assert_eq!(nvda.ticker, "NVDA");
        assert!(reopened.get("MSFT").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_coverage_splits_fresh_outdated_missing() {
        let store = InMemoryProfileStore::with_profiles([profile("NVDA", 2), profile("INTC", 45)]);
        let tickers = vec!["NVDA".to_string(), "INTC".to_string(), "AMD".to_string()];
        let coverage = store
            .coverage(&tickers, Utc::now(), Duration::days(30))
            .await
            .unwrap();
        assert_eq!(coverage.fresh, vec!["NVDA"]);
        assert_eq!(coverage.outdated, vec!["INTC"]);
        assert_eq!(coverage.missing, vec!["AMD"]);
        assert_eq!(coverage.needing_fetch().collect::<Vec<_>>(), vec!["AMD", "INTC"]);
    }
}
