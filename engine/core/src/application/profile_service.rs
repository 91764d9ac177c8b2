// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Profile Service
//!
//! Keeps company profiles available for Phase 2 by generating missing or
//! stale ones through the profiling model, a bounded number per run.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Company context refresh ahead of refinement

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::response_parser::extract_json;
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::market::{CompanyProfile, CompanyProfileStore};
use crate::domain::sector::{SectorCatalog, SectorCode};

const PROFILE_TEMPERATURE: f32 = 0.3;
const PROFILE_MAX_TOKENS: u32 = 800;
const PROFILE_CONCURRENCY: usize = 2;

/// What one refresh pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileRefresh {
    pub fetched: Vec<String>,
    pub failed: Vec<String>,
    /// Needed a fetch but exceeded the per-run cap
    pub deferred: Vec<String>,
}

pub struct ProfileService {
    catalog: Arc<SectorCatalog>,
    provider: Arc<dyn LLMProvider>,
    store: Arc<dyn CompanyProfileStore>,
    max_per_run: usize,
    max_age: chrono::Duration,
    timeout: Duration,
}

impl ProfileService {
    pub fn new(
        catalog: Arc<SectorCatalog>,
        provider: Arc<dyn LLMProvider>,
        store: Arc<dyn CompanyProfileStore>,
        max_per_run: usize,
        max_age_days: i64,
        timeout_secs: u64,
    ) -> Self {
        Self {
            catalog,
            provider,
            store,
            max_per_run,
            max_age: chrono::Duration::days(max_age_days),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn prompt(ticker: &str, name: &str) -> String {
        format!(
            "Generate a company profile for {ticker} ({name}) in JSON format.\n\n\
The profile should include:\n\
- company_name: the company's name\n\
- summary: 2-3 sentences about what the company does\n\
- business_model: How they make money (1 sentence)\n\
- key_products: List of 3-5 main products/services\n\
- competitors: List of 3-5 main competitors\n\
- market_position: Their position in the market (1 sentence)\n\
- volatility: low, medium or high\n\
- risks: List of 3-5 key business risks\n\
- catalysts: List of 3-5 potential positive catalysts\n\
- sentiment_keywords: List of 5-10 keywords that indicate news about this company\n\n\
Respond with ONLY valid JSON, no explanation."
        )
    }

    fn display_name(&self, ticker: &str, sector: &SectorCode) -> String {
        self.catalog
            .candidates(sector)
            .iter()
            .find(|a| a.ticker.eq_ignore_ascii_case(ticker))
            .map(|a| a.name.clone())
            .unwrap_or_else(|| ticker.to_string())
    }

    /// Generate one profile; the caller decides whether to store it.
    pub async fn generate(&self, ticker: &str, sector: &SectorCode, now: DateTime<Utc>) -> Result<CompanyProfile> {
        let name = self.display_name(ticker, sector);
        let options = GenerationOptions::default()
            .with_temperature(PROFILE_TEMPERATURE)
            .with_max_tokens(PROFILE_MAX_TOKENS)
            .expecting_json();

        let response = tokio::time::timeout(self.timeout, self.provider.generate(&Self::prompt(ticker, &name), &options))
            .await
            .map_err(|_| anyhow::anyhow!("profile generation timed out after {}s", self.timeout.as_secs()))??;

        let mut value = extract_json(&response.text)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("ticker".to_string(), serde_json::Value::String(ticker.to_uppercase()));
            object.remove("updated");
        }
        let mut profile: CompanyProfile = serde_json::from_value(value)?;
        if profile.company_name.is_empty() {
            profile.company_name = name;
        }
        if profile.sector.is_empty() {
            profile.sector = sector.to_string();
        }
        profile.updated = Some(now);
        Ok(profile)
    }

    /// Fetch missing, then stale, profiles for `tickers`, at most the per-run cap.
    pub async fn refresh(&self, tickers: &[(String, SectorCode)], now: DateTime<Utc>) -> Result<ProfileRefresh> {
        let symbols: Vec<String> = tickers.iter().map(|(t, _)| t.clone()).collect();
        let coverage = self.store.coverage(&symbols, now, self.max_age).await?;

        let mut refresh = ProfileRefresh::default();
        let mut queue = Vec::new();
        for ticker in coverage.needing_fetch() {
            if queue.len() >= self.max_per_run {
                refresh.deferred.push(ticker.clone());
                continue;
            }
            let sector = tickers
                .iter()
                .find(|(t, _)| t == ticker)
                .map(|(_, s)| s.clone())
                .unwrap_or_else(SectorCode::general);
            queue.push((ticker.clone(), sector));
        }
        if queue.is_empty() {
            return Ok(refresh);
        }

        let results: Vec<(String, Result<CompanyProfile>)> = stream::iter(queue)
            .map(|(ticker, sector)| async move {
                let result = self.generate(&ticker, &sector, now).await;
                (ticker, result)
            })
            .buffer_unordered(PROFILE_CONCURRENCY)
            .collect()
            .await;

        for (ticker, result) in results {
            let stored = match result {
                Ok(profile) => self.store.put(profile).await.map_err(anyhow::Error::from),
                Err(e) => Err(e),
            };
            match stored {
                Ok(()) => refresh.fetched.push(ticker),
                Err(e) => {
                    warn!(%ticker, "Profile generation failed: {}", e);
                    refresh.failed.push(ticker);
                }
            }
        }
        refresh.fetched.sort();
        refresh.failed.sort();

        info!(
            fetched = refresh.fetched.len(),
            failed = refresh.failed.len(),
            deferred = refresh.deferred.len(),
            "Company profiles refreshed"
        );
        Ok(refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{FinishReason, GenerationResponse, LLMError, TokenUsage};
    use crate::infrastructure::profiles::InMemoryProfileStore;
    use async_trait::async_trait;

    struct ProfileWriter;

    #[async_trait]
    impl LLMProvider for ProfileWriter {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
            if prompt.contains("BAD") {
                return Ok(GenerationResponse {
                    text: "no idea".to_string(),
                    usage: TokenUsage::default(),
                    provider: "test".to_string(),
                    model: "test".to_string(),
                    finish_reason: FinishReason::Stop,
                });
            }
            Ok(GenerationResponse {
                text: r#"Profile: {"summary": "Designs chips.", "risks": ["export rules", "cyclicality"], "sentiment_keywords": ["gpu"]}"#.to_string(),
                usage: TokenUsage::default(),
                provider: "test".to_string(),
                model: "test".to_string(),
                finish_reason: FinishReason::Stop,
            })
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    fn service(store: Arc<InMemoryProfileStore>, cap: usize) -> ProfileService {
        ProfileService::new(
            Arc::new(SectorCatalog::default()),
            Arc::new(ProfileWriter),
            store,
            cap,
            30,
            5,
        )
    }

    #[tokio::test]
    async fn test_refresh_respects_cap_and_records_failures() {
        let store = Arc::new(InMemoryProfileStore::new());
        let xlk = SectorCode::from("XLK");
        let tickers: Vec<(String, SectorCode)> = ["NVDA", "BAD", "AMD", "MSFT"]
            .iter()
            .map(|t| (t.to_string(), xlk.clone()))
            .collect();

        let refresh = service(store.clone(), 3).refresh(&tickers, Utc::now()).await.unwrap();
        assert_eq!(refresh.fetched, vec!["AMD", "NVDA"]);
        assert_eq!(refresh.failed, vec!["BAD"]);
        assert_eq!(refresh.deferred, vec!["MSFT"]);

        let nvda = store.get("NVDA").await.unwrap().unwrap();
        assert_eq!(nvda.risks.len(), 2);
        assert_eq!(nvda.sentiment_factors, vec!["gpu"]);
        assert_eq!(nvda.sector, "XLK");
        assert!(nvda.updated.is_some());
    }

    #[tokio::test]
    async fn test_fresh_profiles_are_not_refetched() {
        let store = Arc::new(InMemoryProfileStore::with_profiles([CompanyProfile {
            ticker: "NVDA".to_string(),
            updated: Some(Utc::now()),
            ..Default::default()
        }]));
        let refresh = service(store, 5)
            .refresh(&[("NVDA".to_string(), SectorCode::from("XLK"))], Utc::now())
            .await
            .unwrap();
        assert_eq!(refresh, ProfileRefresh::default());
    }

    #[test]
    fn test_refresh_is_reported_in_phase2_json() {
        let report = crate::application::two_phase::Phase2Report {
            refined: 2,
            profiles: ProfileRefresh {
                fetched: vec!["NVDA".to_string()],
                deferred: vec!["MSFT".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["profiles"]["fetched"], serde_json::json!(["NVDA"]));
        assert_eq!(json["profiles"]["deferred"], serde_json::json!(["MSFT"]));
        assert_eq!(json["refined"], 2);
    }
}
