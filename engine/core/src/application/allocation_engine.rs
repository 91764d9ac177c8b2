// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Allocation Engine
//!
//! Phase 1: asks the selection model to pick assets inside one sector given
//! its sentiment, the scenario and the budget. Structured output is parsed
//! first; a mention-based ticker scan is the lower-confidence second path.
//! `select_or_fallback` turns any failure into a benchmark allocation.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Sentiment-driven asset selection per sector

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::response_parser::{find_tickers, lenient_number, parse_json, ParseError};
use crate::domain::allocation::{
    normalize_assets, AllocationDecision, DecisionId, SelectedAsset, SelectionSource, SentimentClass,
};
use crate::domain::llm::{GenerationOptions, LLMError, LLMProvider};
use crate::domain::scenario::Scenario;
use crate::domain::sector::{Asset, SectorCatalog, SectorCode};

pub const BASE_SYSTEM_PROMPT: &str = "You are a portfolio manager allocating capital inside a single market sector. \
Pick the assets that best fit the sector's sentiment and the trading scenario, and size them.

Respond with JSON only, in this shape:
{\"selected_assets\": [{\"ticker\": \"TICKER\", \"weight\": 0.5, \"reason\": \"short reason\"}], \
\"rationale\": \"one or two sentences\", \"risk_level\": \"low|medium|high\"}

Only use tickers from the list you are given. Weights are fractions of the budget.";

const SELECTION_TEMPERATURE: f32 = 0.3;
const SELECTION_MAX_TOKENS: u32 = 500;
const MAX_EXTRACTED_TICKERS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Sector {0} has no candidate assets")]
    NoCandidates(SectorCode),

    #[error("Selection backend failed: {0}")]
    Backend(#[from] LLMError),

    #[error("Selection timed out after {0}s")]
    Timeout(u64),

    #[error("Selection failed: {0}")]
    SelectionFailed(String),
}

#[derive(Debug, Deserialize)]
struct SelectionResponse {
    #[serde(default)]
    selected_assets: Vec<ProposedAsset>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    risk_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProposedAsset {
    ticker: String,
    #[serde(default, deserialize_with = "lenient_number")]
    weight: f64,
    #[serde(default)]
    reason: Option<String>,
}

pub struct AllocationEngine {
    catalog: Arc<SectorCatalog>,
    provider: Arc<dyn LLMProvider>,
    base_prompt: String,
    timeout: Duration,
}

impl AllocationEngine {
    pub fn new(catalog: Arc<SectorCatalog>, provider: Arc<dyn LLMProvider>, timeout_secs: u64) -> Self {
        Self {
            catalog,
            provider,
            base_prompt: BASE_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_base_prompt(mut self, prompt: Option<String>) -> Self {
        if let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) {
            self.base_prompt = prompt;
        }
        self
    }

    fn system_prompt(&self, sector: &SectorCode) -> String {
        match self.catalog.get(sector).and_then(|s| s.selection_prompt.as_deref()) {
            Some(extra) => format!("{}\n\n{}", self.base_prompt, extra),
            None => self.base_prompt.clone(),
        }
    }

    fn user_prompt(sector: &SectorCode, sentiment: f64, scenario: Scenario, budget: f64, candidates: &[Asset]) -> String {
        let assets = candidates
            .iter()
            .map(|a| {
                let focus = if a.focus.is_empty() { "general" } else { a.focus.as_str() };
                format!("- {}: {} ({})", a.ticker, a.name, focus)
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Conditions:\n- Sector: {}\n- Sentiment: {:+.2} ({})\n- Scenario: {}\n- Budget: ${:.0}\n\nAvailable assets:\n{}\n\nSelect best assets. Return valid JSON only.",
            sector,
            sentiment,
            SentimentClass::from_score(sentiment).as_str(),
            scenario,
            budget,
            assets
        )
    }

    /// Select assets for one sector.
    pub async fn select(
        &self,
        sector: &SectorCode,
        sentiment: f64,
        scenario: Scenario,
        budget: f64,
    ) -> Result<AllocationDecision, SelectionError> {
        let candidates = self.catalog.candidates(sector);
        if candidates.is_empty() {
            return Err(SelectionError::NoCandidates(sector.clone()));
        }

        let prompt = Self::user_prompt(sector, sentiment, scenario, budget, candidates);
        let options = GenerationOptions::default()
            .with_system_prompt(self.system_prompt(sector))
            .with_temperature(SELECTION_TEMPERATURE)
            .with_max_tokens(SELECTION_MAX_TOKENS)
            .expecting_json();

        let response = tokio::time::timeout(self.timeout, self.provider.generate(&prompt, &options))
            .await
            .map_err(|_| SelectionError::Timeout(self.timeout.as_secs()))??;

        let (assets, rationale, risk_level, source) = match Self::parse_structured(&response.text, candidates) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(sector = %sector, "Structured selection unusable ({}), scanning for tickers", e);
                let tickers = find_tickers(
                    &response.text,
                    candidates.iter().map(|a| a.ticker.as_str()),
                    MAX_EXTRACTED_TICKERS,
                );
                if tickers.is_empty() {
                    return Err(SelectionError::SelectionFailed(format!(
                        "no usable selection in response ({})",
                        e
                    )));
                }
                let assets = tickers
                    .into_iter()
                    .map(|ticker| SelectedAsset {
                        ticker,
                        weight: 1.0,
                        amount: 0.0,
                        reason: None,
                    })
                    .collect();
                (
                    assets,
                    "Extracted from response".to_string(),
                    "medium".to_string(),
                    SelectionSource::TickerExtraction,
                )
            }
        };

        let selected_assets = normalize_assets(assets, budget);
        info!(
            sector = %sector,
            scenario = %scenario,
            assets = selected_assets.len(),
            source = ?source,
            "Phase 1 selection"
        );

        Ok(AllocationDecision {
            id: DecisionId::new(),
            sector: sector.clone(),
            sentiment,
            scenario,
            budget,
            selected_assets,
            rationale,
            risk_level,
            source,
            decided_at: chrono::Utc::now(),
        })
    }

    fn parse_structured(
        text: &str,
        candidates: &[Asset],
    ) -> Result<(Vec<SelectedAsset>, String, String, SelectionSource), ParseError> {
        let parsed: SelectionResponse = parse_json(text)?;
        let assets: Vec<SelectedAsset> = parsed
            .selected_assets
            .into_iter()
            .filter(|a| candidates.iter().any(|c| c.ticker.eq_ignore_ascii_case(a.ticker.trim())))
            .map(|a| SelectedAsset {
                ticker: a.ticker,
                weight: a.weight,
                amount: 0.0,
                reason: a.reason,
            })
            .collect();
        if assets.is_empty() {
            return Err(ParseError::Shape("no candidate tickers selected".to_string()));
        }
        Ok((
            assets,
            parsed.rationale.unwrap_or_else(|| "N/A".to_string()),
            parsed.risk_level.unwrap_or_else(|| "medium".to_string()),
            SelectionSource::Structured,
        ))
    }

    /// Select assets, placing the whole budget in the sector benchmark on any failure.
    pub async fn select_or_fallback(
        &self,
        sector: &SectorCode,
        sentiment: f64,
        scenario: Scenario,
        budget: f64,
    ) -> AllocationDecision {
        match self.select(sector, sentiment, scenario, budget).await {
            Ok(decision) => decision,
            Err(e) => {
                let benchmark = self.catalog.benchmark_for(sector);
                warn!(sector = %sector, %benchmark, "Phase 1 selection failed, using benchmark: {}", e);
                AllocationDecision::etf_fallback(
                    sector.clone(),
                    benchmark,
                    sentiment,
                    scenario,
                    budget,
                    format!("Benchmark fallback: {}", e),
                )
            }
        }
    }
}
