// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Refinement Engine
//!
//! Phase 2: reviews one Phase 1 allocation against company profiles and the
//! sector's recent headlines and proposes to keep or adjust it. Refinement
//! never fails; every failure becomes a zero-confidence `keep` whose
//! provenance says what went wrong.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Context-aware review of Phase 1 decisions

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::response_parser::{confidence_fraction, number_value, parse_json, ParseError};
use crate::domain::allocation::{Allocation, AllocationDecision};
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::market::{CompanyProfile, CompanyProfileStore};
use crate::domain::news::RecentNews;
use crate::domain::refinement::{
    RefinementAction, RefinementDecision, RefinementProvenance, RefinementSubject,
};
use crate::domain::sector::{Headline, SectorCatalog};

const REFINEMENT_TEMPERATURE: f32 = 0.3;
const REFINEMENT_MAX_TOKENS: u32 = 600;
const PROFILE_DETAIL_ITEMS: usize = 2;

#[derive(Debug, Deserialize)]
struct RefinementResponse {
    action: String,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    new_allocation: BTreeMap<String, serde_json::Value>,
    #[serde(default, deserialize_with = "confidence_fraction")]
    confidence: f64,
    #[serde(default)]
    risk_notes: Option<serde_json::Value>,
}

pub struct RefinementEngine {
    catalog: Arc<SectorCatalog>,
    provider: Arc<dyn LLMProvider>,
    profiles: Arc<dyn CompanyProfileStore>,
    news: Arc<dyn RecentNews>,
    news_limit: usize,
    timeout: Duration,
}

impl RefinementEngine {
    pub fn new(
        catalog: Arc<SectorCatalog>,
        provider: Arc<dyn LLMProvider>,
        profiles: Arc<dyn CompanyProfileStore>,
        news: Arc<dyn RecentNews>,
        news_limit: usize,
        timeout_secs: u64,
    ) -> Self {
        Self {
            catalog,
            provider,
            profiles,
            news,
            news_limit,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Review one Phase 1 decision.
    pub async fn refine(&self, decision: &AllocationDecision) -> RefinementDecision {
        let subject = RefinementSubject {
            allocation_id: decision.id,
            sector: decision.sector.clone(),
            scenario: decision.scenario,
            sentiment: decision.sentiment,
            original_allocation: decision.allocation(),
        };

        let mut holdings: Vec<(String, f64, Option<CompanyProfile>)> = Vec::new();
        let mut missing = Vec::new();
        let mut found = 0;
        for (ticker, pct) in subject.original_allocation.iter() {
            let profile = match self.profiles.get(ticker).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(%ticker, "Profile lookup failed: {}", e);
                    None
                }
            };
            if profile.is_some() {
                found += 1;
            } else {
                missing.push(ticker.to_string());
            }
            holdings.push((ticker.to_string(), pct, profile));
        }

        if found == 0 {
            debug!(sector = %subject.sector, "No profiles, keeping Phase 1 allocation");
            return RefinementDecision::unchanged(
                subject,
                RefinementProvenance::MissingContext,
                "No company profiles available for refinement",
            )
            .with_coverage(0, missing);
        }

        let news = self.news.recent(&subject.sector, self.news_limit).await;
        let prompt = Self::prompt(&subject, &holdings, &news);
        let options = GenerationOptions::default()
            .with_temperature(REFINEMENT_TEMPERATURE)
            .with_max_tokens(REFINEMENT_MAX_TOKENS)
            .expecting_json();

        let text = match tokio::time::timeout(self.timeout, self.provider.generate(&prompt, &options)).await {
            Ok(Ok(response)) => response.text,
            Ok(Err(e)) => {
                warn!(sector = %subject.sector, "Refinement backend failed: {}", e);
                return RefinementDecision::unchanged(
                    subject,
                    RefinementProvenance::BackendFailure,
                    format!("Backend error: {}", e),
                )
                .with_coverage(found, missing);
            }
            Err(_) => {
                warn!(sector = %subject.sector, timeout_secs = self.timeout.as_secs(), "Refinement timed out");
                return RefinementDecision::unchanged(
                    subject,
                    RefinementProvenance::BackendFailure,
                    format!("Backend error: timed out after {}s", self.timeout.as_secs()),
                )
                .with_coverage(found, missing);
            }
        };

        let refined = match self.interpret(&subject, &text) {
            Ok((action, confidence, allocation, reasoning, risk_notes)) => {
                RefinementDecision::proposed(subject, action, confidence, allocation, reasoning)
                    .with_risk_notes(risk_notes)
            }
            Err(e) => {
                warn!(sector = %subject.sector, "Refinement response unusable: {}", e);
                RefinementDecision::unchanged(
                    subject,
                    RefinementProvenance::MalformedResponse,
                    format!("Parse error: {}", e),
                )
            }
        }
        .with_coverage(found, missing);

        if let Some(warning) = &refined.warning {
            warn!(sector = %refined.sector, "{}", warning);
        }
        info!(
            sector = %refined.sector,
            action = ?refined.action,
            confidence = refined.confidence,
            coverage = %refined.coverage(),
            "Phase 2 refinement"
        );
        refined
    }

    #[allow(clippy::type_complexity)]
    fn interpret(
        &self,
        subject: &RefinementSubject,
        text: &str,
    ) -> Result<(RefinementAction, f64, Allocation, String, Option<String>), ParseError> {
        let parsed: RefinementResponse = parse_json(text)?;
        let action = match parsed.action.trim().to_lowercase().as_str() {
            "keep" => RefinementAction::Keep,
            "adjust" => RefinementAction::Adjust,
            other => return Err(ParseError::Shape(format!("unknown action '{}'", other))),
        };

        let candidates = self.catalog.candidates(&subject.sector);
        let mut allocation = Allocation::new();
        for (ticker, value) in &parsed.new_allocation {
            let ticker = ticker.trim().to_uppercase();
            let known = subject.original_allocation.get(&ticker).is_some()
                || candidates.iter().any(|c| c.ticker.eq_ignore_ascii_case(&ticker));
            let pct = number_value(value);
            if !known {
                debug!(sector = %subject.sector, %ticker, "Dropping ticker outside the candidate set");
                continue;
            }
            if pct.is_finite() && pct > 0.0 {
                allocation.insert(ticker, pct);
            }
        }
        if action == RefinementAction::Adjust && allocation.is_empty() {
            return Err(ParseError::Shape("adjust without a usable allocation".to_string()));
        }

        let risk_notes = parsed.risk_notes.map(|notes| match notes {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        Ok((
            action,
            parsed.confidence,
            allocation,
            parsed.reasoning.unwrap_or_default(),
            risk_notes,
        ))
    }

    fn prompt(
        subject: &RefinementSubject,
        holdings: &[(String, f64, Option<CompanyProfile>)],
        news: &[Headline],
    ) -> String {
        let mut companies = String::new();
        for (ticker, pct, profile) in holdings {
            match profile {
                Some(p) => {
                    let _ = write!(
                        companies,
                        "\n**{ticker}** (current allocation: {pct}%)\n\
- Company: {}\n\
- Business: {}\n\
- Market position: {}\n\
- Volatility: {}\n\
- Key risks: {}\n\
- Catalysts: {}\n",
                        or_unknown(&p.company_name, "Unknown"),
                        or_unknown(&p.summary, "N/A"),
                        or_unknown(&p.market_position, "N/A"),
                        or_unknown(&p.volatility, "N/A"),
                        first_items(&p.risks),
                        first_items(&p.catalysts),
                    );
                }
                None => {
                    let _ = writeln!(companies, "\n**{ticker}** (current allocation: {pct}%) - No profile available");
                }
            }
        }

        let headlines = if news.is_empty() {
            "- No recent news available\n".to_string()
        } else {
            news.iter().map(|h| format!("- {}\n", h.title)).collect()
        };

        format!(
            "You are a portfolio strategist refining asset allocations based on company fundamentals and news.

## Current Situation
**Sector:** {sector}
**Scenario:** {scenario}
**Sentiment Score:** {sentiment:+.2} (scale: -1 bearish to +1 bullish)

## Recent News
{headlines}
## Current Allocation & Company Profiles
{companies}
## Your Task
Review the current allocation considering:
1. How each company's business model aligns with current market sentiment
2. Company-specific risks vs current news themes
3. Potential catalysts that could amplify or dampen sector trends
4. Volatility characteristics for risk management

Should the allocation be adjusted? If so, how?

Return ONLY valid JSON (no markdown, no explanation):
{{
    \"action\": \"keep\" or \"adjust\",
    \"reasoning\": \"Brief explanation (1-2 sentences)\",
    \"new_allocation\": {{\"TICKER\": percentage, ...}},
    \"confidence\": 0.0 to 1.0,
    \"risk_notes\": \"Any specific risks to watch\"
}}

If action is \"keep\", new_allocation should match current allocation.
Percentages must sum to 100.",
            sector = subject.sector,
            scenario = subject.scenario,
            sentiment = subject.sentiment,
        )
    }
}

fn or_unknown<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

fn first_items(items: &[String]) -> String {
    items
        .iter()
        .take(PROFILE_DETAIL_ITEMS)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}
