// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Headline Sentiment Scorers
//
// Model-backed scorer that asks a generation backend for a single number,
// and the deterministic keyword scorer used as its fallback.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::news::{ScoringError, SentimentScorer};
use crate::domain::sector::{ScoreProvenance, SectorCatalog, SectorCode};
use crate::domain::sentiment::keyword_score;

const GENERIC_SYSTEM_PROMPT: &str = "You are a financial sentiment analyzer. Rate the sentiment of news headlines \
on a scale from -1.0 (very bearish/negative) to +1.0 (very bullish/positive).

Guidelines:
- Price increases, earnings beats, upgrades, deals: positive (0.3 to 1.0)
- Price drops, layoffs, lawsuits, downgrades: negative (-1.0 to -0.3)
- Neutral news, mixed signals, routine updates: near zero (-0.2 to 0.2)

RESPOND WITH ONLY A NUMBER between -1.0 and 1.0. No explanation.";

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-+]?\d*\.?\d+").expect("score pattern is valid"))
}

/// First number in `text`, clamped to [-1, 1].
pub fn parse_score(text: &str) -> Result<f64, ScoringError> {
    let found = number_pattern()
        .find(text)
        .ok_or_else(|| ScoringError::Unparseable(text.chars().take(40).collect()))?;
    let value: f64 = found
        .as_str()
        .parse()
        .map_err(|_| ScoringError::Unparseable(found.as_str().to_string()))?;
    if !value.is_finite() {
        return Err(ScoringError::Unparseable(found.as_str().to_string()));
    }
    Ok(value.clamp(-1.0, 1.0))
}

pub struct LlmSentimentScorer {
    provider: Arc<dyn LLMProvider>,
    sector_prompts: BTreeMap<SectorCode, String>,
    timeout: Duration,
}

impl LlmSentimentScorer {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            sector_prompts: BTreeMap::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Use each sector's own scoring prompt where the catalog defines one.
    pub fn with_catalog_prompts(mut self, catalog: &SectorCatalog) -> Self {
        self.sector_prompts = catalog
            .sectors
            .iter()
            .filter_map(|s| s.scoring_prompt.clone().map(|p| (s.code.clone(), p)))
            .collect();
        self
    }

    fn system_prompt(&self, sector: Option<&SectorCode>) -> &str {
        sector
            .and_then(|s| self.sector_prompts.get(s))
            .map(String::as_str)
            .unwrap_or(GENERIC_SYSTEM_PROMPT)
    }
}

#[async_trait]
impl SentimentScorer for LlmSentimentScorer {
    async fn score(&self, text: &str, sector: Option<&SectorCode>) -> Result<f64, ScoringError> {
        let prompt = format!(
            "Rate the financial sentiment of this headline:\n\n\"{}\"\n\nScore (-1.0 to +1.0):",
            text
        );
        let options = GenerationOptions::default()
            .with_system_prompt(self.system_prompt(sector))
            .with_temperature(0.1)
            .with_max_tokens(10);

        let response = tokio::time::timeout(self.timeout, self.provider.generate(&prompt, &options))
            .await
            .map_err(|_| ScoringError::Timeout(self.timeout.as_secs()))??;

        parse_score(&response.text)
    }

    fn provenance(&self) -> ScoreProvenance {
        ScoreProvenance::Model
    }
}

/// Deterministic lexicon scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSentimentScorer;

#[async_trait]
impl SentimentScorer for KeywordSentimentScorer {
    async fn score(&self, text: &str, _sector: Option<&SectorCode>) -> Result<f64, ScoringError> {
        Ok(keyword_score(text))
    }

    fn provenance(&self) -> ScoreProvenance {
        ScoreProvenance::Keyword
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{FinishReason, GenerationResponse, LLMError, TokenUsage};

    struct Reply(&'static str);

    #[async_trait]
    impl LLMProvider for Reply {
        async fn generate(
            &self,
            _prompt: &str,
            options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            assert_eq!(options.max_tokens, Some(10));
            Ok(GenerationResponse {
                text: self.0.to_string(),
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

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("0.7").unwrap(), 0.7);
        assert_eq!(parse_score("Score: -0.45 (bearish)").unwrap(), -0.45);
        assert_eq!(parse_score("+.5").unwrap(), 0.5);
        assert_eq!(parse_score("3").unwrap(), 1.0);
        assert!(matches!(parse_score("bullish"), Err(ScoringError::Unparseable(_))));
    }

    #[tokio::test]
    async fn test_llm_scorer_clamps() {
        let scorer = LlmSentimentScorer::new(Arc::new(Reply(" -1.8\n")), 5);
        assert_eq!(scorer.score("Bank fails", None).await.unwrap(), -1.0);
        assert_eq!(scorer.provenance(), ScoreProvenance::Model);
    }

    #[tokio::test]
    async fn test_keyword_scorer() {
        let score = KeywordSentimentScorer
            .score("Chipmaker shares surge on record earnings", None)
            .await
            .unwrap();
        assert!(score > 0.0);
        assert_eq!(KeywordSentimentScorer.provenance(), ScoreProvenance::Keyword);
    }
}
