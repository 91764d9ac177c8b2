// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sentiment
//!
//! Headline classification, the deterministic keyword lexicon, and per-sector
//! aggregation.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure reductions from scored headlines to sector sentiment

use std::collections::BTreeMap;

use super::sector::{Headline, ScoreProvenance, SectorCode, SectorSentiment, Signal};

const STRONG_POSITIVE: &[&str] = &[
    "surge", "soar", "skyrocket", "boom", "breakout", "record high", "all-time high",
    "beat expectations", "blowout", "massive gain",
];

const POSITIVE: &[&str] = &[
    "rise", "gain", "up", "jump", "rally", "climb", "advance", "bullish", "optimistic",
    "growth", "profit", "beat", "upgrade", "buy", "outperform", "strong", "recovery",
    "expand", "success", "boost", "improve", "positive", "higher", "increase", "exceed",
    "momentum", "breakthrough", "innovation", "deal", "partnership", "acquisition", "launch",
];

const STRONG_NEGATIVE: &[&str] = &[
    "crash", "plunge", "collapse", "tank", "disaster", "crisis", "bankruptcy", "fraud",
    "scandal", "all-time low", "miss badly",
];

const NEGATIVE: &[&str] = &[
    "fall", "drop", "down", "decline", "sink", "slip", "bearish", "pessimistic", "loss",
    "miss", "cut", "downgrade", "sell", "underperform", "weak", "warning", "risk", "fear",
    "concern", "worry", "threat", "layoff", "recession", "inflation", "debt", "default",
    "lawsuit", "investigation", "probe", "lower", "decrease", "slowdown", "delay",
];

const STRONG_WEIGHT: f64 = 0.4;
const REGULAR_WEIGHT: f64 = 0.15;
const TOP_HEADLINES: usize = 2;
const TOP_TITLE_CHARS: usize = 80;

fn contains_term(padded: &str, term: &str) -> bool {
    // Terms must start on a word boundary; suffixes ("rises", "rallying") still match.
    padded.contains(&format!(" {}", term))
}

/// Deterministic lexicon score in [-1, 1].
pub fn keyword_score(text: &str) -> f64 {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { ' ' })
        .collect();
    let padded = format!(" {} ", normalized);

    let mut score = 0.0;
    for (terms, weight) in [
        (STRONG_POSITIVE, STRONG_WEIGHT),
        (POSITIVE, REGULAR_WEIGHT),
        (STRONG_NEGATIVE, -STRONG_WEIGHT),
        (NEGATIVE, -REGULAR_WEIGHT),
    ] {
        score += terms
            .iter()
            .filter(|term| contains_term(&padded, term))
            .count() as f64
            * weight;
    }
    score.clamp(-1.0, 1.0)
}

/// Lowercase words separated by single spaces, padded so every word has a
/// space on both sides.
fn padded_words(text: &str) -> String {
    let words: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", words.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Whole-word (or whole-phrase) match that also accepts a plural suffix.
fn mentions_keyword(padded_title: &str, keyword: &str) -> bool {
    let keyword = padded_words(keyword);
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    ["", "s", "es"]
        .iter()
        .any(|suffix| padded_title.contains(&format!(" {}{} ", keyword, suffix)))
}

/// Assign a headline to every sector whose keyword set matches its title.
///
/// Matching is case-insensitive on whole words, so "oil" matches "Oil-rich"
/// and "oils" but not "turmoil". A title with no match lands in the general
/// bucket.
pub fn classify_sectors(title: &str, keyword_map: &BTreeMap<SectorCode, Vec<String>>) -> Vec<SectorCode> {
    let padded = padded_words(title);
    let matched: Vec<SectorCode> = keyword_map
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| mentions_keyword(&padded, k)))
        .map(|(code, _)| code.clone())
        .collect();

    if matched.is_empty() {
        vec![SectorCode::general()]
    } else {
        matched
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn truncate_title(title: &str) -> String {
    title.chars().take(TOP_TITLE_CHARS).collect()
}

struct Bucket<'a> {
    members: Vec<(&'a Headline, f64)>,
}

fn bucket_headlines<'a>(
    headlines: &'a [Headline],
    keyword_map: &BTreeMap<SectorCode, Vec<String>>,
    weight_of: impl Fn(&Headline) -> f64,
) -> BTreeMap<SectorCode, Bucket<'a>> {
    let mut buckets: BTreeMap<SectorCode, Bucket<'a>> = BTreeMap::new();
    for headline in headlines {
        let sectors = if headline.sectors.is_empty() {
            classify_sectors(&headline.title, keyword_map)
        } else {
            headline.sectors.clone()
        };
        let weight = weight_of(headline);
        for sector in sectors {
            buckets
                .entry(sector)
                .or_insert_with(|| Bucket { members: Vec::new() })
                .members
                .push((headline, weight));
        }
    }
    buckets
}

fn reduce_bucket(sector: SectorCode, mut bucket: Bucket<'_>) -> SectorSentiment {
    // Sorting first makes the floating-point sum independent of arrival order.
    bucket.members.sort_by(|(a, wa), (b, wb)| {
        a.sentiment
            .total_cmp(&b.sentiment)
            .then(wa.total_cmp(wb))
            .then(a.title.cmp(&b.title))
    });

    let weight_sum: f64 = bucket.members.iter().map(|(_, w)| *w).sum();
    let weighted: f64 = bucket.members.iter().map(|(h, w)| h.sentiment * w).sum();
    let mean = if weight_sum > 0.0 { weighted / weight_sum } else { 0.0 };
    let score = round3(mean.clamp(-1.0, 1.0));

    let keyword_scored = bucket
        .members
        .iter()
        .filter(|(h, _)| h.provenance == ScoreProvenance::Keyword)
        .count();

    let top_negative = bucket
        .members
        .iter()
        .filter(|(h, _)| h.sentiment < 0.0)
        .take(TOP_HEADLINES)
        .map(|(h, _)| truncate_title(&h.title))
        .collect();
    let top_positive = bucket
        .members
        .iter()
        .rev()
        .filter(|(h, _)| h.sentiment > 0.0)
        .take(TOP_HEADLINES)
        .map(|(h, _)| truncate_title(&h.title))
        .collect();

    SectorSentiment {
        sector,
        score,
        count: bucket.members.len(),
        signal: Signal::from_score(score),
        model_scored: bucket.members.len() - keyword_scored,
        keyword_scored,
        top_positive,
        top_negative,
    }
}

/// Aggregate scored headlines into per-sector sentiment.
///
/// Headlines that already carry sector tags keep them; untagged headlines are
/// classified with `keyword_map`. The per-sector score is the arithmetic mean of
/// member scores rounded to three decimals. Empty input yields an empty map.
pub fn aggregate(
    headlines: &[Headline],
    keyword_map: &BTreeMap<SectorCode, Vec<String>>,
) -> BTreeMap<SectorCode, SectorSentiment> {
    bucket_headlines(headlines, keyword_map, |_| 1.0)
        .into_iter()
        .map(|(sector, bucket)| (sector.clone(), reduce_bucket(sector, bucket)))
        .collect()
}

/// Like [`aggregate`], but each headline counts with its source's learned weight.
///
/// Unknown sources weigh 1.0. Non-positive weights are floored so a sector with
/// only distrusted sources still produces a score.
pub fn aggregate_weighted(
    headlines: &[Headline],
    keyword_map: &BTreeMap<SectorCode, Vec<String>>,
    source_weights: &BTreeMap<String, f64>,
) -> BTreeMap<SectorCode, SectorSentiment> {
    let weight_of = |h: &Headline| {
        source_weights
            .get(&h.source)
            .copied()
            .unwrap_or(1.0)
            .max(0.01)
    };
    bucket_headlines(headlines, keyword_map, weight_of)
        .into_iter()
        .map(|(sector, bucket)| (sector.clone(), reduce_bucket(sector, bucket)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sector::RawHeadline;

    fn keyword_map() -> BTreeMap<SectorCode, Vec<String>> {
        BTreeMap::from([
            (SectorCode::from("XLK"), vec!["chip".to_string(), "software".to_string()]),
            (SectorCode::from("XLE"), vec!["oil".to_string(), "opec".to_string()]),
        ])
    }

    fn scored(title: &str, source: &str, sentiment: f64) -> Headline {
        Headline::scored(RawHeadline::new(title, source), sentiment, ScoreProvenance::Model)
    }

    #[test]
    fn test_keyword_score_directions() {
        assert!(keyword_score("Chipmakers surge to record high") > 0.5);
        assert!(keyword_score("Bank faces fraud probe, shares plunge") < -0.5);
        assert_eq!(keyword_score("Committee meets on Tuesday"), 0.0);
    }

    #[test]
    fn test_keyword_score_respects_word_starts() {
        // "supply" must not count as "up"
        assert_eq!(keyword_score("supply"), 0.0);
        assert!((keyword_score("stocks rallying") - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_score_is_clamped() {
        let text = "surge soar skyrocket boom breakout blowout";
        assert_eq!(keyword_score(text), 1.0);
    }

    #[test]
    fn test_classify_multi_sector_and_general() {
        let map = keyword_map();
        let sectors = classify_sectors("OPEC cuts oil output as chip demand slows", &map);
        assert_eq!(sectors, vec![SectorCode::from("XLE"), SectorCode::from("XLK")]);
        assert_eq!(classify_sectors("Weather is nice", &map), vec![SectorCode::general()]);
    }

    #[test]
    fn test_classify_matches_whole_words_only() {
        let map = BTreeMap::from([
            (SectorCode::from("XLE"), vec!["oil".to_string(), "gas".to_string()]),
            (SectorCode::from("XLF"), vec!["fed".to_string(), "interest rate".to_string()]),
        ]);
        let general = vec![SectorCode::general()];

        assert_eq!(classify_sectors("Markets in turmoil after Las Vegas shooting", &map), general);
        assert_eq!(classify_sectors("FedEx beats earnings", &map), general);
        assert_eq!(classify_sectors("Fed holds steady", &map), vec![SectorCode::from("XLF")]);
        assert_eq!(classify_sectors("Oil-rich states see gases vented", &map), vec![SectorCode::from("XLE")]);
        assert_eq!(classify_sectors("Banks brace for Interest Rates decision", &map), vec![SectorCode::from("XLF")]);
    }

    #[test]
    fn test_aggregate_mean_rounding_and_signal() {
        let headlines = vec![
            scored("chip rally", "a", 0.5),
            scored("software boom", "b", 0.2),
            scored("oil slump", "c", -0.4),
        ];
        let result = aggregate(&headlines, &keyword_map());
        let xlk = &result[&SectorCode::from("XLK")];
        assert_eq!(xlk.count, 2);
        assert_eq!(xlk.score, 0.35);
        assert_eq!(xlk.signal, Signal::Buy);
        assert_eq!(result[&SectorCode::from("XLE")].signal, Signal::Sell);
    }

    #[test]
    fn test_aggregate_empty_input() {
        assert!(aggregate(&[], &keyword_map()).is_empty());
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let mut headlines: Vec<Headline> = (0..25)
            .map(|i| scored(&format!("chip story {}", i), "wire", (i as f64 * 0.173).sin()))
            .collect();
        let forward = aggregate(&headlines, &keyword_map());
        headlines.reverse();
        let backward = aggregate(&headlines, &keyword_map());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_aggregate_keeps_existing_tags_and_counts_fallbacks() {
        let tagged = scored("untagged words", "a", 0.3).with_sectors(vec![SectorCode::from("XLU")]);
        let fallback = Headline::scored(
            RawHeadline::new("oil rises", "b"),
            0.15,
            ScoreProvenance::Keyword,
        );
        let result = aggregate(&[tagged, fallback], &keyword_map());
        assert!(result.contains_key(&SectorCode::from("XLU")));
        assert!(result[&SectorCode::from("XLE")].has_fallback_scores());
    }

    #[test]
    fn test_weighted_aggregation_favours_reliable_sources() {
        let headlines = vec![scored("chip up", "good", 0.8), scored("chip down", "bad", -0.8)];
        let weights = BTreeMap::from([("good".to_string(), 0.9), ("bad".to_string(), 0.1)]);
        let result = aggregate_weighted(&headlines, &keyword_map(), &weights);
        assert_eq!(result[&SectorCode::from("XLK")].score, 0.64);
    }
}
