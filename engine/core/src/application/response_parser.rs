// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Response Parser
//!
//! Pulls structured JSON out of free-form model output (bare, fenced, or
//! embedded in prose), and the lenient ticker scan used when no structure
//! can be recovered.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Typed parsing of generation output

use regex::Regex;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("No JSON object found in response")]
    NoJson,

    #[error("Response JSON does not match the expected shape: {0}")]
    Shape(String),
}

/// Accept `0.4`, `"0.4"` and `"40%"`.
pub fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(number_value(&value))
}

pub fn number_value(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Confidence as a fraction in [0, 1].
///
/// Models answer `0.55`, `"0.55"`, `55` or `"55%"` for the same thing. Bare
/// numbers above 1 and percent strings are read as percentages; anything
/// else (words, negatives, values above 100) is rejected.
pub fn confidence_fraction<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    parse_confidence(&value).map_err(D::Error::custom)
}

pub fn parse_confidence(value: &serde_json::Value) -> Result<f64, String> {
    let (number, percent) = match value {
        serde_json::Value::Null => return Ok(0.0),
        serde_json::Value::Number(n) => (n.as_f64().unwrap_or(f64::NAN), false),
        serde_json::Value::String(s) => {
            let s = s.trim();
            let (digits, percent) = match s.strip_suffix('%') {
                Some(rest) => (rest.trim(), true),
                None => (s, false),
            };
            let number = digits
                .parse::<f64>()
                .map_err(|_| format!("confidence '{}' is not a number", s))?;
            (number, percent)
        }
        other => return Err(format!("confidence {} is not a number", other)),
    };

    if !number.is_finite() || !(0.0..=100.0).contains(&number) {
        return Err(format!("confidence {} is out of range", number));
    }
    if percent || number > 1.0 {
        Ok(number / 100.0)
    } else {
        Ok(number)
    }
}

/// Candidate JSON texts in the order they are tried.
fn candidates(text: &str) -> Vec<&str> {
    let mut found = Vec::new();

    // ```json ... ``` first, then any fenced block
    for marker in ["```json", "```"] {
        if let Some(start) = text.find(marker) {
            let body = &text[start + marker.len()..];
            if let Some(end) = body.find("```") {
                found.push(body[..end].trim());
            }
        }
    }

    found.push(text.trim());

    if let Some(object) = first_balanced_object(text) {
        found.push(object);
    }
    found
}

/// The first `{ ... }` span with balanced braces, ignoring braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first JSON object from `text`.
pub fn extract_json(text: &str) -> Result<serde_json::Value, ParseError> {
    candidates(text)
        .into_iter()
        .filter_map(|candidate| serde_json::from_str::<serde_json::Value>(candidate).ok())
        .find(|value| value.is_object())
        .ok_or(ParseError::NoJson)
}

/// Extract and deserialize the first JSON object in `text`.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let value = extract_json(text)?;
    serde_json::from_value(value).map_err(|e| ParseError::Shape(e.to_string()))
}

/// Candidate tickers mentioned as whole words in `text`, in candidate order, at most `cap`.
pub fn find_tickers<'a>(text: &str, candidates: impl IntoIterator<Item = &'a str>, cap: usize) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for ticker in candidates {
        let ticker = ticker.trim().to_uppercase();
        if !ticker.is_empty() && !tickers.contains(&ticker) {
            tickers.push(ticker);
        }
    }
    if tickers.is_empty() || cap == 0 {
        return Vec::new();
    }

    // Longest first so BRK.B wins over BRK. Dots and hyphens belong to a
    // ticker unless they trail it, so `\b` alone is not enough.
    let mut alternation: Vec<&String> = tickers.iter().collect();
    alternation.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let pattern = format!(
        r"(?i)(?:^|[^A-Za-z0-9.\-])[.\-]*({})[.\-]*(?:[^A-Za-z0-9.\-]|$)",
        alternation
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|")
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    let mentioned: Vec<String> = mentions(&re, text);
    tickers
        .into_iter()
        .filter(|t| mentioned.contains(t))
        .take(cap)
        .collect()
}

/// Every match of the ticker group, including ones that share a separator.
fn mentions(re: &Regex, text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut start = 0;
    while let Some(caps) = re.captures_at(text, start) {
        let Some(ticker) = caps.get(1) else { break };
        found.push(ticker.as_str().to_uppercase());
        start = ticker.end();
        if start >= text.len() {
            break;
        }
    }
    found
}
