// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Price History Adapter
//
// Daily closes loaded from a JSON file shaped
// `{ "TICKER": { "YYYY-MM-DD": close, ... }, ... }`.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::market::{MarketDataError, PriceHistory};

type Closes = BTreeMap<NaiveDate, f64>;

#[derive(Debug, Clone, Default)]
pub struct JsonPriceHistory {
    closes: BTreeMap<String, Closes>,
}

impl JsonPriceHistory {
    pub fn new(closes: BTreeMap<String, Closes>) -> Self {
        Self {
            closes: closes
                .into_iter()
                .map(|(ticker, series)| (ticker.to_uppercase(), series))
                .collect(),
        }
    }

    /// Load closes from `path`; a missing file yields an empty history.
    pub fn load(path: &Path) -> Result<Self, MarketDataError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No price history at {:?}; evaluations will stay pending", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(MarketDataError::Unavailable(e.to_string())),
        };
        let closes: BTreeMap<String, Closes> = serde_json::from_str(&content)
            .map_err(|e| MarketDataError::Malformed(format!("{:?}: {}", path, e)))?;
        Ok(Self::new(closes))
    }

    pub fn tickers(&self) -> usize {
        self.closes.len()
    }
}

#[async_trait]
impl PriceHistory for JsonPriceHistory {
    async fn price_change(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<f64>, MarketDataError> {
        let Some(series) = self.closes.get(&ticker.to_uppercase()) else {
            return Ok(None);
        };
        let first = series.range(start..=end).next();
        let last = series.range(start..=end).next_back();
        Ok(match (first, last) {
            (Some((d0, c0)), Some((d1, c1))) if d1 > d0 && *c0 > 0.0 => Some(c1 / c0 - 1.0),
            _ => None,
        })
    }
}
