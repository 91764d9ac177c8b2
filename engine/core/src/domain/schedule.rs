// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Schedule
//!
//! Interval checks for recurring jobs (daily learning, profile refresh).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure time-based gating

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last successful run of a recurring job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub job: String,
    pub last_run: DateTime<Utc>,
}

/// True when the job never ran or its interval has fully elapsed.
pub fn should_run(now: DateTime<Utc>, last_run: Option<DateTime<Utc>>, interval: chrono::Duration) -> bool {
    match last_run {
        None => true,
        Some(last) => now - last >= interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_first_run_always_due() {
        assert!(should_run(Utc::now(), None, Duration::days(1)));
    }

    #[test]
    fn test_interval_boundary() {
        let now = Utc::now();
        assert!(!should_run(now, Some(now - Duration::hours(23)), Duration::days(1)));
        assert!(should_run(now, Some(now - Duration::days(1)), Duration::days(1)));
    }

    #[test]
    fn test_clock_skew_is_not_due() {
        let now = Utc::now();
        assert!(!should_run(now, Some(now + Duration::hours(2)), Duration::days(1)));
    }
}
