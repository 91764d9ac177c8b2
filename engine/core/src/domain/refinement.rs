// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Refinement
//!
//! Phase 2 decisions and the confidence gate that decides whether an adjustment
//! is applied.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Refinement value objects and gate semantics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::allocation::{Allocation, DecisionId};
use super::scenario::Scenario;
use super::sector::SectorCode;

/// Sum deviation from 100 beyond which a refined allocation carries a warning.
pub const ALLOCATION_SUM_TOLERANCE: f64 = 5.0;

/// What the refinement model proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementAction {
    Keep,
    Adjust,
}

/// Why a refinement decision looks the way it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementProvenance {
    /// The model answered with a usable decision
    Model,
    /// No company profiles were available; the backend was not consulted
    MissingContext,
    /// The backend call failed or timed out
    BackendFailure,
    /// The backend answered with something that could not be used
    MalformedResponse,
}

/// Phase 2 output for one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementDecision {
    /// Phase 1 decision this refines
    pub allocation_id: DecisionId,
    pub sector: SectorCode,
    pub scenario: Scenario,
    pub sentiment: f64,
    pub action: RefinementAction,
    pub confidence: f64,
    pub original_allocation: Allocation,
    pub new_allocation: Allocation,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default)]
    pub missing_profiles: Vec<String>,
    pub profiles_available: usize,
    pub provenance: RefinementProvenance,
    pub decided_at: DateTime<Utc>,
}

/// Inputs shared by every refinement outcome for one Phase 1 decision.
#[derive(Debug, Clone)]
pub struct RefinementSubject {
    pub allocation_id: DecisionId,
    pub sector: SectorCode,
    pub scenario: Scenario,
    pub sentiment: f64,
    pub original_allocation: Allocation,
}

impl RefinementDecision {
    /// Decision that leaves the Phase 1 allocation untouched with zero confidence.
    pub fn unchanged(
        subject: RefinementSubject,
        provenance: RefinementProvenance,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            allocation_id: subject.allocation_id,
            sector: subject.sector,
            scenario: subject.scenario,
            sentiment: subject.sentiment,
            action: RefinementAction::Keep,
            confidence: 0.0,
            new_allocation: subject.original_allocation.clone(),
            original_allocation: subject.original_allocation,
            reasoning: reasoning.into(),
            risk_notes: None,
            warning: None,
            missing_profiles: Vec::new(),
            profiles_available: 0,
            provenance,
            decided_at: Utc::now(),
        }
    }

    /// Decision proposed by the model. A `keep` always carries the original allocation.
    pub fn proposed(
        subject: RefinementSubject,
        action: RefinementAction,
        confidence: f64,
        new_allocation: Allocation,
        reasoning: impl Into<String>,
    ) -> Self {
        let new_allocation = match action {
            RefinementAction::Keep => subject.original_allocation.clone(),
            RefinementAction::Adjust => new_allocation,
        };
        let warning = (action == RefinementAction::Adjust
            && (new_allocation.total() - 100.0).abs() > ALLOCATION_SUM_TOLERANCE)
            .then(|| format!("Allocation sums to {:.1}%, expected 100%", new_allocation.total()));

        Self {
            allocation_id: subject.allocation_id,
            sector: subject.sector,
            scenario: subject.scenario,
            sentiment: subject.sentiment,
            action,
            confidence: sanitize_confidence(confidence),
            original_allocation: subject.original_allocation,
            new_allocation,
            reasoning: reasoning.into(),
            risk_notes: None,
            warning,
            missing_profiles: Vec::new(),
            profiles_available: 0,
            provenance: RefinementProvenance::Model,
            decided_at: Utc::now(),
        }
    }

    pub fn with_coverage(mut self, available: usize, missing: Vec<String>) -> Self {
        self.profiles_available = available;
        self.missing_profiles = missing;
        self
    }

    pub fn with_risk_notes(mut self, notes: Option<String>) -> Self {
        self.risk_notes = notes.filter(|n| !n.trim().is_empty());
        self
    }

    /// Profile coverage in the `available/total` form used in reports.
    pub fn coverage(&self) -> String {
        format!(
            "{}/{}",
            self.profiles_available,
            self.profiles_available + self.missing_profiles.len()
        )
    }
}

fn sanitize_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Action actually taken after the confidence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedAction {
    Adjust,
    Keep,
    KeepLowConf,
}

impl AppliedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppliedAction::Adjust => "adjust",
            AppliedAction::Keep => "keep",
            AppliedAction::KeepLowConf => "keep_low_conf",
        }
    }
}

impl fmt::Display for AppliedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of passing a refinement through the confidence gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub action: AppliedAction,
    pub final_allocation: Allocation,
}

/// Apply `adjust` only when its confidence reaches `threshold`.
pub fn apply_gate(decision: &RefinementDecision, threshold: f64) -> GateOutcome {
    match decision.action {
        RefinementAction::Adjust if decision.confidence >= threshold => GateOutcome {
            action: AppliedAction::Adjust,
            final_allocation: decision.new_allocation.clone(),
        },
        RefinementAction::Adjust => GateOutcome {
            action: AppliedAction::KeepLowConf,
            final_allocation: decision.original_allocation.clone(),
        },
        RefinementAction::Keep => GateOutcome {
            action: AppliedAction::Keep,
            final_allocation: decision.original_allocation.clone(),
        },
    }
}
