// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Allocation commands
//!
//! Commands: weights, phase1, phase2, run

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use sectorflow_core::application::two_phase::{FinalAllocation, Phase1Report, Phase1Run, Phase2Report};
use sectorflow_core::domain::allocation::{AllocationDecision, SelectionSource};
use sectorflow_core::domain::refinement::AppliedAction;
use sectorflow_core::domain::scenario::Scenario;

use super::signed;
use crate::context::bootstrap;

/// Percentage points below which a refined weight change is not listed.
const CHANGE_DISPLAY_THRESHOLD: f64 = 0.5;

#[derive(Subcommand)]
pub enum AllocateCommand {
    /// Print the sector weights a scenario derives from the latest sentiment
    Weights {
        #[arg(value_name = "SCENARIO")]
        scenario: Scenario,
    },

    /// Run Phase 1 (sector weights and asset selection) only
    Phase1 {
        #[arg(value_name = "SCENARIO")]
        scenario: Scenario,

        /// Print the stored result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run Phase 2 (refinement and confidence gate) on the stored Phase 1 result
    Phase2 {
        #[arg(value_name = "SCENARIO")]
        scenario: Scenario,

        /// Print the stored result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run Phase 1 followed by Phase 2
    Run {
        #[arg(value_name = "SCENARIO")]
        scenario: Scenario,

        /// Print the stored result as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: AllocateCommand, config_override: Option<PathBuf>) -> Result<()> {
    let ctx = bootstrap(config_override)?;
    let pipeline = &ctx.pipeline;

    match command {
        AllocateCommand::Weights { scenario } => {
            let weights = pipeline.weights(scenario).await?;
            println!("{}", format!("{}: {}", scenario, scenario.description()).bold());
            for (sector, weight) in &weights {
                println!("  {:<6} {:>6.2}%", sector.as_str(), weight);
            }
        }
        AllocateCommand::Phase1 { scenario, json } => {
            let (run, report) = pipeline
                .run_phase1(scenario)
                .await
                .with_context(|| format!("Phase 1 failed for scenario '{}'", scenario))?;
            if json {
                return print_json(&run);
            }
            print_phase1(&run, &report);
        }
        AllocateCommand::Phase2 { scenario, json } => {
            let (result, report) = pipeline
                .run_phase2(scenario)
                .await
                .with_context(|| format!("Phase 2 failed for scenario '{}'", scenario))?;
            if json {
                return print_json(&result);
            }
            print_phase2(&result, &report);
        }
        AllocateCommand::Run { scenario, json } => {
            let (phase1, result, phase2) = pipeline
                .run(scenario)
                .await
                .with_context(|| format!("Allocation run failed for scenario '{}'", scenario))?;
            if json {
                return print_json(&result);
            }
            print_phase1_summary(scenario, &phase1);
            println!();
            print_phase2(&result, &phase2);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_phase1_summary(scenario: Scenario, report: &Phase1Report) {
    println!(
        "{}",
        format!(
            "✓ Phase 1 complete for {}: {} sectors ({} structured, {} extracted, {} ETF fallbacks)",
            scenario, report.sectors, report.structured, report.extracted, report.fallbacks
        )
        .green()
    );
    if !report.skipped.is_empty() {
        let skipped: Vec<&str> = report.skipped.iter().map(|s| s.as_str()).collect();
        println!("  Skipped neutral sectors: {}", skipped.join(", ").dimmed());
    }
}

fn print_phase1(run: &Phase1Run, report: &Phase1Report) {
    print_phase1_summary(run.scenario, report);
    println!();
    for decision in &run.decisions {
        print_decision(decision);
    }
}

fn print_phase2(result: &FinalAllocation, report: &Phase2Report) {
    println!(
        "{}",
        format!(
            "✓ Phase 2 complete for {}: {} refined, {} adjusted, {} kept, {} kept (low confidence)",
            result.scenario, report.refined, report.adjusted, report.kept, report.kept_low_conf
        )
        .green()
    );
    println!("  Confidence threshold: {:.2}", report.threshold);
    let profiles = &report.profiles;
    if !profiles.fetched.is_empty() || !profiles.failed.is_empty() || !profiles.deferred.is_empty() {
        println!(
            "  Profiles: {} generated, {} failed, {} deferred",
            profiles.fetched.len(),
            profiles.failed.len(),
            profiles.deferred.len()
        );
    }
    if report.log_failures > 0 {
        println!(
            "  {}",
            format!("{} decisions could not be logged for feedback", report.log_failures).yellow()
        );
    }
    println!();

    for decision in &result.decisions {
        print_decision(decision);
        let Some(refined) = result
            .refinements
            .iter()
            .find(|r| r.refinement.allocation_id == decision.id)
        else {
            continue;
        };
        let label = match refined.applied {
            AppliedAction::Adjust => refined.applied.as_str().green(),
            AppliedAction::Keep => refined.applied.as_str().normal(),
            AppliedAction::KeepLowConf => refined.applied.as_str().yellow(),
        };
        println!(
            "    Refinement: {} (confidence {:.2}, {:?}, profiles {})",
            label,
            refined.refinement.confidence,
            refined.refinement.provenance,
            refined.refinement.coverage()
        );
        if refined.applied == AppliedAction::Adjust {
            for (ticker, old, new) in refined
                .refinement
                .original_allocation
                .changes(&refined.refinement.new_allocation, CHANGE_DISPLAY_THRESHOLD)
            {
                println!("      {:<6} {:>5.1}% → {:>5.1}%", ticker, old, new);
            }
        }
        if let Some(warning) = &refined.refinement.warning {
            println!("    {}", warning.yellow());
        }
    }
}

fn print_decision(decision: &AllocationDecision) {
    let source = match decision.source {
        SelectionSource::Structured => "structured".normal(),
        SelectionSource::TickerExtraction => "ticker extraction".yellow(),
        SelectionSource::EtfFallback => "ETF fallback".yellow(),
    };
    println!(
        "  {} sentiment {} budget ${:.2} [{}]",
        decision.sector.as_str().bold(),
        signed(decision.sentiment),
        decision.budget,
        source
    );
    for asset in &decision.selected_assets {
        println!(
            "    {:<6} {:>5.1}%  ${:>10.2}",
            asset.ticker,
            asset.weight * 100.0,
            asset.amount
        );
    }
}
