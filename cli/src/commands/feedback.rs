// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Feedback commands
//!
//! Commands: evaluate, learn, status, reset

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sectorflow_core::domain::feedback::ThresholdChange;

use crate::context::bootstrap;

#[derive(Subcommand)]
pub enum FeedbackCommand {
    /// Evaluate matured decisions against realized prices
    Evaluate,

    /// Adapt the confidence threshold from evaluated decisions
    Learn,

    /// Show the threshold, pending decisions and performance by action
    Status,

    /// Delete the decision log and restore the configured threshold
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

pub async fn handle_command(command: FeedbackCommand, config_override: Option<PathBuf>) -> Result<()> {
    let ctx = bootstrap(config_override)?;
    let feedback = &ctx.feedback;
    let now = Utc::now();

    match command {
        FeedbackCommand::Evaluate => {
            let summary = feedback
                .run_evaluations(now)
                .await
                .context("Failed to evaluate pending decisions")?;
            println!(
                "{}",
                format!(
                    "✓ Evaluated {} decisions ({} awaiting prices, {} already evaluated)",
                    summary.evaluated, summary.awaiting_prices, summary.already_evaluated
                )
                .green()
            );
            if summary.errors > 0 {
                println!("  {}", format!("{} evaluations failed", summary.errors).yellow());
            }
        }
        FeedbackCommand::Learn => {
            let change = feedback
                .learn_from_evaluations(now)
                .await
                .context("Failed to adapt confidence threshold")?;
            match change {
                ThresholdChange::InsufficientData { have, need } => println!(
                    "{}",
                    format!("Not enough evaluated adjustments to learn ({}/{})", have, need).yellow()
                ),
                ThresholdChange::Lowered { from, to } => println!(
                    "{}",
                    format!("✓ Threshold lowered {:.2} → {:.2}: adjustments are paying off", from, to).green()
                ),
                ThresholdChange::Raised { from, to } => println!(
                    "{}",
                    format!("✓ Threshold raised {:.2} → {:.2}: adjustments are underperforming", from, to).green()
                ),
                ThresholdChange::Unchanged { threshold } => {
                    println!("Threshold unchanged at {:.2}", threshold)
                }
            }
        }
        FeedbackCommand::Status => {
            let status = feedback.status(now).await?;
            let config = &status.config;

            println!("{}", "Feedback configuration:".bold());
            println!("  Confidence threshold: {:.2}", config.min_confidence_threshold);
            println!("  Evaluation window: {} days", config.evaluation_days);
            println!("  Learning rate: {:.2}", config.learning_rate);
            println!("  Version: {}", config.version);
            match config.last_updated {
                Some(updated) => println!("  Last updated: {}", updated.format("%Y-%m-%d %H:%M UTC")),
                None => println!("  Last updated: {}", "never".dimmed()),
            }
            println!();

            println!("{}", "Decisions:".bold());
            println!("  Logged: {}", status.decisions);
            println!("  Pending evaluation: {}", status.pending);
            println!("  Evaluated: {}", status.evaluations);
            println!();

            if status.stats.total() == 0 {
                println!("{}", "No evaluations yet".dimmed());
                return Ok(());
            }
            println!("{}", "Performance by action:".bold());
            for (action, stats) in &status.stats.by_action {
                println!(
                    "  {:<14} {:>4} decisions  win rate {:>5.1}%  mean delta {:+.2} pts",
                    action.as_str(),
                    stats.count,
                    stats.win_rate() * 100.0,
                    stats.mean_delta()
                );
            }
            println!();
            println!("{}", "Performance by confidence:".bold());
            for (bucket, stats) in &status.stats.by_confidence {
                println!(
                    "  {:>3}%+ {:>4} decisions  win rate {:>5.1}%",
                    bucket,
                    stats.count,
                    stats.win_rate() * 100.0
                );
            }
        }
        FeedbackCommand::Reset { yes } => {
            if !yes {
                println!(
                    "{}",
                    "This deletes every logged decision and evaluation. Re-run with --yes to confirm.".yellow()
                );
                return Ok(());
            }
            feedback.reset().await.context("Failed to reset feedback state")?;
            println!(
                "{}",
                format!(
                    "✓ Feedback reset; threshold back to {:.2}",
                    feedback.threshold().await?
                )
                .green()
            );
        }
    }

    Ok(())
}
