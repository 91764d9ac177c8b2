// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daily learning command

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sectorflow_core::application::learning_service::LearningOutcome;
use sectorflow_core::domain::config::ConfigurationError;
use sectorflow_core::domain::sector::SectorCode;

use crate::context::bootstrap;

#[derive(Args)]
pub struct LearnCommand {
    /// JSON object of realized sector moves in percent, e.g. {"XLK": 1.8}
    #[arg(long, value_name = "FILE")]
    pub outcomes: PathBuf,

    /// Run even if the learning interval has not elapsed
    #[arg(long)]
    pub force: bool,
}

pub async fn handle_command(command: LearnCommand, config_override: Option<PathBuf>) -> Result<()> {
    let outcomes = read_outcomes(&command.outcomes)?;
    let ctx = bootstrap(config_override)?;

    match ctx.learning.daily_learn(&outcomes, Utc::now(), command.force).await? {
        LearningOutcome::NotDue { last_run, next_due } => {
            println!(
                "{}",
                format!(
                    "Learning not due: last run {}, next due {}",
                    last_run.format("%Y-%m-%d %H:%M"),
                    next_due.format("%Y-%m-%d %H:%M")
                )
                .yellow()
            );
            println!("  Use --force to run anyway");
        }
        LearningOutcome::Learned(event) => {
            let accuracy = event
                .accuracy()
                .map(|a| format!("{:.0}%", a * 100.0))
                .unwrap_or_else(|| "n/a".to_string());
            println!(
                "{}",
                format!("✓ Learned from {} sectors ({} correct, accuracy {})", event.total, event.correct, accuracy)
                    .green()
            );
            if let Some(lifetime) = event.lifetime_accuracy {
                println!("  Lifetime accuracy: {:.0}%", lifetime * 100.0);
            }
            for (sector, change) in &event.sector_updates {
                let arrow = if change.new > change.old {
                    "↑".green()
                } else if change.new < change.old {
                    "↓".red()
                } else {
                    "=".normal()
                };
                println!(
                    "  {:<6} {:.3} {} {:.3}  ({:?})",
                    sector.as_str(),
                    change.old,
                    arrow,
                    change.new,
                    change.outcome
                );
            }
            if !event.source_updates.is_empty() {
                println!("  Source weights updated: {}", event.source_updates.len());
            }
            if !event.prompts_flagged.is_empty() {
                let flagged: Vec<&str> = event.prompts_flagged.iter().map(|s| s.as_str()).collect();
                println!(
                    "  {}",
                    format!("Scoring prompts flagged for review: {}", flagged.join(", ")).yellow()
                );
            }
        }
    }

    Ok(())
}

/// Read `{SECTOR: percent_move}` from `path`.
pub fn read_outcomes(path: &Path) -> Result<BTreeMap<SectorCode, f64>> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigurationError::MissingFile {
            what: "outcomes file".to_string(),
            path: path.to_path_buf(),
        },
        _ => ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;
    let raw: BTreeMap<String, f64> =
        serde_json::from_str(&content).with_context(|| format!("Invalid outcomes file {:?}", path))?;
    Ok(raw
        .into_iter()
        .map(|(sector, pct)| (SectorCode::new(sector), pct))
        .collect())
}
