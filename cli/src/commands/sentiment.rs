// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sentiment commands
//!
//! Commands: harvest, show

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sectorflow_core::domain::config::ConfigurationError;
use sectorflow_core::domain::sector::{SectorCatalog, SentimentSnapshot};
use sectorflow_core::infrastructure::news::HeadlineFileSource;

use super::signed;
use crate::context::bootstrap;

#[derive(Subcommand)]
pub enum SentimentCommand {
    /// Score a headline file and aggregate it into sector sentiment
    Harvest {
        /// JSON array of headlines, or one headline object per line
        #[arg(long, value_name = "FILE")]
        headlines: PathBuf,
    },

    /// Show the latest sector sentiment
    Show {
        /// Also list the scored headlines
        #[arg(long)]
        headlines: bool,
    },
}

pub async fn handle_command(command: SentimentCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        SentimentCommand::Harvest { headlines } => harvest(headlines, config_override).await,
        SentimentCommand::Show { headlines } => show(headlines, config_override).await,
    }
}

async fn harvest(path: PathBuf, config_override: Option<PathBuf>) -> Result<()> {
    if !path.exists() {
        return Err(ConfigurationError::MissingFile {
            what: "headline file".to_string(),
            path,
        }
        .into());
    }

    let ctx = bootstrap(config_override)?;
    let source = HeadlineFileSource::new(path.clone());
    let (snapshot, report) = ctx
        .sentiment
        .harvest(&source)
        .await
        .with_context(|| format!("Sentiment harvest from {:?} failed", path))?;

    println!(
        "{}",
        format!(
            "✓ Harvested {} headlines ({} duplicates, {} source errors)",
            report.received, report.duplicates, report.source_errors
        )
        .green()
    );
    println!(
        "  Scored: {} by model, {} by keywords",
        report.model_scored, report.keyword_scored
    );
    if report.keyword_scored > 0 && ctx.config.spec.sentiment.use_model {
        println!("  {}", "Some headlines fell back to keyword scoring".yellow());
    }
    println!();
    print_sectors(&snapshot, &ctx.catalog);

    Ok(())
}

async fn show(with_headlines: bool, config_override: Option<PathBuf>) -> Result<()> {
    let ctx = bootstrap(config_override)?;
    let Some(snapshot) = ctx.sentiment.latest().await? else {
        println!("{}", "No sentiment snapshot yet. Run `sectorflow sentiment harvest` first.".yellow());
        return Ok(());
    };

    println!(
        "{}",
        format!("Sector sentiment as of {}", snapshot.generated_at.format("%Y-%m-%d %H:%M UTC")).bold()
    );
    println!();
    print_sectors(&snapshot, &ctx.catalog);

    if with_headlines {
        println!();
        println!("{}", "Headlines:".bold());
        for headline in &snapshot.headlines {
            println!(
                "  {} [{:?}] {} ({})",
                signed(headline.sentiment),
                headline.provenance,
                headline.title,
                headline.source.dimmed()
            );
        }
    }

    Ok(())
}

fn print_sectors(snapshot: &SentimentSnapshot, catalog: &SectorCatalog) {
    if snapshot.sectors.is_empty() {
        println!("{}", "No headline matched a catalog sector".yellow());
        return;
    }
    for (code, sector) in &snapshot.sectors {
        let name = catalog.get(code).map(|s| s.name.as_str()).unwrap_or("");
        println!(
            "  {:<6} {:<24} {}  {:<8} {} headlines",
            code.as_str().bold(),
            name,
            signed(sector.score),
            sector.signal.to_string(),
            sector.count
        );
    }
}
