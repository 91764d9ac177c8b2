// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, health, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use sectorflow_core::domain::config::{EngineConfigManifest, CONFIG_PATH_ENV};
use sectorflow_core::infrastructure::catalog::load_catalog;
use sectorflow_core::infrastructure::llm::ProviderRegistry;

use crate::context::load_config;

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");
const CATALOG_TEMPLATE: &str = include_str!("../../templates/sectors.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file and the sector catalog it points to
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Check that every model role resolves to a reachable backend
    Health,

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./sectorflow.yaml)
        #[arg(short, long, default_value = "./sectorflow.yaml")]
        output: PathBuf,

        /// Include every section with comments
        #[arg(long)]
        examples: bool,

        /// Also write a sample sector catalog to this path
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Health => health(config_override).await,
        ConfigCommand::Generate {
            output,
            examples,
            catalog,
        } => generate(output, examples, catalog).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = EngineConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;
    let spec = &config.spec;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./sectorflow.yaml");
        println!("  4. ~/.sectorflow/config.yaml");
        println!("  5. /etc/sectorflow/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Data:".bold());
    println!("  Data directory: {}", spec.data.data_dir.display());
    println!("  Catalog: {}", spec.data.catalog_path().display());
    println!("  Profiles: {}", spec.data.profiles_path().display());
    println!("  Prices: {}", spec.data.prices_path().display());
    println!("  State: {}", spec.data.state_dir().display());
    println!();

    // LLM providers
    println!("{}", "LLM Providers:".bold());
    for provider in &spec.llm_providers {
        let state = if provider.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!("  {} ({}, {})", provider.name.bold(), provider.provider_type, state);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {} ({}s)", model.alias, model.model, model.timeout_secs);
        }
    }
    if let Some(fallback) = &spec.llm_selection.fallback_provider {
        println!("  Fallback provider: {}", fallback);
    }
    println!();

    println!("{}", "Model Roles:".bold());
    for (role, alias) in spec.models.aliases() {
        println!("  {:<11} {}", role, alias);
    }
    println!();

    println!("{}", "Pipeline:".bold());
    println!(
        "  Sentiment: {} (concurrency {})",
        if spec.sentiment.use_model { "model" } else { "keywords only" },
        spec.sentiment.concurrency
    );
    println!("  Capital per scenario: ${:.2}", spec.allocation.capital_per_scenario);
    println!(
        "  Initial confidence threshold: {:.2}",
        spec.feedback.min_confidence_threshold
    );
    println!("  Evaluation window: {} days", spec.feedback.evaluation_days);
    println!("  Learning interval: {}h", spec.learning.interval_hours);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = EngineConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    let catalog_path = config.spec.data.catalog_path();
    let catalog = load_catalog(&catalog_path).context("Sector catalog validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    println!(
        "  {} sectors in {}",
        catalog.sectors.len(),
        catalog_path.display()
    );

    Ok(())
}

async fn health(config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;
    let registry = ProviderRegistry::from_config(&config).context("Failed to initialize LLM providers")?;

    let roles = config.spec.models.aliases();
    let aliases: Vec<&str> = roles.iter().map(|(_, alias)| *alias).collect();
    let results = registry.health_check_aliases(&aliases).await;

    println!("{}", "Model backends:".bold());
    let mut unhealthy = 0;
    for (role, alias) in roles {
        if role == "scoring" && !config.spec.sentiment.use_model {
            println!("  {:<11} {} {}", role, alias, "(unused: keyword scoring)".dimmed());
            continue;
        }
        if !registry.has_alias(alias) {
            unhealthy += 1;
            println!("  {:<11} {} {}", role, alias, "✗ no enabled provider serves this alias".red());
            continue;
        }
        match results.get(alias) {
            Some(Ok(())) => println!("  {:<11} {} {}", role, alias, "✓ healthy".green()),
            Some(Err(e)) => {
                unhealthy += 1;
                println!("  {:<11} {} {}", role, alias, format!("✗ {}", e).red());
            }
            None => {}
        }
    }

    if unhealthy > 0 {
        println!();
        println!(
            "{}",
            format!("{} role(s) will fall back (keyword scoring, ETF selection, unchanged refinement)", unhealthy)
                .yellow()
        );
    }

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool, catalog: Option<PathBuf>) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    write_template(&output, sample)?;
    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    if let Some(path) = catalog {
        write_template(&path, CATALOG_TEMPLATE)?;
        println!(
            "{}",
            format!("✓ Sector catalog generated: {}", path.display()).green()
        );
    }

    Ok(())
}

fn write_template(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))
}
