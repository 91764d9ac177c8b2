// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # SectorFlow CLI
//!
//! The `sectorflow` binary drives the adaptive allocation pipeline.
//!
//! ## Commands
//!
//! - `sectorflow sentiment harvest|show` - Score headlines and aggregate sector sentiment
//! - `sectorflow learn --outcomes FILE` - Daily learning cycle
//! - `sectorflow allocate weights|phase1|phase2|run SCENARIO` - Two-phase allocation
//! - `sectorflow feedback evaluate|learn|status|reset` - Decision evaluation and threshold learning
//! - `sectorflow config show|validate|generate` - Configuration management
//!
//! Exits with 2 on configuration errors, 1 on any other fatal error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use sectorflow_cli::commands::{self, AllocateCommand, ConfigCommand, FeedbackCommand, SentimentCommand};
use sectorflow_core::domain::config::{ConfigurationError, EngineConfigManifest};

/// SectorFlow - sentiment-driven sector allocation
#[derive(Parser)]
#[command(name = "sectorflow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SECTORFLOW_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SECTORFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Headline scoring and sector sentiment
    #[command(name = "sentiment")]
    Sentiment {
        #[command(subcommand)]
        command: SentimentCommand,
    },

    /// Run the daily learning cycle against realized sector moves
    #[command(name = "learn")]
    Learn {
        #[command(flatten)]
        command: commands::LearnCommand,
    },

    /// Scenario weights and two-phase allocation
    #[command(name = "allocate")]
    Allocate {
        #[command(subcommand)]
        command: AllocateCommand,
    },

    /// Decision evaluation and confidence threshold learning
    #[command(name = "feedback")]
    Feedback {
        #[command(subcommand)]
        command: FeedbackCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Sentiment { command }) => commands::sentiment::handle_command(command, cli.config).await,
        Some(Commands::Learn { command }) => commands::learn::handle_command(command, cli.config).await,
        Some(Commands::Allocate { command }) => commands::allocate::handle_command(command, cli.config).await,
        Some(Commands::Feedback { command }) => commands::feedback::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            anyhow::bail!("no command specified")
        }
    }
}

/// 2 when a configuration error sits anywhere in the chain, 1 otherwise.
fn exit_code(error: &anyhow::Error) -> u8 {
    if error
        .chain()
        .any(|cause| cause.downcast_ref::<ConfigurationError>().is_some())
    {
        2
    } else {
        1
    }
}

/// Initialize tracing subscriber for logging
///
/// `RUST_LOG` wins over `--log-level`, which wins over the configured level.
fn init_logging(cli: &Cli) -> Result<()> {
    // Logging must come up before the config is validated, so read it leniently
    let configured = cli
        .config
        .clone()
        .or_else(EngineConfigManifest::discover_config)
        .and_then(|path| EngineConfigManifest::from_yaml_file(path).ok())
        .map(|config| config.logging())
        .unwrap_or_else(|| EngineConfigManifest::default().logging());

    let level = cli.log_level.as_deref().unwrap_or(&configured.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if configured.format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_exit_with_two() {
        let err = anyhow::Error::new(ConfigurationError::MissingData("no sentiment".to_string()))
            .context("Phase 1 failed");
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::anyhow!("backend exploded").context("Phase 1 failed");
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_cli_parses_allocate_run() {
        let cli = Cli::try_parse_from(["sectorflow", "allocate", "run", "momentum"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Allocate {
                command: AllocateCommand::Run { .. }
            })
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_scenario() {
        assert!(Cli::try_parse_from(["sectorflow", "allocate", "weights", "yolo"]).is_err());
    }
}
