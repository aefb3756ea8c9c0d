//! botcheck CLI - Main Entry Point
//!
//! Drives a conversational bot through its scenario templates and reports
//! which conversations finished, failed or stalled.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use botcheck_cli::commands::{self, classify, init, list, rules, run, simulate};
use botcheck_cli::output;

/// botcheck - Scenario-driven conversation tester for chat bots
#[derive(Parser)]
#[command(name = "botcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "botcheck.toml", env = "BOTCHECK_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against the bot in the browser
    Run(run::RunArgs),

    /// Drive one starter against a scripted bot
    Simulate(simulate::SimulateArgs),

    /// List scenarios
    List(list::ListArgs),

    /// Show the rule table in evaluation order
    Rules(rules::RulesArgs),

    /// Classify a bot turn
    Classify(classify::ClassifyArgs),

    /// Write a default configuration file
    InitConfig(init::InitArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let passed = match cli.command {
        Commands::InitConfig(args) => {
            init::execute(args).await?;
            true
        }
        Commands::Version => {
            println!("botcheck v{}", env!("CARGO_PKG_VERSION"));
            println!("Rule engine v{}", botcheck_common::VERSION);
            true
        }
        command => {
            let config = commands::load_config(&cli.config)?;
            match command {
                Commands::Run(args) => run::execute(args, config, cli.format).await?,
                Commands::Simulate(args) => simulate::execute(args, config, cli.format).await?,
                Commands::List(args) => {
                    list::execute(args, config, cli.format).await?;
                    true
                }
                Commands::Rules(args) => {
                    rules::execute(args, config, cli.format).await?;
                    true
                }
                Commands::Classify(args) => {
                    classify::execute(args, config, cli.format).await?;
                    true
                }
                Commands::InitConfig(_) | Commands::Version => true,
            }
        }
    };

    if !passed {
        std::process::exit(1);
    }

    Ok(())
}
