//! Batch run against the browser

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use botcheck_common::{Selection, TemplateStore};
use botcheck_harness::{
    HarnessConfig, PlaywrightConfig, PlaywrightTransport, RunOrchestrator, SuiteResult,
    TemplateResult,
};

use crate::output::{print_error, print_list, print_success, print_value, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run only these scenarios (repeatable)
    #[arg(short, long)]
    pub scenario: Vec<String>,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// JSON file of {"intent", "example"} starters to run instead
    #[arg(long)]
    pub selection: Option<PathBuf>,

    /// Chat contact of the bot
    #[arg(long, env = "BOTCHECK_CONTACT")]
    pub contact: Option<String>,

    /// Run the browser headless
    #[arg(long, env = "BOTCHECK_HEADLESS")]
    pub headless: Option<bool>,

    /// Persistent browser profile directory
    #[arg(long, env = "BOTCHECK_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    /// Output directory for results
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// Flags win over the configuration file
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(contact) = &self.contact {
            config.session.contact_name = contact.clone();
        }
        if let Some(headless) = self.headless {
            config.session.headless = headless;
        }
        if let Some(dir) = &self.session_dir {
            config.session.session_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
    }

    /// Scenarios selected by the flags
    pub fn select(&self, config: &HarnessConfig) -> Result<TemplateStore> {
        let mut store = match &self.selection {
            Some(path) => Selection::from_file(path)?.into_store(),
            None => config.template_store()?,
        };
        if !self.scenario.is_empty() {
            store = store.select_names(&self.scenario)?;
        }
        if let Some(tag) = &self.tag {
            store = store.filter_by_tag(tag);
        }
        Ok(store)
    }
}

/// One row per driven template
#[derive(Serialize)]
pub struct ResultDisplay {
    pub scenario: String,
    pub template: String,
    pub success: bool,
    pub reason: String,
    pub turns: u32,
    pub duration_ms: u64,
}

impl From<&TemplateResult> for ResultDisplay {
    fn from(result: &TemplateResult) -> Self {
        Self {
            scenario: result.scenario.clone(),
            template: result.template.clone(),
            success: result.outcome.success,
            reason: result.outcome.reason.to_string(),
            turns: result.turns,
            duration_ms: result.duration_ms,
        }
    }
}

impl TableDisplay for ResultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Template", "Result", "Reason", "Turns", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        let status = if self.success {
            "✓ ok".green().to_string()
        } else {
            "✗ fail".red().to_string()
        };
        vec![
            self.scenario.clone(),
            self.template.chars().take(50).collect(),
            status,
            self.reason.clone(),
            self.turns.to_string(),
            format!("{:.1}s", self.duration_ms as f64 / 1000.0),
        ]
    }
}

/// Print a suite result: table, totals, then every failure
pub fn print_suite(suite: &SuiteResult, format: OutputFormat) {
    if print_value(suite, format) {
        return;
    }

    let rows: Vec<ResultDisplay> = suite.results.iter().map(ResultDisplay::from).collect();
    print_list(&rows, format);

    println!();
    println!(
        "{} passed, {} failed of {} ({:.1}s)",
        suite.passed.to_string().green().bold(),
        suite.failed.to_string().red().bold(),
        suite.total,
        suite.duration_ms as f64 / 1000.0
    );

    let failures = suite.failure_lines();
    if !failures.is_empty() {
        println!();
        println!("{}", "Failures:".red().bold());
        for line in failures {
            println!("  {}", line);
        }
    }
}

pub async fn execute(args: RunArgs, mut config: HarnessConfig, format: OutputFormat) -> Result<bool> {
    args.apply(&mut config);

    let store = args.select(&config)?;
    if store.is_empty() {
        bail!("no scenarios selected");
    }

    let (driver, context) = super::driver(&config)?;
    let mut orchestrator =
        RunOrchestrator::new(driver, context).with_output_dir(config.output_dir.clone());

    info!(
        "Driving {} template(s) through {}",
        store.template_count(),
        config.session.contact_name
    );
    let mut transport = PlaywrightTransport::launch(PlaywrightConfig::from(&config.session)).await?;

    let suite = orchestrator.run_all(&mut transport, &store).await;

    if let Err(e) = transport.close().await {
        print_error(&format!("Browser did not close cleanly: {}", e));
    }

    print_suite(&suite, format);
    let path = orchestrator.write_results(&suite)?;
    if suite.success() {
        print_success(&format!("All templates passed. Results: {}", path.display()));
    } else {
        print_error(&format!("{} template(s) failed. Results: {}", suite.failed, path.display()));
    }

    Ok(suite.success())
}
