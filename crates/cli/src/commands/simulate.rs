//! Offline dry run against a scripted bot

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use botcheck_harness::{HarnessConfig, LogEvent, RunReport, Script, ScriptedTransport};

use crate::output::{print_item, print_value, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// YAML script of bot turns
    #[arg(long)]
    pub script: PathBuf,

    /// Scenario the starter belongs to
    #[arg(short, long, default_value = "simulated")]
    pub scenario: String,

    /// Keep the configured timings instead of compressing them
    #[arg(long)]
    pub real_time: bool,

    /// Starter message
    pub starter: String,
}

/// Timings for a scripted bot that answers instantly
pub fn compress_timings(config: &mut HarnessConfig) {
    let timing = &mut config.timing;
    timing.first_fragment_timeout_ms = timing.first_fragment_timeout_ms.min(2_000);
    timing.poll_interval_ms = timing.poll_interval_ms.min(10);
    timing.first_fragment_grace_ms = timing.first_fragment_grace_ms.min(50);
    timing.settle_ms = timing.settle_ms.min(20);
    timing.aggregation_backoff_ms = vec![];
    timing.cancel_settle_ms = timing.cancel_settle_ms.min(20);
}

#[derive(Serialize)]
pub struct ReportDisplay {
    pub scenario: String,
    pub starter: String,
    pub success: bool,
    pub reason: String,
    pub turns: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ReportDisplay {
    fn new(scenario: &str, report: &RunReport) -> Self {
        Self {
            scenario: scenario.to_string(),
            starter: report.starter.clone(),
            success: report.outcome.success,
            reason: report.outcome.reason.to_string(),
            turns: report.turns,
            duration_ms: report.duration_ms,
            error: report.error.clone(),
        }
    }
}

impl TableDisplay for ReportDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Starter", "Success", "Reason", "Turns", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.scenario.clone(),
            self.starter.clone(),
            if self.success { "yes" } else { "no" }.to_string(),
            self.reason.clone(),
            self.turns.to_string(),
            format!("{}ms", self.duration_ms),
            self.error.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

#[derive(Serialize)]
struct Simulation<'a> {
    report: &'a ReportDisplay,
    log: &'a [LogEvent],
}

pub async fn execute(args: SimulateArgs, mut config: HarnessConfig, format: OutputFormat) -> Result<bool> {
    if !args.real_time {
        compress_timings(&mut config);
    }

    let script = Script::from_file(&args.script)?;
    let mut transport =
        ScriptedTransport::from_script(script).ignoring([config.run.cancel_keyword.clone()]);

    let (mut driver, mut context) = super::driver(&config)?;
    let report = driver
        .run(&mut transport, &mut context, &args.scenario, &args.starter)
        .await;

    let display = ReportDisplay::new(&args.scenario, &report);
    let log = context.take_log();
    if !print_value(
        &Simulation {
            report: &display,
            log: log.events(),
        },
        format,
    ) {
        print_item(&display, format);
        println!();
        print!("{}", log);
    }

    Ok(report.outcome.success)
}
