//! Batch runner: every template of every selected scenario, one at a time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use botcheck_common::{materialize, OutcomeReason, RunOutcome, Scenario, TemplateStore};

use crate::context::RunContext;
use crate::driver::ConversationDriver;
use crate::error::HarnessResult;
use crate::log::ConversationLog;
use crate::transport::Transport;

/// File name of the suite results inside the output directory
pub const RESULTS_FILE: &str = "botcheck-results.json";

/// Result of running a single starter template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateResult {
    pub scenario: String,
    /// Starter as sent, variables materialized
    pub template: String,
    pub outcome: RunOutcome,
    pub duration_ms: u64,
    pub turns: u32,
    pub error: Option<String>,
    pub log: ConversationLog,
}

impl TemplateResult {
    /// One-line failure summary: `[scenario] "starter" → reason`
    pub fn failure_line(&self) -> String {
        format!(
            "[{}] \"{}\" → {}",
            self.scenario, self.template, self.outcome.reason
        )
    }
}

/// Result of a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TemplateResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TemplateResult> {
        self.results.iter().filter(|r| !r.outcome.success)
    }

    pub fn failure_lines(&self) -> Vec<String> {
        self.failures().map(TemplateResult::failure_line).collect()
    }

    /// Number of results per failure reason
    pub fn count_reason(&self, reason: OutcomeReason) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.reason == reason)
            .count()
    }
}

/// Runs scenarios through the driver, strictly sequentially
pub struct RunOrchestrator {
    driver: ConversationDriver,
    context: RunContext,
    output_dir: PathBuf,
}

impl RunOrchestrator {
    pub fn new(driver: ConversationDriver, context: RunContext) -> Self {
        Self {
            driver,
            context,
            output_dir: PathBuf::from("test-results"),
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn driver(&self) -> &ConversationDriver {
        &self.driver
    }

    /// Run every template of every scenario in the store
    pub async fn run_all<T>(&mut self, transport: &mut T, store: &TemplateStore) -> SuiteResult
    where
        T: Transport + ?Sized,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();

        info!(
            "Running {} template(s) from {} scenario(s)...",
            store.template_count(),
            store.len()
        );

        for scenario in store.scenarios() {
            results.extend(self.run_scenario(transport, scenario).await);
        }

        let passed = results.iter().filter(|r| r.outcome.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        SuiteResult {
            run_id: Uuid::new_v4(),
            started_at,
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run each template of one scenario; a failure never stops the rest
    pub async fn run_scenario<T>(
        &mut self,
        transport: &mut T,
        scenario: &Scenario,
    ) -> Vec<TemplateResult>
    where
        T: Transport + ?Sized,
    {
        let mut results = Vec::with_capacity(scenario.templates.len());

        for template in &scenario.templates {
            let starter = materialize(template, self.context.bindings().defaults());
            let report = self
                .driver
                .run(transport, &mut self.context, &scenario.name, &starter)
                .await;

            if let Some(message) = &report.error {
                error!("✗ [{}] {} - {}", scenario.name, report.starter, message);
            }

            results.push(TemplateResult {
                scenario: scenario.name.clone(),
                template: report.starter,
                outcome: report.outcome,
                duration_ms: report.duration_ms,
                turns: report.turns,
                error: report.error,
                log: self.context.take_log(),
            });
        }

        results
    }

    /// Write suite results to `<output_dir>/botcheck-results.json`
    pub fn write_results(&self, results: &SuiteResult) -> HarnessResult<PathBuf> {
        write_results(&self.output_dir, results)
    }
}

/// Write suite results as pretty JSON into `output_dir`
pub fn write_results(output_dir: &Path, results: &SuiteResult) -> HarnessResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join(RESULTS_FILE);
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}
