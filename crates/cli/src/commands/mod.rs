//! CLI Commands

pub mod classify;
pub mod init;
pub mod list;
pub mod rules;
pub mod run;
pub mod simulate;

use anyhow::{Context, Result};
use std::path::Path;

use botcheck_common::ResponseClassifier;
use botcheck_harness::{ConversationDriver, HarnessConfig, RunContext};

/// Load the configuration file and apply `BOTCHECK_VAR_*` overrides
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config.apply_env();
    Ok(config)
}

/// Classifier over the configured rule table
pub fn classifier(config: &HarnessConfig) -> Result<ResponseClassifier> {
    Ok(ResponseClassifier::new(config.rule_table()?))
}

/// Driver and fresh run context as configured
pub fn driver(config: &HarnessConfig) -> Result<(ConversationDriver, RunContext)> {
    let driver = ConversationDriver::new(classifier(config)?, config.driver_config())
        .with_randomization(config.randomization.clone());
    let context = RunContext::with_history_len(config.bindings()?, config.run.history_len);
    Ok((driver, context))
}
