//! Classify a bot turn without a conversation

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use botcheck_common::Action;
use botcheck_harness::{sanitize_message, HarnessConfig};

use crate::output::{print_item, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Scenario considered active
    #[arg(short, long)]
    pub scenario: Option<String>,

    /// Fragments of the bot turn, in arrival order
    #[arg(required = true)]
    pub fragments: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassificationDisplay {
    pub action: Action,
    pub matcher: String,
    pub priority: i32,
    pub note: String,
}

impl TableDisplay for ClassificationDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Action", "Matcher", "Priority", "Note"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.action.to_string(),
            self.matcher.clone(),
            self.priority.to_string(),
            self.note.clone(),
        ]
    }
}

/// Sanitize the fragments and classify them as one turn
pub fn classify(args: &ClassifyArgs, config: &HarnessConfig) -> Result<Option<ClassificationDisplay>> {
    let classifier = super::classifier(config)?;
    let bindings = config.bindings()?;
    let fragments: Vec<String> = args
        .fragments
        .iter()
        .map(|f| sanitize_message(f))
        .filter(|f| !f.is_empty())
        .collect();

    Ok(classifier
        .classify_detailed(&fragments, args.scenario.as_deref(), &bindings)
        .map(|c| ClassificationDisplay {
            action: c.action,
            matcher: c.rule.matcher.describe(),
            priority: c.rule.priority,
            note: c.rule.note.clone(),
        }))
}

pub async fn execute(args: ClassifyArgs, config: HarnessConfig, format: OutputFormat) -> Result<()> {
    match classify(&args, &config)? {
        Some(display) => print_item(&display, format),
        None => print_warning("No rule matched"),
    }
    Ok(())
}
