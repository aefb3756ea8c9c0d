//! Show the effective rule table

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use botcheck_common::{MatchScope, Rule};
use botcheck_harness::HarnessConfig;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct RulesArgs {
    /// Only rules that may fire for this scenario
    #[arg(short, long)]
    pub scenario: Option<String>,
}

/// One rule in evaluation order
#[derive(Serialize)]
pub struct RuleDisplay {
    pub order: usize,
    pub priority: i32,
    pub scope: MatchScope,
    pub matcher: String,
    pub action: String,
    pub intents: String,
    pub note: String,
}

impl RuleDisplay {
    fn new(order: usize, rule: &Rule) -> Self {
        Self {
            order,
            priority: rule.priority,
            scope: rule.scope,
            matcher: rule.matcher.describe(),
            action: rule.action.to_string(),
            intents: rule.applicability.to_string(),
            note: rule.note.clone(),
        }
    }
}

impl TableDisplay for RuleDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Priority", "Scope", "Matcher", "Action", "Intents", "Note"]
    }

    fn row(&self) -> Vec<String> {
        let scope = match self.scope {
            MatchScope::Turn => "turn",
            MatchScope::Message => "message",
        };
        vec![
            self.order.to_string(),
            self.priority.to_string(),
            scope.to_string(),
            self.matcher.clone(),
            self.action.clone(),
            self.intents.clone(),
            self.note.clone(),
        ]
    }
}

pub async fn execute(args: RulesArgs, config: HarnessConfig, format: OutputFormat) -> Result<()> {
    let table = config.rule_table()?;
    let rows: Vec<RuleDisplay> = table
        .rules()
        .iter()
        .enumerate()
        .filter(|(_, rule)| match &args.scenario {
            Some(name) => rule.applicability.applies_to(Some(name)),
            None => true,
        })
        .map(|(i, rule)| RuleDisplay::new(i + 1, rule))
        .collect();

    print_list(&rows, format);
    Ok(())
}
