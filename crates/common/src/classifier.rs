//! Response classification
//!
//! Turns one aggregated bot turn into at most one [`Action`] by walking the
//! rule table in evaluation order. The first applicable rule whose matcher
//! accepts the turn decides; later rules are never consulted.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::rules::{ReplyTemplate, Rule, RuleAction, RuleTable};
use crate::template::VariableBindings;
use crate::types::Action;

/// Reply used when an options list cannot be parsed
pub const FALLBACK_OPTION: &str = "1";

static OPTIONS_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)opciones:[ \t]*([^.\n]*)").expect("options regex"));

static NUMBERED_FIRST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*1[ \t]*[.):][ \t]*(\S.*)$").expect("numbered regex"));

/// Pick the first option offered in a turn.
///
/// `Opciones: a, b, c` yields `a`; otherwise a line such as `1) a` or `1. a`
/// yields `a`; otherwise the literal `"1"`.
pub fn extract_first_option(text: &str) -> String {
    if let Some(caps) = OPTIONS_LIST.captures(text) {
        if let Some(first) = caps[1].split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    if let Some(caps) = NUMBERED_FIRST.captures(text) {
        let rest = caps[1].trim();
        if !rest.is_empty() {
            return rest.to_string();
        }
    }

    FALLBACK_OPTION.to_string()
}

/// Join the fragments of a turn the way turn-scoped rules see them
pub fn join_turn(fragments: &[String]) -> String {
    fragments.join("\n")
}

/// The action chosen for a turn and the rule that chose it
#[derive(Debug, Clone)]
pub struct Classification<'a> {
    pub action: Action,
    pub rule: &'a Rule,
}

/// Classifies bot turns against an ordered rule table
#[derive(Debug, Clone, Default)]
pub struct ResponseClassifier {
    rules: RuleTable,
}

impl ResponseClassifier {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Classify a turn; `None` means no rule matched
    pub fn classify(
        &self,
        fragments: &[String],
        active_scenario: Option<&str>,
        bindings: &VariableBindings,
    ) -> Option<Action> {
        self.classify_detailed(fragments, active_scenario, bindings)
            .map(|c| c.action)
    }

    /// Classify a turn and report which rule decided
    pub fn classify_detailed(
        &self,
        fragments: &[String],
        active_scenario: Option<&str>,
        bindings: &VariableBindings,
    ) -> Option<Classification<'_>> {
        let joined = join_turn(fragments);

        let rule = self.rules.rules().iter().find(|rule| {
            if !rule.applicability.applies_to(active_scenario) {
                return false;
            }
            rule.matches(&joined, fragments)
        })?;

        trace!(
            "Rule matched: {} (priority {}, {})",
            rule.matcher.describe(),
            rule.priority,
            rule.note
        );

        let action = match &rule.action {
            RuleAction::Reply(ReplyTemplate::FirstOption) => {
                Action::Reply(bindings.materialize(&extract_first_option(&joined)))
            }
            RuleAction::Reply(ReplyTemplate::Literal(template)) => {
                Action::Reply(bindings.materialize(template))
            }
            RuleAction::EndOk => Action::EndOk,
            RuleAction::EndErr => Action::EndErr,
            RuleAction::RetryExists => Action::RetryExists,
        };

        Some(Classification { action, rule })
    }
}
