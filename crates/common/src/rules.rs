//! Ordered classification rules
//!
//! Rules are kept sorted by ascending priority. The sort is stable, so rules
//! sharing a priority keep their table order and the first match is always
//! the same rule for the same text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::matcher::{Matcher, PatternMatcher, PhraseMatcher};

/// Reply template that selects the first listed option of the bot's turn
pub const FIRST_OPTION_SENTINEL: &str = "__EXTRACT_FIRST_OPTION__";

/// Priority given to rules that do not declare one
pub const DEFAULT_PRIORITY: i32 = 99;

/// What a reply rule sends back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTemplate {
    /// Template materialized against the current bindings
    Literal(String),
    /// First option extracted from the turn itself
    FirstOption,
}

impl ReplyTemplate {
    pub fn parse(template: &str) -> Self {
        if template == FIRST_OPTION_SENTINEL {
            ReplyTemplate::FirstOption
        } else {
            ReplyTemplate::Literal(template.to_string())
        }
    }
}

/// Action attached to a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Reply(ReplyTemplate),
    EndOk,
    EndErr,
    RetryExists,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Reply(ReplyTemplate::Literal(t)) => write!(f, "reply {:?}", t),
            RuleAction::Reply(ReplyTemplate::FirstOption) => write!(f, "reply <first option>"),
            RuleAction::EndOk => write!(f, "end-ok"),
            RuleAction::EndErr => write!(f, "end-err"),
            RuleAction::RetryExists => write!(f, "retry-exists"),
        }
    }
}

/// Which scenarios a rule may fire for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Applicability {
    #[default]
    All,
    /// Only these scenarios; an empty set disables the rule
    Only(BTreeSet<String>),
}

impl Applicability {
    pub fn none() -> Self {
        Applicability::Only(BTreeSet::new())
    }

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Applicability::Only(names.into_iter().map(Into::into).collect())
    }

    /// Whether a rule with this filter may fire while `active` is running
    pub fn applies_to(&self, active: Option<&str>) -> bool {
        match self {
            Applicability::All => true,
            Applicability::Only(set) => active.map_or(false, |name| set.contains(name)),
        }
    }
}

impl fmt::Display for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Applicability::All => write!(f, "all"),
            Applicability::Only(set) if set.is_empty() => write!(f, "none"),
            Applicability::Only(set) => {
                let names: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{}", names.join(", "))
            }
        }
    }
}

/// Whether a rule sees the whole turn or each fragment on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScope {
    /// All fragments joined with newlines
    #[default]
    Turn,
    /// Any single fragment
    Message,
}

/// A (matcher, action, applicability, priority) tuple
#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Arc<dyn Matcher>,
    pub scope: MatchScope,
    pub action: RuleAction,
    pub applicability: Applicability,
    pub priority: i32,
    pub note: String,
}

impl Rule {
    pub fn new(matcher: impl Matcher + 'static, action: RuleAction) -> Self {
        Self {
            matcher: Arc::new(matcher),
            scope: MatchScope::Turn,
            action,
            applicability: Applicability::All,
            priority: DEFAULT_PRIORITY,
            note: String::new(),
        }
    }

    /// Rule backed by a case-insensitive regular expression
    pub fn pattern(pattern: &str, action: RuleAction) -> Result<Self> {
        Ok(Self::new(PatternMatcher::new(pattern)?, action))
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_scope(mut self, scope: MatchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    /// Whether the rule matches the turn, honouring its scope
    pub fn matches(&self, joined: &str, fragments: &[String]) -> bool {
        match self.scope {
            MatchScope::Turn => self.matcher.is_match(joined),
            MatchScope::Message => fragments.iter().any(|f| self.matcher.is_match(f)),
        }
    }
}

/// Rule table kept in evaluation order
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut table = Self { rules };
        table.sort();
        table
    }

    fn sort(&mut self) {
        // Vec::sort_by_key is stable: equal priorities keep table order
        self.rules.sort_by_key(|r| r.priority);
    }

    /// Append a rule and restore evaluation order
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
        self.sort();
    }

    /// Append several rules and restore evaluation order
    pub fn extend(&mut self, rules: impl IntoIterator<Item = Rule>) {
        self.rules.extend(rules);
        self.sort();
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse a rule file
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RuleFile = serde_yaml::from_str(yaml)?;
        let rules = file
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, spec)| spec.into_rule(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules))
    }

    /// Load a rule file from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// On-disk rule file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    pub rules: Vec<RuleSpec>,
}

/// Action names accepted in rule files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Reply,
    EndOk,
    EndErr,
    RetryExists,
}

/// `intents:` accepts `all`, `none`, a single name or a list of names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntentsSpec {
    Keyword(String),
    List(Vec<String>),
}

impl Default for IntentsSpec {
    fn default() -> Self {
        IntentsSpec::Keyword("all".to_string())
    }
}

impl From<IntentsSpec> for Applicability {
    fn from(spec: IntentsSpec) -> Self {
        match spec {
            IntentsSpec::Keyword(k) if k.eq_ignore_ascii_case("all") => Applicability::All,
            IntentsSpec::Keyword(k) if k.eq_ignore_ascii_case("none") => Applicability::none(),
            IntentsSpec::Keyword(name) => Applicability::only([name]),
            IntentsSpec::List(names) => Applicability::only(names),
        }
    }
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// One rule as written in a rule file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub pattern: Option<String>,

    #[serde(default)]
    pub phrase: Option<String>,

    #[serde(default)]
    pub scope: MatchScope,

    pub action: ActionKind,

    /// Reply template (required for `reply`)
    #[serde(default)]
    pub reply: Option<String>,

    #[serde(default)]
    pub intents: IntentsSpec,

    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default)]
    pub note: String,
}

impl RuleSpec {
    pub fn into_rule(self, index: usize) -> Result<Rule> {
        let action = match self.action {
            ActionKind::Reply => {
                let reply = self.reply.ok_or_else(|| Error::InvalidRule {
                    index,
                    reason: "reply action without reply template".to_string(),
                })?;
                RuleAction::Reply(ReplyTemplate::parse(&reply))
            }
            ActionKind::EndOk => RuleAction::EndOk,
            ActionKind::EndErr => RuleAction::EndErr,
            ActionKind::RetryExists => RuleAction::RetryExists,
        };

        let rule = match (self.pattern, self.phrase) {
            (Some(pattern), None) => Rule::pattern(&pattern, action)?,
            (None, Some(phrase)) => Rule::new(PhraseMatcher::new(&phrase), action),
            (Some(_), Some(_)) => {
                return Err(Error::InvalidRule {
                    index,
                    reason: "both pattern and phrase given".to_string(),
                })
            }
            (None, None) => {
                return Err(Error::InvalidRule {
                    index,
                    reason: "missing pattern or phrase".to_string(),
                })
            }
        };

        Ok(rule
            .with_scope(self.scope)
            .with_applicability(self.intents.into())
            .with_priority(self.priority)
            .with_note(self.note))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_sorted_stably_by_priority() {
        let table = RuleTable::new(vec![
            Rule::pattern("a", RuleAction::EndOk).unwrap().with_priority(3).with_note("first-3"),
            Rule::pattern("b", RuleAction::EndOk).unwrap().with_priority(1).with_note("only-1"),
            Rule::pattern("c", RuleAction::EndOk).unwrap().with_priority(3).with_note("second-3"),
        ]);
        let notes: Vec<&str> = table.rules().iter().map(|r| r.note.as_str()).collect();
        assert_eq!(notes, vec!["only-1", "first-3", "second-3"]);
    }

    #[test]
    fn test_applicability() {
        assert!(Applicability::All.applies_to(None));
        assert!(Applicability::All.applies_to(Some("x")));
        assert!(!Applicability::none().applies_to(Some("x")));
        let only = Applicability::only(["create_crop"]);
        assert!(only.applies_to(Some("create_crop")));
        assert!(!only.applies_to(Some("list_crops")));
        assert!(!only.applies_to(None));
    }

    #[test]
    fn test_message_scope_matches_single_fragment() {
        let rule = Rule::pattern(r"^Nombre del cultivo\.?$", RuleAction::EndOk)
            .unwrap()
            .with_scope(MatchScope::Message);
        let fragments = vec!["Vamos a crear un cultivo".to_string(), "Nombre del cultivo.".to_string()];
        let joined = fragments.join("\n");
        assert!(rule.matches(&joined, &fragments));

        let turn_scoped = rule.clone().with_scope(MatchScope::Turn);
        assert!(!turn_scoped.matches(&joined, &fragments));
    }

    #[test]
    fn test_parse_rule_file() {
        let yaml = r#"
rules:
  - pattern: 'opciones:'
    action: reply
    reply: __EXTRACT_FIRST_OPTION__
    priority: 1
    note: options
  - phrase: Nombre del cultivo
    scope: message
    action: reply
    reply: '{crop_name}'
    intents: [create_crop]
    priority: 4
  - pattern: 'error'
    action: end_err
    intents: none
  - pattern: 'ya\s+exist'
    action: retry_exists
    priority: 2
"#;
        let table = RuleTable::from_yaml(yaml).unwrap();
        assert_eq!(table.len(), 4);

        let rules = table.rules();
        assert_eq!(rules[0].action, RuleAction::Reply(ReplyTemplate::FirstOption));
        assert_eq!(rules[1].action, RuleAction::RetryExists);
        assert_eq!(rules[2].scope, MatchScope::Message);
        assert_eq!(rules[2].applicability, Applicability::only(["create_crop"]));
        assert_eq!(rules[3].priority, DEFAULT_PRIORITY);
        assert_eq!(rules[3].applicability, Applicability::none());
    }

    #[test]
    fn test_reply_rule_requires_template() {
        let yaml = "rules:\n  - pattern: x\n    action: reply\n";
        let err = RuleTable::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidRule { index: 0, .. }));
    }

    #[test]
    fn test_rule_needs_exactly_one_matcher() {
        let yaml = "rules:\n  - action: end_ok\n";
        assert!(matches!(
            RuleTable::from_yaml(yaml),
            Err(Error::InvalidRule { index: 0, .. })
        ));

        let yaml = "rules:\n  - pattern: a\n    phrase: b\n    action: end_ok\n";
        assert!(RuleTable::from_yaml(yaml).is_err());
    }
}
