//! botcheck common library
//!
//! Everything the conversation driver consults to decide its next move:
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │ TemplateStore│   │  RuleTable   │──▶│  ResponseClassifier  │
//! │  scenarios   │   │ matcher+prio │   │ fragments → Action   │
//! └──────┬───────┘   └──────────────┘   └──────────┬───────────┘
//!        │                                         │
//!        ▼                                         ▼
//!  VariableBindings ─────── materialize ───────▶ Reply text
//! ```

pub mod classifier;
pub mod error;
pub mod matcher;
pub mod reference;
pub mod rules;
pub mod template;
pub mod types;

pub use classifier::{extract_first_option, join_turn, Classification, ResponseClassifier};
pub use error::{Error, Result};
pub use matcher::{Matcher, PatternMatcher, PhraseMatcher};
pub use rules::{
    Applicability, MatchScope, ReplyTemplate, Rule, RuleAction, RuleTable, FIRST_OPTION_SENTINEL,
};
pub use template::{materialize, Scenario, Selection, TemplateStore, VariableBindings};
pub use types::*;

/// botcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
